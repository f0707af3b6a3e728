//! Error types for cluster defaulting

use crate::vfs::VfsError;

/// Result type alias for defaulting operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while filling in a cluster spec.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A shared network id did not resolve to a network.
    #[error("unable to find VPC ID {network_id:?}")]
    VpcNotFound { network_id: String },

    /// The shared network exists but reports no CIDR.
    #[error("unable to infer network CIDR from VPC ID {network_id:?}, please specify network_cidr")]
    VpcCidrUnknown { network_id: String },

    /// The cloud failed while looking up the shared network.
    #[error("error looking up VPC {network_id:?}: {source:#}")]
    Cloud {
        network_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// A CIDR in the cluster spec could not be parsed.
    #[error("invalid CIDR {cidr:?}: {reason}")]
    InvalidCidr { cidr: String, reason: String },

    /// Incrementing an address left its CIDR.
    #[error("overflowed CIDR {cidr} while incrementing IP")]
    IpOverflow { cidr: String },

    /// Every candidate block of the network CIDR is already taken.
    #[error("no free block left in network CIDR {network_cidr} for subnet {subnet}")]
    SubnetSpaceExhausted { network_cidr: String, subnet: String },

    /// The channel document could not be read.
    #[error("unable to load channel {channel:?}: {source}")]
    Channel {
        channel: String,
        #[source]
        source: VfsError,
    },

    /// The channel document is not valid TOML.
    #[error("unable to parse channel {channel:?}: {source}")]
    ChannelParse {
        channel: String,
        #[source]
        source: toml::de::Error,
    },

    /// No version was set, and the stable marker could not be read.
    #[error("KubernetesVersion not specified, and unable to download latest version from {url:?}: {source}")]
    LatestVersion {
        url: String,
        #[source]
        source: VfsError,
    },

    /// The cluster spec document is not valid TOML.
    #[error("invalid cluster spec: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn invalid_cidr(cidr: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCidr {
            cidr: cidr.to_string(),
            reason: reason.into(),
        }
    }
}
