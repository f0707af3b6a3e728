//! Defaulting - fill in the required, immutable values of a cluster spec
//!
//! Runs on create and on every update, so every assignment only touches
//! values that are still empty.

use crate::cidr::{Ipv4Cidr, increment_ip};
use crate::cluster::{Cluster, Topology};
use crate::error::{Error, Result};
use crate::vfs::Vfs;
use converge::{Cloud, VpcInfo};
use serde::Deserialize;

pub const DEFAULT_NETWORK_CIDR: &str = "172.20.0.0/16";
pub const DEFAULT_NON_MASQUERADE_CIDR: &str = "100.64.0.0/10";
pub const STABLE_VERSION_URL: &str =
    "https://storage.googleapis.com/kubernetes-release/release/stable.txt";

const AWS_METADATA_ADDRESS: &str = "169.254.169.254";

/// Bits added to the network prefix for each assigned subnet
const SUBNET_EXTRA_BITS: u8 = 3;

/// Populate every defaulted value of `cluster`
pub fn perform_assignments(cluster: &mut Cluster, cloud: &dyn Cloud, vfs: &dyn Vfs) -> Result<()> {
    let vpc = if !cluster.shared_vpc() {
        None
    } else if cluster.spec.network_cidr.is_empty() {
        Some(find_shared_vpc(cluster, cloud)?)
    } else {
        lookup_shared_vpc(cluster, cloud)
    };

    if let Some(vpc) = &vpc
        && cluster.spec.network_cidr.is_empty()
    {
        if vpc.cidr.is_empty() {
            return Err(Error::VpcCidrUnknown {
                network_id: cluster.spec.network_id.clone(),
            });
        }
        cluster.spec.network_cidr = vpc.cidr.clone();
    }

    if cluster.spec.topology.is_none() {
        cluster.spec.topology = Some(Topology::default());
    }

    if cluster.spec.network_cidr.is_empty() && !cluster.shared_vpc() {
        cluster.spec.network_cidr = DEFAULT_NETWORK_CIDR.to_string();
    }

    if cluster.spec.non_masquerade_cidr.is_empty() {
        cluster.spec.non_masquerade_cidr = DEFAULT_NON_MASQUERADE_CIDR.to_string();
    }

    if cluster.spec.master_public_name.is_empty() && !cluster.name.is_empty() {
        cluster.spec.master_public_name = format!("api.{}", cluster.name);
    }

    assign_cidrs_to_subnets(cluster, vpc.as_ref())?;
    assign_proxy(cluster)?;
    ensure_kubernetes_version(cluster, vfs)
}

/// Shared network of a cluster that already names its CIDR
///
/// Only used to resolve subnet ids, so a missing network or a failed
/// lookup leaves the spec as configured.
fn lookup_shared_vpc(cluster: &Cluster, cloud: &dyn Cloud) -> Option<VpcInfo> {
    let network_id = &cluster.spec.network_id;
    match cloud.find_vpc_info(network_id) {
        Ok(Some(vpc)) => Some(vpc),
        Ok(None) => {
            log::debug!("Shared network {network_id} not found; keeping configured CIDR");
            None
        }
        Err(e) => {
            log::warn!("Could not look up shared network {network_id}: {e:#}");
            None
        }
    }
}

fn find_shared_vpc(cluster: &Cluster, cloud: &dyn Cloud) -> Result<VpcInfo> {
    let network_id = &cluster.spec.network_id;
    cloud
        .find_vpc_info(network_id)
        .map_err(|source| Error::Cloud {
            network_id: network_id.clone(),
            source,
        })?
        .ok_or_else(|| Error::VpcNotFound {
            network_id: network_id.clone(),
        })
}

/// Give every subnet without a CIDR one
///
/// Subnets naming an existing subnet id take its CIDR from the shared
/// network. The rest get successive free blocks of the network CIDR, each
/// three bits longer than the network prefix.
pub fn assign_cidrs_to_subnets(cluster: &mut Cluster, vpc: Option<&VpcInfo>) -> Result<()> {
    if let Some(vpc) = vpc {
        for subnet in &mut cluster.spec.subnets {
            if !subnet.cidr.is_empty() || subnet.id.is_empty() {
                continue;
            }
            if let Some(existing) = vpc.subnets.iter().find(|s| s.id == subnet.id) {
                log::info!("Using CIDR {} of existing subnet {}", existing.cidr, existing.id);
                subnet.cidr = existing.cidr.clone();
            }
        }
    }

    if cluster.spec.subnets.iter().all(|s| !s.cidr.is_empty()) {
        return Ok(());
    }

    let network_cidr = cluster.spec.network_cidr.clone();
    let network: Ipv4Cidr = network_cidr.parse()?;

    let mut used = Vec::new();
    for cidr in cluster.spec.subnets.iter().map(|s| &s.cidr).filter(|c| !c.is_empty()) {
        used.push(cidr.parse::<Ipv4Cidr>()?);
    }
    for existing in vpc.into_iter().flat_map(|v| &v.subnets) {
        if let Ok(cidr) = existing.cidr.parse::<Ipv4Cidr>() {
            used.push(cidr);
        }
    }

    let blocks = network.subdivide(SUBNET_EXTRA_BITS).ok_or_else(|| {
        Error::invalid_cidr(&network_cidr, "too small to split into subnets")
    })?;
    let mut free = blocks.filter(|block| !used.iter().any(|u| u.overlaps(block)));

    for subnet in &mut cluster.spec.subnets {
        if !subnet.cidr.is_empty() {
            continue;
        }
        let block = free.next().ok_or_else(|| Error::SubnetSpaceExhausted {
            network_cidr: network_cidr.clone(),
            subnet: subnet.name.clone(),
        })?;
        log::info!("Assigned CIDR {block} to subnet {}", subnet.name);
        subnet.cidr = block.to_string();
    }

    Ok(())
}

/// Extend the proxy excludes with the cluster's own addresses
///
/// No-op without an egress proxy. Entries already mentioned in the
/// configured excludes are not added again.
pub fn assign_proxy(cluster: &mut Cluster) -> Result<()> {
    let Some(proxy) = &cluster.spec.egress_proxy else {
        log::trace!("Not setting up proxy excludes");
        return Ok(());
    };

    let configured = proxy.proxy_excludes.clone();
    let mut excludes: Vec<String> = if configured.is_empty() {
        Vec::new()
    } else {
        configured.split(',').map(str::to_string).collect()
    };

    let spec = &cluster.spec;
    let (ip, _) = Ipv4Cidr::parse_with_ip(&spec.non_masquerade_cidr)?;
    let first_ip = increment_ip(ip, &spec.non_masquerade_cidr)?.to_string();

    let mut candidates = vec![
        "127.0.0.1",
        "localhost",
        spec.cluster_dns_domain.as_str(),
        spec.master_public_name.as_str(),
        cluster.name.as_str(),
        first_ip.as_str(),
        spec.non_masquerade_cidr.as_str(),
    ];
    if spec.cloud_provider == "aws" {
        candidates.push(AWS_METADATA_ADDRESS);
    }
    if spec.network_cidr.is_empty() {
        log::warn!("No network CIDR defined (yet), not adding it to the proxy excludes");
    } else {
        candidates.push(spec.network_cidr.as_str());
    }

    for exclude in candidates {
        if exclude.is_empty() || configured.contains(exclude) || excludes.iter().any(|e| e == exclude)
        {
            continue;
        }
        excludes.push(exclude.to_string());
    }

    let joined = excludes.join(",");
    log::trace!("Proxy excludes set to {joined:?}");
    if let Some(proxy) = &mut cluster.spec.egress_proxy {
        proxy.proxy_excludes = joined;
    }
    Ok(())
}

/// Channel document; only the recommendation is read
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub recommended_kubernetes_version: Option<String>,
}

impl Channel {
    pub fn load(location: &str, vfs: &dyn Vfs) -> Result<Self> {
        let content = vfs.read_file(location).map_err(|source| Error::Channel {
            channel: location.to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| Error::ChannelParse {
            channel: location.to_string(),
            source,
        })
    }

    pub fn recommended_kubernetes_version(&self) -> Option<&str> {
        self.recommended_kubernetes_version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Set the kubernetes version from the channel, else from the latest stable
pub fn ensure_kubernetes_version(cluster: &mut Cluster, vfs: &dyn Vfs) -> Result<()> {
    let spec = &mut cluster.spec;
    if spec.kubernetes_version.is_empty() {
        if spec.channel.is_empty() {
            log::warn!("Channel is not set; cannot determine KubernetesVersion from channel");
        } else {
            let channel = Channel::load(&spec.channel, vfs)?;
            match channel.recommended_kubernetes_version() {
                Some(version) => {
                    log::info!(
                        "Using KubernetesVersion {version:?} from channel {:?}",
                        spec.channel
                    );
                    spec.kubernetes_version = version.to_string();
                }
                None => log::warn!(
                    "Cannot determine recommended kubernetes version from channel {:?}",
                    spec.channel
                ),
            }
        }
    }

    if spec.kubernetes_version.is_empty() {
        let latest = find_latest_kubernetes_version(vfs)?;
        log::info!("Using kubernetes latest stable version: {latest}");
        spec.kubernetes_version = latest;
    }
    Ok(())
}

/// Latest stable kubernetes version, read from [`STABLE_VERSION_URL`]
pub fn find_latest_kubernetes_version(vfs: &dyn Vfs) -> Result<String> {
    log::warn!("Loading latest kubernetes version from {STABLE_VERSION_URL:?}");
    let content = vfs
        .read_file(STABLE_VERSION_URL)
        .map_err(|source| Error::LatestVersion {
            url: STABLE_VERSION_URL.to_string(),
            source,
        })?;
    Ok(content.trim().to_string())
}
