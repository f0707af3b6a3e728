//! Cluster spec - the document defaulting fills in

use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub spec: ClusterSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSpec {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cloud_provider: String,
    /// Id of an existing network to share; empty means a dedicated one
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network_cidr: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub non_masquerade_cidr: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub master_public_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster_dns_domain: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kubernetes_version: String,
    /// Location of the channel document
    #[serde(skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<Topology>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub egress_proxy: Option<EgressProxy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<ClusterSubnet>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyKind {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub masters: TopologyKind,
    pub nodes: TopologyKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EgressProxy {
    /// Comma-separated hosts and CIDRs that bypass the proxy
    pub proxy_excludes: String,
    pub http_proxy: ProxyEndpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSubnet {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub zone: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cidr: String,
    /// Id of an existing subnet in a shared network
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
}

impl Cluster {
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Whether the cluster lives in an existing network
    pub fn shared_vpc(&self) -> bool {
        !self.spec.network_id.is_empty()
    }
}
