//! Collaborator handles passed through the context to tasks
//!
//! The engine never calls these itself. They exist so tasks (and the
//! defaulting logic) can reach the cloud, the keystore, the secret store and
//! DNS through one shared context. Implementations do their own locking.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Information about an existing network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcInfo {
    pub id: String,
    pub cidr: String,
    #[serde(default)]
    pub subnets: Vec<SubnetInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetInfo {
    pub id: String,
    pub zone: String,
    pub cidr: String,
}

/// Cloud provider handle
pub trait Cloud: Any + Send + Sync {
    /// Provider identifier (e.g., "aws", "gce", "local")
    fn provider_id(&self) -> &str;

    /// Look up a network by id
    fn find_vpc_info(&self, network_id: &str) -> Result<Option<VpcInfo>>;
}

/// A named certificate/key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keypair {
    pub name: String,
    pub certificate: String,
}

/// Certificate and key storage
pub trait Keystore: Any + Send + Sync {
    fn find_keypair(&self, name: &str) -> Result<Option<Keypair>>;
}

/// An opaque secret value
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({} bytes)", self.data.len())
    }
}

/// Secret storage
pub trait SecretStore: Any + Send + Sync {
    fn find_secret(&self, name: &str) -> Result<Option<Secret>>;
}

/// DNS provider handle
pub trait DnsProvider: Any + Send + Sync {
    /// Hosted zones visible to this provider
    fn zones(&self) -> Result<Vec<String>>;
}

/// Keystore with no entries
pub struct NoKeystore;

impl Keystore for NoKeystore {
    fn find_keypair(&self, _name: &str) -> Result<Option<Keypair>> {
        Ok(None)
    }
}

/// Secret store with no entries
pub struct NoSecrets;

impl SecretStore for NoSecrets {
    fn find_secret(&self, _name: &str) -> Result<Option<Secret>> {
        Ok(None)
    }
}
