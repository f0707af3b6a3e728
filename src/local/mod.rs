//! Local state backend
//!
//! Objects live as pretty JSON files under the state directory, one
//! directory per kind: `<root>/<kind>/<name>.json`. The same handle is the
//! run's [`Cloud`] (lookups) and, for real applies, its [`Backend`].

pub mod tasks;

use anyhow::{Context, Result};
use converge::{Backend, Cloud, SubnetInfo, VpcInfo};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io;
use std::path::PathBuf;

pub use tasks::{DnsRecord, Managed, Network, Subnet};

pub const NETWORK: &str = "network";
pub const SUBNET: &str = "subnet";
pub const DNS_RECORD: &str = "dns_record";

pub struct LocalCloud {
    root: PathBuf,
}

impl LocalCloud {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, kind: &str, name: &str) -> PathBuf {
        // Names may contain path separators; keep every object one level deep
        let file = name.replace(['/', '\\'], "_");
        self.root.join(kind).join(format!("{file}.json"))
    }

    /// Read one object, `None` if it was never written
    pub fn read<T: DeserializeOwned>(&self, kind: &str, name: &str) -> Result<Option<T>> {
        let path = self.path(kind, name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Could not read {}", path.display()));
            }
        };
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid {kind} object in {}", path.display()))?;
        Ok(Some(value))
    }

    pub fn write<T: Serialize>(&self, kind: &str, name: &str, value: &T) -> Result<()> {
        let path = self.path(kind, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&path, content + "\n")
            .with_context(|| format!("Could not write {}", path.display()))?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    /// Every object of a kind, sorted by file name
    pub fn list<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<T>> {
        let dir = self.root.join(kind);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Could not list {}", dir.display())),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Could not read {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid {kind} object in {}", path.display()))
            })
            .collect()
    }
}

impl Cloud for LocalCloud {
    fn provider_id(&self) -> &str {
        "local"
    }

    fn find_vpc_info(&self, network_id: &str) -> Result<Option<VpcInfo>> {
        let Some(network) = self.read::<Network>(NETWORK, network_id)? else {
            return Ok(None);
        };

        let subnets = self
            .list::<Subnet>(SUBNET)?
            .into_iter()
            .filter(|s| s.network == network.name)
            .map(|s| SubnetInfo {
                id: s.name,
                zone: s.zone,
                cidr: s.cidr,
            })
            .collect();

        Ok(Some(VpcInfo {
            id: network.name,
            cidr: network.cidr,
            subnets,
        }))
    }
}

impl Backend for LocalCloud {
    fn kind(&self) -> &'static str {
        "local"
    }
}
