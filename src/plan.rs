//! Plan files - the declared objects of one apply, in TOML
//!
//! ```toml
//! [[network]]
//! name = "main"
//! cidr = "10.0.0.0/16"
//!
//! [[subnet]]
//! name = "a"
//! network = "main"
//! cidr = "10.0.1.0/24"
//!
//! [[dns_record]]
//! name = "api.example.com"
//! value = "10.0.1.10"
//! lifecycle = "ExistsAndWarnIfChanges"
//! ```

use crate::local::tasks::task_name;
use crate::local::{DNS_RECORD, DnsRecord, Managed, NETWORK, Network, SUBNET, Subnet};
use anyhow::{Context, Result, bail};
use converge::{Task, TaskMap};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    #[serde(default)]
    pub network: Vec<Network>,
    #[serde(default)]
    pub subnet: Vec<Subnet>,
    #[serde(default)]
    pub dns_record: Vec<DnsRecord>,
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read plan {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid plan {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn is_empty(&self) -> bool {
        self.network.is_empty() && self.subnet.is_empty() && self.dns_record.is_empty()
    }

    /// One task per declared object
    ///
    /// Subnets depend on their network when the plan declares it; a network
    /// that is not declared must already exist when the subnet renders.
    pub fn tasks(self) -> Result<TaskMap> {
        let networks: HashSet<String> = self.network.iter().map(|n| n.name.clone()).collect();
        let mut tasks: Vec<Arc<dyn Task>> = Vec::new();

        for network in self.network {
            tasks.push(Arc::new(Managed::new(NETWORK, network)));
        }
        for subnet in self.subnet {
            let task = if networks.contains(&subnet.network) {
                let dependency = task_name(NETWORK, &subnet.network);
                Managed::new(SUBNET, subnet).after(dependency)
            } else {
                Managed::new(SUBNET, subnet)
            };
            tasks.push(Arc::new(task));
        }
        for record in self.dns_record {
            tasks.push(Arc::new(Managed::new(DNS_RECORD, record)));
        }

        let mut map = TaskMap::new();
        for task in tasks {
            let name = task.name();
            if map.insert(name.clone(), task).is_some() {
                bail!("{name} is declared more than once");
            }
        }
        Ok(map)
    }
}
