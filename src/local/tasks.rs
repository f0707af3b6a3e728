//! Tasks managed by the local backend: networks, subnets and DNS records

use super::{DNS_RECORD, LocalCloud, NETWORK, SUBNET};
use anyhow::{Context as _, Result, bail};
use cloudup::Ipv4Cidr;
use converge::{Context, Lifecycle, Reconcile, Renderable, Renderers, Task, default_delta_run};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of a task in the task map
pub fn task_name(kind: &str, name: &str) -> String {
    format!("{kind}/{name}")
}

fn local(ctx: &Context) -> Result<&LocalCloud> {
    ctx.cloud_as::<LocalCloud>()
        .context("local tasks can only run against the local cloud")
}

/// Schedules one renderable value with the find / diff / render cycle
#[derive(Debug)]
pub struct Managed<T> {
    kind: &'static str,
    value: T,
    dependencies: Vec<String>,
}

impl<T: Reconcile + fmt::Debug> Managed<T> {
    pub fn new(kind: &'static str, value: T) -> Self {
        Self {
            kind,
            value,
            dependencies: Vec::new(),
        }
    }

    pub fn after(mut self, task: String) -> Self {
        self.dependencies.push(task);
        self
    }
}

impl<T: Reconcile + fmt::Debug> Task for Managed<T> {
    fn name(&self) -> String {
        task_name(self.kind, &Renderable::name(&self.value))
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn run(&self, ctx: &Context) -> Result<()> {
        default_delta_run(&self.value, ctx)
    }
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub cidr: String,
    #[serde(default, skip_serializing)]
    pub lifecycle: Option<Lifecycle>,
}

impl Renderable for Network {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
        r.on::<LocalCloud, _>(|cloud, _ctx, actual, expected, changes| {
            if let Some(actual) = actual
                && !changes.cidr.is_empty()
            {
                bail!(
                    "network {}: CIDR cannot be changed from {} to {}",
                    expected.name,
                    actual.cidr,
                    expected.cidr
                );
            }
            expected.cidr.parse::<Ipv4Cidr>()?;
            cloud.write(NETWORK, &expected.name, expected)
        })?;
        Ok(())
    }
}

impl Reconcile for Network {
    fn find(&self, ctx: &Context) -> Result<Option<Self>> {
        local(ctx)?.read(NETWORK, &self.name)
    }
}

// ============================================================================
// Subnet
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,
    /// Name of the network the subnet belongs to
    pub network: String,
    pub cidr: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default, skip_serializing)]
    pub lifecycle: Option<Lifecycle>,
}

impl Renderable for Subnet {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
        r.on::<LocalCloud, _>(|cloud, _ctx, actual, expected, changes| {
            if actual.is_some() && !changes.network.is_empty() {
                bail!("subnet {}: cannot move to another network", expected.name);
            }

            let network: Network = cloud
                .read(NETWORK, &expected.network)?
                .with_context(|| {
                    format!("subnet {}: network {} does not exist", expected.name, expected.network)
                })?;
            let outer: Ipv4Cidr = network.cidr.parse()?;
            let inner: Ipv4Cidr = expected.cidr.parse()?;
            if inner.prefix() < outer.prefix() || !outer.contains(inner.network()) {
                bail!(
                    "subnet {}: CIDR {} is outside network {} ({})",
                    expected.name,
                    expected.cidr,
                    network.name,
                    network.cidr
                );
            }

            cloud.write(SUBNET, &expected.name, expected)
        })?;
        Ok(())
    }
}

impl Reconcile for Subnet {
    fn find(&self, ctx: &Context) -> Result<Option<Self>> {
        local(ctx)?.read(SUBNET, &self.name)
    }
}

// ============================================================================
// DNS record
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    #[serde(default = "default_record_type")]
    pub record_type: String,
    pub value: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default, skip_serializing)]
    pub lifecycle: Option<Lifecycle>,
}

fn default_record_type() -> String {
    "A".to_string()
}

fn default_ttl() -> u32 {
    300
}

impl Renderable for DnsRecord {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn lifecycle(&self) -> Option<Lifecycle> {
        self.lifecycle
    }

    fn renderers(r: &mut Renderers<Self>) -> converge::Result<()> {
        r.on::<LocalCloud, _>(|cloud, _ctx, _actual, expected, _changes| {
            cloud.write(DNS_RECORD, &expected.name, expected)
        })?;
        Ok(())
    }
}

impl Reconcile for DnsRecord {
    fn find(&self, ctx: &Context) -> Result<Option<Self>> {
        local(ctx)?.read(DNS_RECORD, &self.name)
    }
}
