//! # cloudup
//!
//! Cluster spec defaulting and document loading.
//!
//! [`perform_assignments`] fills in every value of a [`Cluster`] that is
//! required and immutable once chosen: network and non-masquerade CIDRs,
//! the master's public name, subnet CIDRs, proxy excludes and the
//! kubernetes version. It only ever sets values that are still empty.
//!
//! ```no_run
//! use cloudup::{Cluster, VfsContext, perform_assignments};
//! # fn run(cloud: &dyn converge::Cloud) -> cloudup::Result<()> {
//! let mut cluster = Cluster::from_toml("name = \"dev.example.com\"")?;
//! perform_assignments(&mut cluster, cloud, &VfsContext::new())?;
//! assert_eq!(cluster.spec.master_public_name, "api.dev.example.com");
//! # Ok(())
//! # }
//! ```

pub mod cidr;
pub mod cluster;
pub mod defaults;
pub mod error;
pub mod vfs;

pub use cidr::{Ipv4Cidr, increment_ip};
pub use cluster::{Cluster, ClusterSpec, ClusterSubnet, EgressProxy, ProxyEndpoint, Topology, TopologyKind};
pub use defaults::{
    Channel, assign_cidrs_to_subnets, assign_proxy, ensure_kubernetes_version,
    find_latest_kubernetes_version, perform_assignments,
};
pub use error::{Error, Result};
pub use vfs::{FileVfs, HttpVfs, Vfs, VfsContext, VfsError};
