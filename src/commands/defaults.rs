//! `defaults` - complete a cluster spec with its defaulted values

use anyhow::{Context as _, Result};
use cloudup::{Cluster, VfsContext, perform_assignments};
use std::fs;
use std::path::Path;

use crate::Context;
use crate::cli::DefaultsArgs;
use crate::local::LocalCloud;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, args: DefaultsArgs) -> Result<()> {
    let cloud = LocalCloud::new(paths::state_dir(ctx.state_dir.as_deref()));
    let vfs = if args.offline {
        VfsContext::offline()
    } else {
        VfsContext::new()
    };

    let rendered = complete(&args.cluster, &cloud, &vfs)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("Could not write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!("Wrote {}", path.display()));
            }
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

/// Load the cluster at `path`, assign its defaults and render it as TOML
pub fn complete(path: &Path, cloud: &LocalCloud, vfs: &VfsContext) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read cluster spec {}", path.display()))?;
    let mut cluster = Cluster::from_toml(&content)
        .with_context(|| format!("Invalid cluster spec {}", path.display()))?;

    perform_assignments(&mut cluster, cloud, vfs)
        .with_context(|| format!("Could not assign defaults for cluster {}", cluster.name))?;
    log::debug!("Assigned defaults for cluster {}", cluster.name);

    toml::to_string_pretty(&cluster).context("Could not serialize cluster spec")
}
