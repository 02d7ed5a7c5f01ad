use std::path::Path;

use anyhow::{Context, bail};
use tsexport_core::ExporterConfig;

pub fn init(path: &Path, project: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = ExporterConfig::for_project(project);
    config.validate()?;
    std::fs::write(path, config.to_toml_string()?)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("✓ Generated {}", path.display());
    Ok(())
}

pub fn show(path: &Path) -> anyhow::Result<()> {
    let config = ExporterConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
