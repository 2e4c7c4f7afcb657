use std::path::PathBuf;

use anyhow::{bail, Context};

use crate::settings::{default_settings_path, save_settings, Settings};

pub fn run(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(default_settings_path);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_settings(&Settings::default(), &path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}
