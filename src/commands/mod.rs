pub mod doctor;
pub mod init;
pub mod run;
pub mod schema;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config;
use crate::error::ExitError;

/// An explicit `--config` must exist. Without one, look in the working
/// directory and then the per-user config directory; `None` means defaults.
pub(crate) fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ExitError::Config(format!("{} does not exist", path.display())).into());
        }
        return Ok(Some(path.to_path_buf()));
    }
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    Ok(config::discover_config(&cwd))
}
