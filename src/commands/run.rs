use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::resolve_config;
use crate::clock::SystemClock;
use crate::config::ConfigSource;
use crate::conversation::{ContextWindows, Responder, Store};
use crate::error::ExitError;
use crate::llm::GeminiClient;
use crate::supervisor;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Config file (default: concierge.toml or concierge.json here, then ~/.config/concierge/)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory holding blocklist.json, users.json and context.json
    #[arg(long, default_value = ".")]
    pub state_dir: PathBuf,
}

impl RunArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let source = ConfigSource::open(resolve_config(self.config.as_deref())?)?;
        match source.path() {
            Some(path) => tracing::info!(config = %path.display(), "loaded config"),
            None => tracing::info!("no config file found, using defaults"),
        }

        let config = source.current();
        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!("no API key configured; every reply will be the fallback text");
        }
        if config.staff.group.is_none() {
            tracing::info!("no staff group configured, staff notices are disabled");
        }

        fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("creating state directory {}", self.state_dir.display()))?;
        let store = Store::open(&self.state_dir).map_err(ExitError::from)?;
        let windows = ContextWindows::open(&self.state_dir).map_err(ExitError::from)?;
        tracing::info!(
            escalated = store.blocked().len(),
            known = store.known().len(),
            windows = windows.len(),
            "state loaded"
        );

        let model = GeminiClient::new(&config.llm, api_key);
        let responder = Responder::new(
            store,
            windows,
            Box::new(model),
            SystemClock,
            Box::new(StdRng::from_os_rng()),
        );
        supervisor::run(source, responder)
    }
}
