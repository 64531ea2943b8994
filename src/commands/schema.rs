use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use schemars::schema_for;

use crate::config::Config;

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Write the schema to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl SchemaArgs {
    /// JSON Schema for `concierge.toml`, usable by editors for completion.
    pub fn execute(&self) -> anyhow::Result<()> {
        let schema = schema_for!(Config);
        let json = serde_json::to_string_pretty(&schema)?;
        match &self.output {
            Some(path) => std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("writing {}", path.display()))?,
            None => println!("{json}"),
        }
        Ok(())
    }
}
