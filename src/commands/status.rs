use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use clap::Args;
use serde::{Deserialize, Serialize};

use super::doctor::OutputFormat;
use crate::conversation::context::{CONTEXT_FILE, ConversationWindow};
use crate::conversation::store::{BLOCKLIST_FILE, USERS_FILE, load_existing};
use crate::error::ExitError;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Directory holding blocklist.json, users.json and context.json
    #[arg(long, default_value = ".")]
    pub state_dir: PathBuf,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusReport {
    pub state_dir: String,
    /// Contacts handed to staff for good.
    pub escalated: usize,
    /// Contacts that have had at least one reply.
    pub known: usize,
    pub windows: WindowSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WindowSummary {
    pub live: usize,
    /// Past their 24 h lifetime but not yet swept.
    pub stale: usize,
}

impl StatusArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let format = OutputFormat::or_detect(self.format);
        let report = self.collect()?;

        match format {
            OutputFormat::Pretty => Self::print_pretty(&report),
            OutputFormat::Text => Self::print_text(&report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        Ok(())
    }

    /// Read-only: absent files count as empty and are not created.
    fn collect(&self) -> Result<StatusReport, ExitError> {
        let dir = &self.state_dir;
        let blocked: Vec<String> = load_existing(&dir.join(BLOCKLIST_FILE))?.unwrap_or_default();
        let known: Vec<String> = load_existing(&dir.join(USERS_FILE))?.unwrap_or_default();
        let windows: BTreeMap<String, ConversationWindow> =
            load_existing(&dir.join(CONTEXT_FILE))?.unwrap_or_default();

        let now = Utc::now().timestamp_millis();
        let live = windows.values().filter(|w| !w.is_expired(now)).count();

        Ok(StatusReport {
            state_dir: dir.display().to_string(),
            escalated: blocked.len(),
            known: known.len(),
            windows: WindowSummary {
                live,
                stale: windows.len() - live,
            },
        })
    }

    fn print_pretty(report: &StatusReport) {
        println!("=== Concierge Status ===\n");
        println!("State:     {}", report.state_dir);
        println!("Escalated: {}", report.escalated);
        println!("Known:     {}", report.known);
        println!(
            "Windows:   {} live ({} awaiting sweep)",
            report.windows.live, report.windows.stale
        );
    }

    fn print_text(report: &StatusReport) {
        println!("concierge-status  state={}", report.state_dir);
        println!("contacts  escalated={}  known={}", report.escalated, report.known);
        println!("windows  live={}  stale={}", report.windows.live, report.windows.stale);
    }
}
