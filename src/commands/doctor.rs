use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::{Deserialize, Serialize};

use super::resolve_config;
use crate::config::Config;
use crate::conversation::context::{CONTEXT_FILE, ConversationWindow};
use crate::conversation::store::{BLOCKLIST_FILE, USERS_FILE, load_existing};
use crate::error::{ExitError, StoreError};
use crate::subprocess::locate;

#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Config file (default: concierge.toml or concierge.json here, then ~/.config/concierge/)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory holding blocklist.json, users.json and context.json
    #[arg(long, default_value = ".")]
    pub state_dir: PathBuf,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

impl OutputFormat {
    /// Pretty on a terminal, text when piped.
    pub fn or_detect(format: Option<Self>) -> Self {
        format.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                Self::Pretty
            } else {
                Self::Text
            }
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoctorReport {
    pub config: ConfigStatus,
    pub bridge: BridgeStatus,
    pub state_files: Vec<FileStatus>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advice: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigStatus {
    /// `None` when running on defaults.
    pub path: Option<String>,
    pub valid: bool,
    pub trigger_word: String,
    pub model: String,
    pub api_key: bool,
    pub staff_group: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub command: String,
    pub resolved: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: String,
    pub exists: bool,
    pub valid: bool,
}

fn check_state_file<T: serde::de::DeserializeOwned>(dir: &Path, name: &str, issues: &mut Vec<String>) -> FileStatus {
    let path = dir.join(name);
    let (exists, valid) = match load_existing::<T>(&path) {
        Ok(Some(_)) => (true, true),
        Ok(None) => (false, true),
        Err(e @ (StoreError::Malformed { .. } | StoreError::Read { .. })) => {
            issues.push(e.to_string());
            (true, false)
        }
        Err(e) => {
            issues.push(e.to_string());
            (path.exists(), false)
        }
    };
    FileStatus {
        path: path.display().to_string(),
        exists,
        valid,
    }
}

impl DoctorArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let format = OutputFormat::or_detect(self.format);
        let report = self.diagnose()?;
        let issue_count = report.issues.len();

        match format {
            OutputFormat::Pretty => Self::print_pretty(&report),
            OutputFormat::Text => Self::print_text(&report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }

        if issue_count > 0 {
            return Err(ExitError::Other(format!("{issue_count} issue(s) found")).into());
        }
        Ok(())
    }

    fn diagnose(&self) -> anyhow::Result<DoctorReport> {
        let mut issues = Vec::new();
        let mut advice = Vec::new();

        let path = resolve_config(self.config.as_deref())?;
        let (config, valid) = match &path {
            Some(p) => match Config::load(p) {
                Ok(config) => (config, true),
                Err(e) => {
                    issues.push(format!("{e:#}"));
                    (Config::default(), false)
                }
            },
            None => {
                advice.push("no config file found; run `concierge init` to create one".to_string());
                (Config::default(), true)
            }
        };

        if config.responder.trigger_word.trim().is_empty() {
            advice.push(format!(
                "responder.trigger_word is blank, using {}",
                config.trigger_word()
            ));
        }
        let api_key = config.api_key().is_some();
        if !api_key {
            issues.push("no API key: set llm.api_key or GEMINI_API_KEY".to_string());
        }
        if config.staff.group.is_none() {
            advice.push("staff.group is not set; staff notices will be skipped".to_string());
        }

        let resolved = locate(&config.bridge.command);
        if resolved.is_none() {
            issues.push(format!("bridge command not found: {}", config.bridge.command));
        }

        let state_files = vec![
            check_state_file::<Vec<String>>(&self.state_dir, BLOCKLIST_FILE, &mut issues),
            check_state_file::<Vec<String>>(&self.state_dir, USERS_FILE, &mut issues),
            check_state_file::<BTreeMap<String, ConversationWindow>>(&self.state_dir, CONTEXT_FILE, &mut issues),
        ];

        Ok(DoctorReport {
            config: ConfigStatus {
                path: path.map(|p| p.display().to_string()),
                valid,
                trigger_word: config.trigger_word().to_string(),
                model: config.llm.model.clone(),
                api_key,
                staff_group: config.staff.group.clone(),
            },
            bridge: BridgeStatus {
                command: config.bridge.command.clone(),
                resolved: resolved.map(|p| p.display().to_string()),
            },
            state_files,
            issues,
            advice: (!advice.is_empty()).then_some(advice),
        })
    }

    fn print_pretty(report: &DoctorReport) {
        println!("=== Concierge Doctor ===\n");
        println!("Config:  {}", report.config.path.as_deref().unwrap_or("(defaults)"));
        println!("Trigger: {}", report.config.trigger_word);
        println!("Model:   {}", report.config.model);
        println!("API key: {}", if report.config.api_key { "set" } else { "missing" });
        println!("Staff:   {}", report.config.staff_group.as_deref().unwrap_or("(none)"));
        println!();

        match &report.bridge.resolved {
            Some(path) => println!("Bridge:  ✓ {} ({path})", report.bridge.command),
            None => println!("Bridge:  ✗ {}: NOT FOUND", report.bridge.command),
        }

        println!("\nState Files:");
        for file in &report.state_files {
            let mark = match (file.exists, file.valid) {
                (_, false) => "✗",
                (true, true) => "✓",
                (false, true) => "-",
            };
            println!("  {mark} {}", file.path);
        }

        if let Some(advice) = &report.advice {
            println!("\nAdvice:");
            for line in advice {
                println!("  • {line}");
            }
        }

        if report.issues.is_empty() {
            println!("\n✓ No issues found");
        } else {
            println!("\nIssues ({}):", report.issues.len());
            for issue in &report.issues {
                println!("  • {issue}");
            }
        }
    }

    fn print_text(report: &DoctorReport) {
        println!(
            "concierge-doctor  config={}  trigger={}  model={}  api_key={}",
            report.config.path.as_deref().unwrap_or("defaults"),
            report.config.trigger_word,
            report.config.model,
            report.config.api_key
        );
        println!(
            "bridge  {}  {}",
            report.bridge.command,
            report.bridge.resolved.as_deref().unwrap_or("missing")
        );
        for file in &report.state_files {
            let status = match (file.exists, file.valid) {
                (_, false) => "malformed",
                (true, true) => "ok",
                (false, true) => "absent",
            };
            println!("state  {}  {status}", file.path);
        }
        if !report.issues.is_empty() {
            println!("issues  count={}", report.issues.len());
            for issue in &report.issues {
                println!("issue  {issue}");
            }
        }
    }
}
