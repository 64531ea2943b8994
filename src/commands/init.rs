use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::{self, API_KEY_ENV, Config, DEFAULT_TRIGGER_WORD};
use crate::error::ExitError;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Magic word that hands a contact over to staff
    #[arg(long)]
    pub trigger_word: Option<String>,
    /// Staff group chat id for notices (e.g. 120363000000000000@g.us)
    #[arg(long)]
    pub staff_group: Option<String>,
    /// Instructions placed before the conversation transcript in every prompt
    #[arg(long)]
    pub prompt: Option<String>,
    /// Gemini model name
    #[arg(long)]
    pub model: Option<String>,
    /// Bridge program to spawn
    #[arg(long)]
    pub bridge_command: Option<String>,
    /// Non-interactive mode
    #[arg(long)]
    pub no_interactive: bool,
    /// Force overwrite existing config
    #[arg(long)]
    pub force: bool,
    /// Directory to write concierge.toml into (default: current directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

/// Collected user choices for init
#[derive(Debug)]
struct InitChoices {
    trigger_word: String,
    staff_group: Option<String>,
    prompt: Option<String>,
    model: Option<String>,
    bridge_command: Option<String>,
}

impl InitArgs {
    pub fn execute(&self) -> Result<()> {
        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        let config_path = dir.join(config::CONFIG_TOML);
        if config_path.exists() && !self.force {
            return Err(ExitError::Config(format!(
                "{} already exists; use --force to overwrite",
                config_path.display()
            ))
            .into());
        }

        let interactive = !self.no_interactive && std::io::stdin().is_terminal();
        let choices = self.gather_choices(interactive)?;
        let config = build_config(&choices);

        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        fs::write(&config_path, config.to_toml()?)
            .with_context(|| format!("writing {}", config_path.display()))?;
        println!("Generated {}", config_path.display());

        if config.api_key().is_none() {
            println!("Set {API_KEY_ENV} (or llm.api_key) before running `concierge run`.");
        }
        println!("Done.");
        Ok(())
    }

    fn gather_choices(&self, interactive: bool) -> Result<InitChoices> {
        let trigger_word = match &self.trigger_word {
            Some(word) => word.clone(),
            None if interactive => prompt_input("Trigger word for handing a contact to staff", Some(DEFAULT_TRIGGER_WORD))?,
            None => DEFAULT_TRIGGER_WORD.to_string(),
        };
        validate_trigger_word(&trigger_word)?;

        let staff_group = match &self.staff_group {
            Some(group) => Some(group.clone()),
            None if interactive => {
                let group = prompt_input("Staff group id (leave empty to skip notices)", Some(""))?;
                Some(group).filter(|g| !g.trim().is_empty())
            }
            None => None,
        };
        if let Some(group) = &staff_group {
            validate_chat_id(group)?;
        }

        let prompt = match &self.prompt {
            Some(prompt) => Some(prompt.clone()),
            None if interactive => {
                let prompt = prompt_input("Instructions for the assistant (optional)", Some(""))?;
                Some(prompt).filter(|p| !p.trim().is_empty())
            }
            None => None,
        };

        let bridge_command = match &self.bridge_command {
            Some(cmd) => Some(cmd.clone()),
            None if interactive => {
                let default = Config::default().bridge.command;
                let cmd = prompt_input("Bridge command", Some(&default))?;
                Some(cmd).filter(|c| *c != default)
            }
            None => None,
        };

        Ok(InitChoices {
            trigger_word,
            staff_group,
            prompt,
            model: self.model.clone(),
            bridge_command,
        })
    }
}

// --- Interactive prompts using dialoguer ---

fn prompt_input(prompt: &str, default: Option<&str>) -> Result<String> {
    let mut builder = dialoguer::Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true);
    if let Some(d) = default {
        builder = builder.default(d.to_string()).show_default(!d.is_empty());
    }
    builder.interact_text().context("reading user input")
}

// --- Validation ---

fn validate_trigger_word(word: &str) -> Result<()> {
    let trimmed = word.trim();
    if trimmed.is_empty() {
        anyhow::bail!("trigger word must not be blank");
    }
    if trimmed.chars().count() > 64 {
        anyhow::bail!("trigger word must be at most 64 characters");
    }
    Ok(())
}

fn validate_chat_id(id: &str) -> Result<()> {
    match id.split_once('@') {
        Some((user, server)) if !user.is_empty() && !server.is_empty() && !id.contains(char::is_whitespace) => Ok(()),
        _ => anyhow::bail!("chat id must look like <number>@<server>, got {id:?}"),
    }
}

fn build_config(choices: &InitChoices) -> Config {
    let mut config = Config::default();
    config.responder.trigger_word = choices.trigger_word.trim().to_string();
    config.responder.prompt_preamble.clone_from(&choices.prompt);
    config.staff.group.clone_from(&choices.staff_group);
    if let Some(model) = &choices.model {
        config.llm.model.clone_from(model);
    }
    if let Some(cmd) = &choices.bridge_command {
        config.bridge.command.clone_from(cmd);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices() -> InitChoices {
        InitChoices {
            trigger_word: " HUMANO ".to_string(),
            staff_group: Some("120363415263350673@g.us".to_string()),
            prompt: Some("You answer for a bakery.".to_string()),
            model: Some("gemini-2.5-flash".to_string()),
            bridge_command: None,
        }
    }

    #[test]
    fn build_config_applies_choices() {
        let config = build_config(&choices());
        assert_eq!(config.responder.trigger_word, "HUMANO");
        assert_eq!(config.staff.group.as_deref(), Some("120363415263350673@g.us"));
        assert_eq!(config.responder.prompt_preamble.as_deref(), Some("You answer for a bakery."));
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.bridge.command, Config::default().bridge.command);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn generated_toml_round_trips() {
        let config = build_config(&choices());
        let toml = config.to_toml().unwrap();
        assert!(toml.starts_with("# concierge configuration"));
        let parsed = Config::parse_toml(&toml).unwrap();
        assert_eq!(parsed.responder.trigger_word, "HUMANO");
        assert_eq!(parsed.timing, config.timing);
    }

    #[test]
    fn non_interactive_defaults() {
        let args = InitArgs {
            trigger_word: None,
            staff_group: None,
            prompt: None,
            model: None,
            bridge_command: None,
            no_interactive: true,
            force: false,
            dir: None,
        };
        let choices = args.gather_choices(false).unwrap();
        assert_eq!(choices.trigger_word, DEFAULT_TRIGGER_WORD);
        assert!(choices.staff_group.is_none());
        assert!(choices.prompt.is_none());
    }

    #[test]
    fn trigger_word_validation() {
        assert!(validate_trigger_word("MINGAU").is_ok());
        assert!(validate_trigger_word("talk to a human").is_ok());
        assert!(validate_trigger_word("   ").is_err());
        assert!(validate_trigger_word(&"x".repeat(65)).is_err());
    }

    #[test]
    fn chat_id_validation() {
        assert!(validate_chat_id("120363415263350673@g.us").is_ok());
        assert!(validate_chat_id("no-server").is_err());
        assert!(validate_chat_id("@g.us").is_err());
        assert!(validate_chat_id("12 3@g.us").is_err());
    }
}
