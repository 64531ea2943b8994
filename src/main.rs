use std::process::ExitCode;

use clap::{Parser, Subcommand};

use concierge::commands::doctor::DoctorArgs;
use concierge::commands::init::InitArgs;
use concierge::commands::run::RunArgs;
use concierge::commands::schema::SchemaArgs;
use concierge::commands::status::StatusArgs;
use concierge::{error, telemetry};

#[derive(Debug, Parser)]
#[command(
    name = "concierge",
    version,
    about = "Humanized auto-responder that answers a messaging account with Gemini"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Supervise the bridge and answer incoming messages
    Run(RunArgs),
    /// Write a concierge.toml
    Init(InitArgs),
    /// Validate config, state files, and the bridge command
    Doctor(DoctorArgs),
    /// Show escalated and known contacts and live conversation windows
    Status(StatusArgs),
    /// Print the JSON Schema for concierge.toml
    Schema(SchemaArgs),
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Run(_) => "run",
            Self::Init(_) => "init",
            Self::Doctor(_) => "doctor",
            Self::Status(_) => "status",
            Self::Schema(_) => "schema",
        }
    }
}

fn main() -> ExitCode {
    let _telemetry = telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Run(args) => args.execute(),
        Commands::Init(args) => args.execute(),
        Commands::Doctor(args) => args.execute(),
        Commands::Status(args) => args.execute(),
        Commands::Schema(args) => args.execute(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<error::ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
