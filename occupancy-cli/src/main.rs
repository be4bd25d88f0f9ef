use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod hvac_cmd;
mod outbox;
mod rules_cmd;
mod spec_syntax;
mod state;

use hvac_cmd::{ProfileCommand, ZoneCommand};
use rules_cmd::{RuleCommand, SiteCommand};

#[derive(Parser, Debug)]
#[command(
    name = "occupancy",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("OCCUPANCY_BUILD_SHA"), ")"),
    about = "Operating schedules and HVAC setpoints for multi-site facilities"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage ~/.occupancy/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Sites and their base weekly hours
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },

    /// Exception rules: holidays, closures, special hours
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },

    /// List resolved occurrences for a site
    Occurrences {
        #[arg(long)]
        site: String,

        /// YYYY-MM-DD (default: Jan 1 of this year)
        #[arg(long)]
        from: Option<String>,

        /// YYYY-MM-DD (default: Dec 31 of next year)
        #[arg(long)]
        to: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Occupied or unoccupied, now or at --at
    Phase {
        #[arg(long)]
        site: String,

        /// RFC 3339 instant, e.g. 2024-03-01T05:30:00Z
        #[arg(long)]
        at: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Setpoint profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },

    /// HVAC zones
    Zone {
        #[command(subcommand)]
        command: ZoneCommand,
    },

    /// Effective setpoints of a zone
    Setpoints {
        #[arg(long)]
        zone: String,

        /// occupied | unoccupied
        #[arg(long)]
        phase: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Push a profile's setpoints to every linked zone
    PushProfile {
        #[arg(long)]
        profile: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show the most recent pushed setpoints
    Outbox {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config if none exists
    Init,

    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },
        Command::Site { command } => rules_cmd::run_site(command)?,
        Command::Rule { command } => rules_cmd::run_rule(command)?,
        Command::Occurrences { site, from, to, json } => rules_cmd::occurrences(&site, from, to, json)?,
        Command::Phase { site, at, json } => rules_cmd::phase(&site, at, json)?,
        Command::Profile { command } => hvac_cmd::run_profile(command)?,
        Command::Zone { command } => hvac_cmd::run_zone(command)?,
        Command::Setpoints { zone, phase, json } => hvac_cmd::setpoints(&zone, phase, json)?,
        Command::PushProfile { profile, json } => hvac_cmd::push_profile(&profile, json).await?,
        Command::Outbox { limit } => hvac_cmd::show_outbox(limit)?,
    }

    Ok(())
}

/// RUST_LOG wins; otherwise the config's log_level. Logs go to stderr.
fn init_logging() {
    let fallback = config::load_config()
        .map(|c| c.output.log_level)
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
