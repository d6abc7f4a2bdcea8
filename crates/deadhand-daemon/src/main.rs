//! Deadhand daemon.
//!
//! Monitors guardian heartbeats, evaluates the switch countdown and runs
//! dry-run release simulations. Every other command edits the switch stored
//! in the data directory and exits.

mod clock;
mod commands;
mod config;
mod events;
mod relay_dir;
mod store;

use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, Context};
use crate::config::DaemonConfig;

#[derive(Debug, Parser)]
#[command(name = "deadhand", version)]
#[command(about = "Dead man's switch: guardian monitoring, dry runs and release", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log at debug level regardless of the configured level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = DaemonConfig::load()?;
    init_tracing(&config, cli.verbose)?;

    std::fs::create_dir_all(config.data_dir())?;
    let ctx = Context::new(config);
    commands::dispatch(cli.command, &ctx).await
}

fn init_tracing(config: &DaemonConfig, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { config.advanced.log_level.as_str() };
    let filter = EnvFilter::from_default_env().add_directive(format!("deadhand={level}").parse()?);

    if config.advanced.log_file.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.advanced.log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::CommandFactory;

    use super::*;

    fn parse(line: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("deadhand").chain(line.split_whitespace()))
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse("run").expect("parse").command, Command::Run);
        assert_eq!(parse("check-in").expect("parse").command, Command::CheckIn);
        assert_eq!(parse("vacation-off").expect("parse").command, Command::VacationOff);
        assert_eq!(
            parse("vacation +48h").expect("parse").command,
            Command::Vacation { until: "+48h".into() }
        );
        assert_eq!(
            parse("heartbeat key.hex /srv/a /srv/b").expect("parse").command,
            Command::Heartbeat {
                key_file: PathBuf::from("key.hex"),
                relays: vec!["/srv/a".into(), "/srv/b".into()],
            }
        );
        assert_eq!(
            parse("open-share sealed.json enc.key").expect("parse").command,
            Command::OpenShare {
                sealed: PathBuf::from("sealed.json"),
                secret_file: PathBuf::from("enc.key"),
            }
        );
        assert_eq!(
            parse("release a.json b.json").expect("parse").command,
            Command::Release {
                shares: vec![PathBuf::from("a.json"), PathBuf::from("b.json")],
            }
        );
        assert_eq!(
            parse("keygen keys/alice --name alice").expect("parse").command,
            Command::Keygen {
                out: PathBuf::from("keys/alice"),
                name: "alice".into(),
            }
        );

        let cli = parse("status -v").expect("parse");
        assert!(cli.verbose);
        assert_eq!(cli.command, Command::Status);
    }

    #[test]
    fn test_parse_rejects_bad_arity() {
        for line in ["", "vacation", "release", "run now", "explode", "open-share only-one"] {
            assert!(parse(line).is_err(), "{line:?} should not parse");
        }
        assert_eq!(
            parse("--help").expect_err("help").kind(),
            clap::error::ErrorKind::DisplayHelp
        );
    }
}
