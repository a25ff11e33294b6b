pub mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Package update daemon - background registry version checker
#[derive(Parser, Debug)]
#[command(
    name = "pud",
    version,
    about = "Package update daemon - background registry version checker"
)]
pub struct Cli {
    /// Data directory path (pid file, daemon state, log)
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the update daemon in this process
    Daemon {
        /// Seconds between the end of one poll cycle and the next (overrides config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,

        /// Terminate a live daemon instead of standing down
        #[arg(long)]
        kill_existing: bool,

        /// Path to configuration file
        #[arg(short = 'c', long = "config")]
        config: Option<PathBuf>,
    },

    /// Show the daemon's pid record and last observed versions
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stop a running daemon
    Stop,

    /// Track a package so the next poll cycle checks it
    Track {
        /// Package name, e.g. `@scope/name`
        package: String,

        /// Dist tag to watch
        #[arg(long, default_value = "latest")]
        tag: String,
    },
}

/// Dispatch the CLI command to the appropriate handler. Returns the process
/// exit code.
pub async fn dispatch(cli: &Cli) -> anyhow::Result<i32> {
    let data_dir = cli.data_dir.as_deref();
    match &cli.command {
        Some(Commands::Daemon {
            interval,
            kill_existing,
            config,
        }) => {
            daemon::cmd_daemon(
                config.clone(),
                data_dir,
                *interval,
                *kill_existing,
                cli.verbose,
            )
            .await
        }
        Some(Commands::Status { json }) => daemon::cmd_status(data_dir, *json).await,
        Some(Commands::Stop) => daemon::cmd_stop(data_dir).await,
        Some(Commands::Track { package, tag }) => daemon::cmd_track(data_dir, package, tag).await,
        None => {
            // No subcommand provided -- print help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(0)
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_version_flag() {
        let result = Cli::try_parse_from(["pud", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        let output = err.to_string();
        assert!(
            output.contains("0.1.0"),
            "Expected version 0.1.0 in output: {}",
            output
        );
    }

    #[test]
    fn test_cli_daemon_all_flags() {
        let cli = Cli::try_parse_from([
            "pud",
            "daemon",
            "--interval",
            "60",
            "--kill-existing",
            "--config",
            "/etc/pud/config.json",
            "--data-dir",
            "/var/pud",
        ])
        .expect("Should parse daemon with all flags");

        assert_eq!(cli.data_dir, Some(PathBuf::from("/var/pud")));
        match &cli.command {
            Some(Commands::Daemon {
                interval,
                kill_existing,
                config,
            }) => {
                assert_eq!(*interval, Some(60));
                assert!(kill_existing);
                assert_eq!(config.as_deref(), Some(std::path::Path::new("/etc/pud/config.json")));
            }
            other => panic!("Expected Daemon command, got: {:?}", other),
        }
    }

    #[test]
    fn test_cli_daemon_defaults() {
        let cli = Cli::try_parse_from(["pud", "daemon"]).expect("Should parse daemon");
        match &cli.command {
            Some(Commands::Daemon {
                interval,
                kill_existing,
                config,
            }) => {
                assert!(interval.is_none());
                assert!(!kill_existing);
                assert!(config.is_none());
            }
            other => panic!("Expected Daemon command, got: {:?}", other),
        }
    }

    #[test]
    fn test_cli_daemon_zero_interval_rejected() {
        let result = Cli::try_parse_from(["pud", "daemon", "--interval", "0"]);
        assert!(result.is_err(), "interval must be at least one second");
    }

    #[test]
    fn test_cli_status_json_flag() {
        let cli = Cli::try_parse_from(["pud", "status", "--json"]).expect("Should parse status");
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));
    }

    #[test]
    fn test_cli_track_default_tag() {
        let cli = Cli::try_parse_from(["pud", "track", "@scope/cli"]).expect("Should parse track");
        match &cli.command {
            Some(Commands::Track { package, tag }) => {
                assert_eq!(package, "@scope/cli");
                assert_eq!(tag, "latest");
            }
            other => panic!("Expected Track command, got: {:?}", other),
        }
    }

    #[test]
    fn test_cli_track_custom_tag() {
        let cli = Cli::try_parse_from(["pud", "track", "left-pad", "--tag", "next"])
            .expect("Should parse track --tag");
        match &cli.command {
            Some(Commands::Track { tag, .. }) => assert_eq!(tag, "next"),
            other => panic!("Expected Track command, got: {:?}", other),
        }
    }

    #[test]
    fn test_cli_track_requires_package() {
        assert!(Cli::try_parse_from(["pud", "track"]).is_err());
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["pud", "stop", "--data-dir", "/tmp/pud", "-v"])
            .expect("Should parse global options after subcommand");

        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/pud")));
        assert!(matches!(cli.command, Some(Commands::Stop)));
    }

    #[test]
    fn test_cli_no_subcommand() {
        let cli = Cli::try_parse_from(["pud"]).expect("Should parse without subcommand");
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }
}
