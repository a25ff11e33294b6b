use clap::Parser;

use pud::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // The daemon sets up its own subscriber (stderr + daemon.log)
    if cli.verbose && !matches!(cli.command, Some(Commands::Daemon { .. })) {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    }

    match cli::dispatch(&cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
