//! NullVoid CLI binary

use clap::Parser;

use nullvoid_lib::cli::{CacheCommands, Cli, Commands, cache, doctor, scan};

fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let outcome = match cli.command {
        Commands::Scan {
            target,
            depth,
            workers,
            output,
            rules,
            all,
            compliance,
            parallel: _,
            no_parallel,
        } => scan::run(
            target,
            depth,
            workers,
            output,
            rules,
            all,
            compliance,
            !no_parallel,
            cli.quiet,
        ),
        Commands::Cache { action } => match action {
            CacheCommands::Stats => cache::stats(),
            CacheCommands::Clear => cache::clear(),
        },
        Commands::Doctor => doctor::run(),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            // Invalid input and configuration problems land here.
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };
    let directive = std::env::var("NULLVOID_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&directive)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
