//! Command-line argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::output::{ComplianceFramework, OutputFormat};

/// NullVoid - static supply-chain security scanner for npm
///
/// Scans project directories, installed packages, or name@version
/// specifiers for obfuscated code, wallet hijacking, dependency confusion,
/// dangerous lifecycle scripts, and known vulnerabilities.
#[derive(Parser, Debug)]
#[command(name = "nullvoid")]
#[command(author = "NullVoid Team")]
#[command(version)]
#[command(about = "Static supply-chain security scanner for npm", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors and the report
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory, a single file, or a name@version specifier
    #[command(visible_alias = "s")]
    Scan {
        /// Directory path, file path, or package name@version.
        /// Defaults to the configured default target or the current directory.
        target: Option<String>,

        /// Transitive dependency depth to descend
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=10))]
        depth: Option<u32>,

        /// Worker count (1..16) or "auto"
        #[arg(long, value_parser = parse_workers)]
        workers: Option<usize>,

        /// Report format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,

        /// Custom rules file appending patterns to the catalogue
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Also report low and medium severity findings
        #[arg(long)]
        all: bool,

        /// Append a compliance section to markdown output
        #[arg(long, value_enum)]
        compliance: Option<ComplianceFramework>,

        /// Scan files in parallel (default)
        #[arg(long, overrides_with = "no_parallel")]
        parallel: bool,

        /// Scan on a single worker
        #[arg(long)]
        no_parallel: bool,
    },

    /// Inspect or clear the on-disk cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Check advisory provider and cache health
    Doctor,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache entry counts and sizes
    Stats,
    /// Delete all cached entries
    Clear,
}

/// `auto` resolves to 0 and lets the pool size itself from the CPU count.
fn parse_workers(raw: &str) -> Result<usize, String> {
    if raw == "auto" {
        return Ok(0);
    }
    match raw.parse::<usize>() {
        Ok(n) if (1..=16).contains(&n) => Ok(n),
        _ => Err(format!("expected 1..16 or \"auto\", got {raw}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::try_parse_from(["nullvoid", "scan", "./pkg"]).unwrap();
        match cli.command {
            Commands::Scan {
                target,
                output,
                all,
                ..
            } => {
                assert_eq!(target.as_deref(), Some("./pkg"));
                assert_eq!(output, OutputFormat::Table);
                assert!(!all);
            }
            _ => panic!("expected scan"),
        }
    }

    #[test]
    fn test_workers_parsing() {
        assert_eq!(parse_workers("auto"), Ok(0));
        assert_eq!(parse_workers("8"), Ok(8));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("17").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_depth_range_enforced() {
        assert!(Cli::try_parse_from(["nullvoid", "scan", ".", "--depth", "10"]).is_ok());
        assert!(Cli::try_parse_from(["nullvoid", "scan", ".", "--depth", "11"]).is_err());
    }

    #[test]
    fn test_output_formats_accepted() {
        for format in ["json", "table", "yaml", "sarif", "markdown", "html"] {
            assert!(
                Cli::try_parse_from(["nullvoid", "scan", ".", "--output", format]).is_ok(),
                "format {format} rejected"
            );
        }
    }

    #[test]
    fn test_parallel_flags_conflict_resolution() {
        let cli =
            Cli::try_parse_from(["nullvoid", "scan", ".", "--parallel", "--no-parallel"]).unwrap();
        match cli.command {
            Commands::Scan {
                parallel,
                no_parallel,
                ..
            } => {
                assert!(!parallel);
                assert!(no_parallel);
            }
            _ => panic!("expected scan"),
        }
    }
}
