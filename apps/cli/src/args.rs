use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Replicates Claude Code usage records between machines through a private gist.
#[derive(Debug, Parser)]
#[command(name = "ccu", version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(global = true, short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Export new records and upload them with an updated manifest
    Push {
        /// Export every record instead of starting at the last export
        #[arg(long)]
        all: bool,
        /// Overwrite the remote manifest without checking for concurrent pushes
        #[arg(long)]
        force: bool,
        /// Keep a dated copy of the previous data file
        #[arg(long, overrides_with = "no_backup")]
        backup: bool,
        #[arg(long, overrides_with = "backup")]
        no_backup: bool,
    },
    /// Download other machines' records into their local stores
    Pull {
        /// Only pull these machines
        machines: Vec<String>,
    },
    /// Show local and remote sync state
    Status,
    /// List the files in the shared container
    Info,
    /// Store the access token in the config directory
    SetToken { token: String },
    /// Remove the stored access token
    DeleteToken,
    /// Write this machine's records to a single bundle file
    Export {
        output: PathBuf,
        /// Only records on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
    },
    /// Import bundle files into local stores
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Target store (defaults to each bundle's own machine)
        #[arg(long)]
        machine: Option<String>,
        /// Count what would be imported without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// List machines whose records have been imported here
    Machines {
        /// Include inactive machines
        #[arg(long)]
        all: bool,
    },
}

/// `--backup` / `--no-backup`, or `None` to use the configured default.
pub fn backup_override(backup: bool, no_backup: bool) -> Option<bool> {
    match (backup, no_backup) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_push_flags() {
        let cli = Cli::parse_from(["ccu", "push", "--all", "--no-backup"]);
        match cli.command {
            Command::Push {
                all,
                force,
                backup,
                no_backup,
            } => {
                assert!(all);
                assert!(!force);
                assert_eq!(backup_override(backup, no_backup), Some(false));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn last_backup_flag_wins() {
        let cli = Cli::parse_from(["ccu", "push", "--no-backup", "--backup"]);
        let Command::Push {
            backup, no_backup, ..
        } = cli.command
        else {
            panic!("expected push");
        };
        assert_eq!(backup_override(backup, no_backup), Some(true));
    }

    #[test]
    fn parses_export_since_date() {
        let cli = Cli::parse_from(["ccu", "-v", "export", "out.json", "--since", "2025-03-01"]);
        assert!(cli.verbose);
        let Command::Export { output, since } = cli.command else {
            panic!("expected export");
        };
        assert_eq!(output, PathBuf::from("out.json"));
        assert_eq!(since, NaiveDate::from_ymd_opt(2025, 3, 1));
    }

    #[test]
    fn rejects_bad_since_date() {
        assert!(Cli::try_parse_from(["ccu", "export", "out.json", "--since", "March"]).is_err());
    }

    #[test]
    fn parses_info() {
        let cli = Cli::parse_from(["ccu", "info"]);
        assert!(matches!(cli.command, Command::Info));
        assert!(Cli::try_parse_from(["ccu", "info", "extra"]).is_err());
    }

    #[test]
    fn import_requires_a_file() {
        assert!(Cli::try_parse_from(["ccu", "import"]).is_err());
    }
}
