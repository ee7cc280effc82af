use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::shell::hooks::Shell;

#[derive(Parser)]
#[command(
    name = "repty",
    version,
    about = "Record your shell commands and find them again"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a finished command (called by the shell hook)
    #[command(hide = true)]
    Log {
        #[arg(long, allow_hyphen_values = true)]
        command: String,
        #[arg(long)]
        cwd: Option<String>,
        #[arg(long = "exit")]
        exit_code: Option<i32>,
        /// Comma separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Search history by text and tags
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Max results
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Natural language search ranked by an LLM
    Ai {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Max results
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the most recent commands
    Recent {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Save a command as a favorite with a description
    Save {
        description: String,
        #[arg(allow_hyphen_values = true)]
        command: String,
        #[arg(long)]
        cwd: Option<String>,
    },
    /// Add or remove tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Export history to Markdown, or CSV for a .csv path
    Export {
        file: Option<PathBuf>,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print the shell hook (e.g., `eval "$(repty init zsh)"`)
    Init {
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Add the hook to ~/.bashrc and ~/.zshrc
    InstallHooks,
    /// Remove the hook from ~/.bashrc and ~/.zshrc
    UninstallHooks,
    /// Check the database and install hooks
    Setup {
        /// Don't ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
        #[arg(long)]
        no_hooks: bool,
        /// API key to store in the config
        #[arg(long)]
        key: Option<String>,
    },
    /// Remove hooks and delete all repty data
    Uninstall {
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum TagAction {
    /// Tag a command (defaults to the last one you ran)
    Add {
        tag: String,
        #[arg(long)]
        id: Option<i64>,
    },
    /// Remove a tag from a command
    Rm {
        tag: String,
        #[arg(long)]
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Store the LLM API key
    SetKey { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_accepts_dash_commands() {
        let cli = Cli::try_parse_from([
            "repty", "log", "--command", "-rf", "--cwd", "/tmp", "--exit", "2", "--tags", "a,b",
        ])
        .unwrap();
        match cli.command {
            Commands::Log {
                command,
                exit_code,
                tags,
                ..
            } => {
                assert_eq!(command, "-rf");
                assert_eq!(exit_code, Some(2));
                assert_eq!(tags.as_deref(), Some("a,b"));
            }
            _ => panic!("expected log"),
        }
    }

    #[test]
    fn test_multi_word_query() {
        let cli = Cli::try_parse_from(["repty", "ai", "restart", "the", "nginx", "-l", "3"]).unwrap();
        match cli.command {
            Commands::Ai { query, limit } => {
                assert_eq!(query.join(" "), "restart the nginx");
                assert_eq!(limit, Some(3));
            }
            _ => panic!("expected ai"),
        }
    }

    #[test]
    fn test_tag_rm_requires_id() {
        assert!(Cli::try_parse_from(["repty", "tag", "rm", "x"]).is_err());
        assert!(Cli::try_parse_from(["repty", "init", "fish"]).is_err());
    }
}
