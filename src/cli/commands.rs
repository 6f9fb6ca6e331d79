//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: start enabled instances and wait for Ctrl-C
//! - descriptors / instances: list the catalog and configured instances
//! - create / enable / disable / delete: manage instances
//! - resolve: map a stored descriptor key onto the current catalog

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sourced - lifecycle manager for data-source connectors
#[derive(Parser, Debug)]
#[command(name = "sourced")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Start all enabled instances and run until Ctrl-C
    Run {
        /// Do not start instances on startup
        #[arg(long)]
        no_start: bool,
    },

    /// List the descriptor catalog
    Descriptors,

    /// List configured instances
    Instances,

    /// Create a new (disabled) instance of a descriptor
    Create {
        /// Descriptor key, e.g. class:sourced.builtin.Heartbeat
        key: String,

        /// Recorded as the instance's creator
        #[arg(short, long, default_value = "cli")]
        user: String,
    },

    /// Resolve a descriptor key, following renames
    Resolve {
        /// Descriptor key as stored
        key: String,
    },

    /// Enable an instance
    Enable {
        /// Instance ID
        id: String,
    },

    /// Disable an instance
    Disable {
        /// Instance ID
        id: String,
    },

    /// Delete an instance
    Delete {
        /// Instance ID
        id: String,

        /// Also remove dashboard widgets showing the instance
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::try_parse_from(["sourced"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from(["sourced", "instances", "-v", "-c", "/etc/sourced.yml"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sourced.yml")));
        assert_eq!(cli.command, Some(Commands::Instances));
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::try_parse_from(["sourced", "run"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Run { no_start: false }));

        let cli = Cli::try_parse_from(["sourced", "run", "--no-start"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Run { no_start: true }));
    }

    #[test]
    fn test_create_command() {
        let cli = Cli::try_parse_from(["sourced", "create", "class:sourced.builtin.Heartbeat"]).unwrap();
        match cli.command {
            Some(Commands::Create { key, user }) => {
                assert_eq!(key, "class:sourced.builtin.Heartbeat");
                assert_eq!(user, "cli");
            }
            _ => panic!("Expected create command"),
        }
    }

    #[test]
    fn test_resolve_command() {
        let cli = Cli::try_parse_from(["sourced", "resolve", "class:com.old.GitLogSource"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Resolve {
                key: "class:com.old.GitLogSource".to_string()
            })
        );
    }

    #[test]
    fn test_enable_disable_commands() {
        let cli = Cli::try_parse_from(["sourced", "enable", "Heartbeat__ab"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Enable {
                id: "Heartbeat__ab".to_string()
            })
        );

        let cli = Cli::try_parse_from(["sourced", "disable", "Heartbeat__ab"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Disable {
                id: "Heartbeat__ab".to_string()
            })
        );
    }

    #[test]
    fn test_delete_command() {
        let cli = Cli::try_parse_from(["sourced", "delete", "x"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Delete {
                id: "x".to_string(),
                force: false
            })
        );

        let cli = Cli::try_parse_from(["sourced", "delete", "x", "--force"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Delete {
                id: "x".to_string(),
                force: true
            })
        );
    }

    #[test]
    fn test_missing_argument_fails() {
        assert!(Cli::try_parse_from(["sourced", "enable"]).is_err());
    }

    #[test]
    fn test_help_works() {
        Cli::command().debug_assert();
    }
}
