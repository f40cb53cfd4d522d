use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::exporter::ExportFormat;

/// Riverr: backend API for the home media stack
#[derive(Parser)]
#[command(name = "riverr", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export secrets, validate them and start the API server
    Serve {
        /// Port to bind (overrides RIVERR_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Resolve the required secrets and print them for a later startup step
    Export {
        #[arg(short, long, value_enum, default_value = "shell")]
        format: ExportFormat,
        /// Write to a file (mode 0600) instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve and validate the required secrets without starting the server
    Check,

    /// Manage the encrypted vault file
    Vault {
        /// Vault file (defaults to the path in RIVERR_SECRET_SOURCE=vault:<path>)
        #[arg(long, env = "RIVERR_VAULT_FILE")]
        file: Option<PathBuf>,
        #[command(subcommand)]
        command: VaultCommands,
    },
}

#[derive(Subcommand)]
pub enum VaultCommands {
    /// Store a secret. Reads the value from stdin when --value is omitted.
    Put {
        name: String,
        #[arg(long)]
        value: Option<String>,
    },
    /// List stored secret names (never values)
    List,
    /// Delete a stored secret
    Remove { name: String },
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
    fn test_parse_export() {
        let cli = Cli::try_parse_from(["riverr", "export", "--format", "dotenv", "-o", "/tmp/x.env"]).unwrap();
        match cli.command {
            Some(Commands::Export { format, output }) => {
                assert_eq!(format, ExportFormat::Dotenv);
                assert_eq!(output, Some(PathBuf::from("/tmp/x.env")));
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["riverr"]).unwrap();
        assert!(cli.command.is_none());
    }
}
