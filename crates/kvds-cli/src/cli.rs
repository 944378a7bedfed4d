use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kvds_types::DataScope;

#[derive(Parser)]
#[command(name = "kvds", about = "Inspect and edit KVDS stores", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Scope configuration file (TOML). Built-in defaults fill missing scopes.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory of the default local store.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, global = true, default_value = "local")]
    pub scope: DataScope,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show one record
    Get(KeyArgs),
    /// Write a record
    Put(PutArgs),
    /// Delete a record
    Delete(DeleteArgs),
    /// List the records of a collection
    List(KeyArgs),
    /// Show the effective scope configuration
    Scopes,
}

#[derive(Args)]
pub struct KeyArgs {
    /// Key segments below the root namespace
    #[arg(required = true)]
    pub segments: Vec<String>,
}

#[derive(Args)]
pub struct PutArgs {
    #[arg(required = true)]
    pub segments: Vec<String>,
    /// JSON document; anything else is stored as a JSON string
    #[arg(long)]
    pub value: String,
    /// Compare-and-swap on --index (0 or absent: create only)
    #[arg(long)]
    pub atomic: bool,
    #[arg(long, requires = "atomic")]
    pub index: Option<u64>,
}

#[derive(Args)]
pub struct DeleteArgs {
    #[arg(required = true)]
    pub segments: Vec<String>,
    /// Delete only if the record is still at --index
    #[arg(long, requires = "index")]
    pub atomic: bool,
    #[arg(long, requires = "atomic")]
    pub index: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_get() {
        let cli = Cli::try_parse_from(["kvds", "get", "network", "n1"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.segments, vec!["network", "n1"]);
        } else {
            panic!("wrong command");
        }
        assert_eq!(cli.scope, DataScope::Local);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn get_needs_a_key() {
        assert!(Cli::try_parse_from(["kvds", "get"]).is_err());
    }

    #[test]
    fn parse_atomic_put() {
        let cli = Cli::try_parse_from([
            "kvds", "--scope", "global", "put", "net", "n1", "--value", "{}", "--atomic", "--index", "4",
        ])
        .unwrap();
        assert_eq!(cli.scope, DataScope::Global);
        if let Command::Put(args) = cli.command {
            assert!(args.atomic);
            assert_eq!(args.index, Some(4));
            assert_eq!(args.value, "{}");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn index_requires_atomic() {
        assert!(Cli::try_parse_from(["kvds", "put", "a", "--value", "1", "--index", "3"]).is_err());
        assert!(Cli::try_parse_from(["kvds", "delete", "a", "--atomic"]).is_err());
    }

    #[test]
    fn parse_globals_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kvds", "list", "network", "--format", "json", "-v", "--data-dir", "/data", "--config", "/etc/kvds.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/data")));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/kvds.toml")));
    }

    #[test]
    fn unknown_scope_is_rejected() {
        assert!(Cli::try_parse_from(["kvds", "--scope", "cluster", "scopes"]).is_err());
    }
}
