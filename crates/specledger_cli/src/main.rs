//! `specledger` command-line dispatcher.
//!
//! # Responsibility
//! - Parse one contract invocation from the command line.
//! - Open the configured store, run the call and print the result as JSON.
//!
//! # Invariants
//! - Failures go to stderr with a non-zero exit code; stdout carries results only.

use clap::{Args, Parser, Subcommand};
use log::info;
use serde_json::json;
use specledger_core::{
    init_logging_from, LedgerConfig, RepoError, SpecContract, SqliteRecordRepository, TestSpec,
};
use std::path::PathBuf;
use std::process::ExitCode;

const DEFAULT_DB_FILE_NAME: &str = "specledger.sqlite3";

#[derive(Debug, Parser)]
#[command(name = "specledger")]
#[command(about = "World-state ledger for software testing specifications")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "SPECLEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config)
    #[arg(long, env = "SPECLEDGER_DB")]
    db: Option<PathBuf>,

    /// Absolute directory for rolling log files (overrides config)
    #[arg(long)]
    log_dir: Option<String>,

    /// Log level (overrides config)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Seed the fixed demo specs ST001..ST003
    InitLedger,
    /// Print whether a spec exists
    Exists { key: String },
    /// Create a new spec
    Create(SpecArgs),
    /// Print a stored spec document
    Read { key: String },
    /// Replace a stored spec
    Update(SpecArgs),
    /// Delete a stored spec
    Delete { key: String },
    /// Replace the allowed-parties list of a spec
    ChangeParties { key: String, parties: String },
    /// Print every stored record as `{key, record}` pairs
    GetAll,
}

#[derive(Debug, Args)]
struct SpecArgs {
    #[arg(long)]
    id: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    module_version: String,
    /// Build version under test
    #[arg(long = "build-version")]
    build_version: String,
    #[arg(long)]
    date: String,
    #[arg(long)]
    owner: String,
    #[arg(long, default_value = "")]
    allowed_parties: String,
    #[arg(long, default_value = "")]
    source_location: String,
}

impl From<SpecArgs> for TestSpec {
    fn from(args: SpecArgs) -> Self {
        Self {
            id: args.id,
            name: args.name,
            module_version: args.module_version,
            version: args.build_version,
            date: args.date,
            owner: args.owner,
            allowed_parties: args.allowed_parties,
            source_location: args.source_location,
            doc_type: None,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            if let Some(output) = output {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<Option<String>, String> {
    let config = resolve_config(&cli)?;
    init_logging_from(&config.logging)?;

    let repo = SqliteRecordRepository::open(&config.storage).map_err(|err| err.to_string())?;
    let contract = SpecContract::new(repo);
    info!(
        "event=cli_start module=cli status=ok command={:?}",
        cli.command
    );

    dispatch(&contract, cli.command).map_err(|err| err.to_string())
}

fn resolve_config(cli: &Cli) -> Result<LedgerConfig, String> {
    let mut config = match cli.config.as_ref() {
        Some(path) => LedgerConfig::load(path).map_err(|err| err.to_string())?,
        None => LedgerConfig::default(),
    };

    if let Some(db) = cli.db.clone() {
        config.storage.db_path = Some(db);
    }
    if config.storage.db_path.is_none() {
        config.storage.db_path = Some(PathBuf::from(DEFAULT_DB_FILE_NAME));
    }
    if let Some(dir) = cli.log_dir.clone() {
        config.logging.log_dir = Some(dir);
    }
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }

    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

/// Runs one command; `None` means the command has nothing to print.
fn dispatch(
    contract: &SpecContract<SqliteRecordRepository>,
    command: Command,
) -> Result<Option<String>, RepoError> {
    match command {
        Command::InitLedger => {
            let seeded = contract.init_ledger()?;
            Ok(Some(json!({ "seeded": seeded }).to_string()))
        }
        Command::Exists { key } => Ok(Some(json!(contract.spec_exists(&key)?).to_string())),
        Command::Create(args) => {
            contract.create_spec(&TestSpec::from(args))?;
            Ok(None)
        }
        Command::Read { key } => Ok(Some(serde_json::to_string_pretty(
            &contract.read_spec(&key)?,
        )?)),
        Command::Update(args) => {
            contract.update_spec(&TestSpec::from(args))?;
            Ok(None)
        }
        Command::Delete { key } => {
            contract.delete_spec(&key)?;
            Ok(None)
        }
        Command::ChangeParties { key, parties } => {
            contract.change_parties(&key, &parties)?;
            Ok(None)
        }
        Command::GetAll => contract.get_all_results().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::{dispatch, Cli, Command};
    use clap::{CommandFactory, Parser};
    use serde_json::Value;
    use specledger_core::{SpecContract, SqliteRecordRepository, StorageOptions};

    fn contract() -> SpecContract<SqliteRecordRepository> {
        SpecContract::new(SqliteRecordRepository::open(&StorageOptions::default()).unwrap())
    }

    fn command(args: &[&str]) -> Command {
        let argv = std::iter::once("specledger").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_change_parties_with_db_override() {
        let cli = Cli::try_parse_from([
            "specledger",
            "--db",
            "/tmp/ledger.sqlite3",
            "change-parties",
            "ST001",
            "Customer,PM",
        ])
        .unwrap();
        assert_eq!(
            cli.db.as_deref(),
            Some(std::path::Path::new("/tmp/ledger.sqlite3"))
        );
        assert!(matches!(
            cli.command,
            Command::ChangeParties { ref key, ref parties } if key == "ST001" && parties == "Customer,PM"
        ));
    }

    #[test]
    fn unit_commands_print_nothing() {
        let contract = contract();
        let create = command(&[
            "create",
            "--id",
            "ST010",
            "--name",
            "Search Page",
            "--module-version",
            "1.0",
            "--build-version",
            "1.2.1.0",
            "--date",
            "1/6/2022",
            "--owner",
            "QC",
        ]);
        assert_eq!(dispatch(&contract, create).unwrap(), None);
        assert_eq!(
            dispatch(&contract, command(&["change-parties", "ST010", "PM"])).unwrap(),
            None
        );

        let read = dispatch(&contract, command(&["read", "ST010"]))
            .unwrap()
            .expect("read prints the document");
        let document: Value = serde_json::from_str(&read).unwrap();
        assert_eq!(document["name"], "Search Page");
        assert_eq!(document["allowedParties"], "PM");

        assert_eq!(
            dispatch(&contract, command(&["delete", "ST010"])).unwrap(),
            None
        );
        assert_eq!(
            dispatch(&contract, command(&["exists", "ST010"])).unwrap(),
            Some("false".to_string())
        );
    }
}
