//! RETRACE CLI
//!
//! Parse execution traces and replay recorded snapshots from the shell.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod render;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use retrace_replay::{ReplaySession, TypeRegistry, ValueSnapshot};
use retrace_trace::{FocalScope, MockScope, ParserConfig, TraceParser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "RETRACE - Turn recorded executions into replayable tests", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a trace and print its workflows as JSON
    Parse {
        /// Path to trace file
        trace: PathBuf,
        /// Treat every section as a focal call, not only top-level ones
        #[arg(long)]
        every_section: bool,
        /// List every nested call as a mock, not only direct children
        #[arg(long)]
        all_descendants: bool,
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
    /// Materialize a snapshot and print the live value
    Materialize {
        /// Path to snapshot JSON
        snapshot: PathBuf,
        /// Registry extension file
        #[arg(short, long)]
        registry: Option<PathBuf>,
    },
    /// Compare two snapshots; exits with 1 if they differ
    Compare {
        /// Snapshot of the actual value
        actual: PathBuf,
        /// Snapshot of the expected value
        expected: PathBuf,
        /// Registry extension file
        #[arg(short, long)]
        registry: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_registry(path: Option<&Path>) -> Result<TypeRegistry> {
    match path {
        Some(path) => TypeRegistry::from_file(path)
            .wrap_err_with(|| format!("loading registry {}", path.display())),
        None => Ok(TypeRegistry::new()),
    }
}

fn load_snapshot(path: &Path) -> Result<ValueSnapshot> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading snapshot {}", path.display()))?;
    ValueSnapshot::from_json(&text).wrap_err_with(|| format!("decoding snapshot {}", path.display()))
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Parse {
            trace,
            every_section,
            all_descendants,
            pretty,
        } => {
            let mut config = ParserConfig::default();
            if every_section {
                config = config.with_focal(FocalScope::EverySection);
            }
            if all_descendants {
                config = config.with_mock_scope(MockScope::AllDescendants);
            }
            let parsed = TraceParser::new()
                .with_config(config)
                .parse_file(&trace)
                .wrap_err_with(|| format!("parsing trace {}", trace.display()))?;
            tracing::info!(workflows = parsed.workflows.len(), calls = parsed.total_calls(), "trace parsed");
            let out = if pretty {
                serde_json::to_string_pretty(&parsed.workflows)?
            } else {
                serde_json::to_string(&parsed.workflows)?
            };
            println!("{out}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Materialize { snapshot, registry } => {
            let registry = load_registry(registry.as_deref())?;
            let snap = load_snapshot(&snapshot)?;
            let mut session = ReplaySession::new(Arc::new(registry));
            let value = session.materialize(&snap, false)?;
            println!("{}", serde_json::to_string_pretty(&render::render(&value))?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Compare {
            actual,
            expected,
            registry,
        } => {
            let registry = load_registry(registry.as_deref())?;
            let actual_snap = load_snapshot(&actual)?;
            let expected_snap = load_snapshot(&expected)?;
            let mut session = ReplaySession::new(Arc::new(registry));
            let left = session.materialize(&actual_snap, true)?;
            let right = session.materialize(&expected_snap, true)?;
            if session.equal(&left, &right) {
                println!("equal");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("not equal");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["retrace", "--log-format", "json", "parse", "t.log", "--pretty"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Commands::Parse { pretty: true, every_section: false, .. }));

        let cli = Cli::try_parse_from(["retrace", "compare", "a.json", "b.json", "-r", "reg.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Compare { registry: Some(_), .. }));
    }

    #[test]
    fn test_load_snapshot_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"type":"int","value":"5"}}"#).unwrap();
        let snap = load_snapshot(file.path()).unwrap();
        assert_eq!(snap.type_name.as_deref(), Some("int"));
        assert!(load_snapshot(Path::new("/nonexistent/snapshot.json")).is_err());
    }

    #[test]
    fn test_default_registry() {
        let registry = load_registry(None).unwrap();
        assert!(!registry.is_empty());
    }
}
