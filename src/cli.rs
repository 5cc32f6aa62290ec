//! Command-line entry point: importance recompute and ad-hoc queries.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, bail};

use crate::memory::adapters::rig_adapter::init_tracing;
use crate::memory::core::config::MemoryConfig;
use crate::memory::embedding::embedder::build_embedder;
use crate::memory::maintenance::rank_refresh::recompute_importance;
use crate::memory::retrieval::coordinator::{RetrievalCoordinator, RetrievalRequest};

const USAGE: &str = "usage:
  neuromem recompute [--path P]
  neuromem query <text> [--alpha A] [--k K] [--pool P]";

/// A parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Recompute importance, optionally for a specific local chunk file.
    Recompute {
        /// Local chunk file overriding the configured one.
        path: Option<PathBuf>,
    },
    /// Rank chunks for a query.
    Query {
        /// Query text.
        text: String,
        /// Similarity weight override.
        alpha: Option<f64>,
        /// Result count override.
        k: Option<usize>,
        /// Pool size override.
        pool: Option<usize>,
    },
    /// Print usage.
    Help,
}

/// Parse arguments (without the program name).
///
/// # Errors
/// Returns an error on unknown commands, flags, or unparsable values.
pub fn parse_args<I>(args: I) -> anyhow::Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(command) = args.next() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "recompute" => {
            let mut path = None;
            while let Some(flag) = args.next() {
                match flag.as_str() {
                    "--path" => path = Some(PathBuf::from(flag_value(&mut args, "--path")?)),
                    other => bail!("unknown flag for recompute: {other}"),
                }
            }
            Ok(Command::Recompute { path })
        }
        "query" => {
            let mut words = Vec::new();
            let (mut alpha, mut k, mut pool) = (None, None, None);
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--alpha" => {
                        let value = flag_value(&mut args, "--alpha")?;
                        alpha = Some(
                            value
                                .parse::<f64>()
                                .with_context(|| format!("invalid --alpha: {value}"))?,
                        );
                    }
                    "--k" => {
                        let value = flag_value(&mut args, "--k")?;
                        k = Some(
                            value
                                .parse::<usize>()
                                .with_context(|| format!("invalid --k: {value}"))?,
                        );
                    }
                    "--pool" => {
                        let value = flag_value(&mut args, "--pool")?;
                        pool = Some(
                            value
                                .parse::<usize>()
                                .with_context(|| format!("invalid --pool: {value}"))?,
                        );
                    }
                    flag if flag.starts_with("--") => bail!("unknown flag for query: {flag}"),
                    _ => words.push(arg),
                }
            }
            if words.is_empty() {
                bail!("query text is required");
            }
            Ok(Command::Query {
                text: words.join(" "),
                alpha,
                k,
                pool,
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => bail!("unknown command: {other}"),
    }
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next().with_context(|| format!("{flag} needs a value"))
}

/// Execute a command and return what should be printed.
///
/// # Errors
/// Returns an error if configuration, embedding, or storage fails.
pub async fn execute(command: Command, mut config: MemoryConfig) -> anyhow::Result<String> {
    match command {
        Command::Help => Ok(USAGE.to_string()),
        Command::Recompute { path } => {
            if let Some(path) = path {
                config.storage.local_chunks_path = path;
            }
            let coordinator = build_coordinator(&config).await?;
            let count = recompute_importance(
                coordinator.store().as_ref(),
                coordinator.embedder().as_ref(),
                &config.graph,
            )
            .await
            .context("importance recompute failed")?;
            Ok(format!("Wrote {count} rows"))
        }
        Command::Query {
            text,
            alpha,
            k,
            pool,
        } => {
            let coordinator = build_coordinator(&config).await?;
            let defaults = &config.retrieval;
            let request = RetrievalRequest {
                query: text,
                alpha: alpha.unwrap_or(defaults.alpha),
                k: k.unwrap_or(defaults.k),
                pool: pool.unwrap_or(defaults.pool),
            };
            let result = coordinator
                .retrieve(&request)
                .await
                .context("retrieval failed")?;
            Ok(serde_json::to_string_pretty(&result)?)
        }
    }
}

async fn build_coordinator(config: &MemoryConfig) -> anyhow::Result<RetrievalCoordinator> {
    config.validate()?;
    let embedder = build_embedder(&config.embedding)?;
    Ok(RetrievalCoordinator::from_config(config, embedder).await?)
}

/// Parse `std::env::args`, run the command, and print its output.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(err) => {
            tracing::error!("{err:#}");
            let _ = writeln!(std::io::stderr(), "{USAGE}");
            return ExitCode::from(2);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(execute(command, MemoryConfig::from_env())) {
        Ok(output) => {
            let _ = writeln!(std::io::stdout().lock(), "{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(1)
        }
    }
}
