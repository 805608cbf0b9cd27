//! `governor`: validate manifests and dry-run decisions.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use governor_config::{load_config, load_manifest, GovernorConfig};
use governor_policy::{DecisionEvaluator, DecisionRequest, DecisionResult, UnmeteredBudgets};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "governor", version, about = "BRAiN governor manifest tooling")]
struct Cli {
    /// Configuration file (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `governor_policy=debug`.
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a manifest and compile its conditions.
    Validate {
        /// Manifest file. Defaults to the configured `manifest_path`.
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Evaluate one request against a manifest and print the decision.
    Evaluate {
        /// Manifest file. Defaults to the configured `manifest_path`.
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Decision request file (JSON).
        #[arg(long)]
        request: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("loading configuration")?;
    let filter = cli.log.as_deref().unwrap_or(&config.telemetry.log_filter);
    governor_telemetry::init(Some(filter))?;

    match cli.command {
        Command::Validate { manifest } => {
            let evaluator = compile(&manifest_path(manifest, &config)?)?;
            let manifest = evaluator.manifest();
            println!(
                "manifest {} is valid: {} rules, {} budgets, {} risk classes",
                manifest.version(),
                manifest.rules().len(),
                manifest.budgets().len(),
                manifest.risk_classes().len()
            );
        }
        Command::Evaluate { manifest, request } => {
            let result = evaluate(&manifest_path(manifest, &config)?, &request)?;
            info!(decision = %result.decision(), reason = %result.reason(), "evaluated");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn evaluate(manifest: &Path, request: &Path) -> Result<DecisionResult> {
    let evaluator = compile(manifest)?;
    let raw = fs::read_to_string(request)
        .with_context(|| format!("reading request {}", request.display()))?;
    let parsed: DecisionRequest = serde_json::from_str(&raw)
        .with_context(|| format!("parsing request {}", request.display()))?;
    Ok(evaluator.evaluate(&parsed, &UnmeteredBudgets)?)
}

fn manifest_path(explicit: Option<PathBuf>, config: &GovernorConfig) -> Result<PathBuf> {
    explicit
        .or_else(|| config.manifest_path.clone())
        .context("no manifest given: pass --manifest or set GOVERNOR_MANIFEST")
}

fn compile(path: &Path) -> Result<DecisionEvaluator> {
    let manifest = load_manifest(path)?;
    DecisionEvaluator::new(Arc::new(manifest))
        .with_context(|| format!("compiling manifest {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use governor_policy::ReasonCode;
    use tempfile::NamedTempFile;

    use super::*;

    const MANIFEST: &str = r#"{
        "version": "2026.10",
        "risk_classes": [{"name": "routine", "tier": "low"}],
        "base_constraints": {"limits": {"max_robots": 8}},
        "rules": [{
            "id": "inspect",
            "when": {"field": {"path": "action", "op": "eq", "value": "site.inspect"}},
            "action": "allow",
            "risk_class": "routine",
            "reductions": [{"op": "cap_limit", "key": "max_robots", "max": 2}]
        }],
        "default": {"action": "deny", "risk_tier": "medium"}
    }"#;

    fn write(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn evaluate_reads_manifest_and_request_files() {
        let manifest = write(MANIFEST);
        let request = write(r#"{"actor": {"id": "drone-4", "role": "operator"}, "action": "site.inspect"}"#);

        let result = evaluate(manifest.path(), request.path()).unwrap();
        assert_eq!(result.reason(), ReasonCode::RuleAllow);
        assert_eq!(result.constraints().limit("max_robots"), Some(2));

        let printed = serde_json::to_value(&result).unwrap();
        assert_eq!(printed["manifest_version"], "2026.10");
    }

    #[test]
    fn evaluate_reports_malformed_requests() {
        let manifest = write(MANIFEST);
        let request = write(r#"{"action": "site.inspect"}"#);

        let err = evaluate(manifest.path(), request.path()).unwrap_err();
        assert!(err.to_string().starts_with("parsing request"));
    }

    #[test]
    fn evaluate_subcommand_parses() {
        let cli = Cli::try_parse_from([
            "governor",
            "--log",
            "debug",
            "evaluate",
            "--manifest",
            "governor.json",
            "--request",
            "request.json",
        ])
        .unwrap();

        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Command::Evaluate { manifest: Some(_), ref request } if request == Path::new("request.json")
        ));
    }
}
