//! NRT model tool
//!
//! The `nrt-models` command checks workflow configurations and fetches the
//! models they reference, verifying every remote artifact against its
//! SHA-256 digest.
//!
//! ## Commands
//!
//! - `check`: validate a workflow configuration
//! - `resolve`: resolve a single model reference
//! - `fetch`: resolve every model of a workflow configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use model_resolver::config::DEFAULT_CONFIG_FILE;
use model_resolver::{
    resolve_all, EntryOutcome, FsArtifactCache, ModelResolver, VerifiedArtifact, WorkflowConfig,
};
use model_store::{S3Config, S3HttpStore};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "nrt-models")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Check and fetch integrity-verified NRT prediction models", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow configuration and report every problem found
    Check {
        /// Workflow configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },

    /// Resolve one model reference and verify it
    Resolve {
        /// `<name>`, `file://<path>:<sha256>` or `s3://<bucket>/<key>:<sha256>`
        reference: String,

        /// Directory searched for bare model names (default: models)
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Write the verified model bytes to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Content-addressed cache for object-store models
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Give up on a fetch after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Resolve every model in a workflow configuration
    Fetch {
        /// Workflow configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Print a JSON report instead of one line per model
        #[arg(long)]
        report_json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    model_resolver::init_tracing(cli.json, level);

    match cli.command {
        Commands::Check { config } => cmd_check(&config).map(|_| ()),
        Commands::Resolve {
            reference,
            model_dir,
            output,
            cache_dir,
            timeout_secs,
        } => {
            cmd_resolve(
                &reference,
                model_dir.as_deref(),
                output.as_deref(),
                cache_dir.as_deref(),
                timeout_secs,
            )
            .await
        }
        Commands::Fetch {
            config,
            report_json,
        } => cmd_fetch(&config, report_json).await,
    }
}

/// Load and check a workflow configuration
fn cmd_check(path: &Path) -> Result<WorkflowConfig> {
    let config = WorkflowConfig::load(path)
        .with_context(|| format!("Failed to load configuration {:?}", path))?;

    let issues = config.check();
    if !issues.is_empty() {
        for issue in &issues {
            println!("error: {}", issue);
        }
        anyhow::bail!("{} problem(s) in {:?}", issues.len(), path);
    }

    println!("{:?}: {} model(s) OK", path, config.models.len());
    Ok(config)
}

/// Resolve a single reference
async fn cmd_resolve(
    reference: &str,
    model_dir: Option<&Path>,
    output: Option<&Path>,
    cache_dir: Option<&Path>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let store = S3HttpStore::from_env().context("Failed to create object store client")?;
    let mut resolver = ModelResolver::new(Arc::new(store));
    if let Some(dir) = model_dir {
        resolver = resolver.with_search_dir(dir);
    }
    if let Some(dir) = cache_dir {
        let cache = FsArtifactCache::new(dir)
            .with_context(|| format!("Failed to open cache {:?}", dir))?;
        resolver = resolver.with_cache(Arc::new(cache));
    }
    if let Some(secs) = timeout_secs {
        resolver = resolver.with_fetch_timeout(Duration::from_secs(secs));
    }

    let artifact = resolver.resolve(reference).await?;
    print_artifact(&artifact);

    if let Some(path) = output {
        std::fs::write(path, artifact.bytes())
            .with_context(|| format!("Failed to write model to {:?}", path))?;
        println!("Wrote {} bytes to {:?}", artifact.len(), path);
    }
    Ok(())
}

/// Check a configuration, then resolve all of its models
async fn cmd_fetch(path: &Path, report_json: bool) -> Result<()> {
    let config = cmd_check(path)?;

    let mut s3 = config.s3_config();
    if let Some(secs) = config.fetch_timeout_secs {
        s3 = s3.with_timeout(Duration::from_secs(secs));
    }
    let store = build_store(s3)?;
    let resolver = config
        .build_resolver(store)
        .context("Failed to set up model resolver")?;

    let outcomes = resolve_all(&resolver, config.references(), &config.batch_options()).await;
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();

    if report_json {
        let reports: Vec<_> = outcomes.iter().map(EntryOutcome::report).collect();
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for outcome in &outcomes {
            print_outcome(outcome);
        }
    }

    info!(models = outcomes.len(), failed, "fetch finished");
    if failed > 0 {
        anyhow::bail!("{} of {} model(s) failed", failed, outcomes.len());
    }
    Ok(())
}

fn build_store(config: S3Config) -> Result<Arc<S3HttpStore>> {
    let store = S3HttpStore::new(config).context("Failed to create object store client")?;
    Ok(Arc::new(store))
}

fn print_artifact(artifact: &VerifiedArtifact) {
    println!("Reference: {}", artifact.reference());
    println!("SHA-256:   {}", artifact.digest());
    println!("Size:      {} bytes", artifact.len());
    if artifact.is_verified() {
        println!("Status:    verified");
    } else {
        println!("Status:    trusted (local model directory)");
    }
}

fn print_outcome(outcome: &EntryOutcome) {
    match &outcome.result {
        Ok(artifact) => {
            let status = if artifact.is_verified() {
                "verified"
            } else {
                "trusted"
            };
            println!(
                "ok    {}  {} {} bytes, {}",
                outcome.reference,
                artifact.digest().short(),
                artifact.len(),
                status
            );
        }
        Err(e) => {
            let retries = if outcome.attempts > 1 {
                format!(" (after {} attempts)", outcome.attempts)
            } else {
                String::new()
            };
            println!("FAIL  {}  {}{}", outcome.reference, e, retries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use model_resolver::Sha256Digest;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn check_defaults_to_workflow_file() {
        let cli = Cli::try_parse_from(["nrt-models", "check"]).unwrap();
        match cli.command {
            Commands::Check { config } => assert_eq!(config, PathBuf::from("nrt_predict.yaml")),
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["nrt-models", "fetch", "-c", "w.yaml", "--json", "-v"]).unwrap();
        assert!(cli.json);
        assert!(cli.verbose);
    }

    #[test]
    fn resolve_requires_reference() {
        assert!(Cli::try_parse_from(["nrt-models", "resolve"]).is_err());
    }

    #[test]
    fn cmd_check_fails_on_missing_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nrt_predict.yaml");
        std::fs::write(&path, "models:\n  - name: s3://bucket/m.pkl\n    output: m.tif\n").unwrap();

        assert!(cmd_check(&path).is_err());
    }

    #[test]
    fn cmd_check_accepts_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nrt_predict.yaml");
        std::fs::write(&path, "models:\n  - name: veg\n    output: veg.tif\n").unwrap();

        let config = cmd_check(&path).unwrap();
        assert_eq!(config.models.len(), 1);
    }

    #[tokio::test]
    async fn cmd_resolve_writes_verified_file_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("veg.pkl");
        std::fs::write(&model, b"weights").unwrap();
        let out = dir.path().join("copy.pkl");
        let reference = format!(
            "file://{}:{}",
            model.display(),
            Sha256Digest::compute(b"weights")
        );

        cmd_resolve(&reference, None, Some(&out), None, None)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn cmd_resolve_rejects_tampered_model() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("veg.pkl");
        std::fs::write(&model, b"tampered").unwrap();
        let out = dir.path().join("copy.pkl");
        let reference = format!(
            "file://{}:{}",
            model.display(),
            Sha256Digest::compute(b"weights")
        );

        assert!(cmd_resolve(&reference, None, Some(&out), None, None)
            .await
            .is_err());
        assert!(!out.exists());
    }
}
