//! # Asset Batch Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso dell'eseguibile, e fa da host integration
//! minimale: legge gli asset espliciti dalla command line, li passa alla
//! pipeline e scrive i risultati su disco.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Costruzione delle catene dal registry built-in
//! - Writeback dei risultati (replace in place, asset derivati, delete)
//!
//! ## Esempio di utilizzo:
//! ```bash
//! asset-optimizer photo.jpg logo.png --plugin jpeg='{"quality":75}' \
//!     --generate webp-lossless --filename '[name].webp' --workers 8
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use asset_batch_optimizer::{
    normalize_chain, plugins, AssetOptimizer, CacheSetting, Chain, ChainKind, OptimizerConfig,
    RawPluginEntry, SeverityPolicy, Task,
};

#[derive(Parser)]
#[command(name = "asset-optimizer")]
#[command(about = "Optimize assets through pluggable transform chains with content caching")]
struct Args {
    /// Asset files to optimize (no directory discovery; list them explicitly)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Minimizer chain entry: NAME or NAME=JSON_OPTIONS (repeatable, ordered)
    #[arg(short, long = "plugin")]
    plugins: Vec<String>,

    /// Generator chain entry: NAME or NAME=JSON_OPTIONS (repeatable, ordered)
    #[arg(short, long = "generate")]
    generators: Vec<String>,

    /// Output filename template ([path], [base], [name], [ext], [width], [height], ...)
    #[arg(short, long)]
    filename: Option<String>,

    /// Failure classification: off, warning, error or auto
    #[arg(long, default_value = "auto")]
    severity: String,

    /// Resolve severity "auto" to hard errors
    #[arg(long)]
    production: bool,

    /// Number of parallel workers
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Directory for the content cache (default: ~/.asset-optimizer/cache)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Disable the content cache
    #[arg(long)]
    no_cache: bool,

    /// Output directory for results (default: write next to the originals)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Remove originals replaced by a renamed generated asset
    #[arg(long)]
    delete_original: bool,

    /// Emit progress and results as JSON lines
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Parse a `NAME` or `NAME=JSON` chain entry from the command line.
fn parse_entry(spec: &str) -> Result<RawPluginEntry> {
    match spec.split_once('=') {
        None => Ok(RawPluginEntry::Name(spec.to_string())),
        Some((name, options)) => {
            let options: serde_json::Value = serde_json::from_str(options)
                .map_err(|e| anyhow::anyhow!("Invalid options for plugin {}: {}", name, e))?;
            Ok(RawPluginEntry::NameWithOptions(name.to_string(), options))
        }
    }
}

fn build_chains(args: &Args) -> Result<Vec<Chain>> {
    let registry = plugins::builtin_registry();
    let mut chains = Vec::new();

    if !args.plugins.is_empty() {
        let entries: Vec<RawPluginEntry> = args
            .plugins
            .iter()
            .map(|s| parse_entry(s))
            .collect::<Result<_>>()?;
        chains.push(normalize_chain(ChainKind::Minimize, &entries, &registry));
    }

    if !args.generators.is_empty() {
        let entries: Vec<RawPluginEntry> = args
            .generators
            .iter()
            .map(|s| parse_entry(s))
            .collect::<Result<_>>()?;
        chains.push(normalize_chain(ChainKind::Generate, &entries, &registry));
    }

    if chains.is_empty() {
        return Err(anyhow::anyhow!(
            "No transform chain configured; pass at least one --plugin or --generate"
        ));
    }

    for chain in &chains {
        for diagnostic in &chain.diagnostics {
            warn!("Configuration: {}", diagnostic);
        }
    }

    Ok(chains)
}

/// Write one result back to disk under `output_dir` (or next to the
/// original when no output directory is given).
async fn write_result(
    output_dir: Option<&Path>,
    filename: &str,
    data: &[u8],
) -> Result<PathBuf> {
    let target = match output_dir {
        Some(dir) => dir.join(filename),
        None => PathBuf::from(filename),
    };

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    tokio::fs::write(&target, data).await?;
    Ok(target)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let severity: SeverityPolicy = args.severity.parse()?;
    let cache = if args.no_cache {
        CacheSetting::Disabled
    } else {
        match &args.cache_dir {
            Some(dir) => CacheSetting::Dir(dir.clone()),
            None => CacheSetting::Enabled,
        }
    };

    let config = OptimizerConfig {
        severity,
        production: args.production,
        workers: args.workers,
        cache,
        filename: args.filename.clone().map(Into::into),
        delete_original: args.delete_original,
        filter: None,
        json_output: args.json,
    };

    let chains = build_chains(&args)?;

    // Read inputs; a missing file is a hard error before anything runs
    let mut tasks = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let content = tokio::fs::read(file)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
        tasks.push(Task::new(file.to_string_lossy().to_string(), content));
    }

    let optimizer = AssetOptimizer::new(config, chains).await?;
    let results = optimizer.run(&tasks).await?;

    // Writeback: the host side owns this decision, the pipeline only
    // produced the records
    let mut failures = 0usize;
    for result in &results {
        for warning in &result.warnings {
            warn!("{}: {}", result.filename, warning);
        }
        for err in &result.errors {
            error!("{}: {}", result.filename, err);
        }

        if !result.errors.is_empty() {
            failures += 1;
            continue;
        }

        if result.info.minimized || result.info.generated {
            if let Some(data) = &result.data {
                let written = write_result(args.output.as_deref(), &result.filename, data).await?;
                info!("Wrote {}", written.display());
            }
        }
    }

    for original in optimizer.obsolete_originals(&tasks, &results) {
        match tokio::fs::remove_file(&original).await {
            Ok(()) => info!("Removed original {}", original),
            Err(e) => warn!("Failed to remove original {}: {}", original, e),
        }
    }

    if failures > 0 {
        return Err(anyhow::anyhow!("{} asset result(s) had errors", failures));
    }

    Ok(())
}
