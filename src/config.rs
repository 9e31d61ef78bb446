//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione della pipeline e la
//! normalizzazione delle catene di plugin.
//!
//! ## Responsabilità:
//! - Definisce `OptimizerConfig` con tutti i parametri della pipeline
//! - Normalizza configurazioni loosely-typed (nomi, coppie [nome, opzioni],
//!   descriptor pre-istanziati) in catene risolte e validate
//! - Riporta gli errori di configurazione come diagnostics, mai come panic
//! - Definisce `SeverityPolicy` e la classificazione warning/error
//!
//! ## Parametri di configurazione:
//! - `severity`: off | warning | error | auto (default: auto)
//! - `production`: contesto di esecuzione, risolve `auto` → error
//! - `workers`: numero di worker paralleli (default: 4)
//! - `cache`: disabilitata, directory di default, o path esplicito
//! - `filename`: template di default per i filename di output
//! - `delete_original`: rimuove l'originale dopo una generazione rinominata
//! - `filter`: predicato globale (bytes, filename) → bool
//!
//! ## Normalizzazione:
//! - Ogni entry viene risolta contro il `PluginRegistry` (prefisso prima,
//!   nome bare poi)
//! - Entry non risolvibili producono "Unknown plugin: ..." e vengono scartate
//! - Lista vuota produce "No plugins found", mai un errore hard
//! - Senza un sink per le diagnostics il normalizer fallisce immediatamente
//!   con la stessa condizione
//!
//! ## Esempio:
//! ```rust,ignore
//! let entries = vec![RawPluginEntry::Name("jpeg".into())];
//! let chain = normalize_chain(ChainKind::Minimize, &entries, &registry);
//! assert!(chain.diagnostics.is_empty());
//! ```

use crate::error::{Diagnostic, OptimizeError};
use crate::interpolate::FilenameTemplate;
use crate::pipeline::chain::{Chain, ChainKind, FilterFn, TransformDescriptor, TransformResult};
use crate::registry::PluginRegistry;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// How a transform failure is classified after the chain completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityPolicy {
    /// Clear all diagnostics
    Off,
    /// Downgrade every error to a warning
    Warning,
    /// Keep/promote every diagnostic to an error
    Error,
    /// `Error` in a production context, `Warning` otherwise
    #[default]
    Auto,
}

impl SeverityPolicy {
    /// Collapse `Auto` against the execution context.
    fn resolve(self, production: bool) -> SeverityPolicy {
        match self {
            SeverityPolicy::Auto if production => SeverityPolicy::Error,
            SeverityPolicy::Auto => SeverityPolicy::Warning,
            other => other,
        }
    }

    /// Apply the policy to a finished result. Called exactly once per
    /// TransformResult, after the chain completes, never mid-chain.
    pub fn apply(self, result: &mut TransformResult, production: bool) {
        match self.resolve(production) {
            SeverityPolicy::Off => {
                result.warnings.clear();
                result.errors.clear();
            }
            SeverityPolicy::Warning => {
                let demoted: Vec<Diagnostic> = result.errors.drain(..).collect();
                result.warnings.extend(demoted);
            }
            SeverityPolicy::Error => {
                let promoted: Vec<Diagnostic> = result.warnings.drain(..).collect();
                result.errors.extend(promoted);
            }
            // resolve() never returns Auto
            SeverityPolicy::Auto => {}
        }
    }
}

impl FromStr for SeverityPolicy {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(SeverityPolicy::Off),
            "warning" => Ok(SeverityPolicy::Warning),
            "error" | "true" => Ok(SeverityPolicy::Error),
            "auto" => Ok(SeverityPolicy::Auto),
            other => Err(OptimizeError::Validation(format!(
                "Unknown severity policy: {} (expected off, warning, error or auto)",
                other
            ))),
        }
    }
}

/// Where (and whether) the content cache lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheSetting {
    Disabled,
    /// OS-default location under the user's home directory
    #[default]
    Enabled,
    /// Explicit cache directory
    Dir(PathBuf),
}

/// Configuration for a pipeline run.
#[derive(Clone, Default)]
pub struct OptimizerConfig {
    pub severity: SeverityPolicy,
    /// Execution context; resolves `SeverityPolicy::Auto`
    pub production: bool,
    pub workers: usize,
    pub cache: CacheSetting,
    /// Default output filename template, overridden by the first descriptor
    /// in a chain that declares its own
    pub filename: Option<FilenameTemplate>,
    /// Remove the original asset after a generator chain produced a
    /// differently-named derived asset
    pub delete_original: bool,
    /// Gate deciding whether an asset enters the pipeline at all
    pub filter: Option<FilterFn>,
    /// Emit progress and results as JSON lines for programmatic use
    pub json_output: bool,
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self {
            workers: 4,
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }
        Ok(())
    }
}

/// One loosely-typed minimizer configuration entry, before resolution.
#[derive(Clone, Deserialize)]
#[serde(untagged)]
pub enum RawPluginEntry {
    /// A logical plugin name
    Name(String),
    /// A `["name", { ...options }]` pair
    NameWithOptions(String, serde_json::Value),
    /// A fully-instantiated descriptor (deprecated, discouraged); only
    /// constructible programmatically
    #[serde(skip)]
    Descriptor(TransformDescriptor),
    /// Anything else, reported as an invalid configuration
    Invalid(serde_json::Value),
}

/// Resolve raw entries against the registry, splitting into descriptors and
/// diagnostics. Unresolvable or malformed entries are dropped, never fatal.
fn normalize_inner(
    entries: &[RawPluginEntry],
    registry: &PluginRegistry,
) -> (Vec<TransformDescriptor>, Vec<Diagnostic>) {
    let mut steps = Vec::new();
    let mut diagnostics = Vec::new();

    if entries.is_empty() {
        diagnostics.push(Diagnostic::new("No plugins found"));
        return (steps, diagnostics);
    }

    for entry in entries {
        let (name, options) = match entry {
            RawPluginEntry::Name(name) => (name.as_str(), serde_json::Value::Null),
            RawPluginEntry::NameWithOptions(name, options) => {
                if !options.is_object() && !options.is_null() {
                    diagnostics.push(Diagnostic::new(format!(
                        "Invalid plugin configuration: options for \"{}\" must be an object, got {}",
                        name, options
                    )));
                    continue;
                }
                (name.as_str(), options.clone())
            }
            RawPluginEntry::Descriptor(descriptor) => {
                debug!(
                    "Using pre-instantiated transform \"{}\" (deprecated, prefer named entries)",
                    descriptor.name
                );
                steps.push(descriptor.clone());
                continue;
            }
            RawPluginEntry::Invalid(value) => {
                diagnostics.push(Diagnostic::new(format!(
                    "Invalid plugin configuration: expected a plugin name or a [name, options] pair, got {}",
                    value
                )));
                continue;
            }
        };

        match registry.resolve(name) {
            Some(resolved) => {
                debug!("Resolved plugin \"{}\" as {}@{}", name, resolved.name, resolved.version);
                steps.push(TransformDescriptor::new(
                    resolved.name,
                    resolved.version,
                    resolved.transform,
                    options,
                ));
            }
            None => {
                let canonical = PluginRegistry::canonical_name(name);
                diagnostics.push(Diagnostic::new(format!(
                    "Unknown plugin: {}. Tried \"{}\" and \"{}\"; register the implementation in the PluginRegistry before configuring the pipeline",
                    canonical, canonical, name
                )));
            }
        }
    }

    (steps, diagnostics)
}

/// Normalize a loosely-typed plugin list into resolved descriptors.
///
/// Diagnostics are appended to the caller-supplied `sink` rather than
/// raised. When no sink is supplied, the first diagnostic becomes a hard
/// `Config` error instead.
pub fn normalize_plugins(
    entries: &[RawPluginEntry],
    registry: &PluginRegistry,
    sink: Option<&mut Vec<Diagnostic>>,
) -> Result<Vec<TransformDescriptor>, OptimizeError> {
    let (steps, diagnostics) = normalize_inner(entries, registry);

    match sink {
        Some(sink) => {
            sink.extend(diagnostics);
            Ok(steps)
        }
        None => match diagnostics.into_iter().next() {
            Some(diagnostic) => Err(OptimizeError::Config(diagnostic.message)),
            None => Ok(steps),
        },
    }
}

/// Normalize raw entries into a `Chain`, keeping the configuration
/// diagnostics attached so every result produced by the chain carries them.
pub fn normalize_chain(
    kind: ChainKind,
    entries: &[RawPluginEntry],
    registry: &PluginRegistry,
) -> Chain {
    let (steps, diagnostics) = normalize_inner(entries, registry);
    Chain {
        kind,
        steps,
        diagnostics,
    }
}
