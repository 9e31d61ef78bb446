//! # Chain Types Module
//!
//! Questo modulo definisce i tipi di dato della pipeline di trasformazione.
//!
//! ## Strutture dati:
//! - `Task`: un asset in ingresso (bytes + filename + opzioni), immutabile
//! - `TransformDescriptor`: un singolo step della catena (implementazione,
//!   opzioni, filtro opzionale, template filename opzionale)
//! - `Chain`: lista ordinata di descriptor, minimizer oppure generator
//! - `TransformResult`: lo stato che attraversa la catena step dopo step
//! - `ResultInfo`: metadata del risultato (dimensioni, attribution, flags)
//!
//! ## Modello a transizione di stato:
//! La catena è un fold puro `step(TransformResult, TransformDescriptor) ->
//! TransformResult | Error`: ogni implementazione riceve lo stato per valore
//! e ne restituisce uno nuovo, nessuna mutazione condivisa.

use crate::error::{Diagnostic, OptimizeError};
use crate::interpolate::FilenameTemplate;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A transform implementation: takes the current chain state and its options,
/// returns the next state.
///
/// - `Ok(Some(state))` advances the chain;
/// - `Ok(None)` is an explicit no-op step, the previous state is kept;
/// - `Err(_)` stops the chain, the last successful state is preserved.
pub type TransformFn = Arc<
    dyn Fn(TransformResult, serde_json::Value) -> BoxFuture<'static, Result<Option<TransformResult>, OptimizeError>>
        + Send
        + Sync,
>;

/// Predicate gating a single descriptor (or the whole pipeline) for the
/// current data and filename.
pub type FilterFn = Arc<dyn Fn(&[u8], &str) -> bool + Send + Sync>;

/// One input asset. Immutable once created; the pipeline never writes back
/// into it.
#[derive(Debug, Clone)]
pub struct Task {
    pub filename: String,
    /// Raw content bytes. `None` models a missing input, which is an
    /// immediate "Empty input" terminal error in the worker.
    pub content: Option<Vec<u8>>,
}

impl Task {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content: Some(content),
        }
    }

    /// A task with no content at all, used by hosts that forward possibly
    /// absent assets.
    pub fn empty(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content: None,
        }
    }
}

/// One step in a transform chain.
#[derive(Clone)]
pub struct TransformDescriptor {
    /// Canonical plugin name, used for attribution and diagnostics
    pub name: String,
    /// Implementation version, participates in the cache key
    pub version: String,
    pub transform: TransformFn,
    pub options: serde_json::Value,
    /// When present and returning false for the current data, the step is
    /// skipped without diagnostics
    pub filter: Option<FilterFn>,
    /// Output filename template; the first descriptor in a chain that
    /// declares one wins
    pub filename: Option<FilenameTemplate>,
}

impl TransformDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        transform: TransformFn,
        options: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            transform,
            options,
            filter: None,
            filename: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterFn) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_filename(mut self, template: impl Into<FilenameTemplate>) -> Self {
        self.filename = Some(template.into());
        self
    }
}

// Manual impl: the transform and filter closures carry no useful Debug
// representation, so only the configuration fields are shown.
impl std::fmt::Debug for TransformDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("options", &self.options)
            .field("has_filter", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

/// Whether a chain replaces the original asset or emits a new derived one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainKind {
    /// Replace the asset's bytes in place
    Minimize,
    /// Produce an additional derived asset alongside the original
    Generate,
}

/// An ordered list of transform descriptors applied to one asset.
#[derive(Clone)]
pub struct Chain {
    pub kind: ChainKind,
    pub steps: Vec<TransformDescriptor>,
    /// Configuration diagnostics (unknown plugins, malformed entries)
    /// collected at normalization time; seeded into every result produced
    /// by this chain so the severity policy can classify them per run.
    pub diagnostics: Vec<Diagnostic>,
}

impl Chain {
    pub fn new(kind: ChainKind, steps: Vec<TransformDescriptor>) -> Self {
        Self {
            kind,
            steps,
            diagnostics: Vec::new(),
        }
    }
}

/// Metadata accumulated alongside the transformed bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultInfo {
    /// Image width in pixels, when probing succeeded
    pub width: Option<u32>,
    /// Image height in pixels, when probing succeeded
    pub height: Option<u32>,
    /// Whether a minimizer chain actually touched the bytes
    pub minimized: bool,
    /// Whether this result is a derived asset from a generator chain
    pub generated: bool,
    /// Names of the implementations that ran, in order
    pub attribution: Vec<String>,
    /// Set once filename templating has been applied; checked before
    /// re-templating so the template never runs twice
    pub filename_templated: bool,
    /// Whether this result was served from the content cache
    #[serde(default)]
    pub from_cache: bool,
}

/// The state flowing through a chain, and the pipeline's final output.
#[derive(Debug, Clone, Default)]
pub struct TransformResult {
    /// Current payload. Must hold bytes after every step; `None` only for
    /// the "Empty input" terminal error.
    pub data: Option<Vec<u8>>,
    pub filename: String,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
    pub info: ResultInfo,
}

impl TransformResult {
    /// Initialize chain state from a task: task data, empty diagnostics.
    pub fn start(task: &Task) -> Self {
        Self {
            data: task.content.clone(),
            filename: task.filename.clone(),
            warnings: Vec::new(),
            errors: Vec::new(),
            info: ResultInfo::default(),
        }
    }

    /// True when no error diagnostics were recorded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
