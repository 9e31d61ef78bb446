//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della pipeline.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare tutti gli errori possibili
//! - Definisce `Diagnostic`, il record strutturato accumulato nei risultati
//! - Integra con `thiserror` per automatic error conversion
//! - Supporta error chaining per mantenere il contesto degli errori
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, etc.)
//! - `Config`: Configurazione plugin malformata o non risolvibile
//! - `EmptyInput`: Asset senza contenuto, nessun transform eseguito
//! - `Transform`: Un transform ha fallito o ha restituito un risultato malformato
//! - `Cache`: Errori di I/O o lock sulla cache (degradati a cache miss)
//! - `InvalidArgument`: Uso scorretto delle API (limite concorrenza non valido)
//! - `Scheduling`: Un task schedulato è stato cancellato dal runtime
//! - `Validation`: Errori di validazione input
//!
//! ## Propagazione:
//! - Config/EmptyInput/Transform/Cache finiscono nei `warnings`/`errors` del
//!   TransformResult, mai propagati oltre il boundary della pipeline
//! - Solo InvalidArgument e Validation vengono sollevati al chiamante

use serde::{Deserialize, Serialize};

/// Custom error types for the asset optimization pipeline
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty input")]
    EmptyInput,

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// A structured warning or error record attached to a transform result.
///
/// Diagnostics are the only way failures cross the pipeline boundary: the
/// worker captures every recoverable condition here instead of raising, and
/// the severity policy decides afterwards whether each one lands in
/// `warnings` or `errors`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    /// Human-readable description of what went wrong
    pub message: String,
    /// Logical name of the plugin that produced the failure, when known
    pub plugin: Option<String>,
}

impl Diagnostic {
    /// Create a diagnostic not tied to any particular plugin
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            plugin: None,
        }
    }

    /// Create a diagnostic attributed to a named plugin
    pub fn from_plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            plugin: Some(plugin.into()),
        }
    }
}

impl From<&OptimizeError> for Diagnostic {
    fn from(err: &OptimizeError) -> Self {
        Diagnostic::new(err.to_string())
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.plugin {
            Some(plugin) => write!(f, "{}: {}", plugin, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}
