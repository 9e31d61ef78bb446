//! # JSON Report Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per host integration
//! che pilotano il binario programmaticamente.
//!
//! ## Responsabilità:
//! - Emette messaggi JSON strutturati per eventi del batch
//! - Riusa le diagnostics strutturate dei TransformResult
//! - Fornisce interfaccia standardizzata per comunicazione inter-processo
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del batch (numero asset, catene, workers)
//! - `result`: Un TransformResult completato (filename, size, diagnostics)
//! - `complete`: Fine batch con statistiche finali

use crate::error::Diagnostic;
use crate::pipeline::chain::TransformResult;
use crate::progress::OptimizationStats;
use serde::{Deserialize, Serialize};

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReportMessage {
    /// Inizio del batch
    #[serde(rename = "start")]
    Start {
        total_assets: usize,
        total_chains: usize,
        workers: usize,
    },

    /// Un risultato completato
    #[serde(rename = "result")]
    Result {
        filename: String,
        original_size: u64,
        output_size: u64,
        minimized: bool,
        generated: bool,
        cache_hit: bool,
        attribution: Vec<String>,
        warnings: Vec<Diagnostic>,
        errors: Vec<Diagnostic>,
    },

    /// Batch completato
    #[serde(rename = "complete")]
    Complete {
        assets_processed: usize,
        assets_minimized: usize,
        assets_generated: usize,
        cache_hits: usize,
        errors: usize,
        total_bytes_saved: u64,
        average_reduction: f64,
    },
}

impl ReportMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Crea un messaggio di inizio batch
    pub fn start(total_assets: usize, total_chains: usize, workers: usize) -> Self {
        Self::Start {
            total_assets,
            total_chains,
            workers,
        }
    }

    /// Crea un messaggio per un risultato completato
    pub fn result(result: &TransformResult, original_size: u64) -> Self {
        Self::Result {
            filename: result.filename.clone(),
            original_size,
            output_size: result.data.as_ref().map(|d| d.len() as u64).unwrap_or(0),
            minimized: result.info.minimized,
            generated: result.info.generated,
            cache_hit: result.info.from_cache,
            attribution: result.info.attribution.clone(),
            warnings: result.warnings.clone(),
            errors: result.errors.clone(),
        }
    }

    /// Crea un messaggio di completamento batch
    pub fn complete(stats: &OptimizationStats) -> Self {
        Self::Complete {
            assets_processed: stats.assets_processed,
            assets_minimized: stats.assets_minimized,
            assets_generated: stats.assets_generated,
            cache_hits: stats.cache_hits,
            errors: stats.errors,
            total_bytes_saved: stats.total_bytes_saved,
            average_reduction: stats.overall_reduction_percent(),
        }
    }
}
