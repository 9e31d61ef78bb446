//! # Asset Batch Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare della pipeline
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per host integration
//!
//! ## Architettura dei moduli:
//! - `config`: Normalizzazione configurazione, severity policy, validazione
//! - `error`: Tipi di errore custom e diagnostics strutturate
//! - `limiter`: Esecuzione di task asincroni con parallelismo limitato
//! - `cache`: Content cache persistente con lock per chiave
//! - `interpolate`: Templating dei filename di output
//! - `registry`: Lookup table statica dei plugin disponibili
//! - `pipeline`: Esecuzione della catena di trasformazione per asset
//! - `optimizer`: Orchestratore batch
//! - `plugins`: Transform implementation built-in (lato host)
//! - `progress`: Progress tracking e statistiche
//! - `report`: Output JSON strutturato per host integration
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use asset_batch_optimizer::{AssetOptimizer, OptimizerConfig, Task};
//!
//! let optimizer = AssetOptimizer::new(config, chains).await?;
//! let results = optimizer.run(&tasks).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod interpolate;
pub mod limiter;
pub mod optimizer;
pub mod pipeline;
pub mod plugins;
pub mod progress;
pub mod registry;
pub mod report;

pub use cache::{CacheKey, ContentCache};
pub use config::{
    normalize_chain, normalize_plugins, CacheSetting, OptimizerConfig, RawPluginEntry,
    SeverityPolicy,
};
pub use error::{Diagnostic, OptimizeError};
pub use interpolate::{interpolate, FilenameTemplate};
pub use limiter::throttle_all;
pub use optimizer::AssetOptimizer;
pub use pipeline::{Chain, ChainKind, Task, TransformDescriptor, TransformResult};
pub use registry::PluginRegistry;
