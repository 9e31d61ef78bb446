//! # Pipeline Module
//!
//! Modulo che separa le responsabilità della pipeline in sottomoduli:
//! - `chain`: Tipi di dato (task, descriptor, catene, risultati)
//! - `worker`: Esecuzione della catena per singolo asset

pub mod chain;
pub mod worker;

// Re-export delle struct principali
pub use chain::{
    Chain, ChainKind, FilterFn, ResultInfo, Task, TransformDescriptor, TransformFn,
    TransformResult,
};
pub use worker::run_task;
