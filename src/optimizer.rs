//! # Batch Orchestrator Module
//!
//! Questo è il modulo che orchestra l'intero processo di ottimizzazione batch.
//!
//! ## Responsabilità:
//! - Coordinamento di tutti gli altri moduli
//! - Un worker invocation per (asset × catena), parallelismo limitato
//! - Applicazione del filtro globale prima dell'ingresso in pipeline
//! - Apertura della content cache (degradando a nessuna cache su errore)
//! - Progress tracking e statistiche finali
//! - Decisione `delete_original` per le catene generator
//!
//! ## Flusso di esecuzione:
//! 1. **Inizializzazione**: Valida config, apre la cache
//! 2. **Filter gate**: Asset esclusi passano invariati, senza diagnostics
//! 3. **Parallel processing**: throttle_all distribuisce i worker
//! 4. **Statistics**: Raccoglie risultati e calcola statistiche
//! 5. **Reporting**: Summary finale con byte saved e percentuali
//!
//! ## Garanzie:
//! - `results` è in ordine task-major: per ogni task, un risultato per
//!   catena, nell'ordine delle catene richieste
//! - Errori per singoli asset non bloccano il batch
//!
//! ## Esempio:
//! ```rust,ignore
//! let optimizer = AssetOptimizer::new(config, chains).await?;
//! let results = optimizer.run(tasks).await?;
//! ```

use crate::cache::ContentCache;
use crate::config::{CacheSetting, OptimizerConfig};
use crate::pipeline::chain::{Chain, Task, TransformResult};
use crate::pipeline::worker::run_task;
use crate::progress::{OptimizationStats, ProgressManager};
use crate::report::ReportMessage;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Main batch orchestrator
pub struct AssetOptimizer {
    config: Arc<OptimizerConfig>,
    chains: Arc<Vec<Chain>>,
    cache: Option<Arc<ContentCache>>,
}

impl AssetOptimizer {
    /// Create a new optimizer instance for a set of chains
    pub async fn new(config: OptimizerConfig, chains: Vec<Chain>) -> Result<Self> {
        config.validate()?;

        let cache = match &config.cache {
            CacheSetting::Disabled => None,
            CacheSetting::Enabled => Some(ContentCache::at_default_location().await),
            CacheSetting::Dir(dir) => Some(ContentCache::at(dir.clone()).await),
        };

        // An unavailable cache is a forced miss for every asset, never a
        // startup failure
        let cache = match cache {
            Some(Ok(cache)) => {
                info!("Content cache: {}", cache.dir().display());
                Some(Arc::new(cache))
            }
            Some(Err(e)) => {
                warn!("Cache unavailable, continuing without: {}", e);
                None
            }
            None => {
                info!("Content cache disabled");
                None
            }
        };

        Ok(Self {
            config: Arc::new(config),
            chains: Arc::new(chains),
            cache,
        })
    }

    /// Run the batch: one TransformResult per (task × chain), task-major,
    /// matching input order regardless of completion order.
    pub async fn run(&self, tasks: &[Task]) -> Result<Vec<TransformResult>> {
        let total = tasks.len() * self.chains.len();
        info!(
            "Optimizing {} assets through {} chain(s) with {} workers",
            tasks.len(),
            self.chains.len(),
            self.config.workers
        );

        if self.config.json_output {
            ReportMessage::start(tasks.len(), self.chains.len(), self.config.workers).emit();
        }

        let progress = if self.config.json_output {
            ProgressManager::hidden(total as u64)
        } else {
            ProgressManager::new(total as u64)
        };

        let mut futures = Vec::with_capacity(total);
        for task in tasks {
            let admitted = match (&self.config.filter, &task.content) {
                (Some(filter), Some(content)) => filter(content, &task.filename),
                _ => true,
            };
            if !admitted {
                debug!("Filter excluded asset: {}", task.filename);
            }

            for chain in self.chains.iter() {
                let task = task.clone();
                let chain = chain.clone();
                let config = self.config.clone();
                let cache = self.cache.clone();
                let progress = progress.clone();

                futures.push(async move {
                    let original_size =
                        task.content.as_ref().map(|c| c.len() as u64).unwrap_or(0);

                    let result = if admitted {
                        run_task(&task, &chain, &config, cache.as_deref()).await
                    } else {
                        // Excluded assets pass through untouched
                        TransformResult::start(&task)
                    };

                    progress.update(&progress_message(&task, &result, original_size));
                    (original_size, result)
                });
            }
        }

        let outcomes = crate::limiter::throttle_all(self.config.workers, futures).await?;

        let mut stats = OptimizationStats::new();
        let mut results = Vec::with_capacity(outcomes.len());
        for (original_size, result) in outcomes {
            tally(&mut stats, original_size, &result);
            if self.config.json_output {
                ReportMessage::result(&result, original_size).emit();
            }
            results.push(result);
        }

        progress.finish(&stats.format_summary());
        if self.config.json_output {
            ReportMessage::complete(&stats).emit();
        } else {
            print_final_stats(&stats);
        }

        Ok(results)
    }

    /// Original filenames made obsolete by generator chains: the
    /// `delete_original` policy applies when a generator produced a
    /// differently-named derived asset for the task.
    pub fn obsolete_originals(&self, tasks: &[Task], results: &[TransformResult]) -> Vec<String> {
        if !self.config.delete_original || self.chains.is_empty() {
            return Vec::new();
        }

        tasks
            .iter()
            .zip(results.chunks(self.chains.len()))
            .filter(|(task, chunk)| {
                chunk
                    .iter()
                    .any(|r| r.info.generated && r.filename != task.filename)
            })
            .map(|(task, _)| task.filename.clone())
            .collect()
    }
}

fn progress_message(task: &Task, result: &TransformResult, original_size: u64) -> String {
    let name = &task.filename;

    if !result.errors.is_empty() {
        return format!("❌ {}: error", name);
    }
    if result.info.from_cache {
        return format!("⚡ {}: cache", name);
    }
    if result.info.minimized {
        let new_size = result.data.as_ref().map(|d| d.len() as u64).unwrap_or(0);
        let saved = if original_size > 0 {
            (1.0 - new_size as f64 / original_size as f64) * 100.0
        } else {
            0.0
        };
        return format!("✅ {}: {:.1}% saved", name, saved);
    }
    if result.info.generated {
        return format!("✨ {} -> {}", name, result.filename);
    }
    format!("⏩ {}: unchanged", name)
}

fn tally(stats: &mut OptimizationStats, original_size: u64, result: &TransformResult) {
    if result.info.from_cache {
        stats.add_cache_hit();
    }

    if !result.errors.is_empty() {
        stats.add_error();
    } else if result.info.minimized {
        let new_size = result.data.as_ref().map(|d| d.len() as u64).unwrap_or(0);
        stats.add_minimized(original_size, new_size);
    } else if result.info.generated {
        stats.add_generated(original_size);
    } else {
        stats.add_unchanged(original_size);
    }
}

fn print_final_stats(stats: &OptimizationStats) {
    info!("=== Optimization Complete ===");
    info!("Results produced: {}", stats.assets_processed);
    info!("Assets minimized: {}", stats.assets_minimized);
    info!("Assets generated: {}", stats.assets_generated);
    info!("Cache hits: {}", stats.cache_hits);
    info!("Errors: {}", stats.errors);
    info!(
        "Bytes saved: {} ({:.2}%)",
        crate::progress::format_size(stats.total_bytes_saved),
        stats.overall_reduction_percent()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeverityPolicy;
    use crate::error::OptimizeError;
    use crate::pipeline::chain::{ChainKind, TransformDescriptor, TransformFn};
    use std::sync::Arc;

    fn shrink_to_one_byte() -> TransformFn {
        Arc::new(|mut state: TransformResult, _options| {
            Box::pin(async move {
                state.data = Some(vec![b'm']);
                Ok(Some(state))
            })
        })
    }

    fn failing() -> TransformFn {
        Arc::new(|_state, _options| {
            Box::pin(async move { Err(OptimizeError::Transform("boom".to_string())) })
        })
    }

    fn descriptor(name: &str, transform: TransformFn) -> TransformDescriptor {
        TransformDescriptor::new(name, "1.0.0", transform, serde_json::Value::Null)
    }

    fn test_config() -> OptimizerConfig {
        OptimizerConfig {
            severity: SeverityPolicy::Error,
            cache: CacheSetting::Disabled,
            json_output: true,
            ..OptimizerConfig::new()
        }
    }

    #[tokio::test]
    async fn test_batch_produces_result_per_task_per_chain() {
        let minimize = Chain::new(ChainKind::Minimize, vec![descriptor("m", shrink_to_one_byte())]);
        let generate = Chain::new(
            ChainKind::Generate,
            vec![descriptor("g", shrink_to_one_byte()).with_filename("[name].webp")],
        );

        let optimizer = AssetOptimizer::new(test_config(), vec![minimize, generate])
            .await
            .unwrap();
        let tasks = vec![
            Task::new("a.jpg", vec![1, 2, 3]),
            Task::new("b.png", vec![4, 5, 6]),
        ];

        let results = optimizer.run(&tasks).await.unwrap();
        assert_eq!(results.len(), 4);

        // Task-major ordering: a×minimize, a×generate, b×minimize, b×generate
        assert_eq!(results[0].filename, "a.jpg");
        assert!(results[0].info.minimized);
        assert_eq!(results[1].filename, "a.webp");
        assert!(results[1].info.generated);
        assert_eq!(results[2].filename, "b.png");
        assert_eq!(results[3].filename, "b.webp");
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_batch() {
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("broken", failing())]);
        let optimizer = AssetOptimizer::new(test_config(), vec![chain]).await.unwrap();

        let tasks = vec![Task::new("a.jpg", vec![1]), Task::empty("b.jpg")];
        let results = optimizer.run(&tasks).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].data, Some(vec![1]));
        assert!(!results[0].errors.is_empty());
        assert_eq!(results[1].errors[0].message, "Empty input");
    }

    #[tokio::test]
    async fn test_filter_gates_pipeline_entry() {
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("m", shrink_to_one_byte())]);
        let config = OptimizerConfig {
            filter: Some(Arc::new(|_data: &[u8], filename: &str| {
                filename.ends_with(".jpg")
            })),
            ..test_config()
        };

        let optimizer = AssetOptimizer::new(config, vec![chain]).await.unwrap();
        let tasks = vec![
            Task::new("keep.jpg", vec![1, 2, 3]),
            Task::new("skip.svg", vec![4, 5, 6]),
        ];

        let results = optimizer.run(&tasks).await.unwrap();
        assert!(results[0].info.minimized);
        assert!(!results[1].info.minimized);
        assert_eq!(results[1].data, Some(vec![4, 5, 6]));
        assert!(results[1].errors.is_empty());
    }

    #[tokio::test]
    async fn test_obsolete_originals_follow_delete_policy() {
        let generate = Chain::new(
            ChainKind::Generate,
            vec![descriptor("g", shrink_to_one_byte()).with_filename("[name].webp")],
        );
        let config = OptimizerConfig {
            delete_original: true,
            ..test_config()
        };

        let optimizer = AssetOptimizer::new(config, vec![generate]).await.unwrap();
        let tasks = vec![Task::new("a.jpg", vec![1, 2, 3])];
        let results = optimizer.run(&tasks).await.unwrap();

        assert_eq!(
            optimizer.obsolete_originals(&tasks, &results),
            vec!["a.jpg".to_string()]
        );
    }

    #[tokio::test]
    async fn test_obsolete_originals_empty_without_policy() {
        let generate = Chain::new(
            ChainKind::Generate,
            vec![descriptor("g", shrink_to_one_byte()).with_filename("[name].webp")],
        );

        let optimizer = AssetOptimizer::new(test_config(), vec![generate]).await.unwrap();
        let tasks = vec![Task::new("a.jpg", vec![1, 2, 3])];
        let results = optimizer.run(&tasks).await.unwrap();

        assert!(optimizer.obsolete_originals(&tasks, &results).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_worker_count_rejected() {
        let config = OptimizerConfig {
            workers: 0,
            ..test_config()
        };
        assert!(AssetOptimizer::new(config, Vec::new()).await.is_err());
    }
}
