//! # Concurrency Limiter Module
//!
//! Questo modulo esegue batch di task asincroni con parallelismo limitato.
//!
//! ## Responsabilità:
//! - Esegue N task con al massimo `limit` task in-flight simultaneamente
//! - Preserva la corrispondenza indice task → indice risultato
//! - Isola i fallimenti: un task fallito non interrompe i siblings
//! - Valida gli argomenti (limit >= 1)
//!
//! ## Gestione concorrenza:
//! - Semaforo tokio per limitare i worker concorrenti
//! - `tokio::spawn` per ogni task, acquisizione permit dentro il task
//! - Appena un task termina il permit viene rilasciato e il prossimo parte
//!
//! ## Garanzie di ordinamento:
//! - Nessuna garanzia sull'ordine di completamento
//! - `results[i]` corrisponde sempre a `tasks[i]`
//!
//! ## Esempio:
//! ```rust,ignore
//! let tasks = vec![async { 1 }, async { 2 }, async { 3 }];
//! let results = throttle_all(2, tasks).await?;
//! assert_eq!(results, vec![1, 2, 3]);
//! ```

use crate::error::OptimizeError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Run `tasks` with at most `limit` in flight at once.
///
/// The returned vector has the same length and order as `tasks`: slot `i`
/// holds the output of `tasks[i]` regardless of completion order. Each task
/// owns its own success or failure; the limiter only forwards it to the
/// matching slot.
///
/// Fails with `InvalidArgument` when `limit` is zero. An empty task list
/// resolves immediately to an empty vector. A panicking task propagates its
/// panic to the caller; recoverable failures belong in `T` (typically a
/// `Result`), where they stay isolated per slot.
pub async fn throttle_all<T, F>(limit: usize, tasks: Vec<F>) -> Result<Vec<T>, OptimizeError>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    if limit == 0 {
        return Err(OptimizeError::InvalidArgument(
            "concurrency limit must be a positive integer".to_string(),
        ));
    }

    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    debug!("Scheduling {} tasks with limit {}", tasks.len(), limit);

    let semaphore = Arc::new(Semaphore::new(limit));
    let mut handles = Vec::with_capacity(tasks.len());

    for task in tasks {
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            // The semaphore is never closed, so acquisition only fails if the
            // runtime is shutting down; holding the Option keeps the permit
            // alive for the duration of the task either way.
            let _permit = semaphore.acquire_owned().await.ok();
            task.await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(value) => results.push(value),
            // A panic in a task body is a bug in the caller's future, not a
            // limiter failure: let it surface as the panic it was.
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                return Err(OptimizeError::Scheduling(format!(
                    "scheduled task was cancelled: {}",
                    e
                )))
            }
        }
    }

    Ok(results)
}
