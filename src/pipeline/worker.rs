//! # Transform Worker Module
//!
//! Questo modulo esegue la catena di trasformazione per un singolo asset.
//!
//! ## Responsabilità:
//! - Esecuzione della catena come fold puro di step
//! - Check "Empty input" prima di qualsiasi transform
//! - Consultazione e popolamento della content cache
//! - Applicazione della severity policy (una volta, a catena conclusa)
//! - Risoluzione del filename di output (primo template vince)
//! - Probe delle dimensioni immagine per i token [width]/[height]
//!
//! ## State machine per catena:
//! 1. **Start**: stato inizializzato con i dati del task, diagnostics vuote
//! 2. Per ogni descriptor in ordine:
//!    - filtro false → step saltato
//!    - `Ok(Some(next))` → avanza, plugin aggiunto all'attribution
//!    - `Ok(None)` → no-op esplicito, stato precedente conservato
//!    - `Err(_)` → diagnostic registrata, catena interrotta, ultimo stato
//!      valido conservato
//! 3. Severity policy, poi templating del filename
//!
//! ## Comportamento non distruttivo:
//! Un asset fallito restituisce i byte dell'ultimo step riuscito (in assenza
//! di step riusciti, gli originali) accompagnati dalle diagnostics: mai
//! output corrotto, mai errori propagati oltre il boundary.

use crate::cache::{CacheEnvelope, CacheKey, ContentCache};
use crate::config::OptimizerConfig;
use crate::error::Diagnostic;
use crate::interpolate::{interpolate, FilenameTemplate};
use crate::pipeline::chain::{Chain, ChainKind, Task, TransformDescriptor, TransformResult};
use tracing::{debug, warn};

/// Execute one chain for one task and produce its TransformResult.
///
/// Never fails across the boundary: every per-asset condition lands in the
/// result's `warnings`/`errors` lists.
pub async fn run_task(
    task: &Task,
    chain: &Chain,
    config: &OptimizerConfig,
    cache: Option<&ContentCache>,
) -> TransformResult {
    let mut state = TransformResult::start(task);

    // Terminal check before any transform runs; bypasses the severity
    // policy so the condition is never silently discarded.
    let empty = state.data.as_ref().map(|d| d.is_empty()).unwrap_or(true);
    if empty {
        debug!("Empty input: {}", task.filename);
        state.data = None;
        state.errors.push(Diagnostic::new("Empty input"));
        return state;
    }

    // A chain with no steps and nothing to report leaves the task untouched.
    if chain.steps.is_empty() && chain.diagnostics.is_empty() {
        return state;
    }

    // Configuration problems (unknown plugins, malformed entries) ride along
    // with every result this chain produces; the severity policy classifies
    // them per run.
    state.errors.extend(chain.diagnostics.iter().cloned());

    let key = cache.and_then(|_| derive_key(&state, chain));

    if let (Some(cache), Some(key)) = (cache, key.as_ref()) {
        if let Some(hit) = lookup(cache, key).await {
            debug!("Serving {} from cache", task.filename);
            state.data = Some(hit.data);
            state.info.width = hit.width;
            state.info.height = hit.height;
            state.info.attribution = hit.attribution;
            state.info.from_cache = true;
            return finish(state, task, chain, config);
        }
    }

    for descriptor in &chain.steps {
        let (next, proceed) = step(state, descriptor).await;
        state = next;
        if !proceed {
            break;
        }
    }

    // Cacheability is judged before the severity policy rewrites the
    // diagnostics: a chain that stopped on a failure produced partial output
    // and must be recomputed on every run, even when `severity = off`
    // discards its report.
    let cacheable = state.data.is_some()
        && !state.info.attribution.is_empty()
        && state.errors.is_empty()
        && state.warnings.is_empty();

    let result = finish(state, task, chain, config);

    if let (Some(cache), Some(key), true) = (cache, key.as_ref(), cacheable) {
        store(cache, key, &result).await;
    }

    result
}

/// One pure state transition: `step(State, Descriptor) -> State`.
///
/// Returns the next state and whether the chain should continue.
async fn step(state: TransformResult, descriptor: &TransformDescriptor) -> (TransformResult, bool) {
    if let Some(filter) = &descriptor.filter {
        let data = state.data.as_deref().unwrap_or_default();
        if !filter(data, &state.filename) {
            debug!("Filter skipped step \"{}\" for {}", descriptor.name, state.filename);
            return (state, true);
        }
    }

    // The implementation consumes the state; keep the last good one so a
    // failure preserves prior successful steps' output.
    let snapshot = state.clone();

    match (descriptor.transform)(state, descriptor.options.clone()).await {
        Ok(Some(mut next)) => {
            if next.data.is_none() {
                let mut state = snapshot;
                state.errors.push(Diagnostic::from_plugin(
                    descriptor.name.clone(),
                    format!(
                        "Transform \"{}\" doesn't return 'data' or result is not a byte buffer",
                        descriptor.name
                    ),
                ));
                return (state, false);
            }
            next.info.attribution.push(descriptor.name.clone());
            (next, true)
        }
        // Explicit no-op step: previous state kept, no attribution
        Ok(None) => {
            debug!("Step \"{}\" was a no-op for {}", descriptor.name, snapshot.filename);
            (snapshot, true)
        }
        Err(err) => {
            let mut state = snapshot;
            state
                .errors
                .push(Diagnostic::from_plugin(descriptor.name.clone(), err.to_string()));
            (state, false)
        }
    }
}

/// Post-chain bookkeeping: chain-kind flags, dimension probe, severity
/// policy, filename templating. Applied identically on cache hits and
/// recomputations.
fn finish(
    mut state: TransformResult,
    task: &Task,
    chain: &Chain,
    config: &OptimizerConfig,
) -> TransformResult {
    let transformed = !state.info.attribution.is_empty();
    match chain.kind {
        ChainKind::Minimize => state.info.minimized = transformed,
        ChainKind::Generate => state.info.generated = transformed,
    }

    if state.info.width.is_none() {
        if let Some(data) = &state.data {
            if let Some((width, height)) = probe_dimensions(data) {
                state.info.width = Some(width);
                state.info.height = Some(height);
            }
        }
    }

    config.severity.apply(&mut state, config.production);

    if !state.info.filename_templated {
        let template: Option<FilenameTemplate> = chain
            .steps
            .iter()
            .find_map(|d| d.filename.clone())
            .or_else(|| config.filename.clone());

        if let Some(template) = template {
            let dimensions = state.info.width.zip(state.info.height);
            state.filename = interpolate(&task.filename, &template, dimensions);
            state.info.filename_templated = true;
        }
    }

    state
}

/// Cache key over the input bytes and the chain's effective configuration:
/// kind plus each step's (name, version, options).
fn derive_key(state: &TransformResult, chain: &Chain) -> Option<CacheKey> {
    if chain.steps.is_empty() {
        return None;
    }

    let steps: Vec<serde_json::Value> = chain
        .steps
        .iter()
        .map(|d| {
            serde_json::json!({
                "name": d.name,
                "version": d.version,
                "options": d.options,
            })
        })
        .collect();
    let fingerprint = serde_json::json!({ "kind": chain.kind, "steps": steps });

    let data = state.data.as_deref().unwrap_or_default();
    match CacheKey::derive(data, &fingerprint) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!("Cache key derivation failed, caching disabled for this asset: {}", e);
            None
        }
    }
}

async fn lookup(cache: &ContentCache, key: &CacheKey) -> Option<CacheEnvelope> {
    let blob = cache.get(key).await?;
    match CacheEnvelope::from_bytes(&blob) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!("Corrupt cache entry for {}, treating as miss: {}", key.as_str(), e);
            None
        }
    }
}

async fn store(cache: &ContentCache, key: &CacheKey, result: &TransformResult) {
    let envelope = CacheEnvelope {
        data: result.data.clone().unwrap_or_default(),
        width: result.info.width,
        height: result.info.height,
        attribution: result.info.attribution.clone(),
    };

    let outcome = match envelope.to_bytes() {
        Ok(bytes) => cache.put(key, &bytes).await,
        Err(e) => Err(e),
    };

    // Cache failures never fail the pipeline; the work is simply redone
    // next time.
    if let Err(e) = outcome {
        warn!("Cache write failed for {}: {}", key.as_str(), e);
    }
}

fn probe_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(std::io::Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeverityPolicy;
    use crate::error::OptimizeError;
    use crate::pipeline::chain::TransformFn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn append_byte(byte: u8) -> TransformFn {
        Arc::new(move |mut state: TransformResult, _options| {
            Box::pin(async move {
                if let Some(data) = &mut state.data {
                    data.push(byte);
                }
                Ok(Some(state))
            })
        })
    }

    fn failing(message: &'static str) -> TransformFn {
        Arc::new(move |_state, _options| {
            Box::pin(async move { Err(OptimizeError::Transform(message.to_string())) })
        })
    }

    fn noop() -> TransformFn {
        Arc::new(|_state, _options| Box::pin(async move { Ok(None) }))
    }

    fn missing_data() -> TransformFn {
        Arc::new(|mut state: TransformResult, _options| {
            Box::pin(async move {
                state.data = None;
                Ok(Some(state))
            })
        })
    }

    fn counting(counter: Arc<AtomicUsize>) -> TransformFn {
        Arc::new(move |mut state: TransformResult, _options| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(data) = &mut state.data {
                    data.push(b'!');
                }
                Ok(Some(state))
            })
        })
    }

    fn descriptor(name: &str, transform: TransformFn) -> TransformDescriptor {
        TransformDescriptor::new(name, "1.0.0", transform, serde_json::Value::Null)
    }

    fn strict_config() -> OptimizerConfig {
        OptimizerConfig {
            severity: SeverityPolicy::Error,
            ..OptimizerConfig::new()
        }
    }

    #[tokio::test]
    async fn test_null_input_is_terminal() {
        let task = Task::empty("img.jpg");
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("a", append_byte(b'a'))]);

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert!(result.data.is_none());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "Empty input");
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_zero_length_input_is_terminal() {
        let task = Task::new("img.jpg", Vec::new());
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("a", append_byte(b'a'))]);

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert!(result.data.is_none());
        assert_eq!(result.errors[0].message, "Empty input");
    }

    #[tokio::test]
    async fn test_empty_chain_returns_task_unchanged() {
        let task = Task::new("img.jpg", vec![1, 2, 3]);
        let chain = Chain::new(ChainKind::Minimize, Vec::new());

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.data, Some(vec![1, 2, 3]));
        assert_eq!(result.filename, "img.jpg");
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
        assert!(!result.info.minimized);
    }

    #[tokio::test]
    async fn test_steps_run_in_order_with_attribution() {
        let task = Task::new("img.jpg", vec![b'x']);
        let chain = Chain::new(
            ChainKind::Minimize,
            vec![descriptor("first", append_byte(b'a')), descriptor("second", append_byte(b'b'))],
        );

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.data, Some(vec![b'x', b'a', b'b']));
        assert_eq!(result.info.attribution, vec!["first", "second"]);
        assert!(result.info.minimized);
    }

    #[tokio::test]
    async fn test_failure_stops_chain_and_keeps_last_good_state() {
        let task = Task::new("img.jpg", vec![b'x']);
        let chain = Chain::new(
            ChainKind::Minimize,
            vec![
                descriptor("first", append_byte(b'a')),
                descriptor("broken", failing("encode failed")),
                descriptor("never", append_byte(b'c')),
            ],
        );

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.data, Some(vec![b'x', b'a']));
        assert_eq!(result.info.attribution, vec!["first"]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("encode failed"));
        assert_eq!(result.errors[0].plugin.as_deref(), Some("broken"));
    }

    #[tokio::test]
    async fn test_failure_on_first_step_yields_original_bytes() {
        let task = Task::new("img.jpg", vec![1, 2, 3]);
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("broken", failing("boom"))]);

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.data, Some(vec![1, 2, 3]));
        assert!(!result.info.minimized);
    }

    #[tokio::test]
    async fn test_noop_step_keeps_previous_state() {
        let task = Task::new("img.jpg", vec![b'x']);
        let chain = Chain::new(
            ChainKind::Minimize,
            vec![
                descriptor("first", append_byte(b'a')),
                descriptor("lazy", noop()),
                descriptor("third", append_byte(b'c')),
            ],
        );

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.data, Some(vec![b'x', b'a', b'c']));
        assert_eq!(result.info.attribution, vec!["first", "third"]);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_missing_data_is_fatal() {
        let task = Task::new("img.jpg", vec![b'x']);
        let chain = Chain::new(
            ChainKind::Minimize,
            vec![
                descriptor("first", append_byte(b'a')),
                descriptor("bad", missing_data()),
                descriptor("never", append_byte(b'c')),
            ],
        );

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.data, Some(vec![b'x', b'a']));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("doesn't return 'data'"));
    }

    #[tokio::test]
    async fn test_filter_skips_step_without_diagnostics() {
        let task = Task::new("img.jpg", vec![b'x']);
        let gated = descriptor("gated", append_byte(b'a'))
            .with_filter(Arc::new(|_data, _filename| false));
        let chain = Chain::new(ChainKind::Minimize, vec![gated, descriptor("open", append_byte(b'b'))]);

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.data, Some(vec![b'x', b'b']));
        assert_eq!(result.info.attribution, vec!["open"]);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_severity_off_suppresses_transform_failure() {
        let task = Task::new("img.jpg", vec![b'x']);
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("broken", failing("boom"))]);
        let config = OptimizerConfig {
            severity: SeverityPolicy::Off,
            ..OptimizerConfig::new()
        };

        let result = run_task(&task, &chain, &config, None).await;
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(result.data, Some(vec![b'x']));
    }

    #[tokio::test]
    async fn test_severity_warning_downgrades_transform_failure() {
        let task = Task::new("img.jpg", vec![b'x']);
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("broken", failing("boom"))]);
        let config = OptimizerConfig {
            severity: SeverityPolicy::Warning,
            ..OptimizerConfig::new()
        };

        let result = run_task(&task, &chain, &config, None).await;
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_first_filename_template_wins() {
        let task = Task::new("img.jpg", vec![b'x']);
        let first = descriptor("first", append_byte(b'a')).with_filename("[name].webp");
        let second = descriptor("second", append_byte(b'b')).with_filename("[name].avif");
        let chain = Chain::new(ChainKind::Generate, vec![first, second]);

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.filename, "img.webp");
        assert!(result.info.filename_templated);
        assert!(result.info.generated);
    }

    #[tokio::test]
    async fn test_config_template_is_fallback() {
        let task = Task::new("img.jpg", vec![b'x']);
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("a", append_byte(b'a'))]);
        let config = OptimizerConfig {
            severity: SeverityPolicy::Error,
            filename: Some(FilenameTemplate::from("min/[name][ext]")),
            ..OptimizerConfig::new()
        };

        let result = run_task(&task, &chain, &config, None).await;
        assert_eq!(result.filename, "min/img.jpg");
    }

    #[tokio::test]
    async fn test_chain_diagnostics_ride_along_and_data_unchanged() {
        let task = Task::new("img.jpg", vec![1, 2, 3]);
        let mut chain = Chain::new(ChainKind::Minimize, Vec::new());
        chain
            .diagnostics
            .push(Diagnostic::new("Unknown plugin: imagemin-foo"));

        let result = run_task(&task, &chain, &strict_config(), None).await;
        assert_eq!(result.data, Some(vec![1, 2, 3]));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("Unknown plugin: imagemin-foo"));
    }

    #[tokio::test]
    async fn test_warm_cache_skips_transform_invocations() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::at(dir.path().to_path_buf()).await.unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let task = Task::new("img.jpg", vec![1, 2, 3]);
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("count", counting(counter.clone()))]);
        let config = strict_config();

        let cold = run_task(&task, &chain, &config, Some(&cache)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!cold.info.from_cache);

        let warm = run_task(&task, &chain, &config, Some(&cache)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1, "warm run must not invoke transforms");
        assert!(warm.info.from_cache);
        assert_eq!(warm.data, cold.data);
        assert_eq!(warm.info.attribution, cold.info.attribution);
        assert!(warm.info.minimized);
    }

    #[tokio::test]
    async fn test_failed_results_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::at(dir.path().to_path_buf()).await.unwrap();

        let task = Task::new("img.jpg", vec![1, 2, 3]);
        let chain = Chain::new(ChainKind::Minimize, vec![descriptor("broken", failing("boom"))]);
        let config = strict_config();

        let first = run_task(&task, &chain, &config, Some(&cache)).await;
        assert_eq!(first.errors.len(), 1);

        // The failure must be reported again, not replayed from cache
        let second = run_task(&task, &chain, &config, Some(&cache)).await;
        assert_eq!(second.errors.len(), 1);
        assert!(!second.info.from_cache);
    }

    #[tokio::test]
    async fn test_suppressed_failure_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::at(dir.path().to_path_buf()).await.unwrap();

        let task = Task::new("img.jpg", vec![b'x']);
        let chain = Chain::new(
            ChainKind::Minimize,
            vec![descriptor("first", append_byte(b'a')), descriptor("broken", failing("boom"))],
        );

        // Severity off clears the report but the chain still stopped mid-way
        let lenient = OptimizerConfig {
            severity: SeverityPolicy::Off,
            ..OptimizerConfig::new()
        };
        let cold = run_task(&task, &chain, &lenient, Some(&cache)).await;
        assert!(cold.errors.is_empty());
        assert!(cold.warnings.is_empty());
        assert_eq!(cold.data, Some(vec![b'x', b'a']));

        // A strict run over the same content/options must re-run the chain
        // and report the failure, not replay the partial result
        let warm = run_task(&task, &chain, &strict_config(), Some(&cache)).await;
        assert!(!warm.info.from_cache, "partial result must not come from cache");
        assert_eq!(warm.errors.len(), 1);
        assert!(warm.errors[0].message.contains("boom"));
    }

    #[tokio::test]
    async fn test_options_change_invalidates_cache() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::at(dir.path().to_path_buf()).await.unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let task = Task::new("img.jpg", vec![1, 2, 3]);
        let config = strict_config();

        let mut low = descriptor("count", counting(counter.clone()));
        low.options = serde_json::json!({"quality": 10});
        let mut high = descriptor("count", counting(counter.clone()));
        high.options = serde_json::json!({"quality": 90});

        run_task(&task, &Chain::new(ChainKind::Minimize, vec![low]), &config, Some(&cache)).await;
        run_task(&task, &Chain::new(ChainKind::Minimize, vec![high]), &config, Some(&cache)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dimensions_probed_for_templating() {
        // Real 100x50 PNG so the probe has something to read
        let png = {
            let img = image::DynamicImage::ImageRgba8(image::RgbaImage::new(100, 50));
            let mut bytes = Vec::new();
            img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
                .unwrap();
            bytes
        };

        let task = Task::new("a/b/c.png", png);
        let chain = Chain::new(
            ChainKind::Generate,
            vec![descriptor("id", noop()), descriptor("copy", append_byte(0))],
        );
        let config = OptimizerConfig {
            severity: SeverityPolicy::Error,
            filename: Some(FilenameTemplate::from("[path][name]-[width]x[height][ext]")),
            ..OptimizerConfig::new()
        };

        let result = run_task(&task, &chain, &config, None).await;
        assert_eq!(result.info.width, Some(100));
        assert_eq!(result.info.height, Some(50));
        assert_eq!(result.filename, "a/b/c-100x50.png");
    }
}
