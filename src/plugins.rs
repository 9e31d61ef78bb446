//! # Built-in Plugins Module
//!
//! Questo modulo fornisce un set di transform implementation pronte all'uso,
//! costruite sulla crate `image`.
//!
//! ## Responsabilità:
//! - Re-encoder `jpeg`, `png` e `webp-lossless` con opzioni di qualità
//! - Plugin `identity` (passthrough) per testing e debugging
//! - Costruzione del registry di default per la CLI
//!
//! ## Posizione architetturale:
//! La pipeline tratta questi plugin come implementation opache e iniettabili,
//! esattamente come quelle fornite dall'host: nessun modulo core dipende da
//! questo file. Esistono perché il binario sia utilizzabile end-to-end.
//!
//! ## Semantica no-op:
//! I re-encoder in-place (`jpeg`, `png`) restituiscono `Ok(None)` quando il
//! re-encoding non riduce la dimensione: lo step diventa un no-op esplicito
//! e i byte originali sopravvivono invariati.

use crate::error::OptimizeError;
use crate::pipeline::chain::{TransformFn, TransformResult};
use crate::registry::PluginRegistry;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{ColorType, ImageEncoder};
use std::sync::Arc;
use tracing::debug;

/// Version string registered for every built-in plugin; participates in
/// cache keys, so entries invalidate when the crate version changes.
const BUILTIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A registry pre-populated with every built-in plugin.
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register("imagemin-identity", BUILTIN_VERSION, identity());
    registry.register("imagemin-jpeg", BUILTIN_VERSION, jpeg());
    registry.register("imagemin-png", BUILTIN_VERSION, png());
    registry.register("imagemin-webp-lossless", BUILTIN_VERSION, webp_lossless());
    registry
}

/// Passthrough: returns the state unchanged.
pub fn identity() -> TransformFn {
    Arc::new(|state: TransformResult, _options| Box::pin(async move { Ok(Some(state)) }))
}

fn quality_option(options: &serde_json::Value, default: u8) -> Result<u8, OptimizeError> {
    match options.get("quality") {
        None => Ok(default),
        Some(value) => match value.as_u64() {
            Some(q @ 1..=100) => Ok(q as u8),
            _ => Err(OptimizeError::Transform(format!(
                "quality must be between 1 and 100, got {}",
                value
            ))),
        },
    }
}

fn decode(state: &TransformResult) -> Result<(Vec<u8>, image::DynamicImage), OptimizeError> {
    let data = state
        .data
        .clone()
        .ok_or_else(|| OptimizeError::Transform("no input data".to_string()))?;
    let img = image::load_from_memory(&data)
        .map_err(|e| OptimizeError::Transform(format!("Failed to decode image: {}", e)))?;
    Ok((data, img))
}

fn replace_data(
    mut state: TransformResult,
    encoded: Vec<u8>,
    img: &image::DynamicImage,
) -> TransformResult {
    state.data = Some(encoded);
    state.info.width = Some(img.width());
    state.info.height = Some(img.height());
    state
}

/// Lossy JPEG re-encoder. Options: `{"quality": 1..=100}` (default 80).
/// No-op when the re-encoded output is not smaller than the input.
pub fn jpeg() -> TransformFn {
    Arc::new(|state: TransformResult, options| {
        Box::pin(async move {
            let quality = quality_option(&options, 80)?;
            let (input, img) = decode(&state)?;

            let mut encoded = Vec::new();
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut encoded, quality)
                .encode_image(&rgb)
                .map_err(|e| OptimizeError::Transform(format!("JPEG encoding failed: {}", e)))?;

            if encoded.len() >= input.len() {
                debug!("JPEG re-encode did not shrink {}, keeping original", state.filename);
                return Ok(None);
            }

            Ok(Some(replace_data(state, encoded, &img)))
        })
    })
}

/// Lossless PNG re-encoder (best compression, adaptive filtering).
/// No-op when the re-encoded output is not smaller than the input.
pub fn png() -> TransformFn {
    Arc::new(|state: TransformResult, _options| {
        Box::pin(async move {
            let (input, img) = decode(&state)?;

            let mut encoded = Vec::new();
            let rgba = img.to_rgba8();
            PngEncoder::new_with_quality(&mut encoded, CompressionType::Best, FilterType::Adaptive)
                .write_image(rgba.as_raw(), img.width(), img.height(), ColorType::Rgba8)
                .map_err(|e| OptimizeError::Transform(format!("PNG encoding failed: {}", e)))?;

            if encoded.len() >= input.len() {
                debug!("PNG re-encode did not shrink {}, keeping original", state.filename);
                return Ok(None);
            }

            Ok(Some(replace_data(state, encoded, &img)))
        })
    })
}

/// Lossless WebP converter. Always replaces the payload (format conversion,
/// not in-place shrinking), so it pairs with a `[name].webp` template in a
/// generator chain.
pub fn webp_lossless() -> TransformFn {
    Arc::new(|state: TransformResult, _options| {
        Box::pin(async move {
            let (_, img) = decode(&state)?;

            let mut encoded = Vec::new();
            let rgba = img.to_rgba8();
            WebPEncoder::new_lossless(&mut encoded)
                .encode(rgba.as_raw(), img.width(), img.height(), ColorType::Rgba8)
                .map_err(|e| OptimizeError::Transform(format!("WebP encoding failed: {}", e)))?;

            Ok(Some(replace_data(state, encoded, &img)))
        })
    })
}
