//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di batch.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche del batch (asset processati, cache hit, errors)
//! - Calcolo percentuali di riduzione e byte risparmiati
//!
//! ## Statistiche tracciate:
//! - **assets_processed**: Totale risultati prodotti
//! - **assets_minimized**: Asset sostituiti in place da una catena minimizer
//! - **assets_generated**: Asset derivati emessi da una catena generator
//! - **cache_hits**: Risultati serviti dalla content cache
//! - **total_bytes_saved**: Byte totali risparmiati
//! - **errors**: Risultati con almeno una diagnostic di errore
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:02] [====================>-------------------] 12/24 (50%) ✅ photo.jpg: 45.2% saved
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for a batch run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_results: u64) -> Self {
        let bar = ProgressBar::new(total_results);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A bar that draws nothing, for `--json` mode
    pub fn hidden(total_results: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total_results);
        Self { bar }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Statistics tracker for batch results
#[derive(Debug, Default)]
pub struct OptimizationStats {
    pub assets_processed: usize,
    pub assets_minimized: usize,
    pub assets_generated: usize,
    pub cache_hits: usize,
    pub errors: usize,
    pub total_bytes_saved: u64,
    pub total_original_size: u64,
}

impl OptimizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_minimized(&mut self, original_size: u64, new_size: u64) {
        self.assets_processed += 1;
        self.assets_minimized += 1;
        self.total_original_size += original_size;
        self.total_bytes_saved += original_size.saturating_sub(new_size);
    }

    pub fn add_generated(&mut self, original_size: u64) {
        self.assets_processed += 1;
        self.assets_generated += 1;
        self.total_original_size += original_size;
    }

    pub fn add_unchanged(&mut self, original_size: u64) {
        self.assets_processed += 1;
        self.total_original_size += original_size;
    }

    pub fn add_error(&mut self) {
        self.assets_processed += 1;
        self.errors += 1;
    }

    pub fn add_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} | Minimized: {} | Generated: {} | Cache hits: {} | Errors: {} | Saved: {} ({:.2}%)",
            self.assets_processed,
            self.assets_minimized,
            self.assets_generated,
            self.cache_hits,
            self.errors,
            format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}

/// Format a byte count as a human-readable size
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate() {
        let mut stats = OptimizationStats::new();
        stats.add_minimized(1000, 600);
        stats.add_minimized(1000, 900);
        stats.add_generated(500);
        stats.add_error();
        stats.add_cache_hit();

        assert_eq!(stats.assets_processed, 4);
        assert_eq!(stats.assets_minimized, 2);
        assert_eq!(stats.assets_generated, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.total_bytes_saved, 500);
        assert_eq!(stats.total_original_size, 2500);
    }

    #[test]
    fn test_reduction_percent_with_no_input() {
        let stats = OptimizationStats::new();
        assert_eq!(stats.overall_reduction_percent(), 0.0);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
