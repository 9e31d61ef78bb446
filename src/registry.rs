//! # Plugin Registry Module
//!
//! Questo modulo gestisce la lookup table statica dei transform disponibili.
//!
//! ## Responsabilità:
//! - Mappa nomi logici di plugin a (versione, implementazione)
//! - Lookup a due passi: prima il nome canonico con prefisso `imagemin-`,
//!   poi il nome bare
//! - Risoluzione a configuration-time, nessun caricamento dinamico
//!
//! ## Strategia di lookup:
//! 1. `registry.resolve("mozjpeg")` prova `imagemin-mozjpeg`
//! 2. Se assente prova `mozjpeg` così com'è
//! 3. Se entrambi falliscono il normalizer emette "Unknown plugin: ..."
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut registry = PluginRegistry::new();
//! registry.register("imagemin-identity", "1.0.0", identity_transform());
//! let plugin = registry.resolve("identity").unwrap();
//! ```

use crate::pipeline::chain::TransformFn;
use std::collections::HashMap;

/// Canonical namespace prefix for plugin names.
pub const PLUGIN_PREFIX: &str = "imagemin-";

/// A registered transform implementation.
#[derive(Clone)]
pub struct PluginEntry {
    pub version: String,
    pub transform: TransformFn,
}

/// A successful lookup: the canonical name the plugin was found under plus
/// its entry.
#[derive(Clone)]
pub struct ResolvedPlugin {
    pub name: String,
    pub version: String,
    pub transform: TransformFn,
}

/// Static lookup table mapping logical plugin names to implementations.
///
/// Hosts populate this once at startup; the config normalizer resolves
/// against it at pipeline-configuration time.
#[derive(Default)]
pub struct PluginRegistry {
    entries: HashMap<String, PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under `name`. Re-registering the same name
    /// replaces the previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        transform: TransformFn,
    ) {
        self.entries.insert(
            name.into(),
            PluginEntry {
                version: version.into(),
                transform,
            },
        );
    }

    /// The canonical (prefixed) form of a logical plugin name.
    pub fn canonical_name(name: &str) -> String {
        if name.starts_with(PLUGIN_PREFIX) {
            name.to_string()
        } else {
            format!("{}{}", PLUGIN_PREFIX, name)
        }
    }

    /// Two-step lookup: canonical prefixed name first, then the bare name.
    pub fn resolve(&self, name: &str) -> Option<ResolvedPlugin> {
        let canonical = Self::canonical_name(name);

        for candidate in [canonical.as_str(), name] {
            if let Some(entry) = self.entries.get(candidate) {
                return Some(ResolvedPlugin {
                    name: candidate.to_string(),
                    version: entry.version.clone(),
                    transform: entry.transform.clone(),
                });
            }
        }

        None
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Registered names, sorted, for diagnostics and `--list-plugins`.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}
