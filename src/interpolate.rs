//! # Filename Interpolation Module
//!
//! Questo modulo espande i template di filename per gli asset derivati.
//!
//! ## Responsabilità:
//! - Parsing del filename originale nei suoi componenti (path, name, ext, ...)
//! - Espansione dei token `[name]`, `[ext]`, `[path]`, `[base]`, `[query]`,
//!   `[fragment]` e, quando le dimensioni sono note, `[width]` / `[height]`
//! - Supporto per template funzione oltre ai template letterali
//!
//! ## Regole di espansione:
//! - I token sono case-insensitive: `[NAME]` equivale a `[name]`
//! - Token sconosciuti restano testo letterale
//! - `[width]`/`[height]` restano letterali se le dimensioni non sono note
//! - I template funzione ricevono la token map e il risultato viene comunque
//!   ri-scandito per `[width]`/`[height]` (le dimensioni possono essere note
//!   solo dopo la generazione)
//!
//! ## Componenti del filename:
//! ```text
//! a/b/c.png?v=1#frag
//! └┬─┘└┬┘└┬┘└┬─┘└─┬─┘
//! path name ext query fragment     base = name + ext
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let out = interpolate("img.jpg", &FilenameTemplate::from("[name].webp"), None);
//! assert_eq!(out, "img.webp");
//! ```

use std::sync::Arc;

/// Signature for function templates: token map in, final filename out.
pub type TemplateFn = Arc<dyn Fn(&FilenameTokens) -> String + Send + Sync>;

/// A filename template: either a literal string with bracketed tokens or a
/// function from the token map to a string.
#[derive(Clone)]
pub enum FilenameTemplate {
    Literal(String),
    Function(TemplateFn),
}

impl From<&str> for FilenameTemplate {
    fn from(template: &str) -> Self {
        FilenameTemplate::Literal(template.to_string())
    }
}

impl From<String> for FilenameTemplate {
    fn from(template: String) -> Self {
        FilenameTemplate::Literal(template)
    }
}

/// Token values derived from an original filename, plus image dimensions
/// when they are known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameTokens {
    /// Directory portion including the trailing slash ("a/b/")
    pub path: String,
    /// Basename with extension ("c.png")
    pub base: String,
    /// Basename without extension ("c")
    pub name: String,
    /// Extension including the leading dot (".png")
    pub ext: String,
    /// Query string including the leading "?" ("?v=1")
    pub query: String,
    /// Fragment including the leading "#" ("#frag")
    pub fragment: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl FilenameTokens {
    /// Split `filename` into its components.
    ///
    /// The fragment is everything from the first `#`, the query everything
    /// from the first `?` before it. A leading dot alone (hidden files like
    /// ".env") does not count as an extension separator.
    pub fn parse(filename: &str, dimensions: Option<(u32, u32)>) -> Self {
        let (rest, fragment) = match filename.find('#') {
            Some(i) => (&filename[..i], filename[i..].to_string()),
            None => (filename, String::new()),
        };

        let (rest, query) = match rest.find('?') {
            Some(i) => (&rest[..i], rest[i..].to_string()),
            None => (rest, String::new()),
        };

        let (path, base) = match rest.rfind('/') {
            Some(i) => (rest[..=i].to_string(), &rest[i + 1..]),
            None => (String::new(), rest),
        };

        let (name, ext) = match base.rfind('.') {
            Some(i) if i > 0 => (base[..i].to_string(), base[i..].to_string()),
            _ => (base.to_string(), String::new()),
        };

        Self {
            path,
            base: base.to_string(),
            name,
            ext,
            query,
            fragment,
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
        }
    }

    /// Look up a token value by its (lowercased) name.
    fn lookup(&self, token: &str) -> Option<String> {
        match token {
            "path" => Some(self.path.clone()),
            "base" => Some(self.base.clone()),
            "name" => Some(self.name.clone()),
            "ext" => Some(self.ext.clone()),
            "query" => Some(self.query.clone()),
            "fragment" => Some(self.fragment.clone()),
            "width" => self.width.map(|w| w.to_string()),
            "height" => self.height.map(|h| h.to_string()),
            _ => None,
        }
    }
}

/// Expand `template` against `tokens`.
///
/// When `dimensions_only` is set, only `[width]` and `[height]` are
/// substituted; every other token is left untouched. This is the post-scan
/// applied to the output of function templates.
fn expand(template: &str, tokens: &FilenameTokens, dimensions_only: bool) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        output.push_str(&rest[..open]);
        let tail = &rest[open..];

        match tail.find(']') {
            Some(close) => {
                let token = tail[1..close].to_ascii_lowercase();
                let allowed = !dimensions_only || token == "width" || token == "height";

                match tokens.lookup(&token).filter(|_| allowed) {
                    Some(value) => output.push_str(&value),
                    // Unknown token: keep the bracketed text verbatim
                    None => output.push_str(&tail[..=close]),
                }
                rest = &tail[close + 1..];
            }
            None => {
                // Unclosed bracket, nothing left to substitute
                output.push_str(tail);
                rest = "";
            }
        }
    }

    output.push_str(rest);
    output
}

/// Produce the final output filename for `original` under `template`.
///
/// Deterministic: identical (filename, template, dimensions) always yields
/// the identical output.
pub fn interpolate(
    original: &str,
    template: &FilenameTemplate,
    dimensions: Option<(u32, u32)>,
) -> String {
    let tokens = FilenameTokens::parse(original, dimensions);

    match template {
        FilenameTemplate::Literal(template) => expand(template, &tokens, false),
        FilenameTemplate::Function(f) => {
            // Dimension info may only exist after generation, so the function
            // output still gets a width/height pass.
            let produced = f(&tokens);
            expand(&produced, &tokens, true)
        }
    }
}
