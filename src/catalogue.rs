//! Token-definition catalogue loading (spec §6, §4.5.2).
//!
//! The catalogue is a two-level JSON document: `replacements` maps a token
//! source (e.g. `"G21"`) to a map of context variables it contributes (e.g.
//! `{"lengthUnits": "mm"}`), and `tokenDefs` maps either a full token (e.g.
//! `"G1"`) or a bare letter (e.g. `"X"`) to a display template referencing
//! `{key}`-style placeholders. Annotation is an enrichment, not a hard
//! requirement, so a missing or malformed catalogue file degrades to
//! "annotation disabled" rather than aborting the pipeline (spec §7).

use std::collections::HashMap;
use std::path::Path;

use crate::error::GCodeCleanError;

/// A loaded token-definition catalogue.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    pub replacements: HashMap<String, HashMap<String, String>>,
    pub token_defs: HashMap<String, String>,
}

impl Catalogue {
    /// An empty catalogue — annotation substitutes nothing.
    pub fn empty() -> Catalogue {
        Catalogue::default()
    }

    /// Loads and parses a catalogue file from `path`.
    pub fn load(path: &Path) -> Result<Catalogue, GCodeCleanError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GCodeCleanError::Catalogue(format!("{}: {e}", path.display())))?;
        Catalogue::parse(&text)
    }

    /// Parses a catalogue document from its JSON text.
    pub fn parse(text: &str) -> Result<Catalogue, GCodeCleanError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| GCodeCleanError::Catalogue(e.to_string()))?;

        let replacements = match value.get("replacements").and_then(|v| v.as_object()) {
            Some(obj) => obj
                .iter()
                .filter_map(|(k, v)| v.as_object().map(|m| (k.clone(), string_map(m))))
                .collect(),
            None => HashMap::new(),
        };
        let token_defs = match value.get("tokenDefs").and_then(|v| v.as_object()) {
            Some(obj) => obj
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect(),
            None => HashMap::new(),
        };

        Ok(Catalogue {
            replacements,
            token_defs,
        })
    }

    /// The annotation template registered for `key` (a full token source like
    /// `"G1"` or a bare argument letter like `"X"`), if any.
    pub fn template_for(&self, key: &str) -> Option<&str> {
        self.token_defs.get(key).map(String::as_str)
    }

    /// The context-variable contributions registered for a token source
    /// (e.g. `"G21"`), if any.
    pub fn context_for(&self, token_source: &str) -> Option<&HashMap<String, String>> {
        self.replacements.get(token_source)
    }
}

fn string_map(obj: &serde_json::Map<String, serde_json::Value>) -> HashMap<String, String> {
    obj.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}
