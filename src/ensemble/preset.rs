//! Preset registry: reasoning-mode bundles loaded from three layered
//! sources, with checksum-verified import/export. See spec §4.6.1.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dialect::AgentKind;

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("preset '{0}' not found")]
    NotFound(String),
    #[error("preset '{name}' already exists from a higher-priority source and fingerprints differ")]
    Conflict { name: String },
    #[error("remote import requires both --allow-remote and a matching checksum")]
    RemoteNotAllowed,
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("preset references unknown mode id: {0}")]
    UnknownMode(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] toml::ser::Error),
    #[error("deserialization error: {0}")]
    De(#[from] toml::de::Error),
}

/// Where a preset was loaded from; priority order low-to-high matches load
/// order (later wins on read) per spec §4.6.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetSource {
    BuiltIn,
    UserGlobal,
    ProjectLocal,
}

/// A single reasoning mode within a preset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeDef {
    pub id: String,
    pub code: String,
    pub preferred_agent: Option<AgentKind>,
    pub prompt_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preset {
    pub name: String,
    pub synthesis_strategy: String,
    pub merge_similarity_threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PresetSource>,
    // Scalars above, array-of-tables last: `toml` rejects a scalar emitted
    // after a table in the same table (`ValueAfterTable`), so this field
    // order is load-bearing for `fingerprint()` and file export/import.
    pub modes: Vec<ModeDef>,
}

impl Preset {
    /// SHA-256 of the preset's canonical serialization with `source`
    /// cleared, per spec §4.6.1.
    pub fn fingerprint(&self) -> String {
        let mut canonical = self.clone();
        canonical.source = None;
        let bytes = toml::to_string(&canonical).unwrap_or_default();
        let digest = Sha256::digest(bytes.as_bytes());
        hex::encode(digest)
    }

    pub fn mode_ids(&self) -> Vec<&str> {
        self.modes.iter().map(|m| m.id.as_str()).collect()
    }
}

/// The embedded built-in presets - always available, lowest priority.
pub fn built_in_presets() -> Vec<Preset> {
    vec![Preset {
        name: "standard-review".to_string(),
        synthesis_strategy: "consensus".to_string(),
        merge_similarity_threshold: 0.82,
        source: Some(PresetSource::BuiltIn),
        modes: vec![
            ModeDef {
                id: "security".to_string(),
                code: "SEC".to_string(),
                preferred_agent: Some(AgentKind::ClaudeCode),
                prompt_template: "Review for security issues: {question}".to_string(),
            },
            ModeDef {
                id: "performance".to_string(),
                code: "PERF".to_string(),
                preferred_agent: Some(AgentKind::Codex),
                prompt_template: "Review for performance issues: {question}".to_string(),
            },
            ModeDef {
                id: "correctness".to_string(),
                code: "CORR".to_string(),
                preferred_agent: Some(AgentKind::Gemini),
                prompt_template: "Review for correctness issues: {question}".to_string(),
            },
        ],
    }]
}

/// Registry holding presets layered by source. Read returns the
/// highest-priority match by name; import refuses to overwrite a same-name
/// preset from a higher source unless fingerprints match.
#[derive(Default)]
pub struct PresetRegistry {
    by_source: Vec<(PresetSource, HashMap<String, Preset>)>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self { by_source: Vec::new() }
    }

    /// Loads built-in presets, then a user-global file, then a
    /// project-local file, in that priority order (later layers shadow
    /// earlier ones on read, per spec §4.6.1).
    pub fn load_layered(user_global: Option<&Path>, project_local: Option<&Path>) -> Result<Self, PresetError> {
        let mut registry = Self::new();

        let mut built_in = HashMap::new();
        for preset in built_in_presets() {
            built_in.insert(preset.name.clone(), preset);
        }
        registry.by_source.push((PresetSource::BuiltIn, built_in));

        registry.by_source.push((PresetSource::UserGlobal, load_file_layer(user_global, PresetSource::UserGlobal)?));
        registry.by_source.push((PresetSource::ProjectLocal, load_file_layer(project_local, PresetSource::ProjectLocal)?));

        Ok(registry)
    }

    /// Returns the highest-priority preset with this name, scanning layers
    /// from highest to lowest source.
    pub fn get(&self, name: &str) -> Result<Preset, PresetError> {
        for (_, layer) in self.by_source.iter().rev() {
            if let Some(preset) = layer.get(name) {
                return Ok(preset.clone());
            }
        }
        Err(PresetError::NotFound(name.to_string()))
    }

    /// Import refuses to overwrite a same-name preset from a *higher*
    /// source unless the content fingerprint matches (spec §4.6.1).
    pub fn import(&mut self, mut preset: Preset, into: PresetSource) -> Result<(), PresetError> {
        for (source, layer) in &self.by_source {
            if *source > into {
                if let Some(existing) = layer.get(&preset.name) {
                    if existing.fingerprint() != preset.fingerprint() {
                        return Err(PresetError::Conflict { name: preset.name.clone() });
                    }
                }
            }
        }

        preset.source = Some(into);
        let layer = self
            .by_source
            .iter_mut()
            .find(|(source, _)| *source == into)
            .map(|(_, layer)| layer);
        match layer {
            Some(layer) => {
                layer.insert(preset.name.clone(), preset);
                Ok(())
            }
            None => {
                let mut layer = HashMap::new();
                layer.insert(preset.name.clone(), preset);
                self.by_source.push((into, layer));
                Ok(())
            }
        }
    }

    /// All presets currently held in one source layer, for persisting that
    /// layer back to its file after `import`.
    pub fn layer(&self, source: PresetSource) -> Vec<Preset> {
        self.by_source.iter().find(|(s, _)| *s == source).map(|(_, layer)| layer.values().cloned().collect()).unwrap_or_default()
    }

    /// All preset names visible across every layer, for `presets list`.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_source.iter().flat_map(|(_, layer)| layer.keys().cloned()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Validates a preset's modes reference known mode ids (spec §4.6.2
    /// validation happens at assignment time, but the registry exposes the
    /// check for callers that want it earlier).
    pub fn validate_mode_ids(&self, preset: &Preset, known_mode_ids: &[String]) -> Result<(), PresetError> {
        for mode in &preset.modes {
            if !known_mode_ids.iter().any(|id| id == &mode.id) {
                return Err(PresetError::UnknownMode(mode.id.clone()));
            }
        }
        Ok(())
    }
}

fn load_file_layer(path: Option<&Path>, source: PresetSource) -> Result<HashMap<String, Preset>, PresetError> {
    let mut layer = HashMap::new();
    let Some(path) = path else { return Ok(layer) };
    if !path.exists() {
        return Ok(layer);
    }
    let text = std::fs::read_to_string(path)?;
    let file: PresetFile = toml::from_str(&text)?;
    for mut preset in file.presets {
        preset.source = Some(source);
        layer.insert(preset.name.clone(), preset);
    }
    Ok(layer)
}

#[derive(Debug, Serialize, Deserialize)]
struct PresetFile {
    presets: Vec<Preset>,
}

/// Serializes a single preset into the same `PresetFile` wrapper shape
/// `load_file_layer` expects, for `presets export`.
pub fn to_file_toml(preset: &Preset) -> Result<String, PresetError> {
    write_layer_toml(std::slice::from_ref(preset))
}

/// Serializes a whole layer's worth of presets into the `PresetFile` shape,
/// for `presets import` persisting its target layer file back to disk.
pub fn write_layer_toml(presets: &[Preset]) -> Result<String, PresetError> {
    let file = PresetFile { presets: presets.to_vec() };
    Ok(toml::to_string_pretty(&file)?)
}

/// Verify a downloaded remote preset's bytes against an expected SHA-256
/// checksum. A remote URL is accepted only with both `allow_remote` and a
/// checksum that matches (spec §4.6.1).
pub fn verify_remote(bytes: &[u8], expected_checksum: &str, allow_remote: bool) -> Result<(), PresetError> {
    if !allow_remote {
        return Err(PresetError::RemoteNotAllowed);
    }
    let actual = hex::encode(Sha256::digest(bytes));
    if actual != expected_checksum {
        return Err(PresetError::ChecksumMismatch { expected: expected_checksum.to_string(), actual });
    }
    Ok(())
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
