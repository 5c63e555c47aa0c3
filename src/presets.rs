//! Named adjustment snapshots persisted as JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::model::AdjustmentSet;
use crate::workspace::Workspace;

/// A saved [`AdjustmentSet`] under a user-chosen name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub adjustments: AdjustmentSet,
}

impl Preset {
    /// Derive the id from `name`: lowercase, non-alphanumerics collapsed to `-`.
    pub fn new(name: impl Into<String>, adjustments: AdjustmentSet) -> Self {
        let name = name.into();
        let id = slug(&name);
        Self {
            id,
            name,
            adjustments: adjustments.clamped(),
        }
    }
}

fn slug(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            id.extend(c.to_lowercase());
        } else if !id.is_empty() && !id.ends_with('-') {
            id.push('-');
        }
    }
    let id = id.trim_end_matches('-');
    if id.is_empty() {
        "preset".into()
    } else {
        id.into()
    }
}

/// Presets keyed by id.
///
/// # Example
///
/// ```rust,no_run
/// use retouch_ai::model::AdjustmentSet;
/// use retouch_ai::presets::{Preset, PresetStore};
///
/// let mut store = PresetStore::load("presets.json".as_ref()).unwrap();
/// store.insert(Preset::new("Warm Film", AdjustmentSet::default().with_warmth(40.0)));
/// store.save("presets.json".as_ref()).unwrap();
/// assert!(store.get("warm-film").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetStore {
    presets: BTreeMap<String, Preset>,
}

impl PresetStore {
    /// Load presets from `path`; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read presets from {}", path.display()))?;
        let store: PresetStore =
            serde_json::from_str(&contents).context("Failed to parse presets file")?;
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize presets")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write presets to {}", path.display()))?;
        log::info!("Saved {} preset(s) to {}", self.presets.len(), path.display());
        Ok(())
    }

    /// Add or replace a preset. Returns the one it replaced.
    pub fn insert(&mut self, preset: Preset) -> Option<Preset> {
        self.presets.insert(preset.id.clone(), preset)
    }

    pub fn remove(&mut self, id: &str) -> Option<Preset> {
        self.presets.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Preset> {
        self.presets.get(id)
    }

    /// Presets ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.values()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// Replace the adjustments of every selected image with the preset's.
pub fn apply_preset(workspace: &Workspace, preset: &Preset) -> usize {
    let count = workspace.apply_to_selection(&preset.adjustments);
    log::info!("Applied preset '{}' to {count} image(s)", preset.name);
    count
}
