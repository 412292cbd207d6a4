use crate::manifest::{Manifest, depth_of, profile_depths};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{EntityKind, ResourceData};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// State Structures
// ============================================================================

/// Last reconciled record of every managed entity
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct State {
    /// Records in dependency order
    #[serde(default)]
    pub resources: Vec<ResourceData>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            resources: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl State {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: State = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!(
            "Loaded {} records from {}",
            state.resources.len(),
            path.display()
        );
        Ok(state)
    }

    /// Update the timestamp and save state to disk
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Utc::now();
        self.resources
            .sort_by(|a, b| (a.kind, &a.name).cmp(&(b.kind, &b.name)));
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn get(&self, kind: EntityKind, name: &str) -> Option<&ResourceData> {
        self.resources
            .iter()
            .find(|r| r.kind == kind && r.name == name)
    }

    /// Insert or replace the record for an entity
    pub fn upsert(&mut self, record: ResourceData) {
        self.remove(record.kind, &record.name);
        self.resources.push(record);
    }

    pub fn remove(&mut self, kind: EntityKind, name: &str) {
        self.resources.retain(|r| !(r.kind == kind && r.name == name));
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Records the manifest no longer declares, dependents first
    pub fn orphans(&self, manifest: &Manifest) -> Vec<ResourceData> {
        let orphans = self
            .resources
            .iter()
            .filter(|r| !manifest.contains(r.kind, &r.name))
            .cloned()
            .collect();
        teardown_order(orphans)
    }

    /// Every record, dependents first
    pub fn teardown(&self) -> Vec<ResourceData> {
        teardown_order(self.resources.clone())
    }
}

/// Reverse dependency order: systems before profiles before distros, and
/// child profiles before the profiles they name as `parent`
fn teardown_order(mut records: Vec<ResourceData>) -> Vec<ResourceData> {
    let depths = profile_depths(&records);
    records.sort_by(|a, b| {
        b.kind
            .cmp(&a.kind)
            .then_with(|| depth_of(&depths, b).cmp(&depth_of(&depths, a)))
            .then_with(|| a.name.cmp(&b.name))
    });
    records
}

// ============================================================================
// Tests
// ============================================================================
