use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Curated duplicate -> canonical club names. Iterates in duplicate-name
/// order so runs are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClubMapping {
    entries: BTreeMap<String, String>,
}

impl ClubMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, duplicate: &str, canonical: &str) -> Self {
        self.entries
            .insert(duplicate.to_string(), canonical.to_string());
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read club mapping {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parse club mapping {}", path.display()))
    }

    /// Accepts `{"duplicate": "canonical", ...}`. Blank names and chains
    /// (a canonical name that is itself mapped away) are rejected.
    pub fn from_json(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(Self::default());
        }
        let entries = serde_json::from_str::<BTreeMap<String, String>>(trimmed)
            .context("invalid club mapping json")?;
        let mapping = Self { entries };
        mapping.validate()?;
        Ok(mapping)
    }

    pub fn validate(&self) -> Result<()> {
        for (duplicate, canonical) in &self.entries {
            if duplicate.trim().is_empty() || canonical.trim().is_empty() {
                return Err(anyhow!("blank club name in mapping entry {duplicate:?}"));
            }
            if self.entries.contains_key(canonical) {
                return Err(anyhow!(
                    "canonical club {canonical:?} is itself mapped as a duplicate"
                ));
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(duplicate, canonical)| (duplicate.as_str(), canonical.as_str()))
    }

    pub fn canonical_for(&self, duplicate: &str) -> Option<&str> {
        self.entries.get(duplicate).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
