//! Named search regions, imported from the selection editor's JSON export:
//!
//! ```json
//! [{"id": 1, "name": "minimap", "x0": 0.8, "y0": 0.0, "x1": 1.0, "y1": 0.2,
//!   "template": "flag.png"}]
//! ```

use super::types::{MatchError, NormRect};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRegion {
    #[serde(default)]
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub x0: f64,
    #[serde(default)]
    pub y0: f64,
    #[serde(default = "one")]
    pub x1: f64,
    #[serde(default = "one")]
    pub y1: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl MatchRegion {
    pub fn rect(&self) -> NormRect {
        NormRect::new(self.x0, self.y0, self.x1, self.y1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<MatchRegion>,
}

impl RegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, MatchError> {
        let mut set = Self::new();
        set.import_json(json)?;
        Ok(set)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, MatchError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Merges regions from a JSON array. Clashing ids are renumbered after
    /// the current maximum, clashing names get a `_1`, `_2`... suffix, and
    /// regions with an invalid rectangle are skipped. Returns the number
    /// of regions added.
    pub fn import_json(&mut self, json: &str) -> Result<usize, MatchError> {
        let incoming: Vec<MatchRegion> = serde_json::from_str(json)?;
        let mut added = 0;
        for mut region in incoming {
            if let Err(e) = region.rect().validate() {
                warn!("Skipping region '{}': {}", region.name, e);
                continue;
            }
            if region.id == 0 || self.get(region.id).is_some() {
                region.id = self.next_id();
            }
            if region.name.is_empty() {
                region.name = format!("region_{}", region.id);
            }
            if self.by_name(&region.name).is_some() {
                let base = region.name.clone();
                let mut suffix = 1;
                while self.by_name(&region.name).is_some() {
                    region.name = format!("{base}_{suffix}");
                    suffix += 1;
                }
            }
            debug!("Region {} '{}' imported", region.id, region.name);
            self.regions.push(region);
            added += 1;
        }
        Ok(added)
    }

    pub fn get(&self, id: u32) -> Option<&MatchRegion> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&MatchRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Accepts either a numeric id or a region name.
    pub fn lookup(&self, key: &str) -> Result<&MatchRegion, MatchError> {
        key.trim()
            .parse::<u32>()
            .ok()
            .and_then(|id| self.get(id))
            .or_else(|| self.by_name(key))
            .ok_or_else(|| MatchError::RegionNotFound {
                id: key.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchRegion> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn next_id(&self) -> u32 {
        self.regions.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }
}
