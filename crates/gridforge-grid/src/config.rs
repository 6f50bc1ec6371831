//! Saved partition configurations.
//!
//! A configuration set is an ordered list of partition records that the host
//! persists and replays into a world at startup. Records are validated when
//! applied; a bad record is reported and skipped without affecting the rest.

use std::fs;
use std::path::Path;

use gridforge_core::constants::DEFAULT_SCAN_CELL_SIZE;
use gridforge_core::{BoundingArea, GridError, PartitionHandle, Result, Vector3d};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::world::GridWorld;

/// Format version written at the head of every saved set.
pub const FORMAT_VERSION: u8 = 1;

/// One saved partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfiguration {
    pub bounds_min: Vector3d,
    pub bounds_max: Vector3d,
    pub scan_cell_size: i32,
}

impl GridConfiguration {
    /// Create a record. Non-positive scan sizes are replaced by the default.
    pub const fn new(bounds_min: Vector3d, bounds_max: Vector3d, scan_cell_size: i32) -> Self {
        Self {
            bounds_min,
            bounds_max,
            scan_cell_size: if scan_cell_size > 0 {
                scan_cell_size
            } else {
                DEFAULT_SCAN_CELL_SIZE
            },
        }
    }

    #[inline]
    pub const fn bounds(&self) -> BoundingArea {
        BoundingArea::new(self.bounds_min, self.bounds_max)
    }

    /// True if the record would be accepted by [`GridWorld::add_partition`].
    pub fn is_valid(&self) -> bool {
        self.bounds().is_valid()
    }
}

#[derive(Serialize, Deserialize)]
struct SavedSet {
    version: u8,
    configurations: Vec<GridConfiguration>,
}

/// Ordered list of saved partitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationSet {
    configurations: Vec<GridConfiguration>,
}

impl ConfigurationSet {
    pub const fn new() -> Self {
        Self {
            configurations: Vec::new(),
        }
    }

    /// Record a partition with the default scan cell size.
    pub fn save(&mut self, bounds_min: Vector3d, bounds_max: Vector3d) {
        self.push(GridConfiguration::new(
            bounds_min,
            bounds_max,
            DEFAULT_SCAN_CELL_SIZE,
        ));
    }

    pub fn push(&mut self, configuration: GridConfiguration) {
        self.configurations.push(configuration);
    }

    pub fn configurations(&self) -> &[GridConfiguration] {
        &self.configurations
    }

    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Register every record in order.
    ///
    /// Returns one result per record. Failures are logged and skipped; the
    /// remaining records are still applied.
    pub fn apply(&self, world: &mut GridWorld) -> Vec<Result<PartitionHandle>> {
        let results: Vec<_> = self
            .configurations
            .iter()
            .enumerate()
            .map(|(i, config)| {
                let result = world.add_partition(config.bounds(), config.scan_cell_size);
                if let Err(err) = &result {
                    warn!(
                        record = i,
                        min = %config.bounds_min,
                        max = %config.bounds_max,
                        %err,
                        "skipping grid configuration"
                    );
                }
                result
            })
            .collect();
        debug!(
            applied = results.iter().filter(|r| r.is_ok()).count(),
            total = results.len(),
            "configuration set applied"
        );
        results
    }

    /// Encode with bincode.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let saved = SavedSet {
            version: FORMAT_VERSION,
            configurations: self.configurations.clone(),
        };
        bincode::serialize(&saved).map_err(|e| GridError::Serialization(e.to_string()))
    }

    /// Decode a set written by [`ConfigurationSet::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let saved: SavedSet =
            bincode::deserialize(data).map_err(|e| GridError::Serialization(e.to_string()))?;
        if saved.version != FORMAT_VERSION {
            return Err(GridError::Serialization(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                saved.version
            )));
        }
        Ok(Self {
            configurations: saved.configurations,
        })
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_bytes(&fs::read(path)?)
    }
}

impl FromIterator<GridConfiguration> for ConfigurationSet {
    fn from_iter<I: IntoIterator<Item = GridConfiguration>>(iter: I) -> Self {
        Self {
            configurations: iter.into_iter().collect(),
        }
    }
}
