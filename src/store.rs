use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::Result;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::discogs::MarketplaceStats;

const SEEN_FILE: &str = "seen.json";
const STATS_FILE: &str = "stats_cache.json";

/// Last marketplace snapshot we recorded for a release.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReleaseStats {
    pub num_for_sale: u32,
    pub lowest_price: Option<f64>,
}

impl From<&MarketplaceStats> for ReleaseStats {
    fn from(stats: &MarketplaceStats) -> Self {
        ReleaseStats {
            num_for_sale: stats.num_for_sale,
            lowest_price: stats.lowest_price.as_ref().map(|p| p.value),
        }
    }
}

/// The only durable state: listing IDs already notified plus per-release
/// stats, both persisted as JSON under the storage directory. An ID in the
/// seen set never produces a second "new listing" alert, across restarts.
#[derive(Debug)]
pub struct Store {
    dir: PathBuf,
    seen: HashSet<u64>,
    stats: HashMap<u64, ReleaseStats>,
    dirty: bool,
}

impl Store {
    /// Missing or unreadable files start the store empty rather than
    /// failing; a corrupt file is logged and ignored.
    pub fn load(dir: &Path) -> Self {
        Store {
            dir: dir.to_path_buf(),
            seen: read_json(&dir.join(SEEN_FILE)).unwrap_or_default(),
            stats: read_json(&dir.join(STATS_FILE)).unwrap_or_default(),
            dirty: false,
        }
    }

    pub fn is_seen(&self, listing_id: u64) -> bool {
        self.seen.contains(&listing_id)
    }

    pub fn mark_seen(&mut self, listing_id: u64) {
        if self.seen.insert(listing_id) {
            self.dirty = true;
        }
    }

    pub fn stats_for(&self, release_id: u64) -> Option<ReleaseStats> {
        self.stats.get(&release_id).copied()
    }

    pub fn record_stats(&mut self, release_id: u64, stats: ReleaseStats) {
        if self.stats.insert(release_id, stats) != Some(stats) {
            self.dirty = true;
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn releases_tracked(&self) -> usize {
        self.stats.len()
    }

    pub fn reset(&mut self) {
        self.seen.clear();
        self.stats.clear();
        self.dirty = true;
    }

    /// Write both files if anything changed since the last persist.
    pub fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;
        fs::write(
            self.dir.join(SEEN_FILE),
            serde_json::to_string_pretty(&self.seen)?,
        )?;
        fs::write(
            self.dir.join(STATS_FILE),
            serde_json::to_string_pretty(&self.stats)?,
        )?;
        self.dirty = false;
        Ok(())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let data = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("ignoring corrupt state file {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(num_for_sale: u32, lowest_price: Option<f64>) -> ReleaseStats {
        ReleaseStats {
            num_for_sale,
            lowest_price,
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::load(dir.path());
        store.mark_seen(42);
        store.mark_seen(43);
        store.record_stats(7, stats(3, Some(12.5)));
        store.persist().unwrap();

        let reloaded = Store::load(dir.path());
        assert!(reloaded.is_seen(42));
        assert!(reloaded.is_seen(43));
        assert!(!reloaded.is_seen(44));
        assert_eq!(reloaded.stats_for(7), Some(stats(3, Some(12.5))));
    }

    #[test]
    fn missing_files_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::load(dir.path());
        assert_eq!(store.seen_count(), 0);
        assert_eq!(store.releases_tracked(), 0);
    }

    #[test]
    fn corrupt_file_starts_empty_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SEEN_FILE), "not json {").unwrap();
        let store = Store::load(dir.path());
        assert_eq!(store.seen_count(), 0);
    }

    #[test]
    fn persist_is_skipped_when_nothing_changed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::load(dir.path());
        store.persist().unwrap();
        // nothing was dirty, so no files were created
        assert!(!dir.path().join(SEEN_FILE).exists());
    }

    #[test]
    fn reset_clears_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::load(dir.path());
        store.mark_seen(42);
        store.record_stats(7, stats(1, None));
        store.reset();
        store.persist().unwrap();

        let reloaded = Store::load(dir.path());
        assert_eq!(reloaded.seen_count(), 0);
        assert_eq!(reloaded.releases_tracked(), 0);
    }

    #[test]
    fn seen_file_is_a_plain_id_array() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::load(dir.path());
        store.mark_seen(42);
        store.persist().unwrap();

        let raw = fs::read_to_string(dir.path().join(SEEN_FILE)).unwrap();
        let parsed: Vec<u64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec![42]);
    }
}
