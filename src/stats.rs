//! Cumulative ingestion counters.
//!
//! Counts what the client has received and done across runs. Only counts
//! are kept here, never comment content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Feed counters for the current process, optionally seeded from disk.
#[derive(Debug)]
pub struct FeedStats {
    /// Frames received from the relay
    frames_received: AtomicU64,
    /// Comments appended to the feed
    comments_ingested: AtomicU64,
    /// Frames dropped as malformed
    frames_discarded: AtomicU64,
    /// Comments pushed out of the feed by newer ones
    comments_evicted: AtomicU64,
    /// CSV files written
    exports_written: AtomicU64,
    /// When this process started counting
    run_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl FeedStats {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            comments_ingested: AtomicU64::new(0),
            frames_discarded: AtomicU64::new(0),
            comments_evicted: AtomicU64::new(0),
            exports_written: AtomicU64::new(0),
            run_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create counters backed by a JSON file, continuing from its totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::debug!("Could not load previous feed stats: {e}");
        }

        stats
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_comment(&self) {
        self.comments_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted(&self) {
        self.comments_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self) {
        self.exports_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current counters.
    pub fn stats(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            comments_ingested: self.comments_ingested.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            comments_evicted: self.comments_evicted.load(Ordering::Relaxed),
            exports_written: self.exports_written.load(Ordering::Relaxed),
            run_start: self.run_start,
            run_duration_secs: (Utc::now() - self.run_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Feed Statistics:\n\
             - Frames received: {}\n\
             - Comments ingested: {}\n\
             - Frames discarded: {}\n\
             - Comments evicted: {}\n\
             - Exports written: {}\n\
             - Run duration: {} seconds",
            stats.frames_received,
            stats.comments_ingested,
            stats.frames_discarded,
            stats.comments_evicted,
            stats.exports_written,
            stats.run_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_received: stats.frames_received,
                comments_ingested: stats.comments_ingested,
                frames_discarded: stats.frames_discarded,
                comments_evicted: stats.comments_evicted,
                exports_written: stats.exports_written,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = read_persisted(path)?;

                self.frames_received
                    .store(persisted.frames_received, Ordering::Relaxed);
                self.comments_ingested
                    .store(persisted.comments_ingested, Ordering::Relaxed);
                self.frames_discarded
                    .store(persisted.frames_discarded, Ordering::Relaxed);
                self.comments_evicted
                    .store(persisted.comments_evicted, Ordering::Relaxed);
                self.exports_written
                    .store(persisted.exports_written, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for FeedStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedStatsSnapshot {
    pub frames_received: u64,
    pub comments_ingested: u64,
    pub frames_discarded: u64,
    pub comments_evicted: u64,
    pub exports_written: u64,
    pub run_start: DateTime<Utc>,
    pub run_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStats {
    pub frames_received: u64,
    pub comments_ingested: u64,
    pub frames_discarded: u64,
    pub comments_evicted: u64,
    pub exports_written: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read persisted totals written by a previous run.
pub fn read_persisted(path: &std::path::Path) -> Result<PersistedStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Feed counters shared between the session task and the presentation layer.
pub type SharedFeedStats = Arc<FeedStats>;

pub fn create_shared_stats() -> SharedFeedStats {
    Arc::new(FeedStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedFeedStats {
    Arc::new(FeedStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = FeedStats::new();
        stats.record_frame();
        stats.record_frame();
        stats.record_comment();
        stats.record_discarded();

        let snapshot = stats.stats();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.comments_ingested, 1);
        assert_eq!(snapshot.frames_discarded, 1);
        assert_eq!(snapshot.comments_evicted, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.json");

        let stats = FeedStats::with_persistence(path.clone());
        stats.record_comment();
        stats.record_comment();
        stats.record_export();
        stats.save().unwrap();

        let reloaded = FeedStats::with_persistence(path.clone());
        assert_eq!(reloaded.stats().comments_ingested, 2);
        assert_eq!(reloaded.stats().exports_written, 1);
        assert_eq!(read_persisted(&path).unwrap().comments_ingested, 2);
    }

    #[test]
    fn test_unreadable_file_starts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "garbage").unwrap();

        let stats = FeedStats::with_persistence(path);
        assert_eq!(stats.stats().frames_received, 0);
    }

    #[test]
    fn test_summary_format() {
        let summary = FeedStats::new().summary();
        assert!(summary.contains("Comments ingested"));
        assert!(summary.contains("Frames discarded"));
    }
}
