//! Backup retention: geometric bucket sampling over timestamped archives.
//!
//! Retention density decays geometrically with age: with a ceiling of one
//! year and a period factor of 2, one archive survives near a year old,
//! one near half a year, one near a quarter, and so on down to the
//! `min_age_in_minutes` floor. Archives younger than the floor are left
//! alone (the swap step itself creates them); nothing older than the
//! ceiling is ever kept.

use crate::dir::StoreDir;
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Retention schedule parameters.
#[derive(Debug, Clone)]
pub struct BackupPolicy {
    /// Below this age no periodic thinning happens.
    pub min_age_in_minutes: u64,
    /// Hard ceiling: no archive older than this is ever kept.
    pub max_age_in_days: u64,
    /// Controls density (> 1). Decrease it to densen the kept set.
    pub period_factor: f64,
}

impl BackupPolicy {
    /// Creates a policy with the given ceiling and default density
    /// (30 minute floor, factor 1.3).
    #[must_use]
    pub fn new(max_age_in_days: u64) -> Self {
        Self {
            min_age_in_minutes: 30,
            max_age_in_days,
            period_factor: 1.3,
        }
    }

    /// Sets the thinning floor.
    #[must_use]
    pub const fn min_age_in_minutes(mut self, minutes: u64) -> Self {
        self.min_age_in_minutes = minutes;
        self
    }

    /// Sets the period factor.
    #[must_use]
    pub const fn period_factor(mut self, factor: f64) -> Self {
        self.period_factor = factor;
        self
    }
}

/// An archive file with its age relative to "now".
#[derive(Debug, Clone)]
pub struct Archive {
    /// Path of the archive file.
    pub path: PathBuf,
    /// Age derived from the filename timestamp.
    pub age: Duration,
}

/// Decides which archives survive under the policy.
///
/// Walking period values from the ceiling down to the floor, dividing by
/// the period factor each step, the oldest archive not older than the
/// period is that bucket's representative and is kept (one archive may
/// represent several consecutive buckets). Everything else is doomed.
#[must_use]
pub fn plan(archives: &[Archive], policy: &BackupPolicy) -> HashSet<PathBuf> {
    let mut kept = HashSet::new();

    // Increasing age; the oldest pops off the back.
    let mut sorted: Vec<&Archive> = archives.iter().collect();
    sorted.sort_by_key(|a| a.age);
    let Some(mut oldest) = sorted.pop() else {
        return kept;
    };

    let floor_ms = policy.min_age_in_minutes as f64 * 60_000.0;
    let mut period_ms = policy.max_age_in_days as f64 * 86_400_000.0;

    while period_ms > floor_ms {
        while oldest.age.as_millis() as f64 > period_ms {
            match sorted.pop() {
                Some(next) => oldest = next,
                None => return kept,
            }
        }
        kept.insert(oldest.path.clone());
        period_ms /= policy.period_factor;
    }

    kept
}

/// Applies the retention plan to the store directory: scans the archive
/// files, derives ages from their filename timestamps and deletes every
/// archive outside the kept set. Returns how many were deleted.
pub fn consolidate(dir: &StoreDir, policy: &BackupPolicy, now: DateTime<Utc>) -> CoreResult<usize> {
    let archives: Vec<Archive> = dir
        .list_archives()?
        .into_iter()
        .map(|(path, stamp)| Archive {
            path,
            age: (now - stamp).to_std().unwrap_or(Duration::ZERO),
        })
        .collect();

    let kept = plan(&archives, policy);

    let mut deleted = 0;
    for archive in &archives {
        if !kept.contains(&archive.path) {
            debug!(archive = %archive.path.display(), "deleting archive outside retention schedule");
            fs::remove_file(&archive.path)?;
            deleted += 1;
        }
    }
    if deleted > 0 {
        dir.sync_directory()?;
    }
    Ok(deleted)
}
