//! Atomic snapshot writes and crash recovery.
//!
//! Invariant: a process crash at any point leaves the store in a state
//! from which the next open recovers a valid current snapshot, with no
//! data loss beyond the write that was in flight.

use crate::dir::StoreDir;
use crate::error::CoreResult;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes a new snapshot using the crash-safe rename protocol.
///
/// The text goes to `db.next.json` first. Without archiving, a single
/// rename swaps it in. With archiving and an existing current file, the
/// sequence is: current → previous, next → current (the atomic swap
/// point), previous → timestamped archive named after the superseded
/// snapshot's creation instant.
///
/// Returns the archive path when one was created.
pub fn commit(dir: &StoreDir, text: &str, archive: bool) -> CoreResult<Option<PathBuf>> {
    let next = dir.next_path();
    let mut file = File::create(&next)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()?;
    drop(file);

    let current = dir.current_path();
    let archived = if archive && current.exists() {
        let created = snapshot_birth(&current)?;
        let previous = dir.previous_path();

        fs::rename(&current, &previous)?;
        fs::rename(&next, &current)?; // the swap point
        let archive_path = dir.archive_path(created);
        fs::rename(&previous, &archive_path)?;

        debug!(archive = %archive_path.display(), "archived superseded snapshot");
        Some(archive_path)
    } else {
        fs::rename(&next, &current)?;
        None
    };

    dir.sync_directory()?;
    Ok(archived)
}

/// Repairs the snapshot set after a crash. Runs at open, before loading.
///
/// An existing `db.next.json` is always the remnant of a write that
/// crashed before the swap (the current file has not been replaced yet),
/// so discarding it is safe. An existing `db.previous.json` means the
/// crash hit between the two swap renames; renaming it back restores the
/// last known-good state.
pub fn recover(dir: &StoreDir) -> CoreResult<()> {
    let mut repaired = false;

    let next = dir.next_path();
    if next.exists() {
        warn!(file = %next.display(), "discarding incomplete write left by a crash");
        fs::remove_file(&next)?;
        repaired = true;
    }

    let previous = dir.previous_path();
    if previous.exists() {
        warn!(file = %previous.display(), "restoring snapshot from an interrupted swap");
        fs::rename(&previous, dir.current_path())?;
        repaired = true;
    }

    if repaired {
        dir.sync_directory()?;
    }
    Ok(())
}

/// The creation instant of the current snapshot, recovered from file
/// metadata (falling back to the modification time where birth time is
/// unavailable).
fn snapshot_birth(path: &Path) -> CoreResult<DateTime<Utc>> {
    let meta = fs::metadata(path)?;
    let instant = meta.created().or_else(|_| meta.modified())?;
    Ok(DateTime::<Utc>::from(instant))
}
