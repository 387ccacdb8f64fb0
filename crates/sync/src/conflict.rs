use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{Result, SyncError};
use crate::manifest::{MANIFEST_FILENAME, Manifest};
use crate::remote::RemoteContainer;

pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Downloads and validates the container's manifest. `Ok(None)` means the
/// container has no manifest file yet.
pub fn fetch_manifest<R: RemoteContainer>(remote: &R, container_id: &str) -> Result<Option<Manifest>> {
    match remote.get_file_content(container_id, MANIFEST_FILENAME)? {
        Some(text) => Manifest::from_json(&text).map(Some),
        None => Ok(None),
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub manifest: Manifest,
    /// How many remote manifests were merged into the candidate.
    pub merges: u32,
}

impl Resolution {
    pub fn conflicts_resolved(&self) -> bool {
        self.merges > 0
    }
}

/// Optimistic check of a push candidate against the remote manifest.
pub struct ConflictResolver<'a, R> {
    remote: &'a R,
    container_id: &'a str,
    max_retries: u32,
    unreadable_is_missing: bool,
}

impl<'a, R: RemoteContainer> ConflictResolver<'a, R> {
    pub fn new(remote: &'a R, container_id: &'a str) -> Self {
        Self {
            remote,
            container_id,
            max_retries: MAX_CONFLICT_RETRIES,
            unreadable_is_missing: false,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Treat a manifest that fails validation as absent instead of failing.
    /// Only appropriate for a container first seen during this run.
    pub fn unreadable_as_missing(mut self, enabled: bool) -> Self {
        self.unreadable_is_missing = enabled;
        self
    }

    fn fetch_remote(&self) -> Result<Option<Manifest>> {
        match fetch_manifest(self.remote, self.container_id) {
            Err(SyncError::Manifest(message)) if self.unreadable_is_missing => {
                warn!(container = %self.container_id, error = %message, "ignoring unreadable manifest");
                Ok(None)
            }
            other => other,
        }
    }

    /// `base` is the `last_updated` of the remote manifest the candidate was
    /// built from. Whenever the remote has moved past it, the remote is merged
    /// into the candidate and checked again; after `max_retries` merges a
    /// still-moving remote is a [`SyncError::Conflict`].
    ///
    /// This narrows the race but does not close it. The last read here and
    /// the caller's manifest write are separate requests, so a manifest
    /// written by another machine in between is overwritten without being
    /// merged. Nothing here looks at data files: an interrupted push can
    /// leave files no entry names, or an entry naming files that were
    /// since replaced or deleted, and the resolver passes both through.
    pub fn resolve(&self, candidate: Manifest, base: DateTime<Utc>) -> Result<Resolution> {
        let mut candidate = candidate;
        let mut base = base;
        let mut merges = 0u32;
        loop {
            let Some(remote) = self.fetch_remote()? else {
                return Ok(Resolution {
                    manifest: candidate,
                    merges,
                });
            };
            if !remote.is_newer_than(base) {
                if merges > 0 {
                    info!(merges, "merged concurrent manifest changes");
                }
                return Ok(Resolution {
                    manifest: candidate,
                    merges,
                });
            }
            if merges >= self.max_retries {
                warn!(
                    local = %base,
                    remote = %remote.last_updated,
                    attempts = merges,
                    "manifest conflict persists, giving up"
                );
                return Err(SyncError::Conflict {
                    local: base,
                    remote: remote.last_updated,
                    attempts: merges,
                });
            }
            warn!(
                local = %base,
                remote = %remote.last_updated,
                attempt = merges + 1,
                max_attempts = self.max_retries,
                "remote manifest changed during push, merging"
            );
            base = remote.last_updated;
            candidate = candidate.merge(&remote);
            merges += 1;
        }
    }
}
