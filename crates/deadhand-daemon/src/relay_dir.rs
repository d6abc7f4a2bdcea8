//! Relay directories.
//!
//! A relay directory holds one `<guardian hex>.json` file per guardian, each
//! a JSON array of heartbeat records. Relays are configured as `file://`
//! URLs or bare paths; a shared folder or a synced mount is enough to run a
//! relay.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use deadhand_guardian::heartbeat::HeartbeatRecord;
use deadhand_guardian::source::{FetchError, HeartbeatSource};
use deadhand_types::GuardianId;

/// Records kept per guardian file when appending.
pub const MAX_RECORDS_PER_FILE: usize = 64;

/// Map a relay URL to its directory.
pub fn relay_path(relay: &str) -> PathBuf {
    PathBuf::from(relay.strip_prefix("file://").unwrap_or(relay))
}

fn guardian_file(dir: &Path, guardian: &GuardianId) -> PathBuf {
    dir.join(format!("{guardian}.json"))
}

/// [`HeartbeatSource`] backed by relay directories on the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectoryHeartbeatSource;

#[async_trait]
impl HeartbeatSource for DirectoryHeartbeatSource {
    async fn fetch_heartbeats(
        &self,
        guardian: &GuardianId,
        relay: &str,
    ) -> Result<Vec<HeartbeatRecord>, FetchError> {
        let dir = relay_path(relay);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(FetchError::Unreachable {
                relay: relay.to_string(),
                reason: format!("{} does not exist", dir.display()),
            });
        }

        let path = guardian_file(&dir, guardian);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(FetchError::Unreachable {
                    relay: relay.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed {
            relay: relay.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Append `record` to the guardian's file in `relay`, creating both if needed.
///
/// Keeps the newest [`MAX_RECORDS_PER_FILE`] records. A record already
/// present is not duplicated.
pub async fn append_heartbeat(relay: &str, record: &HeartbeatRecord) -> anyhow::Result<()> {
    let dir = relay_path(relay);
    tokio::fs::create_dir_all(&dir).await?;
    let path = guardian_file(&dir, &record.guardian);

    let mut records: Vec<HeartbeatRecord> = match tokio::fs::read(&path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let mut stored = record.clone();
    stored.origin_relays.clear();
    if !records.contains(&stored) {
        records.push(stored);
    }
    records.sort_by_key(|r| r.timestamp);
    let excess = records.len().saturating_sub(MAX_RECORDS_PER_FILE);
    records.drain(..excess);

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(&records)?).await?;
    tokio::fs::rename(&tmp, &path).await?;

    tracing::debug!(guardian = %record.guardian.short(), relay, "heartbeat appended");
    Ok(())
}
