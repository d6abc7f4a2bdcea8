//! On-disk state.
//!
//! The data directory holds `switch.json` (the switch), `health.json` (the
//! last poll), `events.jsonl` (one event per line, append-only) and `blobs/`
//! (encrypted messages referenced by `ciphertext_location`). JSON documents
//! are replaced through a temp file and a rename so a crash never leaves a
//! half-written switch behind.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use deadhand_guardian::distribution::{SealedShare, ShareSink};
use deadhand_guardian::monitor::HealthSnapshot;
use deadhand_switch::blob::{BlobLocator, LocatorUnavailable};
use deadhand_switch::lifecycle::Switch;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::events::Event;

const SWITCH_FILE: &str = "switch.json";
const HEALTH_FILE: &str = "health.json";
const EVENTS_FILE: &str = "events.jsonl";

/// JSON files in the data directory.
#[derive(Clone, Debug)]
pub struct SwitchStore {
    dir: PathBuf,
}

impl SwitchStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The stored switch, or `None` if none has been created.
    pub async fn load_switch(&self) -> anyhow::Result<Option<Switch>> {
        self.read_json(SWITCH_FILE).await
    }

    pub async fn save_switch(&self, switch: &Switch) -> anyhow::Result<()> {
        self.write_json(SWITCH_FILE, switch).await
    }

    /// The last persisted poll, if any.
    pub async fn load_health(&self) -> anyhow::Result<Option<HealthSnapshot>> {
        self.read_json(HEALTH_FILE).await
    }

    pub async fn save_health(&self, snapshot: &HealthSnapshot) -> anyhow::Result<()> {
        self.write_json(HEALTH_FILE, snapshot).await
    }

    /// Append one event to the log.
    pub async fn append_event(&self, event: &Event) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(EVENTS_FILE);
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// The last `limit` logged events, oldest first. Unparseable lines are skipped.
    pub async fn recent_events(&self, limit: usize) -> anyhow::Result<Vec<Event>> {
        let path = self.dir.join(EVENTS_FILE);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let mut events: Vec<Event> = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable event log line");
                    None
                }
            })
            .collect();
        let skip = events.len().saturating_sub(limit);
        events.drain(..skip);
        Ok(events)
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

/// [`BlobLocator`] for ciphertext stored on the local filesystem.
///
/// Relative locations resolve against `base`.
#[derive(Clone, Debug)]
pub struct FsBlobLocator {
    base: PathBuf,
}

impl FsBlobLocator {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}

#[async_trait]
impl BlobLocator for FsBlobLocator {
    async fn blob_exists(&self, location: &str) -> Result<bool, LocatorUnavailable> {
        let path = self.resolve(location);
        if !tokio::fs::try_exists(&self.base).await.unwrap_or(false) {
            return Err(LocatorUnavailable(format!(
                "{} is not mounted",
                self.base.display()
            )));
        }
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| LocatorUnavailable(e.to_string()))
    }
}

/// [`ShareSink`] that drops each sealed share into `<dir>/<guardian hex>.json`
/// for out-of-band hand-off.
#[derive(Clone, Debug)]
pub struct OutboxShareSink {
    dir: PathBuf,
}

impl OutboxShareSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn write(&self, share: &SealedShare) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.json", share.guardian));
        tokio::fs::write(&path, serde_json::to_vec_pretty(share)?).await?;
        Ok(())
    }
}

#[async_trait]
impl ShareSink for OutboxShareSink {
    async fn deliver(&self, share: &SealedShare) -> Result<(), String> {
        self.write(share).await.map_err(|e| format!("{e:#}"))
    }
}
