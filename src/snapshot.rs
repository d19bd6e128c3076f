use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::DocumentKind;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub client_id: String,
    pub kind: DocumentKind,
    pub html: String,
    pub updated_at: DateTime<Utc>,
}

pub trait SnapshotStore {
    /// Inserts or replaces the snapshot for `(client_id, kind)`.
    fn upsert(&self, client_id: &str, kind: DocumentKind, html: &str) -> anyhow::Result<Snapshot>;
    fn load(&self, client_id: &str, kind: DocumentKind) -> anyhow::Result<Option<Snapshot>>;
}

/// Keeps each snapshot as `<dir>/<client>_<kind>.json`.
#[derive(Clone, Debug)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, client_id: &str, kind: DocumentKind) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", sanitize_filename(client_id), kind.as_str()))
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn upsert(&self, client_id: &str, kind: DocumentKind, html: &str) -> anyhow::Result<Snapshot> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create snapshot dir: {}", self.dir.display()))?;
        let snap = Snapshot {
            client_id: client_id.to_string(),
            kind,
            html: html.to_string(),
            updated_at: Utc::now(),
        };
        let path = self.path_for(client_id, kind);
        let json = serde_json::to_vec_pretty(&snap).context("serialize snapshot")?;
        std::fs::write(&path, json)
            .with_context(|| format!("write snapshot: {}", path.display()))?;
        debug!(client = client_id, %kind, path = %path.display(), "snapshot saved");
        Ok(snap)
    }

    fn load(&self, client_id: &str, kind: DocumentKind) -> anyhow::Result<Option<Snapshot>> {
        let path = self.path_for(client_id, kind);
        if !path.exists() {
            return Ok(None);
        }
        let bytes =
            std::fs::read(&path).with_context(|| format!("read snapshot: {}", path.display()))?;
        let snap = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse snapshot: {}", path.display()))?;
        Ok(Some(snap))
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c if c.is_control() => out.push('_'),
            _ => out.push(ch),
        }
    }
    if out.is_empty() || out.chars().all(|c| c == '.') {
        out = "_".to_string();
    }
    out
}
