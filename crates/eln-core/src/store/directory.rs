//! Directory-backed record store.
//!
//! Layout:
//! ```text
//! <root>/index.json      teams, memberships and record metadata
//! <root>/uploads/...     attachment files, referenced from the index
//! ```
//!
//! The index is read once when the store is opened. Attachment files are
//! opened on fetch and streamed by the pipeline; they are never read here.

use crate::source::{ContentSource, RecordStore};
use crate::store::StoreError;
use chrono::{DateTime, Utc};
use eln_common::{
    AttachmentRef, OwnerId, RecordInfo, RecordKind, RecordMetadata, Slug, TeamId, TeamRow,
};
use serde::Deserialize;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub const INDEX_FILENAME: &str = "index.json";
pub const UPLOADS_DIR: &str = "uploads";

#[derive(Debug, Clone, Deserialize)]
struct TeamEntry {
    #[serde(flatten)]
    row: TeamRow,
    #[serde(default)]
    members: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct AttachmentEntry {
    filename: String,
    /// Relative to `uploads/`.
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RecordEntry {
    id: i64,
    team_id: i64,
    #[serde(default)]
    owner_id: Option<i64>,
    title: String,
    created_at: DateTime<Utc>,
    author: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    attachments: Vec<AttachmentEntry>,
}

impl RecordEntry {
    fn info(&self, kind: RecordKind) -> Result<RecordInfo, StoreError> {
        let mut info = RecordInfo::new(kind, self.id, &self.title, self.created_at, &self.author)?
            .with_tags(self.tags.iter().cloned());
        if let Some(body) = &self.body {
            info = info.with_body(body.clone());
        }
        Ok(info)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct StoreIndex {
    #[serde(default)]
    teams: Vec<TeamEntry>,
    #[serde(default)]
    experiments: Vec<RecordEntry>,
    #[serde(default)]
    resources: Vec<RecordEntry>,
}

/// Notebook directory store.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    index: StoreIndex,
}

impl DirectoryStore {
    /// Open a store rooted at `root`, reading its index.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let index_path = root.join(INDEX_FILENAME);

        let content = std::fs::read_to_string(&index_path).map_err(|source| StoreError::Io {
            path: index_path.clone(),
            source,
        })?;
        let index: StoreIndex =
            serde_json::from_str(&content).map_err(|source| StoreError::Index {
                path: index_path.clone(),
                source,
            })?;

        debug!(
            root = %root.display(),
            teams = index.teams.len(),
            experiments = index.experiments.len(),
            resources = index.resources.len(),
            "Opened directory store"
        );

        Ok(DirectoryStore { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries(&self, kind: RecordKind) -> &[RecordEntry] {
        match kind {
            RecordKind::Experiment => &self.index.experiments,
            RecordKind::Resource => &self.index.resources,
        }
    }

    fn upload_path(&self, relative: &str) -> Result<PathBuf, StoreError> {
        let relative_path = Path::new(relative);
        let clean = !relative.is_empty()
            && relative_path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StoreError::UnsafePath(relative.to_string()));
        }
        Ok(self.root.join(UPLOADS_DIR).join(relative_path))
    }
}

impl RecordStore for DirectoryStore {
    fn is_member(&self, owner: OwnerId, team: TeamId) -> Result<bool, StoreError> {
        Ok(self
            .index
            .teams
            .iter()
            .any(|t| t.row.id == team.0 && t.members.contains(&owner.0)))
    }

    fn experiment_ids(&self, owner: OwnerId, team: TeamId) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .index
            .experiments
            .iter()
            .filter(|e| e.team_id == team.0 && e.owner_id == Some(owner.0))
            .map(|e| e.id)
            .collect())
    }

    fn resource_ids(&self, team: TeamId) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .index
            .resources
            .iter()
            .filter(|r| r.team_id == team.0)
            .map(|r| r.id)
            .collect())
    }

    fn team(&self, team: TeamId) -> Result<TeamRow, StoreError> {
        self.index
            .teams
            .iter()
            .find(|t| t.row.id == team.0)
            .map(|t| t.row.clone())
            .ok_or_else(|| StoreError::NotFound(format!("team {}", team)))
    }
}

impl ContentSource for DirectoryStore {
    fn fetch(&self, slug: &Slug) -> Result<RecordMetadata, StoreError> {
        let entry = self
            .entries(slug.kind)
            .iter()
            .find(|e| e.id == slug.id && e.team_id == slug.team_id.0)
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))?;

        let info = entry.info(slug.kind)?;

        let mut attachments = Vec::with_capacity(entry.attachments.len());
        for attachment in &entry.attachments {
            let path = self.upload_path(&attachment.path)?;
            let file = File::open(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let mut reference = AttachmentRef::new(attachment.filename.clone(), Box::new(file));
            if let Ok(meta) = std::fs::metadata(&path) {
                reference = reference.with_byte_length(meta.len());
            }
            attachments.push(reference);
        }

        Ok(RecordMetadata::new(info, attachments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Read;
    use tempfile::TempDir;

    fn write_store(index: serde_json::Value) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(UPLOADS_DIR).join("ab")).unwrap();
        std::fs::write(dir.path().join(UPLOADS_DIR).join("ab").join("gel.png"), b"PNGDATA").unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILENAME),
            serde_json::to_vec(&index).unwrap(),
        )
        .unwrap();
        dir
    }

    fn sample_index() -> serde_json::Value {
        json!({
            "teams": [{"id": 1, "name": "Lab", "members": [4]}],
            "experiments": [
                {
                    "id": 10, "team_id": 1, "owner_id": 4, "title": "Gel run",
                    "created_at": "2024-04-01T09:00:00Z", "author": "Ada",
                    "tags": ["gel"],
                    "attachments": [{"filename": "gel.png", "path": "ab/gel.png"}]
                },
                {
                    "id": 11, "team_id": 1, "owner_id": 5, "title": "Other",
                    "created_at": "2024-04-02T09:00:00Z", "author": "Bob"
                }
            ],
            "resources": [
                {
                    "id": 20, "team_id": 1, "title": "Buffer",
                    "created_at": "2024-04-03T09:00:00Z", "author": "Ada"
                }
            ]
        })
    }

    #[test]
    fn test_queries() {
        let dir = write_store(sample_index());
        let store = DirectoryStore::open(dir.path()).unwrap();

        assert!(store.is_member(OwnerId(4), TeamId(1)).unwrap());
        assert!(!store.is_member(OwnerId(5), TeamId(1)).unwrap());
        assert_eq!(store.experiment_ids(OwnerId(4), TeamId(1)).unwrap(), vec![10]);
        assert_eq!(store.resource_ids(TeamId(1)).unwrap(), vec![20]);
        assert_eq!(store.team(TeamId(1)).unwrap().name.as_deref(), Some("Lab"));
    }

    #[test]
    fn test_fetch_opens_attachments() {
        let dir = write_store(sample_index());
        let store = DirectoryStore::open(dir.path()).unwrap();

        let meta = store.fetch(&Slug::experiment(10, TeamId(1))).unwrap();
        assert_eq!(meta.info().tags(), ["gel".to_string()]);
        let (_, attachments) = meta.into_parts();
        assert_eq!(attachments[0].byte_length(), Some(7));

        let mut bytes = Vec::new();
        let attachment = attachments.into_iter().next().unwrap();
        attachment.into_content().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"PNGDATA");
    }

    #[test]
    fn test_missing_index() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            DirectoryStore::open(dir.path()),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn test_malformed_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INDEX_FILENAME), b"[not an index").unwrap();
        assert!(matches!(
            DirectoryStore::open(dir.path()),
            Err(StoreError::Index { .. })
        ));
    }

    #[test]
    fn test_rejects_escaping_attachment_path() {
        let mut index = sample_index();
        index["experiments"][0]["attachments"][0]["path"] = json!("../../etc/passwd");
        let dir = write_store(index);
        let store = DirectoryStore::open(dir.path()).unwrap();

        let err = store.fetch(&Slug::experiment(10, TeamId(1))).unwrap_err();
        assert!(matches!(err, StoreError::UnsafePath(_)));
    }

    #[test]
    fn test_blank_title_is_invalid() {
        let mut index = sample_index();
        index["experiments"][0]["title"] = json!("   ");
        let dir = write_store(index);
        let store = DirectoryStore::open(dir.path()).unwrap();

        let err = store.fetch(&Slug::experiment(10, TeamId(1))).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
