//! In-memory record store.

use crate::source::{ContentSource, RecordStore};
use crate::store::StoreError;
use eln_common::{
    AttachmentRef, OwnerId, RecordInfo, RecordKind, RecordMetadata, Slug, TeamId, TeamRow,
};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredRecord {
    team: TeamId,
    owner: Option<OwnerId>,
    info: RecordInfo,
    attachments: Vec<(String, Arc<[u8]>)>,
}

/// Records, teams and attachment bytes held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    teams: BTreeMap<TeamId, TeamRow>,
    members: BTreeSet<(TeamId, OwnerId)>,
    records: BTreeMap<(RecordKind, i64), StoredRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_team(mut self, row: TeamRow, members: &[i64]) -> Self {
        let team = TeamId(row.id);
        for member in members {
            self.members.insert((team, OwnerId(*member)));
        }
        self.teams.insert(team, row);
        self
    }

    pub fn with_experiment(
        mut self,
        team: i64,
        owner: i64,
        info: RecordInfo,
        attachments: Vec<(&str, Vec<u8>)>,
    ) -> Self {
        self.insert(TeamId(team), Some(OwnerId(owner)), info, attachments);
        self
    }

    pub fn with_resource(
        mut self,
        team: i64,
        info: RecordInfo,
        attachments: Vec<(&str, Vec<u8>)>,
    ) -> Self {
        self.insert(TeamId(team), None, info, attachments);
        self
    }

    fn insert(
        &mut self,
        team: TeamId,
        owner: Option<OwnerId>,
        info: RecordInfo,
        attachments: Vec<(&str, Vec<u8>)>,
    ) {
        let attachments = attachments
            .into_iter()
            .map(|(name, bytes)| (name.to_string(), Arc::from(bytes)))
            .collect();
        self.records.insert(
            (info.kind(), info.id()),
            StoredRecord {
                team,
                owner,
                info,
                attachments,
            },
        );
    }

    fn ids(&self, kind: RecordKind, team: TeamId, owner: Option<OwnerId>) -> Vec<i64> {
        self.records
            .values()
            .filter(|r| r.info.kind() == kind && r.team == team)
            .filter(|r| owner.is_none() || r.owner == owner)
            .map(|r| r.info.id())
            .collect()
    }
}

impl RecordStore for MemoryStore {
    fn is_member(&self, owner: OwnerId, team: TeamId) -> Result<bool, StoreError> {
        Ok(self.members.contains(&(team, owner)))
    }

    fn experiment_ids(&self, owner: OwnerId, team: TeamId) -> Result<Vec<i64>, StoreError> {
        Ok(self.ids(RecordKind::Experiment, team, Some(owner)))
    }

    fn resource_ids(&self, team: TeamId) -> Result<Vec<i64>, StoreError> {
        Ok(self.ids(RecordKind::Resource, team, None))
    }

    fn team(&self, team: TeamId) -> Result<TeamRow, StoreError> {
        self.teams
            .get(&team)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("team {}", team)))
    }
}

impl ContentSource for MemoryStore {
    fn fetch(&self, slug: &Slug) -> Result<RecordMetadata, StoreError> {
        let record = self
            .records
            .get(&(slug.kind, slug.id))
            .filter(|r| r.team == slug.team_id)
            .ok_or_else(|| StoreError::NotFound(slug.to_string()))?;

        let attachments = record
            .attachments
            .iter()
            .map(|(name, bytes)| {
                AttachmentRef::new(name.clone(), Box::new(Cursor::new(Arc::clone(bytes))))
                    .with_byte_length(bytes.len() as u64)
            })
            .collect();

        Ok(RecordMetadata::new(record.info.clone(), attachments))
    }
}
