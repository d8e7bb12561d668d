//! Record and request identity types.
//!
//! A record is uniquely identified within an export by its [`Slug`], the
//! `(kind, id, team)` tuple. Slugs order by kind first (experiments before
//! resources) and then by ascending id, which is the order records appear in
//! an archive.

use crate::error::{Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User identifier of the export owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        OwnerId(id)
    }
}

/// Team identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub i64);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TeamId {
    fn from(id: i64) -> Self {
        TeamId(id)
    }
}

/// Kind of exportable record.
///
/// Variant order is significant: it is the primary sort key of slugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Experiment,
    Resource,
}

impl RecordKind {
    /// Top-level archive directory holding records of this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            RecordKind::Experiment => "experiments",
            RecordKind::Resource => "resources",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Experiment => "experiment",
            RecordKind::Resource => "resource",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "experiment" | "experiments" => Ok(RecordKind::Experiment),
            "resource" | "resources" | "item" | "items" => Ok(RecordKind::Resource),
            _ => Err(format!("unknown record kind: {}", s)),
        }
    }
}

/// Stable identifier of one exportable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slug {
    pub kind: RecordKind,
    pub id: i64,
    pub team_id: TeamId,
}

impl Slug {
    pub fn new(kind: RecordKind, id: i64, team_id: TeamId) -> Self {
        Slug { kind, id, team_id }
    }

    pub fn experiment(id: i64, team_id: TeamId) -> Self {
        Slug::new(RecordKind::Experiment, id, team_id)
    }

    pub fn resource(id: i64, team_id: TeamId) -> Self {
        Slug::new(RecordKind::Resource, id, team_id)
    }

    /// Archive directory of this record, with trailing slash: `experiments/12/`.
    pub fn dir_path(&self) -> String {
        format!("{}/{}/", self.kind.dir_name(), self.id)
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Immutable input of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub owner_id: OwnerId,
    pub team_id: TeamId,
    pub include_resources: bool,
}

impl ExportRequest {
    pub fn new(owner_id: i64, team_id: i64, include_resources: bool) -> Self {
        ExportRequest {
            owner_id: OwnerId(owner_id),
            team_id: TeamId(team_id),
            include_resources,
        }
    }

    /// Reject malformed identifiers. Database ids start at 1.
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.0 <= 0 {
            return Err(ValidationError::invalid(
                "owner_id",
                format!("must be a positive integer, got {}", self.owner_id),
            ));
        }
        if self.team_id.0 <= 0 {
            return Err(ValidationError::invalid(
                "team_id",
                format!("must be a positive integer, got {}", self.team_id),
            ));
        }
        Ok(())
    }
}
