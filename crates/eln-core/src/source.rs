//! Read-only handles the pipeline is built on.

use crate::store::StoreError;
use eln_common::{OwnerId, RecordMetadata, Slug, TeamId, TeamRow};

/// Membership and record-id queries.
///
/// Implementations return identifiers that are already authorised for the
/// owner; the export pipeline performs no permission checks of its own.
pub trait RecordStore {
    fn is_member(&self, owner: OwnerId, team: TeamId) -> Result<bool, StoreError>;

    /// Experiment ids owned by `owner` within `team`, in any order.
    fn experiment_ids(&self, owner: OwnerId, team: TeamId) -> Result<Vec<i64>, StoreError>;

    /// Resource ids belonging to `team`, in any order.
    fn resource_ids(&self, team: TeamId) -> Result<Vec<i64>, StoreError>;

    fn team(&self, team: TeamId) -> Result<TeamRow, StoreError>;
}

/// Record content by slug.
///
/// Attachment streams are read-once; the pipeline consumes each fully or
/// drops it.
pub trait ContentSource {
    fn fetch(&self, slug: &Slug) -> Result<RecordMetadata, StoreError>;
}
