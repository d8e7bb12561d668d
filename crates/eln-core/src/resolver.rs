//! Export request → ordered slug list.

use crate::error::{ExportError, Result};
use crate::source::RecordStore;
use eln_common::{ExportRequest, RecordKind, Slug};
use eln_config::EmptyExportPolicy;
use tracing::debug;

/// Resolves which records belong to an export.
///
/// Pure query layer over a [`RecordStore`]: no side effects, and the same store
/// contents always resolve to the same slug order.
pub struct SlugResolver<'a> {
    store: &'a dyn RecordStore,
    empty_policy: EmptyExportPolicy,
}

impl<'a> SlugResolver<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        SlugResolver {
            store,
            empty_policy: EmptyExportPolicy::default(),
        }
    }

    pub fn with_empty_policy(mut self, policy: EmptyExportPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Slugs for `request`, experiments first, each kind by ascending id,
    /// without duplicates.
    ///
    /// Identifiers are validated before the store is queried. An owner who is
    /// not a member of the team is `NotFound`, as is an empty result under
    /// [`EmptyExportPolicy::Reject`].
    pub fn resolve(&self, request: &ExportRequest) -> Result<Vec<Slug>> {
        request.validate()?;

        if !self.store.is_member(request.owner_id, request.team_id)? {
            return Err(ExportError::not_found(format!(
                "membership of user {} in team {}",
                request.owner_id, request.team_id
            )));
        }

        let mut slugs: Vec<Slug> = self
            .store
            .experiment_ids(request.owner_id, request.team_id)?
            .into_iter()
            .map(|id| Slug::new(RecordKind::Experiment, id, request.team_id))
            .collect();

        if request.include_resources {
            slugs.extend(
                self.store
                    .resource_ids(request.team_id)?
                    .into_iter()
                    .map(|id| Slug::new(RecordKind::Resource, id, request.team_id)),
            );
        }

        slugs.sort();
        slugs.dedup();

        debug!(
            owner = %request.owner_id,
            team = %request.team_id,
            include_resources = request.include_resources,
            count = slugs.len(),
            "Resolved export slugs"
        );

        if slugs.is_empty() && self.empty_policy == EmptyExportPolicy::Reject {
            return Err(ExportError::not_found(format!(
                "records of user {} in team {}",
                request.owner_id, request.team_id
            )));
        }

        Ok(slugs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::StoreError;
    use eln_common::{OwnerId, TeamId, TeamRow};
    use proptest::prelude::*;
    use std::cell::Cell;

    /// Store returning fixed id lists and counting queries.
    struct FixedStore {
        member: bool,
        experiments: Vec<i64>,
        resources: Vec<i64>,
        queries: Cell<usize>,
    }

    impl FixedStore {
        fn new(experiments: Vec<i64>, resources: Vec<i64>) -> Self {
            FixedStore {
                member: true,
                experiments,
                resources,
                queries: Cell::new(0),
            }
        }
    }

    impl RecordStore for FixedStore {
        fn is_member(&self, _: OwnerId, _: TeamId) -> std::result::Result<bool, StoreError> {
            self.queries.set(self.queries.get() + 1);
            Ok(self.member)
        }

        fn experiment_ids(&self, _: OwnerId, _: TeamId) -> std::result::Result<Vec<i64>, StoreError> {
            self.queries.set(self.queries.get() + 1);
            Ok(self.experiments.clone())
        }

        fn resource_ids(&self, _: TeamId) -> std::result::Result<Vec<i64>, StoreError> {
            self.queries.set(self.queries.get() + 1);
            Ok(self.resources.clone())
        }

        fn team(&self, team: TeamId) -> std::result::Result<TeamRow, StoreError> {
            Err(StoreError::NotFound(format!("team {}", team)))
        }
    }

    #[test]
    fn test_orders_and_dedups() {
        let store = FixedStore::new(vec![5, 2, 5, 9], vec![3, 1]);
        let slugs = SlugResolver::new(&store)
            .resolve(&ExportRequest::new(1, 1, true))
            .unwrap();

        let rendered: Vec<String> = slugs.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "experiment:2",
                "experiment:5",
                "experiment:9",
                "resource:1",
                "resource:3"
            ]
        );
    }

    #[test]
    fn test_resources_excluded() {
        let store = FixedStore::new(vec![1], vec![2]);
        let slugs = SlugResolver::new(&store)
            .resolve(&ExportRequest::new(1, 1, false))
            .unwrap();
        assert!(slugs.iter().all(|s| s.kind == RecordKind::Experiment));
        assert_eq!(store.queries.get(), 2);
    }

    #[test]
    fn test_invalid_ids_rejected_before_query() {
        let store = FixedStore::new(vec![1], vec![]);
        for (owner, team) in [(0, 1), (1, 0), (-4, 2)] {
            let err = SlugResolver::new(&store)
                .resolve(&ExportRequest::new(owner, team, false))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        }
        assert_eq!(store.queries.get(), 0);
    }

    #[test]
    fn test_non_member_not_found() {
        let mut store = FixedStore::new(vec![1], vec![]);
        store.member = false;
        let err = SlugResolver::new(&store)
            .resolve(&ExportRequest::new(1, 1, false))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_empty_policy() {
        let store = FixedStore::new(vec![], vec![]);
        let request = ExportRequest::new(1, 1, true);

        let allowed = SlugResolver::new(&store).resolve(&request).unwrap();
        assert!(allowed.is_empty());

        let err = SlugResolver::new(&store)
            .with_empty_policy(EmptyExportPolicy::Reject)
            .resolve(&request)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    proptest! {
        #[test]
        fn prop_resolution_is_sorted_unique_and_stable(
            experiments in proptest::collection::vec(1i64..500, 0..40),
            resources in proptest::collection::vec(1i64..500, 0..40),
            include in any::<bool>(),
        ) {
            let store = FixedStore::new(experiments.clone(), resources.clone());
            let request = ExportRequest::new(3, 4, include);
            let first = SlugResolver::new(&store).resolve(&request).unwrap();

            prop_assert!(first.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(include || first.iter().all(|s| s.kind == RecordKind::Experiment));

            let mut reversed = FixedStore::new(experiments, resources);
            reversed.experiments.reverse();
            reversed.resources.reverse();
            let second = SlugResolver::new(&reversed).resolve(&request).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
