//! Folds result records into the fleet status.
//!
//! Failed records are logged and skipped. Successful ones are inserted and
//! synced right away, so a crash loses only records still in flight.
//! Unknown groups and already-collected instances end the run.

use crate::error::FetchError;
use crate::models::InstanceLogs;
use crate::status::StatusStore;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub collected: usize,
    pub failed: usize,
    pub total_files: usize,
}

pub struct Aggregator<'a, S: StatusStore + ?Sized> {
    store: &'a mut S,
    tally: Tally,
}

impl<'a, S: StatusStore + ?Sized> Aggregator<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self {
            store,
            tally: Tally::default(),
        }
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn absorb(&mut self, record: InstanceLogs) -> Result<(), FetchError> {
        if let Some(err) = &record.error {
            error!(
                group = %record.group,
                instance_id = %record.instance_id,
                error = %err,
                "failed to fetch logs"
            );
            self.tally.failed += 1;
            return Ok(());
        }

        let files = record.paths.len();
        self.store
            .status_mut()
            .record_logs(&record.group, &record.instance_id, record.paths)?;

        // a failed sync is retried by the next merge and by the final sync
        if let Err(e) = self.store.sync() {
            warn!(error = %e, "failed to sync fleet status");
        }

        self.tally.collected += 1;
        self.tally.total_files += files;
        info!(
            group = %record.group,
            instance_id = %record.instance_id,
            files,
            total_downloaded_files = self.tally.total_files,
            "wrote log files"
        );
        Ok(())
    }

    /// Final flush at run end or cancellation
    pub fn finish(self) -> Result<Tally, FetchError> {
        self.store.sync()?;
        Ok(self.tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectError, SessionError};
    use crate::models::Instance;
    use crate::status::FleetStatus;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        status: FleetStatus,
        syncs: AtomicUsize,
        fail_sync: bool,
    }

    impl StatusStore for MemoryStore {
        fn status(&self) -> &FleetStatus {
            &self.status
        }
        fn status_mut(&mut self) -> &mut FleetStatus {
            &mut self.status
        }
        fn sync(&self) -> Result<(), FetchError> {
            self.syncs.fetch_add(1, Ordering::Relaxed);
            if self.fail_sync {
                return Err(FetchError::InvalidConfig("read-only".into()));
            }
            Ok(())
        }
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::default();
        store.status.add_instance("ng-a", Instance::new("i-1", "", ""));
        store.status.add_instance("ng-a", Instance::new("i-2", "", ""));
        store
    }

    fn ok(group: &str, id: &str, n: usize) -> InstanceLogs {
        let paths = (0..n).map(|i| PathBuf::from(format!("/run/{id}-{i}.log"))).collect();
        InstanceLogs::collected(group, id, paths)
    }

    fn failed(group: &str, id: &str) -> InstanceLogs {
        InstanceLogs::failed(
            group,
            id,
            CollectError::Connect {
                instance_id: id.to_string(),
                source: SessionError::Closed,
            },
        )
    }

    #[test]
    fn test_success_is_recorded_and_synced() {
        let mut store = store();
        let mut agg = Aggregator::new(&mut store);

        agg.absorb(ok("ng-a", "i-1", 3)).unwrap();
        agg.absorb(ok("ng-a", "i-2", 2)).unwrap();
        let tally = agg.finish().unwrap();

        assert_eq!(tally, Tally { collected: 2, failed: 0, total_files: 5 });
        assert_eq!(store.syncs.load(Ordering::Relaxed), 3);
        assert_eq!(store.status().logs_for("ng-a", "i-1").unwrap().len(), 3);
    }

    #[test]
    fn test_failed_record_is_skipped() {
        let mut store = store();
        let mut agg = Aggregator::new(&mut store);

        agg.absorb(failed("ng-a", "i-1")).unwrap();
        assert_eq!(agg.tally().failed, 1);
        assert_eq!(agg.tally().collected, 0);
        assert_eq!(store.status.collected_instances(), 0);
    }

    #[test]
    fn test_failed_record_for_unknown_group_is_not_fatal() {
        let mut store = store();
        let mut agg = Aggregator::new(&mut store);
        assert!(agg.absorb(failed("ng-missing", "i-9")).is_ok());
    }

    #[test]
    fn test_unknown_group_is_fatal() {
        let mut store = store();
        let mut agg = Aggregator::new(&mut store);
        let err = agg.absorb(ok("ng-missing", "i-1", 1)).unwrap_err();
        assert!(matches!(err, FetchError::UnknownGroup(_)));
    }

    #[test]
    fn test_duplicate_instance_is_fatal() {
        let mut store = store();
        let mut agg = Aggregator::new(&mut store);
        agg.absorb(ok("ng-a", "i-1", 1)).unwrap();

        let err = agg.absorb(ok("ng-a", "i-1", 4)).unwrap_err();
        assert!(matches!(err, FetchError::DuplicateInstance { .. }));
        assert_eq!(store.status.logs_for("ng-a", "i-1").unwrap().len(), 1);
    }

    #[test]
    fn test_mid_run_sync_failure_is_tolerated() {
        let mut store = store();
        store.fail_sync = true;
        let mut agg = Aggregator::new(&mut store);

        agg.absorb(ok("ng-a", "i-1", 1)).unwrap();
        assert!(agg.finish().is_err());
        assert_eq!(store.status.collected_instances(), 1);
    }
}
