//! Convergence properties over random replicas.

mod common;

use common::*;
use docsync_engine::{ConflictPolicy, ReplicateOptions, ReportCode};
use docsync_storage::DocumentStorage;
use docsync_testkit::prelude::*;
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
        .block_on(future)
}

async fn seed(set: &ReplicaSet, entries: &[ReplicaEntry]) {
    for entry in entries {
        if let Some(local) = &entry.local {
            set.local.put(&entry.id, local.clone()).await.unwrap();
        }
        if let Some(remote) = &entry.remote {
            set.remote.put(&entry.id, remote.clone()).await.unwrap();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn keep_local_converges_in_one_pass(entries in replica_strategy()) {
        let (converged, second) = block_on(async {
            let set = ReplicaSet::new();
            seed(&set, &entries).await;
            let options = ReplicateOptions::new().with_conflict_handling(ConflictPolicy::KeepLocal);
            let replicator = replicator(&set, options);
            repair_ok(&replicator).await;
            let converged = set.converged();
            (converged, repair_ok(&replicator).await)
        });
        prop_assert!(converged);
        prop_assert!(second.entries().iter().all(|e| e.code == ReportCode::NoChange));
    }

    #[test]
    fn keep_remote_matches_the_remote_side(entries in replica_strategy()) {
        let (local, remote) = block_on(async {
            let set = ReplicaSet::new();
            seed(&set, &entries).await;
            let options = ReplicateOptions::new().with_conflict_handling(ConflictPolicy::KeepRemote);
            repair_ok(&replicator(&set, options)).await;
            (set.local.ids(), set.remote.ids())
        });
        let mut expected: Vec<String> = entries
            .iter()
            .filter(|e| e.remote.is_some() || e.local.is_some())
            .map(|e| e.id.clone())
            .collect();
        expected.sort();
        prop_assert_eq!(&local, &remote);
        prop_assert_eq!(local, expected);
    }
}
