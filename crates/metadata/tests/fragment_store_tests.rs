// Row-store behavior shared by the SQLite and PostgreSQL backends.

mod common;

use common::run_metadata_test_both;
use mosaic_metadata::{ChunkRow, MetadataError, MetadataStore, NewFragment};
use std::sync::Arc;

fn new_fragment(path: &str) -> NewFragment {
    NewFragment {
        user_id: 7,
        file_id: 0,
        path: path.to_string(),
        create_time: 1_700_000_000,
    }
}

fn chunk(fragment_id: i64, number: i64, size: i64) -> ChunkRow {
    ChunkRow {
        id: format!("{fragment_id}:{number}"),
        fragment_id,
        number,
        size,
        create_time: 1_700_000_010,
    }
}

#[tokio::test]
async fn test_counters_match_aggregates() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let id = store
            .create_fragment(&new_fragment("media/clip.mov"))
            .await
            .unwrap();

        for (number, size) in [(1, 100), (2, 200), (3, 50), (2, 20)] {
            let row = store.record_chunk(&chunk(id, number, size)).await.unwrap();
            let chunks = store.list_chunks(id).await.unwrap();
            assert_eq!(row.number, chunks.len() as i64);
            assert_eq!(row.size, chunks.iter().map(|c| c.size).sum::<i64>());
        }

        let row = store.get_fragment(id).await.unwrap().unwrap();
        assert_eq!((row.number, row.size), (3, 170));
    })
    .await;
}

#[tokio::test]
async fn test_concurrent_chunk_records_keep_counters_consistent() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let id = store
            .create_fragment(&new_fragment("big/file.iso"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for number in 1..=20i64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_chunk(&chunk(id, number, number)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let row = store.get_fragment(id).await.unwrap().unwrap();
        assert_eq!(row.number, 20);
        assert_eq!(row.size, (1..=20).sum::<i64>());
    })
    .await;
}

#[tokio::test]
async fn test_merge_claim_checks() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let id = store.create_fragment(&new_fragment("a.txt")).await.unwrap();

        let err = store.begin_merge(id, 1, 10).await.unwrap_err();
        assert!(matches!(err, MetadataError::NoChunks { .. }));

        for number in [1, 2, 4] {
            store.record_chunk(&chunk(id, number, 1)).await.unwrap();
        }

        let err = store.begin_merge(id, 4, 10).await.unwrap_err();
        assert!(matches!(
            err,
            MetadataError::ChunkCountMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));

        let err = store.begin_merge(id, 3, 10).await.unwrap_err();
        assert!(matches!(
            err,
            MetadataError::ChunksNotContiguous {
                previous: 2,
                found: 4,
                ..
            }
        ));

        let row = store.get_fragment(id).await.unwrap().unwrap();
        assert!(!row.merging);

        let err = store.begin_merge(id + 1000, 3, 10).await.unwrap_err();
        assert!(matches!(err, MetadataError::NotFound(_)));
    })
    .await;
}

#[tokio::test]
async fn test_claim_is_exclusive() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let id = store.create_fragment(&new_fragment("a.txt")).await.unwrap();
        store.record_chunk(&chunk(id, 1, 1)).await.unwrap();

        let first = store.clone();
        let second = store.clone();
        let (a, b) = tokio::join!(
            async move { first.begin_merge(id, 1, 10).await },
            async move { second.begin_merge(id, 1, 10).await },
        );

        let claimed = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(claimed, 1, "exactly one claim must win");

        store.end_merge(id).await.unwrap();
        let claim = store.begin_merge(id, 1, 11).await.unwrap();
        assert_eq!(claim.fragment.merge_started_at, Some(11));
        assert_eq!(claim.chunks.len(), 1);
    })
    .await;
}

#[tokio::test]
async fn test_delete_and_release() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let stuck = store.create_fragment(&new_fragment("s.bin")).await.unwrap();
        store.record_chunk(&chunk(stuck, 1, 1)).await.unwrap();
        store.begin_merge(stuck, 1, 100).await.unwrap();

        assert_eq!(store.release_stale_merges(50).await.unwrap(), Vec::<i64>::new());
        assert_eq!(store.release_stale_merges(101).await.unwrap(), vec![stuck]);

        assert_eq!(store.delete_fragment(stuck).await.unwrap(), 1);
        assert!(store.list_chunks(stuck).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_fragment(stuck).await,
            Err(MetadataError::NotFound(_))
        ));
        assert!(matches!(
            store.end_merge(stuck).await,
            Err(MetadataError::NotFound(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn test_open_chunk_write_holds_off_merge_claim() {
    run_metadata_test_both(|store: Arc<dyn MetadataStore>| async move {
        let id = store
            .create_fragment(&new_fragment("race/file.bin"))
            .await
            .unwrap();
        store.record_chunk(&chunk(id, 1, 4)).await.unwrap();

        let write = store.begin_chunk(id).await.unwrap();
        assert!(!write.fragment().merging);

        let claimer = tokio::spawn({
            let store = store.clone();
            async move { store.begin_merge(id, 1, 1_700_000_100).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!claimer.is_finished());

        let row = write.commit(&chunk(id, 1, 10)).await.unwrap();
        assert_eq!((row.number, row.size), (1, 10));

        let claim = claimer.await.unwrap().unwrap();
        assert_eq!(claim.chunks[0].size, 10);
        assert!(matches!(
            store.begin_chunk(id).await,
            Err(MetadataError::MergeInProgress { .. })
        ));
    })
    .await;
}
