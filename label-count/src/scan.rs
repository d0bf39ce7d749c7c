//! Partition scanning: enumerate the annotation files under a key prefix.

use crate::{common::*, error::CountError, store::ObjectStore, ObjectLocation};

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// List the annotation files of a partition as a lazy stream.
///
/// Listing pages are requested one at a time as the stream is polled and
/// truncated listings are continued until the store reports no more pages.
/// Only keys ending with `suffix` are yielded. A listing failure ends the
/// stream with [CountError::ScanFailed].
pub fn scan_partition<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    prefix: &'a str,
    suffix: &'a str,
) -> impl Stream<Item = Result<ObjectLocation, CountError>> + 'a {
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let (continuation, first) = match cursor {
            Cursor::Start => (None, true),
            Cursor::Next(token) => (Some(token), false),
            Cursor::Done => return Ok(None),
        };

        let page = store
            .list_page(bucket, prefix, continuation.as_deref())
            .await
            .map_err(|source| CountError::ScanFailed {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source,
            })?;

        if first && page.keys.is_empty() && page.next.is_none() {
            info!("no files found under '{}/{}'", bucket, prefix);
        }

        let cursor = match page.next {
            Some(token) => Cursor::Next(token),
            None => Cursor::Done,
        };
        Ok::<_, CountError>(Some((page.keys, cursor)))
    })
    .map_ok(|keys| stream::iter(keys).map(Ok))
    .try_flatten()
    .try_filter(move |key: &String| future::ready(key.ends_with(suffix)))
    .map_ok(move |key| ObjectLocation::new(bucket, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn paged_store() -> MemoryStore {
        let store = MemoryStore::new().with_page_size(NonZeroUsize::new(2).unwrap());
        for index in 0..5 {
            store.insert("dataset", &format!("train/labels/{}.txt", index), "0 0 0 1 1\n");
        }
        store.insert("dataset", "train/labels.cache", "");
        store.insert("dataset", "train/images/0.jpg", "");
        store.insert("dataset", "valid/readme.md", "");
        store
    }

    #[tokio::test]
    async fn follows_truncated_listings() -> anyhow::Result<()> {
        let store = paged_store();
        let keys: Vec<String> = scan_partition(&store, "dataset", "train/", ".txt")
            .map_ok(|location| location.key)
            .try_collect()
            .await?;

        let expect: Vec<String> = (0..5)
            .map(|index| format!("train/labels/{}.txt", index))
            .collect();
        assert_eq!(keys, expect);
        Ok(())
    }

    #[tokio::test]
    async fn unmatched_partitions_are_empty() -> anyhow::Result<()> {
        let store = paged_store();

        let test: Vec<_> = scan_partition(&store, "dataset", "test/", ".txt")
            .try_collect()
            .await?;
        assert!(test.is_empty());

        let valid: Vec<_> = scan_partition(&store, "dataset", "valid/", ".txt")
            .try_collect()
            .await?;
        assert!(valid.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn listing_failure_is_fatal() {
        let store = paged_store();
        store.fail_listings_of("dataset");

        let result: Result<Vec<_>, _> = scan_partition(&store, "dataset", "train/", ".txt")
            .try_collect()
            .await;
        assert!(matches!(result, Err(CountError::ScanFailed { .. })));
    }

    #[tokio::test]
    async fn restartable_per_call() -> anyhow::Result<()> {
        let store = paged_store();
        let first: Vec<_> = scan_partition(&store, "dataset", "train/", ".txt")
            .try_collect()
            .await?;
        let second: Vec<_> = scan_partition(&store, "dataset", "train/", ".txt")
            .try_collect()
            .await?;
        assert_eq!(first, second);
        Ok(())
    }
}
