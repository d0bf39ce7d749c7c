use super::*;
use std::{
    fs,
    io::{self, Write as _},
    sync::Arc,
};

/// An object store backed by a local directory.
///
/// Every bucket is a sub-directory of the root and keys are `/`-separated
/// paths relative to the bucket directory.
///
/// The key list of the latest listing is kept so that continued listings
/// page through it instead of walking the directory again.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
    listing: Arc<Mutex<Option<Listing>>>,
}

#[derive(Debug)]
struct Listing {
    bucket: String,
    prefix: String,
    keys: Arc<Vec<String>>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
            listing: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_page_size(self, page_size: NonZeroUsize) -> Self {
        Self {
            page_size: page_size.get(),
            ..self
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, location: &ObjectLocation) -> Result<PathBuf, StoreError> {
        let ObjectLocation { bucket, key } = location;
        let valid = !key.is_empty()
            && key
                .split('/')
                .all(|comp| !comp.is_empty() && comp != "." && comp != "..");
        if !valid {
            return Err(StoreError::InvalidKey(key.clone()));
        }
        let path = key
            .split('/')
            .fold(self.bucket_dir(bucket)?, |path, comp| path.join(comp));
        Ok(path)
    }
}

impl LocalStore {
    async fn walk_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            if !bucket_dir.is_dir() {
                return Err(StoreError::BucketNotFound(bucket));
            }
            list_keys(&bucket_dir, &prefix)
        })
        .await
        .map_err(join_error)?
    }

    fn cached_keys(&self, bucket: &str, prefix: &str) -> Option<Arc<Vec<String>>> {
        match &*self.lock_listing() {
            Some(listing) if listing.bucket == bucket && listing.prefix == prefix => {
                Some(listing.keys.clone())
            }
            _ => None,
        }
    }

    fn lock_listing(&self) -> std::sync::MutexGuard<'_, Option<Listing>> {
        self.listing
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl ObjectStore for LocalStore {
    fn list_page<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> BoxFuture<'a, Result<ListPage, StoreError>> {
        async move {
            let keys = match continuation {
                Some(_) => self.cached_keys(bucket, prefix),
                None => None,
            };
            let keys = match keys {
                Some(keys) => keys,
                None => {
                    let keys = Arc::new(self.walk_keys(bucket, prefix).await?);
                    *self.lock_listing() = Some(Listing {
                        bucket: bucket.to_string(),
                        prefix: prefix.to_string(),
                        keys: keys.clone(),
                    });
                    keys
                }
            };

            let page_size = self.page_size;
            let start = match continuation {
                Some(token) => keys.partition_point(|key| key.as_str() <= token),
                None => 0,
            };
            let rest = &keys[start..];
            let page: Vec<String> = rest.iter().take(page_size).cloned().collect();
            let next = if rest.len() > page_size {
                page.last().cloned()
            } else {
                None
            };

            Ok(ListPage { keys: page, next })
        }
        .boxed()
    }

    fn get<'a>(
        &'a self,
        location: &'a ObjectLocation,
    ) -> BoxFuture<'a, Result<Vec<u8>, StoreError>> {
        async move {
            let path = self.object_path(location)?;
            tokio::fs::read(&path)
                .await
                .map_err(|err| not_found_or_io(err, location))
        }
        .boxed()
    }

    fn put<'a>(
        &'a self,
        location: &'a ObjectLocation,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let path = self.object_path(location)?;
            tokio::task::spawn_blocking(move || write_atomic(&path, &body))
                .await
                .map_err(join_error)??;
            Ok(())
        }
        .boxed()
    }

    fn download<'a>(
        &'a self,
        location: &'a ObjectLocation,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let path = self.object_path(location)?;
            tokio::fs::copy(&path, dest)
                .await
                .map_err(|err| not_found_or_io(err, location))?;
            Ok(())
        }
        .boxed()
    }
}

/// Collect the sorted keys starting with `prefix`.
///
/// Only the directory named by the part of the prefix up to its last `/` is
/// walked.
fn list_keys(bucket_dir: &Path, prefix: &str) -> Result<Vec<String>, StoreError> {
    let base = match prefix.rfind('/') {
        Some(pos) => &prefix[..pos],
        None => "",
    };
    let mut search_dir = bucket_dir.to_owned();
    for comp in base.split('/').filter(|comp| !comp.is_empty()) {
        if comp == "." || comp == ".." {
            return Err(StoreError::InvalidKey(prefix.to_string()));
        }
        search_dir.push(comp);
    }
    if !search_dir.is_dir() {
        return Ok(vec![]);
    }

    let pattern = format!(
        "{}/**/*",
        glob::Pattern::escape(&search_dir.to_string_lossy())
    );
    let mut keys: Vec<String> = glob::glob(&pattern)
        .map_err(|err| StoreError::Rejected(err.to_string()))?
        .map(|entry| -> Result<_, StoreError> {
            let path = entry.map_err(|err| StoreError::Io(err.into()))?;
            if !path.is_file() {
                return Ok(None);
            }
            let key = match path.strip_prefix(bucket_dir) {
                Ok(rel) => rel
                    .components()
                    .map(|comp| comp.as_os_str().to_string_lossy())
                    .join("/"),
                Err(_) => return Ok(None),
            };
            Ok(key.starts_with(prefix).then(|| key))
        })
        .filter_map(|result| result.transpose())
        .collect::<Result<_, _>>()?;
    keys.sort();
    Ok(keys)
}

/// Write to a temporary sibling and rename it over the destination.
fn write_atomic(path: &Path, body: &[u8]) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidKey(path.display().to_string()))?;
    fs::create_dir_all(parent)?;
    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(body)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn not_found_or_io(err: io::Error, location: &ObjectLocation) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound => StoreError::NotFound(location.clone()),
        _ => StoreError::Io(err),
    }
}

fn join_error(err: tokio::task::JoinError) -> StoreError {
    StoreError::Io(io::Error::new(io::ErrorKind::Other, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> anyhow::Result<(tempfile::TempDir, LocalStore)> {
        let dir = tempfile::tempdir()?;
        let labels = dir.path().join("dataset").join("train").join("labels");
        fs::create_dir_all(&labels)?;
        for name in ["a.txt", "b.txt", "c.txt", "d.jpg"] {
            fs::write(labels.join(name), "0 0.5 0.5 0.1 0.1\n")?;
        }
        fs::write(dir.path().join("dataset").join("data.yaml"), "names: [cat]\n")?;
        let store = LocalStore::new(dir.path()).with_page_size(NonZeroUsize::new(2).unwrap());
        Ok((dir, store))
    }

    #[tokio::test]
    async fn list_pages_until_exhausted() -> anyhow::Result<()> {
        let (_dir, store) = sample_store()?;

        let first = store.list_page("dataset", "train/", None).await?;
        assert_eq!(
            first.keys,
            vec!["train/labels/a.txt", "train/labels/b.txt"]
        );
        let token = first.next.expect("listing should be truncated");

        let second = store.list_page("dataset", "train/", Some(&token)).await?;
        assert_eq!(
            second.keys,
            vec!["train/labels/c.txt", "train/labels/d.jpg"]
        );
        assert_eq!(second.next, None);
        Ok(())
    }

    #[tokio::test]
    async fn partial_prefix_within_directory() -> anyhow::Result<()> {
        let (_dir, store) = sample_store()?;
        let page = store.list_page("dataset", "train/labels/b", None).await?;
        assert_eq!(page.keys, vec!["train/labels/b.txt"]);

        let page = store.list_page("dataset", "data", None).await?;
        assert_eq!(page.keys, vec!["data.yaml"]);
        Ok(())
    }

    #[tokio::test]
    async fn escaping_prefix_is_rejected() -> anyhow::Result<()> {
        let (_dir, store) = sample_store()?;
        let err = store.list_page("dataset", "../other/", None).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
        Ok(())
    }

    #[tokio::test]
    async fn continuation_pages_through_one_snapshot() -> anyhow::Result<()> {
        let (dir, store) = sample_store()?;
        let labels = dir.path().join("dataset/train/labels");

        let first = store.list_page("dataset", "train/", None).await?;
        let token = first.next.expect("listing should be truncated");

        // files appearing mid-listing are not seen by the continued listing
        fs::write(labels.join("e.txt"), "0 0 0 0 0\n")?;
        let second = store.list_page("dataset", "train/", Some(&token)).await?;
        assert_eq!(
            second.keys,
            vec!["train/labels/c.txt", "train/labels/d.jpg"]
        );
        assert_eq!(second.next, None);

        // a fresh listing walks the directory again
        let all: Vec<String> = store.list_page("dataset", "train/", None).await?.keys;
        assert_eq!(all, vec!["train/labels/a.txt", "train/labels/b.txt"]);
        let rest = store
            .list_page("dataset", "train/", Some("train/labels/b.txt"))
            .await?;
        assert_eq!(rest.keys, vec!["train/labels/c.txt", "train/labels/d.jpg"]);
        assert_eq!(rest.next.as_deref(), Some("train/labels/d.jpg"));
        Ok(())
    }

    #[tokio::test]
    async fn listing_missing_bucket_fails() -> anyhow::Result<()> {
        let (_dir, store) = sample_store()?;
        let err = store.list_page("nope", "", None).await.unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(_)));
        Ok(())
    }

    #[tokio::test]
    async fn empty_prefix_match_is_not_an_error() -> anyhow::Result<()> {
        let (_dir, store) = sample_store()?;
        let page = store.list_page("dataset", "valid/", None).await?;
        assert!(page.keys.is_empty());
        assert_eq!(page.next, None);
        Ok(())
    }

    #[tokio::test]
    async fn put_then_get() -> anyhow::Result<()> {
        let (dir, store) = sample_store()?;
        let location = ObjectLocation::new("output", "details/class_counts.json");
        store.put(&location, b"{}".to_vec()).await?;

        assert_eq!(store.get(&location).await?, b"{}");
        assert!(dir
            .path()
            .join("output/details/class_counts.json")
            .is_file());
        Ok(())
    }

    #[tokio::test]
    async fn get_missing_object_is_not_found() -> anyhow::Result<()> {
        let (_dir, store) = sample_store()?;
        let location = ObjectLocation::new("dataset", "missing.yaml");
        let err = store.get(&location).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(loc) if loc == location));
        Ok(())
    }

    #[tokio::test]
    async fn reject_escaping_keys() -> anyhow::Result<()> {
        let (_dir, store) = sample_store()?;
        for key in ["../secret", "/etc/passwd", "a//b", ""] {
            let location = ObjectLocation::new("dataset", key);
            let err = store.get(&location).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey(_)), "key {:?}", key);
        }
        Ok(())
    }

    #[tokio::test]
    async fn download_copies_into_local_file() -> anyhow::Result<()> {
        let (_dir, store) = sample_store()?;
        let temp = NamedTempFile::new()?;
        store
            .download(&ObjectLocation::new("dataset", "data.yaml"), temp.path())
            .await?;
        assert_eq!(fs::read_to_string(temp.path())?, "names: [cat]\n");
        Ok(())
    }
}
