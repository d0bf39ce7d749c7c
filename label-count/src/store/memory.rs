use super::*;

type Buckets = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// An in-process object store.
///
/// Besides holding objects in memory it can simulate listing failures and
/// rejected writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<Buckets>,
    failing_listings: Mutex<HashSet<String>>,
    reject_puts: AtomicBool,
    page_size: Option<NonZeroUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(self, page_size: NonZeroUsize) -> Self {
        Self {
            page_size: Some(page_size),
            ..self
        }
    }

    /// Create an empty bucket. Existing buckets are left untouched.
    pub fn create_bucket(&self, bucket: &str) {
        self.lock_buckets().entry(bucket.to_string()).or_default();
    }

    /// Insert an object, creating its bucket if needed.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.lock_buckets()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock_buckets().get(bucket)?.get(key).cloned()
    }

    /// Make every listing of `bucket` fail.
    pub fn fail_listings_of(&self, bucket: &str) {
        self.failing_listings
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(bucket.to_string());
    }

    pub fn set_reject_puts(&self, reject: bool) {
        self.reject_puts.store(reject, atomic::Ordering::SeqCst);
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, Buckets> {
        self.buckets
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl ObjectStore for MemoryStore {
    fn list_page<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> BoxFuture<'a, Result<ListPage, StoreError>> {
        let result = (|| -> Result<ListPage, StoreError> {
            let failing = self
                .failing_listings
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .contains(bucket);
            if failing {
                return Err(StoreError::Rejected(format!(
                    "access denied while listing '{}'",
                    bucket
                )));
            }

            let buckets = self.lock_buckets();
            let objects = buckets
                .get(bucket)
                .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))?;
            let page_size = self.page_size.map_or(DEFAULT_PAGE_SIZE, NonZeroUsize::get);

            let mut keys = objects
                .keys()
                .filter(|key| key.starts_with(prefix))
                .filter(|key| continuation.map_or(true, |token| key.as_str() > token))
                .cloned();
            let page: Vec<String> = keys.by_ref().take(page_size).collect();
            let next = match keys.next() {
                Some(_) => page.last().cloned(),
                None => None,
            };

            Ok(ListPage { keys: page, next })
        })();
        future::ready(result).boxed()
    }

    fn get<'a>(
        &'a self,
        location: &'a ObjectLocation,
    ) -> BoxFuture<'a, Result<Vec<u8>, StoreError>> {
        let result = self
            .object(&location.bucket, &location.key)
            .ok_or_else(|| StoreError::NotFound(location.clone()));
        future::ready(result).boxed()
    }

    fn put<'a>(
        &'a self,
        location: &'a ObjectLocation,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        let result = if self.reject_puts.load(atomic::Ordering::SeqCst) {
            Err(StoreError::Rejected(format!(
                "write to '{}' was refused",
                location
            )))
        } else {
            self.insert(&location.bucket, &location.key, body);
            Ok(())
        };
        future::ready(result).boxed()
    }
}
