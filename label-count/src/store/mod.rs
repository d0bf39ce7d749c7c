//! The object-store collaborator.
//!
//! The pipeline only talks to storage through [ObjectStore]. Backends decide
//! how buckets and keys map onto real storage.

mod local;
mod memory;

pub use local::*;
pub use memory::*;

use crate::common::*;
use thiserror::Error;

/// The default number of keys per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// An object address: a bucket and a key inside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// One page of a key listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys in lexical order.
    pub keys: Vec<String>,
    /// The continuation token if the listing was truncated.
    pub next: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object '{0}' does not exist")]
    NotFound(ObjectLocation),
    #[error("bucket '{0}' does not exist")]
    BucketNotFound(String),
    #[error("invalid object key '{0}'")]
    InvalidKey(String),
    #[error("operation rejected by the store: {0}")]
    Rejected(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The storage operations the pipeline needs.
pub trait ObjectStore
where
    Self: Debug + Send + Sync,
{
    /// List one page of keys starting with `prefix`.
    ///
    /// Pass the `next` token of the previous page to continue a truncated
    /// listing.
    fn list_page<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        continuation: Option<&'a str>,
    ) -> BoxFuture<'a, Result<ListPage, StoreError>>;

    fn get<'a>(&'a self, location: &'a ObjectLocation)
        -> BoxFuture<'a, Result<Vec<u8>, StoreError>>;

    /// Store an object. The object becomes visible only when the whole body
    /// has been written.
    fn put<'a>(
        &'a self,
        location: &'a ObjectLocation,
        body: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Copy an object into a local file.
    fn download<'a>(
        &'a self,
        location: &'a ObjectLocation,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let body = self.get(location).await?;
            tokio::fs::write(dest, body).await?;
            Ok(())
        }
        .boxed()
    }

    /// Store the content of a local file as an object.
    fn upload<'a>(
        &'a self,
        src: &'a Path,
        location: &'a ObjectLocation,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        async move {
            let body = tokio::fs::read(src).await?;
            self.put(location, body).await
        }
        .boxed()
    }
}
