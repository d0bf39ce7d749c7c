//! The error taxonomy of a counting run.

use crate::{common::*, store::StoreError, ObjectLocation};
use strum::AsRefStr;
use thiserror::Error;

/// Every way a counting run can fail.
///
/// Any of these aborts the run before the summary is published. The variant
/// name is available through `AsRef<str>` for logging.
#[derive(Debug, Error, AsRefStr)]
pub enum CountError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("class manifest '{location}' could not be retrieved")]
    ManifestNotFound {
        location: ObjectLocation,
        #[source]
        source: StoreError,
    },
    #[error("class manifest '{location}' is malformed: {reason}")]
    ManifestMalformed {
        location: ObjectLocation,
        reason: String,
    },
    #[error("failed to list objects under '{bucket}/{prefix}'")]
    ScanFailed {
        bucket: String,
        prefix: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to fetch annotation file '{location}'")]
    AnnotationFetchFailed {
        location: ObjectLocation,
        #[source]
        source: StoreError,
    },
    #[error("{location}:{line}: class id '{token}' is not an integer")]
    RecordParseError {
        location: ObjectLocation,
        line: usize,
        token: String,
    },
    #[error("{location}:{line}: class id {class_id} is out of range for {num_classes} classes")]
    ClassIndexOutOfRange {
        location: ObjectLocation,
        line: usize,
        class_id: String,
        num_classes: usize,
    },
    #[error("failed to publish summary to '{location}'")]
    PublishFailed {
        location: ObjectLocation,
        #[source]
        source: StoreError,
    },
    #[error("the run did not finish within {0:?}")]
    DeadlineExceeded(Duration),
    #[error(transparent)]
    UnclassifiedFailure(#[from] anyhow::Error),
}
