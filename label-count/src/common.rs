//! Common imports from external crates.

pub use anyhow::Context as _;
pub use futures::{
    future::{self, BoxFuture, FutureExt as _},
    stream::{self, Stream, StreamExt as _, TryStreamExt as _},
};
pub use itertools::Itertools as _;
pub use serde::{Deserialize, Serialize};
pub use std::{
    collections::{btree_map, BTreeMap, HashSet},
    fmt::{self, Debug, Display},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::{
        atomic::{self, AtomicBool},
        Mutex,
    },
    time::Duration,
};
pub use tempfile::NamedTempFile;
pub use tracing::{debug, error, info, info_span, warn, Instrument as _};
