//! Annotation aggregation: count the class id of every label record.

use crate::{
    common::*, config::RecordPolicy, error::CountError, manifest::ClassManifest,
    store::ObjectStore, ObjectLocation,
};
use std::num::IntErrorKind;

/// Annotation counts per class name, ordered by name.
///
/// Only classes that were seen at least once have an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassCounts(BTreeMap<String, u64>);

impl ClassCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &str) {
        match self.0.get_mut(name) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(name.to_string(), 1);
            }
        }
    }

    pub fn merge(&mut self, other: ClassCounts) {
        other.0.into_iter().for_each(|(name, count)| {
            *self.0.entry(name).or_insert(0) += count;
        });
    }

    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    /// The sum of all counts.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, u64> {
        self.0.iter()
    }
}

impl<S> FromIterator<(S, u64)> for ClassCounts
where
    S: Into<String>,
{
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
    {
        Self(
            iter.into_iter()
                .map(|(name, count)| (name.into(), count))
                .collect(),
        )
    }
}

/// Why a label record could not be counted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecordFault {
    /// The first token is not a base-10 integer.
    InvalidClassId { token: String },
    /// The class id, as written, has no entry in the manifest.
    ClassIndexOutOfRange { class_id: String },
}

impl RecordFault {
    fn into_error(self, location: ObjectLocation, line: usize, num_classes: usize) -> CountError {
        match self {
            Self::InvalidClassId { token } => CountError::RecordParseError {
                location,
                line,
                token,
            },
            Self::ClassIndexOutOfRange { class_id } => CountError::ClassIndexOutOfRange {
                location,
                line,
                class_id,
                num_classes,
            },
        }
    }
}

impl Display for RecordFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidClassId { token } => write!(f, "class id '{}' is not an integer", token),
            Self::ClassIndexOutOfRange { class_id } => {
                write!(f, "class id {} is out of range", class_id)
            }
        }
    }
}

/// A label record left out of the counts under [RecordPolicy::Skip].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SkippedRecord {
    pub location: ObjectLocation,
    /// 1-based line number.
    pub line: usize,
    pub fault: RecordFault,
}

/// The aggregate of one or more annotation files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub counts: ClassCounts,
    pub files: usize,
    /// The number of counted records.
    pub records: u64,
    pub skipped: Vec<SkippedRecord>,
}

impl Tally {
    pub fn merge(&mut self, other: Tally) {
        let Tally {
            counts,
            files,
            records,
            skipped,
        } = other;
        self.counts.merge(counts);
        self.files += files;
        self.records += records;
        self.skipped.extend(skipped);
    }
}

/// Resolve the class name of a label record.
///
/// Returns `None` for blank lines. Only the first token has to be valid
/// UTF-8; the tokens after the class id are ignored.
pub fn parse_record<'m>(
    line: &[u8],
    manifest: &'m ClassManifest,
) -> Option<Result<&'m str, RecordFault>> {
    let token = line
        .split(u8::is_ascii_whitespace)
        .find(|token| !token.is_empty())?;
    let token = match std::str::from_utf8(token) {
        Ok(token) => token,
        Err(_) => {
            return Some(Err(RecordFault::InvalidClassId {
                token: String::from_utf8_lossy(token).into_owned(),
            }))
        }
    };

    let out_of_range = || RecordFault::ClassIndexOutOfRange {
        class_id: token.to_string(),
    };
    let result = match token.parse::<i64>() {
        Ok(class_id) => manifest.name(class_id).ok_or_else(out_of_range),
        // an integer beyond i64 cannot index the manifest either
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Err(out_of_range()),
            _ => Err(RecordFault::InvalidClassId {
                token: token.to_string(),
            }),
        },
    };
    Some(result)
}

/// Count the records of one annotation file's content.
pub fn tally_records(
    content: &[u8],
    manifest: &ClassManifest,
    location: &ObjectLocation,
    policy: RecordPolicy,
) -> Result<Tally, CountError> {
    let mut tally = Tally {
        files: 1,
        ..Default::default()
    };

    for (index, line) in content.split(|&byte| byte == b'\n').enumerate() {
        let line_no = index + 1;
        match parse_record(line, manifest) {
            None => continue,
            Some(Ok(name)) => {
                tally.counts.increment(name);
                tally.records += 1;
            }
            Some(Err(fault)) => match policy {
                RecordPolicy::Abort => {
                    return Err(fault.into_error(location.clone(), line_no, manifest.len()));
                }
                RecordPolicy::Skip => {
                    warn!("skip record at {}:{}: {}", location, line_no, fault);
                    tally.skipped.push(SkippedRecord {
                        location: location.clone(),
                        line: line_no,
                        fault,
                    });
                }
            },
        }
    }

    Ok(tally)
}

/// Fetch one annotation file into a temporary file and count its records.
///
/// The temporary file is removed when this function returns.
pub async fn tally_file(
    store: &dyn ObjectStore,
    manifest: &ClassManifest,
    location: ObjectLocation,
    policy: RecordPolicy,
) -> Result<Tally, CountError> {
    let temp = NamedTempFile::new()
        .context("failed to create a temporary file for an annotation file")?;

    store
        .download(&location, temp.path())
        .await
        .map_err(|source| CountError::AnnotationFetchFailed {
            location: location.clone(),
            source,
        })?;
    let content = tokio::fs::read(temp.path())
        .await
        .with_context(|| format!("failed to read annotation file '{}'", location))?;

    let tally = tally_records(&content, manifest, &location, policy)?;
    debug!("counted {} records in '{}'", tally.records, location);
    Ok(tally)
}

/// Count the records of every annotation file in `locations`.
///
/// At most `concurrency` files are fetched at once. Every file is tallied
/// separately and the tallies are merged, so the result does not depend on
/// the order in which files complete.
pub async fn aggregate<S>(
    store: &dyn ObjectStore,
    manifest: &ClassManifest,
    locations: S,
    policy: RecordPolicy,
    concurrency: NonZeroUsize,
) -> Result<Tally, CountError>
where
    S: Stream<Item = Result<ObjectLocation, CountError>>,
{
    locations
        .map_ok(|location| tally_file(store, manifest, location, policy))
        .try_buffer_unordered(concurrency.get())
        .try_fold(Tally::default(), |mut total, tally| {
            total.merge(tally);
            future::ready(Ok(total))
        })
        .await
}
