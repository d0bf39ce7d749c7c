//! Counting job configuration format.

use crate::{common::*, error::CountError, store::LocalStore, ObjectLocation};

pub use dataset::*;
pub use output::*;
pub use processing::*;

/// The configuration file of the command line program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(flatten)]
    pub count: CountConfig,
}

impl Config {
    pub fn open<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

/// Object store backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StoreConfig {
    /// Buckets are directories under `root`.
    Local { root: PathBuf },
}

impl StoreConfig {
    pub fn build(&self) -> LocalStore {
        match self {
            Self::Local { root } => LocalStore::new(root),
        }
    }
}

/// Everything the counting pipeline needs to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountConfig {
    pub dataset: DatasetConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl CountConfig {
    pub fn validate(&self) -> Result<(), CountError> {
        if self.dataset.bucket.is_empty() || self.output.bucket.is_empty() {
            return Err(CountError::InvalidConfig(
                "missing required bucket parameters".into(),
            ));
        }
        if self.dataset.annotation_suffix.is_empty() {
            return Err(CountError::InvalidConfig(
                "annotation file suffix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

mod dataset {
    use super::*;

    /// Where the dataset lives.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        pub bucket: String,
        /// The key of the YAML document holding the class `names`.
        pub manifest_key: String,
        pub partitions: PartitionsConfig,
        /// Only keys ending with this suffix are treated as annotation files.
        #[serde(default = "default_annotation_suffix")]
        pub annotation_suffix: String,
    }

    impl DatasetConfig {
        pub fn manifest_location(&self) -> ObjectLocation {
            ObjectLocation::new(&self.bucket, &self.manifest_key)
        }
    }

    /// The key prefixes of the three dataset partitions.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PartitionsConfig {
        pub train: String,
        pub validation: String,
        pub test: String,
    }

    impl PartitionsConfig {
        pub fn descriptors(&self) -> [PartitionDescriptor; 3] {
            [
                PartitionDescriptor::new(PartitionKind::Train, &self.train),
                PartitionDescriptor::new(PartitionKind::Validation, &self.validation),
                PartitionDescriptor::new(PartitionKind::Test, &self.test),
            ]
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
    #[strum(serialize_all = "snake_case")]
    pub enum PartitionKind {
        Train,
        Validation,
        Test,
    }

    /// A named dataset partition and the key prefix of its annotation files.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PartitionDescriptor {
        pub kind: PartitionKind,
        pub prefix: String,
    }

    impl PartitionDescriptor {
        pub fn new(kind: PartitionKind, prefix: impl Into<String>) -> Self {
            Self {
                kind,
                prefix: prefix.into(),
            }
        }
    }

    fn default_annotation_suffix() -> String {
        ".txt".into()
    }
}

mod output {
    use super::*;

    /// Where the summary document is written.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OutputConfig {
        pub bucket: String,
        pub prefix: String,
        #[serde(default = "default_file_name")]
        pub file_name: String,
    }

    impl OutputConfig {
        /// The summary location, joining the prefix and the file name like a
        /// path.
        pub fn location(&self) -> ObjectLocation {
            let key = if self.prefix.is_empty() {
                self.file_name.clone()
            } else if self.prefix.ends_with('/') {
                format!("{}{}", self.prefix, self.file_name)
            } else {
                format!("{}/{}", self.prefix, self.file_name)
            };
            ObjectLocation::new(&self.bucket, key)
        }
    }

    fn default_file_name() -> String {
        "class_counts.json".into()
    }
}

mod processing {
    use super::*;

    /// What to do with a label record whose class id cannot be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum RecordPolicy {
        /// Fail the whole run on the first bad record.
        Abort,
        /// Leave the record out of the counts and report it.
        Skip,
    }

    impl Default for RecordPolicy {
        fn default() -> Self {
            Self::Abort
        }
    }

    /// Runtime options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct ProcessingConfig {
        pub record_policy: RecordPolicy,
        /// The maximum number of annotation files fetched at once.
        pub concurrency: NonZeroUsize,
        /// If set, the run fails once it takes longer than this.
        pub deadline_secs: Option<u64>,
    }

    impl ProcessingConfig {
        pub fn deadline(&self) -> Option<Duration> {
            self.deadline_secs.map(Duration::from_secs)
        }
    }

    impl Default for ProcessingConfig {
        fn default() -> Self {
            Self {
                record_policy: RecordPolicy::default(),
                concurrency: NonZeroUsize::new(4).unwrap(),
                deadline_secs: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json5_config() -> anyhow::Result<()> {
        let text = r#"{
            // local dataset mirror
            store: { kind: "Local", root: "/srv/buckets" },
            dataset: {
                bucket: "dataset",
                manifest_key: "data.yaml",
                partitions: { train: "train/", validation: "valid/", test: "test/" },
            },
            output: { bucket: "reports", prefix: "dataset_details" },
            processing: { record_policy: "skip", concurrency: 16 },
        }"#;
        let config: Config = json5::from_str(text)?;

        assert!(matches!(config.store, StoreConfig::Local { ref root } if root == Path::new("/srv/buckets")));
        let count = &config.count;
        assert_eq!(count.dataset.annotation_suffix, ".txt");
        assert_eq!(count.processing.record_policy, RecordPolicy::Skip);
        assert_eq!(count.processing.concurrency.get(), 16);
        assert_eq!(count.processing.deadline(), None);
        assert_eq!(
            count.output.location(),
            ObjectLocation::new("reports", "dataset_details/class_counts.json")
        );
        count.validate()?;
        Ok(())
    }

    #[test]
    fn processing_defaults_to_abort() -> anyhow::Result<()> {
        let config: CountConfig = json5::from_str(
            r#"{
                dataset: {
                    bucket: "d",
                    manifest_key: "data.yaml",
                    partitions: { train: "train/", validation: "valid/", test: "test/" },
                },
                output: { bucket: "o", prefix: "" },
            }"#,
        )?;
        assert_eq!(config.processing.record_policy, RecordPolicy::Abort);
        assert_eq!(config.output.location().key, "class_counts.json");
        Ok(())
    }

    #[test]
    fn output_prefix_with_trailing_slash() {
        let output = OutputConfig {
            bucket: "o".into(),
            prefix: "details/".into(),
            file_name: "class_counts.json".into(),
        };
        assert_eq!(output.location().key, "details/class_counts.json");
    }

    #[test]
    fn empty_bucket_is_rejected() {
        let config = CountConfig {
            dataset: DatasetConfig {
                bucket: "".into(),
                manifest_key: "data.yaml".into(),
                partitions: PartitionsConfig {
                    train: "train/".into(),
                    validation: "valid/".into(),
                    test: "test/".into(),
                },
                annotation_suffix: ".txt".into(),
            },
            output: OutputConfig {
                bucket: "o".into(),
                prefix: "p".into(),
                file_name: "class_counts.json".into(),
            },
            processing: ProcessingConfig::default(),
        };
        assert!(matches!(
            config.validate(),
            Err(CountError::InvalidConfig(_))
        ));
    }
}
