//! Adapters between external invocations and the counting pipeline.
//!
//! Both adapters only translate parameters into a [CountConfig] and the run
//! outcome into an [InvocationResult].

use crate::{
    common::*,
    config::{
        CountConfig, DatasetConfig, OutputConfig, PartitionsConfig, ProcessingConfig,
        RecordPolicy,
    },
    error::CountError,
    pipeline::{self, RunReport},
    store::ObjectStore,
};

pub use direct::*;
pub use event::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationStatus {
    Success,
    Error,
}

/// The result value returned to the invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub status: InvocationStatus,
    pub message: String,
}

impl InvocationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: InvocationStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: InvocationStatus::Error,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Success
    }

    fn from_run(result: Result<RunReport, CountError>) -> Self {
        match result {
            Ok(report) => Self::success(format!("Data saved to {}", report.output)),
            Err(err) => {
                let kind: &str = err.as_ref();
                let kind = kind.to_string();
                let message = format!("{:#}", anyhow::Error::from(err));
                error!("{}: {}", kind, message);
                Self::error(message)
            }
        }
    }
}

mod direct {
    use super::*;

    /// Run the pipeline with an explicit configuration.
    pub async fn invoke(store: &dyn ObjectStore, config: &CountConfig) -> InvocationResult {
        InvocationResult::from_run(pipeline::run(store, config).await)
    }
}

mod event {
    use super::*;

    const DEFAULT_TRAIN_PREFIX: &str = "train/";
    const DEFAULT_VAL_PREFIX: &str = "valid/";
    const DEFAULT_TEST_PREFIX: &str = "test/";
    const DEFAULT_MANIFEST_KEY: &str = "data.yaml";
    const DEFAULT_OUTPUT_PREFIX: &str = "dataset_details";

    /// The parameters delivered by an event trigger.
    ///
    /// Only the two buckets are required. Missing prefixes and keys fall back
    /// to the conventional YOLO dataset layout.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct InvocationEvent {
        pub bucket_name: Option<String>,
        pub train_prefix: Option<String>,
        pub val_prefix: Option<String>,
        pub test_prefix: Option<String>,
        pub yaml_key: Option<String>,
        pub output_bucket: Option<String>,
        pub output_prefix: Option<String>,
        /// Skip malformed label records instead of failing the run.
        pub skip_malformed: bool,
    }

    impl InvocationEvent {
        /// Build the pipeline configuration, or `None` if a bucket is
        /// missing.
        pub fn into_config(self) -> Option<CountConfig> {
            let Self {
                bucket_name,
                train_prefix,
                val_prefix,
                test_prefix,
                yaml_key,
                output_bucket,
                output_prefix,
                skip_malformed,
            } = self;

            let bucket = bucket_name.filter(|name| !name.is_empty())?;
            let output_bucket = output_bucket.filter(|name| !name.is_empty())?;
            let or_default =
                |value: Option<String>, default: &str| value.unwrap_or_else(|| default.into());

            let record_policy = if skip_malformed {
                RecordPolicy::Skip
            } else {
                RecordPolicy::Abort
            };

            Some(CountConfig {
                dataset: DatasetConfig {
                    bucket,
                    manifest_key: or_default(yaml_key, DEFAULT_MANIFEST_KEY),
                    partitions: PartitionsConfig {
                        train: or_default(train_prefix, DEFAULT_TRAIN_PREFIX),
                        validation: or_default(val_prefix, DEFAULT_VAL_PREFIX),
                        test: or_default(test_prefix, DEFAULT_TEST_PREFIX),
                    },
                    annotation_suffix: ".txt".into(),
                },
                output: OutputConfig {
                    bucket: output_bucket,
                    prefix: or_default(output_prefix, DEFAULT_OUTPUT_PREFIX),
                    file_name: "class_counts.json".into(),
                },
                processing: ProcessingConfig {
                    record_policy,
                    ..Default::default()
                },
            })
        }
    }

    /// Handle one trigger event.
    pub async fn handle_event(
        store: &dyn ObjectStore,
        event: InvocationEvent,
    ) -> InvocationResult {
        match event.into_config() {
            Some(config) => invoke(store, &config).await,
            None => InvocationResult::error("Missing required bucket parameters."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_defaults() {
        let event: InvocationEvent = serde_json::from_str(
            r#"{ "bucket_name": "dataset", "output_bucket": "reports" }"#,
        )
        .unwrap();
        let config = event.into_config().unwrap();

        assert_eq!(config.dataset.manifest_key, "data.yaml");
        assert_eq!(config.dataset.partitions.train, "train/");
        assert_eq!(config.dataset.partitions.validation, "valid/");
        assert_eq!(config.dataset.partitions.test, "test/");
        assert_eq!(
            config.output.location().to_string(),
            "reports/dataset_details/class_counts.json"
        );
        assert_eq!(config.processing.record_policy, RecordPolicy::Abort);
    }

    #[test]
    fn event_without_buckets() {
        let event = InvocationEvent {
            bucket_name: Some("dataset".into()),
            output_bucket: Some("".into()),
            ..Default::default()
        };
        assert!(event.into_config().is_none());
    }

    #[test]
    fn result_serialization() -> anyhow::Result<()> {
        let result = InvocationResult::success("Data saved to reports/class_counts.json");
        assert_eq!(
            serde_json::to_value(&result)?,
            serde_json::json!({
                "status": "Success",
                "message": "Data saved to reports/class_counts.json",
            })
        );
        Ok(())
    }
}
