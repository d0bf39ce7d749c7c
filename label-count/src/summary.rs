//! The summary document and its publication.

use crate::{
    aggregate::ClassCounts, common::*, error::CountError, manifest::ClassManifest,
    store::ObjectStore, ObjectLocation,
};
use serde_json::ser::{PrettyFormatter, Serializer};

/// The published summary.
///
/// `total_classes` is the manifest size, which may exceed the number of
/// entries in `class_counts` since classes without annotations are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub total_classes: usize,
    pub class_counts: ClassCounts,
}

impl SummaryRecord {
    pub fn new(manifest: &ClassManifest, class_counts: ClassCounts) -> Self {
        Self {
            total_classes: manifest.len(),
            class_counts,
        }
    }

    /// Encode as JSON indented by four spaces.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut buf = vec![];
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(buf)
    }

    /// Write the document to `location`.
    ///
    /// The document is staged in a temporary file and uploaded as a whole.
    pub async fn publish(
        &self,
        store: &dyn ObjectStore,
        location: &ObjectLocation,
    ) -> Result<(), CountError> {
        let json = self
            .to_json()
            .context("failed to serialize the summary")?;
        let temp = NamedTempFile::new()
            .context("failed to create a temporary file for the summary")?;
        tokio::fs::write(temp.path(), &json)
            .await
            .context("failed to stage the summary")?;

        store
            .upload(temp.path(), location)
            .await
            .map_err(|source| CountError::PublishFailed {
                location: location.clone(),
                source,
            })?;

        info!("class counts saved to '{}'", location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn document_shape() -> anyhow::Result<()> {
        let manifest = ClassManifest::new(["cat", "dog"]);
        let counts: ClassCounts = [("dog", 1), ("cat", 1)].into_iter().collect();
        let summary = SummaryRecord::new(&manifest, counts);

        let json = String::from_utf8(summary.to_json()?)?;
        assert_eq!(
            json,
            "{\n    \"total_classes\": 2,\n    \"class_counts\": {\n        \"cat\": 1,\n        \"dog\": 1\n    }\n}"
        );
        Ok(())
    }

    #[test]
    fn zero_count_classes_are_absent() -> anyhow::Result<()> {
        // intentional: total_classes follows the manifest while class_counts
        // only lists classes that were seen
        let manifest = ClassManifest::new(["cat", "dog", "bird"]);
        let counts: ClassCounts = [("dog", 4)].into_iter().collect();
        let summary = SummaryRecord::new(&manifest, counts);

        let value: serde_json::Value = serde_json::from_slice(&summary.to_json()?)?;
        assert_eq!(
            value,
            serde_json::json!({ "total_classes": 3, "class_counts": { "dog": 4 } })
        );
        Ok(())
    }

    #[tokio::test]
    async fn publish_writes_whole_document() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let summary = SummaryRecord::new(&ClassManifest::new(["cat"]), ClassCounts::new());
        let location = ObjectLocation::new("reports", "dataset_details/class_counts.json");
        summary.publish(&store, &location).await?;

        let body = store
            .object("reports", "dataset_details/class_counts.json")
            .expect("summary should be written");
        assert_eq!(body, summary.to_json()?);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_write_is_publish_failure() {
        let store = MemoryStore::new();
        store.set_reject_puts(true);
        let summary = SummaryRecord::new(&ClassManifest::new(["cat"]), ClassCounts::new());
        let location = ObjectLocation::new("reports", "class_counts.json");

        let err = summary.publish(&store, &location).await.unwrap_err();
        assert!(matches!(err, CountError::PublishFailed { .. }));
        assert_eq!(store.object("reports", "class_counts.json"), None);
    }
}
