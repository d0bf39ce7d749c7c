//! The class manifest, the YAML document mapping class ids to names.

use crate::{common::*, error::CountError, store::ObjectStore, ObjectLocation};
use anyhow::bail;

/// The ordered list of class names. The position of a name is its class id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassManifest {
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    nc: Option<usize>,
    names: ManifestNames,
}

/// YOLO dataset files list names either as a sequence or as an
/// index-to-name mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

impl ClassManifest {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Look up the name of a class id. Negative and too large ids have no
    /// name.
    pub fn name(&self, class_id: i64) -> Option<&str> {
        let index = usize::try_from(class_id).ok()?;
        self.names.get(index).map(String::as_str)
    }

    /// Parse the manifest document.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let ManifestDocument { nc, names } =
            serde_yaml::from_str(text).context("invalid manifest document")?;

        let names = match names {
            ManifestNames::Sequence(names) => names,
            ManifestNames::Mapping(mapping) => {
                let dense = mapping
                    .keys()
                    .enumerate()
                    .all(|(expect, &index)| expect == index);
                if !dense {
                    bail!(
                        "class indices {:?} are not contiguous from 0",
                        mapping.keys().collect::<Vec<_>>()
                    );
                }
                mapping.into_values().collect()
            }
        };

        if let Some(nc) = nc {
            if nc != names.len() {
                warn!(
                    "manifest declares nc = {}, but lists {} class names",
                    nc,
                    names.len()
                );
            }
        }

        Ok(Self { names })
    }

    /// Fetch and parse the manifest at `location`.
    ///
    /// The document is staged in a temporary file that is removed before
    /// returning.
    pub async fn load(
        store: &dyn ObjectStore,
        location: &ObjectLocation,
    ) -> Result<Self, CountError> {
        let temp = NamedTempFile::new()
            .context("failed to create a temporary file for the class manifest")?;

        store
            .download(location, temp.path())
            .await
            .map_err(|source| CountError::ManifestNotFound {
                location: location.clone(),
                source,
            })?;

        let malformed = |reason: String| CountError::ManifestMalformed {
            location: location.clone(),
            reason,
        };
        let text = tokio::fs::read_to_string(temp.path())
            .await
            .map_err(|err| malformed(err.to_string()))?;
        let manifest = Self::parse(&text).map_err(|err| malformed(format!("{:#}", err)))?;

        info!(
            "loaded {} class names from '{}'",
            manifest.len(),
            location
        );
        Ok(manifest)
    }
}
