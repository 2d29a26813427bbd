use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::SerializationError;

/// JSON pointer to the label mapping of a Kubernetes object.
pub const LABELS_PATH: &str = "/metadata/labels";

/// Value carried by a patch operation.
///
/// Kubernetes accepts any JSON document as the value of an RFC 6902
/// operation; the webhook only ever replaces a whole string mapping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PatchValue {
    Labels(BTreeMap<String, String>),
}

/// A single RFC 6902 operation.
///
/// `add` on a member that already exists replaces its value, which is how
/// the whole label mapping gets swapped in one step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Add { path: String, value: PatchValue },
}

impl PatchOperation {
    pub fn replace_labels(labels: BTreeMap<String, String>) -> Self {
        PatchOperation::Add {
            path: LABELS_PATH.to_owned(),
            value: PatchValue::Labels(labels),
        }
    }
}

/// Ordered list of operations, applied by the API server in sequence.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct JsonPatch(pub Vec<PatchOperation>);

impl JsonPatch {
    pub fn to_vec(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<PatchOperation>> for JsonPatch {
    fn from(operations: Vec<PatchOperation>) -> Self {
        JsonPatch(operations)
    }
}
