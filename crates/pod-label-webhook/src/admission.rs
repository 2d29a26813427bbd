use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use serde::{Deserialize, Serialize};

use crate::errors::{DecodeError, EncodeError, SerializationError};
use crate::patch::JsonPatch;

pub const ADMISSION_API_VERSION_V1: &str = "admission.k8s.io/v1";
pub const ADMISSION_API_VERSION_V1BETA1: &str = "admission.k8s.io/v1beta1";
pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

const SUPPORTED_API_VERSIONS: [&str; 2] = [ADMISSION_API_VERSION_V1, ADMISSION_API_VERSION_V1BETA1];

/// The AdmissionReview envelope as sent by the API server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
}

/// This models the admission/v1/AdmissionRequest object of Kubernetes.
/// Only the fields relevant to the webhook are kept, everything else is
/// ignored while decoding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    /// Correlation identifier, must be copied verbatim into the response.
    pub uid: String,
    pub kind: GroupVersionKind,
    pub resource: GroupVersionResource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<RawExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_object: Option<RawExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Connect,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully decoded review: the request plus the envelope version the
/// answer has to be written in.
#[derive(Clone, Debug)]
pub struct DecodedReview {
    pub api_version: String,
    pub request: AdmissionRequest,
}

/// Decode the body of an admission webhook call.
///
/// Either a complete request is returned or an error, nothing is defaulted.
pub fn decode(raw: &[u8]) -> Result<DecodedReview, DecodeError> {
    let review: AdmissionReviewRequest = serde_json::from_slice(raw)?;

    let api_version = match review.api_version {
        Some(version) if SUPPORTED_API_VERSIONS.contains(&version.as_str()) => version,
        other => return Err(DecodeError::UnsupportedApiVersion(other)),
    };
    if review.kind.as_deref() != Some(ADMISSION_REVIEW_KIND) {
        return Err(DecodeError::UnexpectedKind(review.kind));
    }

    let request = review.request.ok_or(DecodeError::MissingRequest)?;
    if request.uid.is_empty() {
        return Err(DecodeError::MissingUid);
    }

    Ok(DecodedReview {
        api_version,
        request,
    })
}

/// This models the admission/v1/AdmissionResponse object of Kubernetes
/// See https://pkg.go.dev/k8s.io/kubernetes/pkg/apis/admission#AdmissionResponse
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    /// UID is an identifier for the individual request/response.
    /// This must be copied over from the corresponding AdmissionRequest.
    pub uid: String,

    /// Allowed indicates whether or not the admission request was permitted.
    pub allowed: bool,

    /// The type of Patch. Only "JSONPatch" exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<PatchType>,

    /// The patch body, base64 encoded as Kubernetes does with `[]byte`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    /// Warning messages returned to the requesting API client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    #[default]
    JSONPatch,
}

impl AdmissionResponse {
    /// Admit the request without changing it.
    pub fn allow(uid: String) -> AdmissionResponse {
        AdmissionResponse {
            uid,
            allowed: true,
            ..Default::default()
        }
    }

    /// Admit the request and ask the API server to apply `patch` first.
    /// An empty patch is not sent at all.
    pub fn allow_with_patch(
        uid: String,
        patch: &JsonPatch,
    ) -> Result<AdmissionResponse, SerializationError> {
        if patch.is_empty() {
            return Ok(AdmissionResponse::allow(uid));
        }

        let encoded = general_purpose::STANDARD.encode(patch.to_vec()?);
        Ok(AdmissionResponse {
            uid,
            allowed: true,
            patch_type: Some(PatchType::JSONPatch),
            patch: Some(encoded),
            ..Default::default()
        })
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings
            .get_or_insert_with(Vec::new)
            .push(warning.into());
        self
    }

    /// Decode the patch carried by the response, if any.
    pub fn decoded_patch(&self) -> Option<Vec<u8>> {
        self.patch
            .as_ref()
            .and_then(|p| general_purpose::STANDARD.decode(p).ok())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    pub response: AdmissionResponse,
}

impl AdmissionReviewResponse {
    /// The API server rejects answers whose apiVersion differs from the
    /// one it sent, hence the version is taken from the request.
    pub fn new(api_version: impl Into<String>, response: AdmissionResponse) -> Self {
        AdmissionReviewResponse {
            api_version: Some(api_version.into()),
            kind: Some(String::from(ADMISSION_REVIEW_KIND)),
            response,
        }
    }
}

pub fn encode(review: &AdmissionReviewResponse) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(review)?)
}
