use thiserror::Error;

/// Reasons why the bytes sent by the API server cannot be turned into an
/// admission request. Every variant maps to a `400 Bad Request`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("could not deserialize request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported AdmissionReview apiVersion: {0:?}")]
    UnsupportedApiVersion(Option<String>),

    #[error("unexpected object kind: {0:?}, expected AdmissionReview")]
    UnexpectedKind(Option<String>),

    #[error("malformed admission review: request is nil")]
    MissingRequest,

    #[error("malformed admission review: request uid is empty")]
    MissingUid,
}

#[derive(Debug, Error)]
#[error("cannot serialize AdmissionReview response: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// The object embedded into the admission request cannot be used as a pod.
#[derive(Debug, Error)]
pub enum ResourceParseError {
    #[error("admission request does not carry an object")]
    MissingObject,

    #[error("admission request targets a {0}, not a Pod")]
    NotAPod(String),

    #[error("could not unmarshal pod on admission request: {0}")]
    InvalidPod(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("could not marshal JSON patch: {0}")]
pub struct SerializationError(#[from] pub serde_json::Error);
