use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use k8s_openapi::api::core::v1::Pod;
use tokio::task::{self, JoinHandle};
use tracing::{Span, debug, error, info, warn};

use crate::admission::{
    self, AdmissionRequest, AdmissionResponse, AdmissionReviewResponse, DecodedReview,
};
use crate::api::api_error::ApiError;
use crate::errors::{DecodeError, ResourceParseError};
use crate::patch::{JsonPatch, PatchOperation};

/// Label added to every pod that goes through the webhook.
pub const MARKER_LABEL_KEY: &str = "mutating-webhook";
pub const MARKER_LABEL_VALUE: &str = "pod was mutated";

const POD_KIND: &str = "Pod";

/// Settings of the mutation handler, fixed for the lifetime of the process.
#[derive(Clone, Debug)]
pub struct MutationSettings {
    /// Maximum time spent computing a patch. `None` disables the deadline.
    pub mutation_timeout: Option<Duration>,
}

impl Default for MutationSettings {
    fn default() -> Self {
        MutationSettings {
            mutation_timeout: Some(Duration::from_secs(2)),
        }
    }
}

/// Turns AdmissionReview requests into AdmissionReview responses that add
/// the marker label to pods.
///
/// The handler never denies a request. When the embedded object cannot be
/// mutated the request is admitted unchanged and a warning is attached to
/// the response.
#[derive(Clone, Debug, Default)]
pub struct MutationHandler {
    settings: MutationSettings,
}

impl MutationHandler {
    pub fn new(settings: MutationSettings) -> Self {
        MutationHandler { settings }
    }

    /// Process the raw body of an admission call, returning the HTTP status
    /// and body to send back.
    pub fn handle(&self, raw: &[u8]) -> (StatusCode, Vec<u8>) {
        let review = match decode_review(raw) {
            Ok(review) => review,
            Err(response) => return response,
        };
        let response = self.review(&review.request);
        encode_review(&review.api_version, response)
    }

    /// Like [`MutationHandler::handle`], but the mutation runs on the
    /// blocking pool and is abandoned once the configured deadline expires.
    /// An expired deadline admits the request without mutation.
    pub async fn handle_with_deadline(self: Arc<Self>, raw: Bytes) -> (StatusCode, Vec<u8>) {
        let review = match decode_review(&raw) {
            Ok(review) => review,
            Err(response) => return response,
        };
        let DecodedReview {
            api_version,
            request,
        } = review;
        let uid = request.uid.clone();

        let span = Span::current();
        let handler = self.clone();
        let mutation = task::spawn_blocking(move || {
            let _enter = span.enter();
            handler.review(&request)
        });

        let response = await_review(self.settings.mutation_timeout, uid, mutation).await;
        encode_review(&api_version, response)
    }

    /// Compute the admission response for an already decoded request.
    ///
    /// This never fails: problems with the embedded object are logged and
    /// turned into an "allow, unchanged" answer.
    pub fn review(&self, request: &AdmissionRequest) -> AdmissionResponse {
        populate_span_with_admission_request_data(request);
        info!(
            kind = %request.kind.kind,
            operation = %request.operation,
            name = request.name.as_deref().unwrap_or_default(),
            "reviewing admission request"
        );

        let pod = match parse_pod(request) {
            Ok(pod) => pod,
            Err(e) => {
                warn!(error = %e, "pod admitted without changes");
                let response = AdmissionResponse::allow(request.uid.clone())
                    .with_warning(format!("pod not mutated: {e}"));
                populate_span_with_mutation_results(&response);
                return response;
            }
        };

        let patch = label_patch(pod);
        let response = match AdmissionResponse::allow_with_patch(request.uid.clone(), &patch) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "pod admitted without changes");
                AdmissionResponse::allow(request.uid.clone())
            }
        };

        populate_span_with_mutation_results(&response);
        response
    }
}

/// Wait for a running review, admitting the pod unchanged when the review
/// outlives `deadline` or its task dies.
async fn await_review(
    deadline: Option<Duration>,
    uid: String,
    mutation: JoinHandle<AdmissionResponse>,
) -> AdmissionResponse {
    let outcome = match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, mutation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    timeout_ms = deadline.as_millis() as u64,
                    "mutation deadline exceeded, admitting pod unchanged"
                );
                return AdmissionResponse::allow(uid)
                    .with_warning("mutating webhook timed out, pod admitted without changes");
            }
        },
        None => mutation.await,
    };

    outcome.unwrap_or_else(|e| {
        error!(error = %e, "mutation task failed, admitting pod unchanged");
        AdmissionResponse::allow(uid)
            .with_warning("mutating webhook failed, pod admitted without changes")
    })
}

/// Extract the pod embedded into the admission request.
pub fn parse_pod(request: &AdmissionRequest) -> Result<Pod, ResourceParseError> {
    if request.kind.kind != POD_KIND || !request.kind.group.is_empty() {
        return Err(ResourceParseError::NotAPod(request.kind.to_string()));
    }
    let object = request
        .object
        .as_ref()
        .ok_or(ResourceParseError::MissingObject)?;

    serde_json::from_value(object.0.clone()).map_err(ResourceParseError::InvalidPod)
}

/// Labels of the pod once the marker label has been set. A pod without
/// labels gets a brand new mapping.
pub fn mutated_labels(pod: Pod) -> BTreeMap<String, String> {
    let mut labels = pod.metadata.labels.unwrap_or_default();
    labels.insert(MARKER_LABEL_KEY.to_owned(), MARKER_LABEL_VALUE.to_owned());
    labels
}

/// Build the patch replacing the whole label mapping of `pod`.
pub fn label_patch(pod: Pod) -> JsonPatch {
    JsonPatch::from(vec![PatchOperation::replace_labels(mutated_labels(pod))])
}

fn decode_review(raw: &[u8]) -> Result<DecodedReview, (StatusCode, Vec<u8>)> {
    debug!(request = %String::from_utf8_lossy(raw), "admission review received");

    admission::decode(raw).map_err(|e: DecodeError| {
        warn!(error = %e, "bad AdmissionReview request");
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        }
        .into_parts()
    })
}

fn encode_review(api_version: &str, response: AdmissionResponse) -> (StatusCode, Vec<u8>) {
    let review = AdmissionReviewResponse::new(api_version, response);
    match admission::encode(&review) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "cannot encode AdmissionReview response");
            ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Something went wrong".to_owned(),
            }
            .into_parts()
        }
    }
}

fn populate_span_with_admission_request_data(request: &AdmissionRequest) {
    let span = Span::current();
    span.record("request_uid", request.uid.as_str());
    span.record("kind", request.kind.kind.as_str());
    span.record("name", request.name.as_deref().unwrap_or_default());
    span.record("namespace", request.namespace.as_deref().unwrap_or_default());
    span.record("operation", request.operation.as_str());
}

fn populate_span_with_mutation_results(response: &AdmissionResponse) {
    Span::current().record("allowed", response.allowed);
    Span::current().record("mutated", response.patch.is_some());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{ADMISSION_API_VERSION_V1, PatchType};
    use crate::patch::PatchValue;
    use rstest::*;
    use serde_json::json;

    fn review_body(uid: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": ADMISSION_API_VERSION_V1,
            "kind": "AdmissionReview",
            "request": {
                "uid": uid,
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "name": "nginx-pod",
                "namespace": "default",
                "operation": "CREATE",
                "object": object
            }
        }))
        .unwrap()
    }

    fn pod(labels: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "nginx-pod", "labels": labels},
            "spec": {"containers": [{"name": "nginx", "image": "nginx:1.27"}]}
        })
    }

    fn response_of(body: &[u8]) -> AdmissionReviewResponse {
        serde_json::from_slice(body).expect("response should be an AdmissionReview")
    }

    fn labels_in_patch(response: &AdmissionResponse) -> BTreeMap<String, String> {
        let patch: JsonPatch =
            serde_json::from_slice(&response.decoded_patch().expect("patch expected")).unwrap();
        assert_eq!(patch.0.len(), 1);
        match &patch.0[0] {
            PatchOperation::Add {
                path,
                value: PatchValue::Labels(labels),
            } => {
                assert_eq!(path, "/metadata/labels");
                labels.clone()
            }
        }
    }

    #[test]
    fn nginx_pod_scenario() {
        let handler = MutationHandler::default();
        let body = review_body("abc-123", pod(json!({"app": "nginx"})));

        let (status, out) = handler.handle(&body);

        assert_eq!(status, StatusCode::OK);
        let review = response_of(&out);
        assert_eq!(review.api_version.as_deref(), Some(ADMISSION_API_VERSION_V1));
        assert_eq!(review.kind.as_deref(), Some("AdmissionReview"));
        assert_eq!(review.response.uid, "abc-123");
        assert!(review.response.allowed);
        assert_eq!(review.response.patch_type, Some(PatchType::JSONPatch));

        let patch: serde_json::Value =
            serde_json::from_slice(&review.response.decoded_patch().unwrap()).unwrap();
        assert_eq!(
            patch,
            json!([{
                "op": "add",
                "path": "/metadata/labels",
                "value": {"app": "nginx", "mutating-webhook": "pod was mutated"}
            }])
        );
    }

    #[rstest]
    #[case::null_labels(json!(null))]
    #[case::empty_labels(json!({}))]
    fn pod_without_labels_gets_only_the_marker(#[case] labels: serde_json::Value) {
        let handler = MutationHandler::default();
        let (status, out) = handler.handle(&review_body("uid", pod(labels)));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            labels_in_patch(&response_of(&out).response),
            BTreeMap::from([(MARKER_LABEL_KEY.to_owned(), MARKER_LABEL_VALUE.to_owned())])
        );
    }

    #[test]
    fn pod_without_metadata_labels_key() {
        let handler = MutationHandler::default();
        let object = json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"generateName": "web-"}});

        let (status, out) = handler.handle(&review_body("uid", object));

        assert_eq!(status, StatusCode::OK);
        assert_eq!(labels_in_patch(&response_of(&out).response).len(), 1);
    }

    #[test]
    fn existing_labels_are_preserved_and_marker_overwritten() {
        let handler = MutationHandler::default();
        let labels = json!({
            "app.kubernetes.io/name": "web",
            "tier": "frontend",
            "mutating-webhook": "stale"
        });

        let (_, out) = handler.handle(&review_body("uid", pod(labels)));

        let labels = labels_in_patch(&response_of(&out).response);
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["app.kubernetes.io/name"], "web");
        assert_eq!(labels["tier"], "frontend");
        assert_eq!(labels[MARKER_LABEL_KEY], MARKER_LABEL_VALUE);
    }

    #[rstest]
    #[case::not_json(b"{not json".to_vec())]
    #[case::missing_request(br#"{"apiVersion":"admission.k8s.io/v1","kind":"AdmissionReview"}"#.to_vec())]
    fn malformed_envelope_is_a_bad_request(#[case] body: Vec<u8>) {
        let handler = MutationHandler::default();

        let (status, out) = handler.handle(&body);

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(error["status"], 400);
        assert!(error["message"].is_string());
    }

    #[test]
    fn unparsable_pod_is_admitted_unchanged() {
        let handler = MutationHandler::default();
        let object = json!({"apiVersion": "v1", "kind": "Pod", "metadata": {"labels": "not-a-map"}});

        let (status, out) = handler.handle(&review_body("uid-1", object));

        assert_eq!(status, StatusCode::OK);
        let review = response_of(&out);
        assert_eq!(review.response.uid, "uid-1");
        assert!(review.response.allowed);
        assert!(review.response.patch.is_none());
        assert_eq!(review.response.warnings.map(|w| w.len()), Some(1));
    }

    #[test]
    fn request_without_object_is_admitted_unchanged() {
        let handler = MutationHandler::default();
        let body = serde_json::to_vec(&json!({
            "apiVersion": ADMISSION_API_VERSION_V1,
            "kind": "AdmissionReview",
            "request": {
                "uid": "uid-2",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "operation": "DELETE",
                "object": null
            }
        }))
        .unwrap();

        let (status, out) = handler.handle(&body);

        assert_eq!(status, StatusCode::OK);
        let review = response_of(&out);
        assert!(review.response.allowed);
        assert!(review.response.patch.is_none());
    }

    #[test]
    fn non_pod_objects_are_not_mutated() {
        let mut request: AdmissionRequest = serde_json::from_value(json!({
            "uid": "uid-3",
            "kind": {"group": "apps", "version": "v1", "kind": "Deployment"},
            "resource": {"group": "apps", "version": "v1", "resource": "deployments"},
            "operation": "CREATE",
            "object": {"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {}}
        }))
        .unwrap();

        assert!(matches!(
            parse_pod(&request),
            Err(ResourceParseError::NotAPod(kind)) if kind == "apps/v1/Deployment"
        ));

        request.uid = "uid-4".to_owned();
        let response = MutationHandler::default().review(&request);
        assert_eq!(response.uid, "uid-4");
        assert!(response.allowed);
        assert!(response.patch.is_none());
    }

    #[test]
    fn pod_kind_from_another_group_is_not_mutated() {
        let request: AdmissionRequest = serde_json::from_value(json!({
            "uid": "uid-5",
            "kind": {"group": "example.com", "version": "v1", "kind": "Pod"},
            "resource": {"group": "example.com", "version": "v1", "resource": "pods"},
            "operation": "CREATE",
            "object": pod(json!({"app": "nginx"}))
        }))
        .unwrap();

        assert!(matches!(
            parse_pod(&request),
            Err(ResourceParseError::NotAPod(kind)) if kind == "example.com/v1/Pod"
        ));

        let response = MutationHandler::default().review(&request);
        assert_eq!(response.uid, "uid-5");
        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert_eq!(response.warnings.map(|w| w.len()), Some(1));
    }

    #[test]
    fn mutated_labels_on_pod_without_labels() {
        let labels = mutated_labels(Pod::default());

        assert_eq!(
            labels,
            BTreeMap::from([(MARKER_LABEL_KEY.to_owned(), MARKER_LABEL_VALUE.to_owned())])
        );
    }

    #[tokio::test]
    async fn handle_with_deadline_matches_handle() {
        let handler = Arc::new(MutationHandler::default());
        let body = review_body("abc-123", pod(json!({"app": "nginx"})));

        let (status, out) = handler
            .clone()
            .handle_with_deadline(Bytes::from(body.clone()))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            labels_in_patch(&response_of(&out).response),
            labels_in_patch(&response_of(&handler.handle(&body).1).response)
        );
    }

    #[tokio::test]
    async fn handle_with_deadline_without_timeout() {
        let handler = Arc::new(MutationHandler::new(MutationSettings {
            mutation_timeout: None,
        }));
        let body = review_body("abc-123", pod(json!(null)));

        let (status, out) = handler.handle_with_deadline(Bytes::from(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response_of(&out).response.uid, "abc-123");
    }

    #[tokio::test]
    async fn handle_with_deadline_rejects_malformed_envelope() {
        let handler = Arc::new(MutationHandler::default());

        let (status, _) = handler
            .handle_with_deadline(Bytes::from_static(b"\x00\x01"))
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_review_is_admitted_unchanged_once_deadline_expires() {
        let mutation = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            let pod = serde_json::from_value(pod(json!({"app": "nginx"}))).unwrap();
            AdmissionResponse::allow_with_patch("abc-123".to_owned(), &label_patch(pod)).unwrap()
        });

        let response =
            await_review(Some(Duration::from_secs(2)), "abc-123".to_owned(), mutation).await;
        let (status, out) = encode_review(ADMISSION_API_VERSION_V1, response);

        assert_eq!(status, StatusCode::OK);
        let review = response_of(&out);
        assert_eq!(review.response.uid, "abc-123");
        assert!(review.response.allowed);
        assert!(review.response.patch.is_none());
        assert_eq!(review.response.warnings.map(|w| w.len()), Some(1));
    }

    #[rstest]
    #[case::with_deadline(Some(Duration::from_secs(2)))]
    #[case::without_deadline(None)]
    #[tokio::test]
    async fn failed_review_task_is_admitted_unchanged(#[case] deadline: Option<Duration>) {
        let mutation = tokio::spawn(std::future::pending::<AdmissionResponse>());
        mutation.abort();

        let response = await_review(deadline, "abc-123".to_owned(), mutation).await;

        assert_eq!(response.uid, "abc-123");
        assert!(response.allowed);
        assert!(response.patch.is_none());
        assert_eq!(response.warnings.map(|w| w.len()), Some(1));
    }
}
