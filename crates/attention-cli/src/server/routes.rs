//! Request handlers.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use attention_core::domain::{flag, AttentionEvent, EventContext, SessionRef};
use attention_core::pipeline::ScoredFrame;
use attention_core::ports::{Delivery, EventSink};
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{ApiError, AppState};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn debug_status(State(state): State<AppState>) -> Json<Value> {
    let runtime = state.pipeline.runtime();
    let training = state.training.borrow().clone();
    Json(json!({
        "model": runtime.status(),
        "detector_loaded": state.pipeline.detector_ready(),
        "active_sessions": state.pipeline.store().len(),
        "sequence_length": runtime.shape().seq_len,
        "training": training,
    }))
}

/// Multipart upload of one webcam frame.
#[derive(Default)]
struct FrameForm {
    file: Option<Bytes>,
    fields: HashMap<String, String>,
}

impl FrameForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                form.file = Some(field.bytes().await.map_err(bad_form)?);
            } else {
                let value = field.text().await.map_err(bad_form)?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// Optional typed field; blank values count as absent.
    fn get<T>(&self, name: &str) -> Result<Option<T>, ApiError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|e| ApiError::BadRequest(format!("invalid {name} '{v}': {e}"))),
        }
    }

    fn flag(&self, name: &str) -> bool {
        self.fields.get(name).is_some_and(|v| {
            v.trim().eq_ignore_ascii_case("true") || flag::from_json(&Value::String(v.clone()))
        })
    }

    fn context(&self) -> Result<EventContext, ApiError> {
        Ok(EventContext {
            phase: self.get("phase")?.unwrap_or(0),
            spinning: self.flag("spinning"),
            time_left: self.get("time_left")?,
            test_name: self
                .fields
                .get("test_name")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

#[allow(clippy::needless_pass_by_value)]
fn bad_form(e: impl Display) -> ApiError {
    ApiError::BadRequest(format!("malformed form: {e}"))
}

pub async fn analyze_frame(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let form = FrameForm::read(multipart.map_err(bad_form)?).await?;

    let session = SessionRef::from_parts(form.get("session_id")?, form.get("diagnostic_session_id")?)?;
    let user_id: i64 = form
        .get("user_id")?
        .ok_or_else(|| ApiError::BadRequest("user_id is required".to_string()))?;
    let context = form.context()?;
    let bytes = form
        .file
        .ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;

    let pipeline = Arc::clone(&state.pipeline);
    let frame_context = context.clone();
    let scored = tokio::task::spawn_blocking(move || -> Result<ScoredFrame, ApiError> {
        let image = image::load_from_memory(&bytes)
            .map_err(|e| ApiError::BadRequest(format!("cannot decode image: {e}")))?;
        pipeline
            .process(session, &image, &frame_context)
            .map_err(|e| ApiError::Detector(format!("{e:#}")))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    let event = scored.to_event(session, user_id, &context);
    let forwarded = forward(state.sink.as_ref(), &event).await?;

    info!(
        %session,
        user_id,
        source = ?scored.decision.source,
        score = ?scored.decision.value,
        forwarded,
        latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Frame scored"
    );

    Ok(Json(json!({
        "ok": true,
        "score": scored.score_result(),
        "frame_score": scored.frame_result(),
        "forwarded": forwarded,
    })))
}

pub async fn forward_event(
    State(state): State<AppState>,
    payload: Result<Json<AttentionEvent>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(event) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let forwarded = forward(state.sink.as_ref(), &event).await?;
    debug!(session = %event.session, user_id = event.user_id, forwarded, "Event relayed");
    Ok(Json(json!({ "ok": true, "forwarded": forwarded })))
}

async fn forward(sink: &dyn EventSink, event: &AttentionEvent) -> Result<bool, ApiError> {
    match sink.send(event).await? {
        Delivery::Accepted => Ok(true),
        Delivery::Disabled => Ok(false),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::time::Duration;

    use attention_core::inference::{ModelRuntime, SequenceShape};
    use attention_core::pipeline::{AttentionPipeline, FeatureExtractor, SessionStore};
    use attention_core::ports::ForwardError;
    use attention_test_support::{
        MockEventSink, MockLandmarkDetector, SinkBehaviour, SyntheticImageBuilder,
        SyntheticLandmarks,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use candle_core::Device;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use super::*;
    use crate::server::{router, TrainingStatus};

    const BOUNDARY: &str = "attention-test-boundary";

    fn state(detector: MockLandmarkDetector, sink: Arc<MockEventSink>) -> AppState {
        let pipeline = AttentionPipeline::new(
            FeatureExtractor::new(Arc::new(detector)),
            Arc::new(SessionStore::new(4, Duration::from_secs(60))),
            Arc::new(ModelRuntime::new(None, SequenceShape::rgb(4, 16), Device::Cpu)),
        );
        let (_tx, rx) = watch::channel(TrainingStatus::Disabled);
        AppState::new(Arc::new(pipeline), sink, rx)
    }

    fn attentive(sink: Arc<MockEventSink>) -> AppState {
        state(MockLandmarkDetector::always(SyntheticLandmarks::attentive()), sink)
    }

    fn frame_request(fields: &[(&str, &str)], file: Option<&[u8]>) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                    .as_bytes(),
            );
        }
        if let Some(bytes) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"frame.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/analyze/frame")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn json_request(uri: &str, value: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(attentive(Arc::new(MockEventSink::accepting())));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_analyze_frame_scores_and_forwards() {
        let sink = Arc::new(MockEventSink::accepting());
        let app = router(attentive(Arc::clone(&sink)));
        let jpeg = SyntheticImageBuilder::jpeg_frame();

        let response = app
            .oneshot(frame_request(
                &[("diagnostic_session_id", "5"), ("user_id", "9"), ("phase", "2"), ("spinning", "0")],
                Some(jpeg.as_slice()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["forwarded"], true);
        assert!(body["score"]["value"].as_f64().unwrap() > 0.9);
        assert_eq!(body["score"]["label"], "attention_sequence_score");
        assert_eq!(body["score"]["data"]["sequence_len"], 1);
        assert!(body["score"]["data"]["temporal_mean"].is_number());
        assert!(body["score"]["data"]["eyes_mean"].is_number());
        assert!(body["score"]["data"]["gaze_mean"].is_number());
        assert_eq!(body["frame_score"]["label"], "attention_score");
        assert!(body["frame_score"]["value"].is_number());
        assert_eq!(body["frame_score"]["data"]["face"], true);
        assert!(body["frame_score"]["data"]["ear"].is_number());
        assert!(body["frame_score"]["data"]["eyes_open"].is_number());
        assert!(body["frame_score"]["data"]["gaze_center"].is_number());
        assert_eq!(body["frame_score"]["data"]["gaze_offset"].as_array().unwrap().len(), 2);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session, SessionRef::Diagnostic(5));
        assert_eq!(events[0].user_id, 9);
        assert_eq!(events[0].data["context"]["phase"], 2);
    }

    #[tokio::test]
    async fn test_disabled_forwarder_reports_not_forwarded() {
        let sink = Arc::new(MockEventSink::new(SinkBehaviour::Disabled));
        let app = router(attentive(sink));
        let jpeg = SyntheticImageBuilder::jpeg_frame();

        let response = app
            .oneshot(frame_request(&[("session_id", "1"), ("user_id", "2")], Some(jpeg.as_slice())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["forwarded"], false);
    }

    #[tokio::test]
    async fn test_no_face_has_null_score() {
        let sink = Arc::new(MockEventSink::accepting());
        let app = router(state(MockLandmarkDetector::no_face(), Arc::clone(&sink)));
        let jpeg = SyntheticImageBuilder::jpeg_frame();

        let response = app
            .oneshot(frame_request(&[("session_id", "1"), ("user_id", "2")], Some(jpeg.as_slice())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["score"]["value"].is_null());
        assert_eq!(body["score"]["label"], "no_face");
        assert_eq!(body["frame_score"]["data"]["face"], false);
        assert_eq!(sink.events()[0].label, "no_face");
    }

    #[tokio::test]
    async fn test_session_contract_is_a_client_error() {
        let jpeg = SyntheticImageBuilder::jpeg_frame();
        for fields in [
            vec![("session_id", "1"), ("diagnostic_session_id", "2"), ("user_id", "3")],
            vec![("user_id", "3")],
        ] {
            let sink = Arc::new(MockEventSink::accepting());
            let app = router(attentive(Arc::clone(&sink)));
            let response = app.oneshot(frame_request(&fields, Some(jpeg.as_slice()))).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await["ok"], false);
            assert!(sink.events().is_empty());
        }
    }

    #[tokio::test]
    async fn test_undecodable_image_is_a_client_error() {
        let app = router(attentive(Arc::new(MockEventSink::accepting())));
        let response = app
            .oneshot(frame_request(&[("session_id", "1"), ("user_id", "2")], Some(b"not an image".as_slice())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["detail"].as_str().unwrap().contains("decode"));
    }

    #[tokio::test]
    async fn test_missing_file_and_bad_numbers_are_client_errors() {
        let app = router(attentive(Arc::new(MockEventSink::accepting())));
        let response = app
            .oneshot(frame_request(&[("session_id", "1"), ("user_id", "2")], None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let app = router(attentive(Arc::new(MockEventSink::accepting())));
        let jpeg = SyntheticImageBuilder::jpeg_frame();
        let response = app
            .oneshot(frame_request(&[("session_id", "one"), ("user_id", "2")], Some(jpeg.as_slice())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_detector_failure_is_unavailable() {
        let app = router(state(
            MockLandmarkDetector::failing("weights missing"),
            Arc::new(MockEventSink::accepting()),
        ));
        let jpeg = SyntheticImageBuilder::jpeg_frame();
        let response = app
            .oneshot(frame_request(&[("session_id", "1"), ("user_id", "2")], Some(jpeg.as_slice())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_backend_failures_map_to_gateway_errors() {
        let jpeg = SyntheticImageBuilder::jpeg_frame();
        for (error, status) in [
            (ForwardError::Status { status: 500 }, StatusCode::BAD_GATEWAY),
            (ForwardError::Transport("refused".into()), StatusCode::BAD_GATEWAY),
            (ForwardError::Timeout { seconds: 10 }, StatusCode::GATEWAY_TIMEOUT),
        ] {
            let sink = Arc::new(MockEventSink::new(SinkBehaviour::Fail(error)));
            let app = router(attentive(sink));
            let response = app
                .oneshot(frame_request(&[("session_id", "1"), ("user_id", "2")], Some(jpeg.as_slice())))
                .await
                .unwrap();
            assert_eq!(response.status(), status);
            assert_eq!(body_json(response).await["ok"], false);
        }
    }

    #[tokio::test]
    async fn test_events_relays_precomputed_event() {
        let sink = Arc::new(MockEventSink::accepting());
        let app = router(attentive(Arc::clone(&sink)));
        let response = app
            .oneshot(json_request(
                "/events",
                &json!({ "session_id": 3, "user_id": 4, "value": 0.7, "label": "external" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ok": true, "forwarded": true }));
        assert_eq!(sink.events()[0].session, SessionRef::Course(3));
    }

    #[tokio::test]
    async fn test_events_rejects_ambiguous_session() {
        let sink = Arc::new(MockEventSink::accepting());
        let app = router(attentive(Arc::clone(&sink)));
        let response = app
            .oneshot(json_request(
                "/events",
                &json!({ "session_id": 3, "diagnostic_session_id": 4, "user_id": 4 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_debug_status_reports_sessions() {
        let state = attentive(Arc::new(MockEventSink::accepting()));
        let jpeg = SyntheticImageBuilder::jpeg_frame();
        router(state.clone())
            .oneshot(frame_request(&[("session_id", "1"), ("user_id", "2")], Some(jpeg.as_slice())))
            .await
            .unwrap();

        let response = router(state)
            .oneshot(Request::builder().uri("/debug/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["active_sessions"], 1);
        assert_eq!(body["sequence_length"], 4);
        assert_eq!(body["model"]["loaded"], false);
        assert_eq!(body["detector_loaded"], true);
        assert_eq!(body["training"]["state"], "disabled");
    }
}
