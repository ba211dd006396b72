use super::*;
use std::{sync::Mutex as StdMutex, time::Duration};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde_json::json;
use tokio::{
    net::TcpListener,
    sync::{Barrier, Mutex},
};

use crate::form::SelectedFile;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CapturedPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Clone, Default)]
struct CaptureState {
    requests: Arc<Mutex<Vec<Vec<CapturedPart>>>>,
}

#[derive(Default)]
struct RecordingSink {
    logs: StdMutex<Vec<Value>>,
    errors: StdMutex<Vec<String>>,
}

impl RecordingSink {
    fn logs(&self) -> Vec<Value> {
        self.logs.lock().expect("logs").clone()
    }

    fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("errors").clone()
    }
}

impl DiagnosticSink for RecordingSink {
    fn log(&self, _submission_id: SubmissionId, value: &Value) {
        self.logs.lock().expect("logs").push(value.clone());
    }

    fn error(&self, _submission_id: SubmissionId, error: &SubmitError) {
        self.errors.lock().expect("errors").push(error.to_string());
    }
}

async fn read_parts(mut multipart: Multipart) -> Vec<CapturedPart> {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.expect("field bytes").to_vec();
        parts.push(CapturedPart {
            name,
            file_name,
            content_type,
            data,
        });
    }
    parts
}

async fn handle_process(State(state): State<CaptureState>, multipart: Multipart) -> Json<Value> {
    let parts = read_parts(multipart).await;
    state.requests.lock().await.push(parts);
    Json(json!({ "status": "ok" }))
}

async fn spawn_router(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn spawn_process_server() -> (String, CaptureState) {
    let state = CaptureState::default();
    let app = Router::new()
        .route("/process", post(handle_process))
        .with_state(state.clone());
    (spawn_router(app).await, state)
}

fn local_client() -> Client {
    Client::builder().no_proxy().build().expect("http client")
}

fn handler_with_sink(server_url: &str) -> (SubmitHandler, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let handler = SubmitHandler::new(server_url, FormElements::new())
        .expect("handler")
        .with_http_client(local_client())
        .with_sink(sink.clone());
    (handler, sink)
}

#[test]
fn endpoint_resolves_against_server_origin() {
    let handler = SubmitHandler::new("http://localhost:5000", FormElements::new()).expect("handler");
    assert_eq!(handler.endpoint().as_str(), "http://localhost:5000/process");

    let nested =
        SubmitHandler::new("http://localhost:5000/app/index.html", FormElements::new())
            .expect("handler");
    assert_eq!(nested.endpoint().as_str(), "http://localhost:5000/process");
}

#[test]
fn invalid_server_url_is_rejected_up_front() {
    let err = SubmitHandler::new("not a url", FormElements::new())
        .err()
        .expect("must fail");
    assert!(matches!(err, SubmitError::InvalidEndpoint { .. }));
}

#[tokio::test]
async fn submit_posts_file_and_subject_name_parts() {
    let (server_url, state) = spawn_process_server().await;
    let (handler, sink) = handler_with_sink(&server_url);
    handler
        .form()
        .file_input
        .select(SelectedFile::from_bytes("attendance.xlsx", b"sheet-bytes".to_vec()));
    handler.form().subject_name.set_value("Physics");

    let mut event = handler.form().submit_event();
    let task = handler.on_submit(&mut event).expect("handled");
    assert!(event.default_prevented());
    task.await.expect("task");

    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 1);
    let parts = &requests[0];
    assert_eq!(parts.len(), 2);

    assert_eq!(parts[0].name, "file");
    assert_eq!(parts[0].file_name.as_deref(), Some("attendance.xlsx"));
    assert_eq!(
        parts[0].content_type.as_deref(),
        Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
    );
    assert_eq!(parts[0].data, b"sheet-bytes".to_vec());

    assert_eq!(parts[1].name, "subjectName");
    assert_eq!(parts[1].file_name, None);
    assert_eq!(parts[1].data, b"Physics".to_vec());

    assert_eq!(sink.logs(), vec![json!({ "status": "ok" })]);
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn submit_without_file_still_sends_subject_name() {
    let (server_url, state) = spawn_process_server().await;
    let (handler, sink) = handler_with_sink(&server_url);

    let mut event = handler.form().submit_event();
    handler
        .on_submit(&mut event)
        .expect("handled")
        .await
        .expect("task");
    assert!(event.default_prevented());

    let requests = state.requests.lock().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        vec![CapturedPart {
            name: "subjectName".to_string(),
            file_name: None,
            content_type: None,
            data: Vec::new(),
        }]
    );
    assert_eq!(sink.logs().len(), 1);
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn submit_reads_form_state_at_event_time() {
    let (server_url, state) = spawn_process_server().await;
    let (handler, _sink) = handler_with_sink(&server_url);
    handler.form().subject_name.set_value("maths");

    let mut event = handler.form().submit_event();
    let task = handler.on_submit(&mut event).expect("handled");
    handler.form().subject_name.set_value("history");
    task.await.expect("task");

    let requests = state.requests.lock().await;
    assert_eq!(requests[0][0].data, b"maths".to_vec());
}

#[tokio::test]
async fn events_for_other_forms_are_ignored() {
    let (server_url, state) = spawn_process_server().await;
    let (handler, sink) = handler_with_sink(&server_url);

    let mut event = SubmitEvent::new("search-form");
    assert!(handler.on_submit(&mut event).is_none());
    assert!(!event.default_prevented());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(state.requests.lock().await.is_empty());
    assert!(sink.logs().is_empty());
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn error_status_with_json_body_is_logged_not_errored() {
    let app = Router::new().route(
        "/process",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "File or subject name missing" })),
            )
        }),
    );
    let server_url = spawn_router(app).await;
    let (handler, sink) = handler_with_sink(&server_url);

    let mut event = handler.form().submit_event();
    handler
        .on_submit(&mut event)
        .expect("handled")
        .await
        .expect("task");

    assert_eq!(
        sink.logs(),
        vec![json!({ "message": "File or subject name missing" })]
    );
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn non_json_response_goes_to_error_stream() {
    let app = Router::new().route(
        "/process",
        post(|| async { (StatusCode::OK, "<html>not json</html>").into_response() }),
    );
    let server_url = spawn_router(app).await;
    let (handler, sink) = handler_with_sink(&server_url);

    let err = handler
        .dispatch(Submission::new(None, "chemistry"))
        .await
        .expect_err("must fail");
    assert!(matches!(err, SubmitError::Decode { status: 200, .. }));
    assert!(!err.is_transport());

    let mut event = handler.form().submit_event();
    handler
        .on_submit(&mut event)
        .expect("handled")
        .await
        .expect("task");
    assert!(sink.logs().is_empty());
    assert_eq!(sink.errors().len(), 1);
    assert!(sink.errors()[0].contains("not valid JSON"));
}

#[tokio::test]
async fn unreachable_endpoint_goes_to_error_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let (handler, sink) = handler_with_sink(&format!("http://{addr}"));
    let mut event = handler.form().submit_event();
    handler
        .on_submit(&mut event)
        .expect("handled")
        .await
        .expect("task");

    assert!(event.default_prevented());
    assert!(sink.logs().is_empty());
    assert_eq!(sink.errors().len(), 1);

    let err = handler
        .dispatch(Submission::new(None, ""))
        .await
        .expect_err("must fail");
    assert!(err.is_transport());
}

#[tokio::test]
async fn unreadable_file_goes_to_error_stream_without_request() {
    let (server_url, state) = spawn_process_server().await;
    let (handler, sink) = handler_with_sink(&server_url);
    handler.form().file_input.select(SelectedFile::from_path(
        std::env::temp_dir().join(format!("missing_{}.pdf", SubmissionId::new())),
    ));

    let mut event = handler.form().submit_event();
    handler
        .on_submit(&mut event)
        .expect("handled")
        .await
        .expect("task");

    assert!(state.requests.lock().await.is_empty());
    assert!(sink.logs().is_empty());
    assert_eq!(sink.errors().len(), 1);
    assert!(sink.errors()[0].contains("failed to read selected file"));
}

#[tokio::test]
async fn rapid_submits_are_independent_in_flight_requests() {
    #[derive(Clone)]
    struct GateState {
        barrier: Arc<Barrier>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    async fn gated(State(state): State<GateState>, multipart: Multipart) -> Json<Value> {
        let parts = read_parts(multipart).await;
        let subject = String::from_utf8(parts[0].data.clone()).expect("utf8");
        state.seen.lock().await.push(subject.clone());
        // Only released once both requests are in flight.
        state.barrier.wait().await;
        Json(json!({ "subject": subject }))
    }

    let state = GateState {
        barrier: Arc::new(Barrier::new(2)),
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/process", post(gated))
        .with_state(state.clone());
    let server_url = spawn_router(app).await;
    let (handler, sink) = handler_with_sink(&server_url);

    handler.form().subject_name.set_value("first");
    let mut first_event = handler.form().submit_event();
    let first = handler.on_submit(&mut first_event).expect("handled");

    handler.form().subject_name.set_value("second");
    let mut second_event = handler.form().submit_event();
    let second = handler.on_submit(&mut second_event).expect("handled");

    let results = tokio::time::timeout(
        Duration::from_secs(10),
        futures::future::join_all([first, second]),
    )
    .await
    .expect("both requests complete");
    assert!(results.iter().all(Result::is_ok));

    let mut seen = state.seen.lock().await.clone();
    seen.sort();
    assert_eq!(seen, vec!["first".to_string(), "second".to_string()]);

    let mut logged: Vec<String> = sink
        .logs()
        .iter()
        .filter_map(|value| value["subject"].as_str().map(str::to_string))
        .collect();
    logged.sort();
    assert_eq!(logged, vec!["first".to_string(), "second".to_string()]);
    assert!(sink.errors().is_empty());
}
