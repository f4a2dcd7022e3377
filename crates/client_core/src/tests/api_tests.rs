use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared::{
    domain::TrackId,
    error::{ErrorCode, ValidationError},
    protocol::{ListTracksQuery, TrackSort},
};

use super::*;
use crate::test_support::spawn_server;

fn client(base: &str) -> ApiClient {
    ApiClient::new(
        BaseAddress::parse(base).expect("base address"),
        Duration::from_secs(5),
    )
}

async fn error_server() -> String {
    let app = Router::new()
        .route(
            "/api/tracks/:id",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({ "detail": "Track not found" })),
                )
            }),
        )
        .route(
            "/api/generate",
            post(|| async {
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({
                        "detail": [{ "loc": ["body", "topk"], "msg": "too large" }]
                    })),
                )
            }),
        )
        .route(
            "/api/health",
            get(|| async { (StatusCode::BAD_GATEWAY, "upstream went away") }),
        )
        .route(
            "/api/gpu",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))) }),
        );
    spawn_server(app).await.expect("spawn server")
}

#[tokio::test]
async fn string_detail_becomes_the_error_message() {
    let base = error_server().await;
    let err = client(&base)
        .get_track(&TrackId::from("t-404"))
        .await
        .expect_err("missing track");

    match err {
        ClientError::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 404);
            assert_eq!(code, ErrorCode::NotFound);
            assert_eq!(message, "Track not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn structured_detail_is_rendered_as_json() {
    let base = error_server().await;
    let request = shared::protocol::GenerationRequest {
        lyrics: "la".into(),
        tags: "pop".into(),
        params: Default::default(),
    };
    let err = client(&base)
        .submit_generation(&request)
        .await
        .expect_err("validation failure");

    assert_eq!(err.status(), Some(422));
    assert_eq!(err.code(), Some(ErrorCode::Validation));
    assert!(err.to_string().contains("\"loc\""), "{err}");
}

#[tokio::test]
async fn unreadable_bodies_fall_back_to_the_reason_phrase() {
    let base = error_server().await;
    let api = client(&base);

    let err = api.health().await.expect_err("bad gateway");
    assert!(matches!(
        &err,
        ClientError::Api { status: 502, message, .. } if message == "Bad Gateway"
    ));

    let err = api.gpu_status().await.expect_err("unavailable");
    assert!(matches!(
        &err,
        ClientError::Api { status: 503, message, .. } if message == "Request failed"
    ));
}

#[tokio::test]
async fn track_listing_sends_only_set_filters() {
    let seen: Arc<Mutex<Option<HashMap<String, String>>>> = Arc::default();
    let app = Router::new()
        .route(
            "/api/tracks",
            get(
                |State(seen): State<Arc<Mutex<Option<HashMap<String, String>>>>>,
                 Query(params): Query<HashMap<String, String>>| async move {
                    *seen.lock() = Some(params);
                    Json(json!({ "tracks": [], "total": 0 }))
                },
            ),
        )
        .with_state(Arc::clone(&seen));
    let base = spawn_server(app).await.expect("spawn server");

    let page = client(&base)
        .list_tracks(&ListTracksQuery {
            favorite: Some(true),
            sort: Some(TrackSort::DurationMs),
            limit: Some(20),
            offset: Some(40),
            ..ListTracksQuery::default()
        })
        .await
        .expect("list tracks");
    assert_eq!(page.total, 0);

    let params = seen.lock().clone().expect("request seen");
    assert_eq!(params.get("favorite").map(String::as_str), Some("true"));
    assert_eq!(params.get("sort").map(String::as_str), Some("duration_ms"));
    assert_eq!(params.get("limit").map(String::as_str), Some("20"));
    assert_eq!(params.get("offset").map(String::as_str), Some("40"));
    assert!(!params.contains_key("search"));
    assert!(!params.contains_key("tags"));
}

#[tokio::test]
async fn generation_request_flattens_parameters() {
    let body: Arc<Mutex<Option<Value>>> = Arc::default();
    let app = Router::new()
        .route(
            "/api/generate",
            post(
                |State(body): State<Arc<Mutex<Option<Value>>>>, Json(request): Json<Value>| async move {
                    *body.lock() = Some(request);
                    Json(json!({
                        "job_id": "job-77",
                        "status": "pending",
                        "queue_position": 2,
                        "created_at": "2026-02-14T12:00:00.123456"
                    }))
                },
            ),
        )
        .with_state(Arc::clone(&body));
    let base = spawn_server(app).await.expect("spawn server");

    let response = client(&base)
        .submit_generation(&shared::protocol::GenerationRequest {
            lyrics: "[verse]\nhello".into(),
            tags: "pop,upbeat".into(),
            params: Default::default(),
        })
        .await
        .expect("submit");
    assert_eq!(response.job_id.as_str(), "job-77");
    assert_eq!(response.queue_position, 2);

    let sent = body.lock().clone().expect("request body");
    assert_eq!(sent["tags"], "pop,upbeat");
    assert_eq!(sent["max_length_ms"], 240_000);
    assert_eq!(sent["topk"], 50);
    assert!(sent.get("params").is_none());
}

#[tokio::test]
async fn delete_track_accepts_an_empty_success_body() {
    let app = Router::new().route(
        "/api/tracks/:id",
        delete(|| async { StatusCode::NO_CONTENT.into_response() }),
    );
    let base = spawn_server(app).await.expect("spawn server");
    client(&base)
        .delete_track(&TrackId::from("t1"))
        .await
        .expect("delete");
}

#[derive(Debug, Default, Clone)]
struct ReceivedFile {
    field: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[tokio::test]
async fn transcription_upload_sends_multipart_file_field() {
    let received: Arc<Mutex<Option<ReceivedFile>>> = Arc::default();
    let app = Router::new()
        .route(
            "/api/transcribe",
            post(
                |State(received): State<Arc<Mutex<Option<ReceivedFile>>>>,
                 mut multipart: Multipart| async move {
                    while let Ok(Some(field)) = multipart.next_field().await {
                        let file = ReceivedFile {
                            field: field.name().unwrap_or_default().to_string(),
                            file_name: field.file_name().map(str::to_string),
                            content_type: field.content_type().map(str::to_string),
                            bytes: Vec::new(),
                        };
                        let bytes = field.bytes().await.unwrap_or_default();
                        *received.lock() = Some(ReceivedFile {
                            bytes: bytes.to_vec(),
                            ..file
                        });
                    }
                    Json(json!({ "job_id": "tx-9" }))
                },
            ),
        )
        .with_state(Arc::clone(&received));
    let base = spawn_server(app).await.expect("spawn server");

    let upload = AudioUpload::new("demo.wav", b"RIFF....WAVE".to_vec()).expect("upload");
    let accepted = client(&base).transcribe(upload).await.expect("transcribe");
    assert_eq!(accepted.job_id.as_str(), "tx-9");

    let file = received.lock().clone().expect("file received");
    assert_eq!(file.field, "file");
    assert_eq!(file.file_name.as_deref(), Some("demo.wav"));
    assert!(file
        .content_type
        .as_deref()
        .is_some_and(|mime| mime.starts_with("audio/")));
    assert_eq!(file.bytes, b"RIFF....WAVE");
}

#[test]
fn uploads_are_limited_to_audio_extensions() {
    let upload = AudioUpload::new("Take 3.MP3", vec![1, 2, 3]).expect("mp3 accepted");
    assert_eq!(upload.mime_type.as_deref(), Some("audio/mpeg"));

    let err = AudioUpload::new("notes.txt", vec![]).expect_err("txt rejected");
    assert_eq!(
        err,
        ValidationError::UnsupportedFileType {
            extension: "txt".into(),
            allowed: "mp3, wav, flac, ogg, m4a".into(),
        }
    );
    assert!(AudioUpload::new("no_extension", vec![]).is_err());
}

#[test]
fn audio_urls_resolve_against_the_base_address() {
    let api = client("http://studio.local:8000/");
    assert_eq!(
        api.audio_url("/outputs/t1.mp3"),
        "http://studio.local:8000/outputs/t1.mp3"
    );
}
