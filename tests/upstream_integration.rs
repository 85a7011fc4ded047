mod common;

use std::time::Duration;

use outbound_guard::config::schema::{CircuitBreakerSettings, DependencyConfig, RetrySettings};
use outbound_guard::resilience::{FailureClass, Level, ResilienceContext, ResilienceError};
use outbound_guard::upstream::{UpstreamClient, UpstreamError, MUSIC_API};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use common::{start_mock_backend, start_programmable_backend};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Track {
    id: u32,
    title: String,
}

fn dependency(url: &str, attempts: u32, threshold: u32) -> DependencyConfig {
    DependencyConfig {
        name: MUSIC_API.to_string(),
        base_url: url.to_string(),
        timeout_ms: 1_000,
        retries: Some(RetrySettings {
            max_attempts: attempts,
            initial_delay_ms: 5,
            max_delay_ms: 20,
            ..Default::default()
        }),
        circuit_breaker: Some(CircuitBreakerSettings {
            failure_threshold: threshold,
            ..Default::default()
        }),
    }
}

#[tokio::test]
async fn test_transient_failures_are_retried_with_one_request_id() {
    let backend = start_programmable_backend(|n| async move {
        if n < 3 {
            (503, r#"{"error":"warming up"}"#.to_string())
        } else {
            (200, r#"[{"id":7,"title":"Blue in Green"}]"#.to_string())
        }
    })
    .await;

    let client = UpstreamClient::new(&dependency(&backend.url(), 3, 5), ResilienceContext::new()).unwrap();
    let tracks: Vec<Track> = client.get_json("/v1/tracks").await.unwrap();

    assert_eq!(tracks[0].title, "Blue in Green");
    assert_eq!(backend.hits(), 3);

    let seen = backend.seen();
    assert_eq!(seen[0].path, "/v1/tracks");
    let first_id = seen[0].request_id.clone().unwrap();
    assert!(seen.iter().all(|r| r.request_id.as_deref() == Some(first_id.as_str())));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let backend = start_mock_backend(404, r#"{"error":"no such playlist"}"#).await;
    let ctx = ResilienceContext::new();
    let client = UpstreamClient::new(&dependency(&backend.url(), 3, 5), ctx.clone()).unwrap();

    let err = client.get_json::<Vec<Track>>("playlists/42").await.unwrap_err();

    assert_eq!(backend.hits(), 1);
    assert_eq!(err.class(), FailureClass::Permanent);
    match err {
        ResilienceError::Operation(UpstreamError::Status { status, body, .. }) => {
            assert_eq!(status, 404);
            assert!(body.contains("no such playlist"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let errors = ctx.reporter().notifications(Some(Level::Error));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].context_str("dependency"), Some(MUSIC_API));
    assert_eq!(errors[0].context_str("class"), Some("permanent"));
}

#[tokio::test]
async fn test_open_circuit_serves_fallback_without_calling() {
    let backend = start_mock_backend(500, r#"{"error":"boom"}"#).await;
    let ctx = ResilienceContext::new();
    let client = UpstreamClient::new(&dependency(&backend.url(), 1, 2), ctx.clone()).unwrap();

    for _ in 0..2 {
        assert!(client.get_json::<Vec<Track>>("tracks").await.is_err());
    }
    assert_eq!(backend.hits(), 2);

    let tracks = client
        .get_json_or("tracks", || {
            vec![Track {
                id: 0,
                title: "Offline mix".to_string(),
            }]
        })
        .await
        .unwrap();

    assert_eq!(tracks[0].title, "Offline mix");
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_slow_dependency_times_out_per_attempt() {
    let backend = start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "[]".to_string())
    })
    .await;

    let mut config = dependency(&backend.url(), 2, 5);
    config.timeout_ms = 50;
    let client = UpstreamClient::new(&config, ResilienceContext::new()).unwrap();

    let err = client.get_json::<Vec<Track>>("tracks").await.unwrap_err();

    assert!(matches!(err, ResilienceError::Operation(UpstreamError::Timeout(_))));
    assert_eq!(err.class(), FailureClass::Transient);
    assert_eq!(backend.hits(), 2);
}

#[tokio::test]
async fn test_refused_connection_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = UpstreamClient::new(
        &dependency(&format!("http://{}/", addr), 2, 5),
        ResilienceContext::new(),
    )
    .unwrap();

    let err = client.get_json::<Vec<Track>>("tracks").await.unwrap_err();
    assert!(matches!(err, ResilienceError::Operation(UpstreamError::Transport { .. })));
    assert_eq!(err.class(), FailureClass::Transient);
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let backend = start_mock_backend(201, r#"{"id":9,"title":"So What"}"#).await;
    let client = UpstreamClient::new(&dependency(&backend.url(), 1, 5), ResilienceContext::new()).unwrap();

    let created: Track = client
        .post_json(
            "tracks",
            &Track {
                id: 9,
                title: "So What".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(created.id, 9);
    let seen = backend.seen();
    assert_eq!(seen[0].method, "POST");
    assert_eq!(seen[0].body, r#"{"id":9,"title":"So What"}"#);
}

#[tokio::test]
async fn test_base_url_path_without_trailing_slash_is_kept() {
    let backend = start_mock_backend(200, r#"[{"id":1,"title":"Freddie Freeloader"}]"#).await;
    let base = format!("http://{}/v1", backend.addr);
    let client = UpstreamClient::new(&dependency(&base, 1, 5), ResilienceContext::new()).unwrap();

    let tracks: Vec<Track> = client.get_json("tracks").await.unwrap();

    assert_eq!(tracks[0].id, 1);
    assert_eq!(backend.seen()[0].path, "/v1/tracks");
}
