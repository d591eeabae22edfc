//! The sampling loop against both `TelemetrySink` backends.

use aerolink_core::types::Account;
use aerolink_core::{TelemetryRecord, TelemetrySink};
use aerolink_egress::auth::{AuthConfig, CredentialManager};
use aerolink_egress::backend::{HttpBackendConfig, ReqwestBackend};
use aerolink_egress::executor::{ResilientExecutor, RetryPolicy};
use aerolink_egress::ingest::{IngestClient, IngestConfig};
use aerolink_egress::sink::{DocumentStoreSink, IngestApiSink};
use aerolink_egress::store::DocumentStoreClient;
use aerolink_integration_tests::{
    TestStore, init_test_tracing, mount_password_sign_in, mount_token_exchange,
};
use aerolink_sampler::{BatchAccumulator, Reading, RetentionCursor, flush_batch};
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_reading() -> Reading {
    Reading {
        pm1_0: 2.0,
        pm2_5: 5.0,
        pm4_0: 6.0,
        pm10_0: 8.0,
        voc_index: 120.0,
        nox_index: 12.0,
        co2_ppm: 430,
        temperature_c: 21.0,
        humidity_pct: 45.0,
    }
}

async fn document_store_sink(
    store: &TestStore,
    auth: &MockServer,
) -> DocumentStoreSink<ReqwestBackend> {
    let backend = ReqwestBackend::new(&HttpBackendConfig::default()).expect("backend");
    let executor = ResilientExecutor::new(backend).with_policy(RetryPolicy::single_attempt());
    let config = AuthConfig::new("integration-key")
        .with_identity_base_url(auth.uri())
        .with_token_base_url(auth.uri());
    let credentials = CredentialManager::new(config, Account::new("device@example.com", "hunter2"));
    let mut client = DocumentStoreClient::new(executor, credentials, &store.base_url);
    client.sign_in().await.expect("sign in");
    DocumentStoreSink::new(client, "/history")
}

#[tokio::test]
async fn flush_lands_in_the_document_tree_under_the_time_key() {
    init_test_tracing();
    let store = TestStore::spawn().await;
    let auth = MockServer::start().await;
    mount_password_sign_in(&auth, "refresh-1").await;
    mount_token_exchange(&auth, "refresh-1", "access-1").await;

    let mut sink = document_store_sink(&store, &auth).await;
    let mut batch = BatchAccumulator::new();
    let mut cursor = RetentionCursor::default();
    batch.push(&sample_reading());

    let at = Utc.with_ymd_and_hms(2026, 3, 9, 6, 5, 0).unwrap();
    let key = flush_batch(&mut sink, &mut batch, &mut cursor, at, Some("north-field"))
        .await
        .expect("flush")
        .expect("non-empty batch");

    assert_eq!(key, "26-03-09_06-05-00");
    let stored = store.snapshot();
    let record = &stored["history"]["26-03-09_06-05-00"];
    assert_eq!(record["co2_ppm"], json!(430));
    assert_eq!(record["date"], json!("2026-03-09"));
    assert_eq!(record["location"], json!("north-field"));
}

#[tokio::test]
async fn flush_reaches_the_ingest_api_with_device_id() {
    init_test_tracing();
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(header("X-API-Key", "integration-secret"))
        .and(body_partial_json(json!({
            "device_id": "dev-7",
            "co2_ppm": 430,
            "date": "2026-03-09",
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&api)
        .await;

    let backend = ReqwestBackend::new(&HttpBackendConfig::default()).expect("backend");
    let config = IngestConfig::new(
        format!("{}/ingest", api.uri()),
        format!("{}/admin", api.uri()),
        "integration-secret",
        "dev-7",
    );
    let mut sink = IngestApiSink::new(IngestClient::new(backend, config));

    let mut batch = BatchAccumulator::new();
    let mut cursor = RetentionCursor::default();
    batch.push(&sample_reading());

    let at = Utc.with_ymd_and_hms(2026, 3, 9, 6, 5, 0).unwrap();
    flush_batch(&mut sink, &mut batch, &mut cursor, at, None)
        .await
        .expect("flush");
}

#[tokio::test]
async fn the_sampling_loop_is_backend_agnostic() {
    init_test_tracing();

    // Same driver routine, fed a trait object for either backend.
    async fn drive(sink: &mut dyn TelemetrySink, record: &TelemetryRecord) {
        sink.ingest("26-03-09_06-05-00", record).await.expect("ingest");
        let removed = sink.trim_oldest(2).await.expect("trim");
        assert!(removed <= 2);
    }

    let record = TelemetryRecord {
        pm1_0: 1.0,
        pm2_5: 2.0,
        pm4_0: 3.0,
        pm10_0: 4.0,
        voc_index: 10.0,
        nox_index: 1.0,
        co2_ppm: 400,
        temperature_c: 20.0,
        humidity_pct: 50.0,
        date: "2026-03-09".into(),
        time: "06:05:00".into(),
        location: None,
        boot_time: None,
    };

    // Document-tree variant.
    let store = TestStore::spawn().await;
    let auth = MockServer::start().await;
    mount_password_sign_in(&auth, "refresh-1").await;
    mount_token_exchange(&auth, "refresh-1", "access-1").await;
    let mut doc_sink = document_store_sink(&store, &auth).await;
    drive(&mut doc_sink, &record).await;
    assert_eq!(store.snapshot()["history"], json!({}));

    // Fixed-endpoint variant.
    let api = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&api)
        .await;
    Mock::given(method("POST"))
        .and(path("/admin"))
        .and(body_partial_json(json!({"op": "trim_oldest", "batch_size": 2})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&api)
        .await;

    let backend = ReqwestBackend::new(&HttpBackendConfig::default()).expect("backend");
    let config = IngestConfig::new(
        format!("{}/ingest", api.uri()),
        format!("{}/admin", api.uri()),
        "integration-secret",
        "dev-7",
    );
    let mut api_sink = IngestApiSink::new(IngestClient::new(backend, config));
    drive(&mut api_sink, &record).await;
}
