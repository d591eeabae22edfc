//! Shared fixtures for AeroLink integration tests.
//!
//! `TestStore` is an in-memory document tree served over HTTP with the
//! same wire shape the real store speaks: `.json`-suffixed paths,
//! `auth` query parameter, shallow and key-ordered listings, null-valued
//! PATCH deletions, and silent writes. Auth endpoints are mocked with
//! wiremock per test.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Installs a compact tracing subscriber once, honoring `RUST_LOG`.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .try_init();
}

#[derive(Clone)]
struct StoreState {
    tree: Arc<Mutex<Value>>,
    valid_tokens: Arc<Mutex<HashSet<String>>>,
    push_counter: Arc<AtomicU64>,
}

/// In-memory document-tree store listening on an ephemeral local port.
pub struct TestStore {
    pub base_url: String,
    tree: Arc<Mutex<Value>>,
    valid_tokens: Arc<Mutex<HashSet<String>>>,
}

impl TestStore {
    /// Spawns a store that accepts any `auth` value.
    pub async fn spawn() -> Self {
        Self::spawn_with_tokens(&[]).await
    }

    /// Spawns a store that only accepts the listed `auth` values. An
    /// empty list disables the check.
    pub async fn spawn_with_tokens(tokens: &[&str]) -> Self {
        let tree = Arc::new(Mutex::new(Value::Null));
        let valid_tokens = Arc::new(Mutex::new(
            tokens.iter().map(|t| t.to_string()).collect::<HashSet<_>>(),
        ));
        let state = StoreState {
            tree: tree.clone(),
            valid_tokens: valid_tokens.clone(),
            push_counter: Arc::new(AtomicU64::new(0)),
        };
        let app = axum::Router::new()
            .route("/{*path}", any(handle))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test store");
        let addr = listener.local_addr().expect("test store addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test store");
        });

        Self {
            base_url: format!("http://{addr}"),
            tree,
            valid_tokens,
        }
    }

    pub fn allow_token(&self, token: &str) {
        self.valid_tokens
            .lock()
            .expect("token set")
            .insert(token.to_string());
    }

    /// Replaces the whole tree, bypassing HTTP.
    pub fn set_tree(&self, value: Value) {
        *self.tree.lock().expect("tree") = value;
    }

    /// Clone of the current tree.
    pub fn snapshot(&self) -> Value {
        self.tree.lock().expect("tree").clone()
    }
}

async fn handle(
    State(state): State<StoreState>,
    req_method: Method,
    Path(raw_path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    {
        let valid = state.valid_tokens.lock().expect("token set");
        if !valid.is_empty() {
            match params.get("auth") {
                Some(token) if valid.contains(token) => {}
                _ => {
                    return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})))
                        .into_response();
                }
            }
        }
    }

    let trimmed = raw_path.strip_suffix(".json").unwrap_or(&raw_path);
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();

    if req_method == Method::GET {
        let tree = state.tree.lock().expect("tree");
        let node = node_at(&tree, &segments).cloned().unwrap_or(Value::Null);
        let view = if params.get("shallow").map(String::as_str) == Some("true") {
            shallow_view(&node)
        } else if let Some(limit) = params
            .get("limitToFirst")
            .and_then(|v| v.parse::<usize>().ok())
        {
            first_keys_view(&node, limit)
        } else {
            node
        };
        (StatusCode::OK, Json(view)).into_response()
    } else if req_method == Method::PUT {
        let Ok(parsed) = serde_json::from_str::<Value>(&body) else {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid json"})))
                .into_response();
        };
        let mut tree = state.tree.lock().expect("tree");
        *node_mut(&mut tree, &segments) = parsed.clone();
        (StatusCode::OK, Json(parsed)).into_response()
    } else if req_method == Method::POST {
        let Ok(parsed) = serde_json::from_str::<Value>(&body) else {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid json"})))
                .into_response();
        };
        let name = format!("push-{:08}", state.push_counter.fetch_add(1, Ordering::SeqCst));
        let mut tree = state.tree.lock().expect("tree");
        let node = node_mut(&mut tree, &segments);
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node.as_object_mut()
            .expect("object node")
            .insert(name.clone(), parsed);
        (StatusCode::OK, Json(json!({"name": name}))).into_response()
    } else if req_method == Method::PATCH {
        let Ok(Value::Object(updates)) = serde_json::from_str::<Value>(&body) else {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid patch"})))
                .into_response();
        };
        let mut tree = state.tree.lock().expect("tree");
        let node = node_mut(&mut tree, &segments);
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let map = node.as_object_mut().expect("object node");
        for (key, value) in updates.clone() {
            // A null value deletes the child, per the store's
            // bulk-delete idiom.
            if value.is_null() {
                map.remove(&key);
            } else {
                map.insert(key, value);
            }
        }
        if params.get("print").map(String::as_str) == Some("silent") {
            StatusCode::NO_CONTENT.into_response()
        } else {
            (StatusCode::OK, Json(Value::Object(updates))).into_response()
        }
    } else if req_method == Method::DELETE {
        let mut tree = state.tree.lock().expect("tree");
        remove_node(&mut tree, &segments);
        (StatusCode::OK, Json(Value::Null)).into_response()
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}

fn shallow_view(node: &Value) -> Value {
    match node {
        Value::Object(map) => Value::Object(
            map.keys()
                .map(|key| (key.clone(), Value::Bool(true)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// First `limit` children in key order. The backing map is keyed by a
/// BTreeMap, so iteration order is the key order the query promises.
fn first_keys_view(node: &Value, limit: usize) -> Value {
    match node {
        Value::Object(map) => Value::Object(
            map.iter()
                .take(limit)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn node_at<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.get(segment)?;
    }
    Some(node)
}

fn node_mut<'a>(root: &'a mut Value, segments: &[&str]) -> &'a mut Value {
    let mut node = root;
    for segment in segments {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = node
            .as_object_mut()
            .expect("object node")
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }
    node
}

fn remove_node(root: &mut Value, segments: &[&str]) {
    match segments {
        [] => *root = Value::Null,
        [leaf] => {
            if let Some(map) = root.as_object_mut() {
                map.remove(*leaf);
            }
        }
        [head, rest @ ..] => {
            if let Some(child) = root.get_mut(*head) {
                remove_node(child, rest);
            }
        }
    }
}

/// Mounts password sign-in returning `refresh_token`.
pub async fn mount_password_sign_in(server: &MockServer, refresh_token: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/accounts:signInWithPassword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "refreshToken": refresh_token,
        })))
        .mount(server)
        .await;
}

/// Mounts the token exchange for `refresh_token`, minting
/// `access_token` with a one-hour expiry.
pub async fn mount_token_exchange(server: &MockServer, refresh_token: &str, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .and(body_partial_json(json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "expires_in": "3600",
        })))
        .mount(server)
        .await;
}

/// Mounts a token exchange that answers once with `access_token` and
/// then stops matching, letting a later-mounted mock take over.
pub async fn mount_token_exchange_once(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access_token,
            "expires_in": "3600",
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}
