//! In-process mock of the kvpbase REST service for tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use axum::{
    Json,
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::backends::kvpbase::API_KEY_HEADER;

struct StoredObject {
    data: Bytes,
    content_type: String,
    created: DateTime<Utc>,
}

#[derive(Clone)]
struct MockState {
    api_key: String,
    objects: Arc<Mutex<BTreeMap<String, StoredObject>>>,
}

impl MockState {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == self.api_key)
    }
}

fn record(key: &str, object: &StoredObject) -> serde_json::Value {
    json!({
        "Key": key,
        "ContentType": object.content_type,
        "ContentLength": object.data.len(),
        "CreatedUtc": object.created.to_rfc3339(),
    })
}

/// A running mock server. Shut down on drop.
pub(crate) struct MockKvpbase {
    pub endpoint: String,
    cancel: CancellationToken,
}

impl MockKvpbase {
    pub async fn start(api_key: &str) -> Self {
        let state = MockState {
            api_key: api_key.to_string(),
            objects: Arc::new(Mutex::new(BTreeMap::new())),
        };
        let app = Router::new()
            .route("/{user}/{container}", get(list_objects))
            .route(
                "/{user}/{container}/{*key}",
                get(read_object).post(write_object).delete(delete_object),
            )
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel_clone.cancelled().await;
                })
                .await
                .unwrap();
        });

        Self {
            endpoint: format!("http://127.0.0.1:{}", port),
            cancel,
        }
    }
}

impl Drop for MockKvpbase {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn list_objects(
    State(state): State<MockState>,
    Path((user, container)): Path<(String, String)>,
    Query(params): Query<HashMap<String, usize>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let index = params.get("_index").copied().unwrap_or(0);
    let max = params.get("_max").copied().unwrap_or(1000);
    let prefix = format!("{}/{}/", user, container);

    let objects = state.objects.lock().unwrap();
    let page: Vec<_> = objects
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(&prefix).map(|key| record(key, v)))
        .skip(index)
        .take(max)
        .collect();
    Json(json!({ "Objects": page })).into_response()
}

async fn read_object(
    State(state): State<MockState>,
    Path((user, container, key)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let objects = state.objects.lock().unwrap();
    let Some(object) = objects.get(&format!("{}/{}/{}", user, container, key)) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if params.contains_key("_metadata") {
        return Json(record(&key, object)).into_response();
    }
    (
        [(header::CONTENT_TYPE, object.content_type.clone())],
        object.data.clone(),
    )
        .into_response()
}

async fn write_object(
    State(state): State<MockState>,
    Path((user, container, key)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    state.objects.lock().unwrap().insert(
        format!("{}/{}/{}", user, container, key),
        StoredObject {
            data: body,
            content_type,
            created: Utc::now(),
        },
    );
    StatusCode::CREATED.into_response()
}

async fn delete_object(
    State(state): State<MockState>,
    Path((user, container, key)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let removed = state
        .objects
        .lock()
        .unwrap()
        .remove(&format!("{}/{}/{}", user, container, key));
    match removed {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
