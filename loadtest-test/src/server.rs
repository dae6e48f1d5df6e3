//! Exposes an in-process product API for use in integration tests.
//!
//! ```
//! use loadtest_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// A product as stored by the test API.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Product {
    pub product_id: i64,
    pub sku: String,
    pub manufacturer: String,
    pub category_id: i64,
    pub weight: i64,
    pub some_other_id: i64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: &'static str,
    details: String,
}

impl ErrorResponse {
    fn invalid(message: &'static str, details: impl Into<String>) -> Response {
        let body = ErrorResponse {
            error: "INVALID_INPUT",
            message,
            details: details.into(),
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

#[derive(Debug, Default)]
struct ApiState {
    products: RwLock<HashMap<i64, Product>>,
    requests: AtomicU64,
    fail_with: Option<StatusCode>,
}

type SharedState = Arc<ApiState>;

/// An in-process product API for use in integration tests.
///
/// It stores products in memory and listens on a random available port on localhost. The server
/// is stopped when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: SharedState,
}

impl TestServer {
    /// Starts a server that implements the product API.
    pub async fn new() -> Self {
        Self::start(ApiState::default()).await
    }

    /// Starts a server that answers every request with the given status.
    pub async fn failing(status: StatusCode) -> Self {
        Self::start(ApiState {
            fail_with: Some(status),
            ..Default::default()
        })
        .await
    }

    async fn start(state: ApiState) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(state);
        let app = routes(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns the base URL of the server, without trailing slash.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.socket.port())
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url(), path)
    }

    /// The number of requests the server has received.
    pub fn requests(&self) -> u64 {
        self.state.requests.load(Ordering::Relaxed)
    }

    /// Returns the stored product with the given identifier.
    pub fn product(&self, product_id: i64) -> Option<Product> {
        self.state.products.read().unwrap().get(&product_id).cloned()
    }

    /// The number of distinct products stored.
    pub fn product_count(&self) -> usize {
        self.state.products.read().unwrap().len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/products/{id}", get(get_product))
        .route("/products/{id}/details", post(add_product_details))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            count_requests,
        ))
        .with_state(state)
}

async fn count_requests(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    state.requests.fetch_add(1, Ordering::Relaxed);
    tracing::trace!(method = %request.method(), uri = %request.uri(), "test server request");

    match state.fail_with {
        Some(status) => status.into_response(),
        None => next.run(request).await,
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

fn parse_id(id: &str) -> Result<i64, Response> {
    match id.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ErrorResponse::invalid(
            "Invalid product ID",
            "productId must be a positive integer",
        )),
    }
}

async fn get_product(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let Some(product) = state.products.read().unwrap().get(&id).cloned() else {
        let body = ErrorResponse {
            error: "NOT_FOUND",
            message: "Product not found",
            details: format!("No product exists with ID {id}"),
        };
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };

    Json(product).into_response()
}

async fn add_product_details(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<Product>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let product = match body {
        Ok(Json(product)) => product,
        Err(rejection) => {
            return ErrorResponse::invalid("Invalid JSON body", rejection.body_text());
        }
    };

    if let Err(details) = validate(&product, id) {
        return ErrorResponse::invalid("Validation failed", details);
    }

    state.products.write().unwrap().insert(id, product);
    StatusCode::NO_CONTENT.into_response()
}

fn validate(product: &Product, path_id: i64) -> Result<(), &'static str> {
    if product.product_id != path_id {
        return Err("product_id in body must match productId in path");
    }
    if !(1..=100).contains(&product.sku.len()) {
        return Err("sku must be between 1 and 100 characters");
    }
    if !(1..=200).contains(&product.manufacturer.len()) {
        return Err("manufacturer must be between 1 and 200 characters");
    }
    if product.category_id < 1 {
        return Err("category_id must be at least 1");
    }
    if product.weight < 0 {
        return Err("weight must be at least 0");
    }
    if product.some_other_id < 1 {
        return Err("some_other_id must be at least 1");
    }
    Ok(())
}
