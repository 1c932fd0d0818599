//! Document collection routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_delete, handle_list, handle_put, CollectionResponse, DocumentView};
use crate::AppState;

/// Create document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/collections/{*path}", get(list_handler))
        .route("/documents/{*path}", put(put_handler).delete(delete_handler))
}

/// GET /collections/{path} - List a collection.
async fn list_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(path): Path<String>,
) -> Result<Json<CollectionResponse>> {
    let response = handle_list(&state.pool, &path).await?;
    Ok(Json(response))
}

/// PUT /documents/{path}/{id} - Store a document.
async fn put_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(path): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<DocumentView>> {
    let document = handle_put(&state.pool, &state.conn_manager, &path, body).await?;
    Ok(Json(document))
}

/// DELETE /documents/{path}/{id} - Delete a document.
async fn delete_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(path): Path<String>,
) -> Result<StatusCode> {
    handle_delete(&state.pool, &state.conn_manager, &path).await?;
    Ok(StatusCode::NO_CONTENT)
}
