//! Document handlers - list, upsert and delete with change fan-out.

use roomsync_engine::ChangeEvent;
use serde::Serialize;
use sqlx::PgPool;

use crate::db;
use crate::error::{AppError, Result};
use crate::websocket::{ConnectionManager, ServerMessage};

/// A document as returned by the HTTP API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub id: String,
    pub data: serde_json::Value,
}

/// Response for listing a collection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResponse {
    pub path: String,
    pub documents: Vec<DocumentView>,
}

/// Normalize a collection path: no leading/trailing slashes, no empty segments.
pub fn normalize_collection_path(path: &str) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|segment| segment.trim().is_empty()) {
        return Err(AppError::BadRequest(format!(
            "invalid collection path: {path:?}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Split `collection/.../doc_id` into its collection path and document id.
pub fn split_document_path(path: &str) -> Result<(String, String)> {
    let trimmed = path.trim_matches('/');
    if trimmed.split('/').any(|segment| segment.trim().is_empty()) {
        return Err(AppError::BadRequest(format!(
            "invalid document path: {path:?}"
        )));
    }
    match trimmed.rsplit_once('/') {
        Some((collection, doc_id)) if !doc_id.trim().is_empty() => {
            Ok((normalize_collection_path(collection)?, doc_id.to_string()))
        }
        _ => Err(AppError::BadRequest(format!(
            "document path needs a collection and an id: {path:?}"
        ))),
    }
}

/// List every document of a collection.
pub async fn handle_list(pool: &PgPool, path: &str) -> Result<CollectionResponse> {
    let path = normalize_collection_path(path)?;
    let documents = db::list_documents(pool, &path)
        .await?
        .into_iter()
        .map(|doc| DocumentView {
            data: doc.snapshot(),
            id: doc.doc_id,
        })
        .collect();

    Ok(CollectionResponse { path, documents })
}

/// Store a document and notify subscribers of its collection.
///
/// `lastModified` is owned by the server; a client-supplied value is replaced.
pub async fn handle_put(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    path: &str,
    mut body: serde_json::Value,
) -> Result<DocumentView> {
    let (collection, doc_id) = split_document_path(path)?;
    let Some(object) = body.as_object_mut() else {
        return Err(AppError::BadRequest(
            "document body must be a JSON object".to_string(),
        ));
    };
    object.remove("lastModified");

    let now_ms = chrono::Utc::now().timestamp_millis();
    let outcome = db::upsert_document(pool, &collection, &doc_id, &body, now_ms).await?;
    let snapshot = outcome.document.snapshot();

    let event = if outcome.inserted {
        ChangeEvent::added(doc_id.clone(), snapshot.clone())
    } else {
        ChangeEvent::modified(doc_id.clone(), snapshot.clone())
    };
    let sent = conn_manager.broadcast(&collection, ServerMessage::changes(&collection, vec![event]));

    tracing::debug!(
        collection = %collection,
        doc_id = %doc_id,
        last_modified = outcome.document.last_modified,
        inserted = outcome.inserted,
        sent_to = sent,
        "Document stored"
    );

    Ok(DocumentView {
        id: doc_id,
        data: snapshot,
    })
}

/// Delete a document and notify subscribers of its collection.
pub async fn handle_delete(
    pool: &PgPool,
    conn_manager: &ConnectionManager,
    path: &str,
) -> Result<()> {
    let (collection, doc_id) = split_document_path(path)?;
    if !db::delete_document(pool, &collection, &doc_id).await? {
        return Err(AppError::NotFound(format!("{collection}/{doc_id}")));
    }

    let sent = conn_manager.broadcast(
        &collection,
        ServerMessage::changes(&collection, vec![ChangeEvent::removed(doc_id.clone())]),
    );
    tracing::debug!(collection = %collection, doc_id = %doc_id, sent_to = sent, "Document deleted");

    Ok(())
}
