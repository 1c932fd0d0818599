//! Database operations for the documents table.

use sqlx::{PgPool, Row};

/// A stored document row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub collection_path: String,
    pub doc_id: String,
    pub data: serde_json::Value,
    pub last_modified: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredDocument {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredDocument {
            collection_path: row.try_get("collection_path")?,
            doc_id: row.try_get("doc_id")?,
            data: row.try_get("data")?,
            last_modified: row.try_get("last_modified")?,
        })
    }
}

impl StoredDocument {
    /// The document body as clients see it, with the server write time.
    pub fn snapshot(&self) -> serde_json::Value {
        let mut data = self.data.clone();
        if let Some(object) = data.as_object_mut() {
            object.insert(
                "lastModified".to_string(),
                serde_json::Value::from(self.last_modified),
            );
        }
        data
    }
}

/// Result of an upsert.
#[derive(Debug)]
pub struct UpsertOutcome {
    pub document: StoredDocument,
    /// Whether the document did not exist before
    pub inserted: bool,
}

/// Insert or replace a document.
///
/// `last_modified` becomes `max(now_ms, previous + 1)`, so it grows with
/// every write to the same document even if clocks step backwards.
pub async fn upsert_document(
    pool: &PgPool,
    collection_path: &str,
    doc_id: &str,
    data: &serde_json::Value,
    now_ms: i64,
) -> Result<UpsertOutcome, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO documents (collection_path, doc_id, data, last_modified)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (collection_path, doc_id) DO UPDATE SET
            data = EXCLUDED.data,
            last_modified = GREATEST(EXCLUDED.last_modified, documents.last_modified + 1)
        RETURNING collection_path, doc_id, data, last_modified, (xmax = 0) AS inserted
        "#,
    )
    .bind(collection_path)
    .bind(doc_id)
    .bind(data)
    .bind(now_ms)
    .fetch_one(pool)
    .await?;

    let inserted: bool = row.try_get("inserted")?;
    let document = <StoredDocument as sqlx::FromRow<_>>::from_row(&row)?;

    Ok(UpsertOutcome { document, inserted })
}

/// All documents of a collection, ordered by id.
pub async fn list_documents(
    pool: &PgPool,
    collection_path: &str,
) -> Result<Vec<StoredDocument>, sqlx::Error> {
    sqlx::query_as::<_, StoredDocument>(
        r#"
        SELECT collection_path, doc_id, data, last_modified
        FROM documents
        WHERE collection_path = $1
        ORDER BY doc_id ASC
        "#,
    )
    .bind(collection_path)
    .fetch_all(pool)
    .await
}

/// Delete a document. Returns whether it existed.
pub async fn delete_document(
    pool: &PgPool,
    collection_path: &str,
    doc_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM documents
        WHERE collection_path = $1 AND doc_id = $2
        "#,
    )
    .bind(collection_path)
    .bind(doc_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_carries_last_modified() {
        let doc = StoredDocument {
            collection_path: "rooms".into(),
            doc_id: "a".into(),
            data: json!({"id": "a", "number": "101", "lastModified": 1}),
            last_modified: 42,
        };
        assert_eq!(
            doc.snapshot(),
            json!({"id": "a", "number": "101", "lastModified": 42})
        );
    }
}
