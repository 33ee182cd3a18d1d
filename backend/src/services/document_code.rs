//! Generated document codes (`PO-2026-0007`)

use chrono::{Datelike, Utc};
use sqlx::PgConnection;

use crate::error::AppResult;

/// Allocate the next code for `prefix` in the current year.
/// The counter row stays locked until the caller's transaction ends.
pub async fn next_document_code(conn: &mut PgConnection, prefix: &str) -> AppResult<String> {
    let year = Utc::now().year();
    let sequence = sqlx::query_scalar::<_, i32>("SELECT next_document_sequence($1, $2)")
        .bind(prefix)
        .bind(year)
        .fetch_one(&mut *conn)
        .await?;

    Ok(shared::format_document_code(prefix, year, sequence))
}
