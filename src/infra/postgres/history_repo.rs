use crate::domain::{audit::StatusHistoryEntry, error::PaymentError};

pub async fn insert_history_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &StatusHistoryEntry,
) -> Result<(), PaymentError> {
    sqlx::query(
        r#"
        INSERT INTO payment_status_history
            (id, payment_id, reference, from_status, to_status, actor, detail)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id)
    .bind(entry.payment_id)
    .bind(&entry.reference)
    .bind(entry.from_status.as_str())
    .bind(entry.to_status.as_str())
    .bind(&entry.actor)
    .bind(&entry.detail)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
