use {
    super::history_repo::insert_history_entry,
    crate::domain::{
        error::PaymentError,
        money::{CurrencyCode, Money},
        payment::{NewPayment, Payment, RequestLink, RequestType, StatusUpdate, TransitionOutcome},
        reference::Reference,
        status::{CanonicalStatus, ProviderKind},
        store::{PaymentStore, StoreFuture},
    },
    chrono::{DateTime, Utc},
    rust_decimal::Decimal,
    sqlx::PgPool,
    uuid::Uuid,
};

const PAYMENT_COLUMNS: &str = r#"
    id, reference, provider, provider_transaction_id, checkout_id,
    amount, currency, pay_currency, status, raw_status, paid_at, channel,
    failure_reason, request_id, request_type, customer_email, metadata,
    created_at, updated_at
"#;

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    reference: String,
    provider: String,
    provider_transaction_id: Option<String>,
    checkout_id: Option<String>,
    amount: Decimal,
    currency: String,
    pay_currency: Option<String>,
    status: String,
    raw_status: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    channel: Option<String>,
    failure_reason: Option<String>,
    request_id: Option<String>,
    request_type: Option<String>,
    customer_email: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = PaymentError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let link = match (row.request_id, row.request_type) {
            (Some(request_id), Some(request_type)) => Some(RequestLink {
                request_id,
                request_type: request_type.parse::<RequestType>()?,
            }),
            _ => None,
        };
        Ok(Payment {
            id: row.id,
            reference: Reference::new(row.reference)?,
            provider: row.provider.parse::<ProviderKind>()?,
            provider_transaction_id: row.provider_transaction_id,
            checkout_id: row.checkout_id,
            money: Money::new(row.amount, CurrencyCode::new(row.currency)?)?,
            pay_currency: row.pay_currency,
            status: CanonicalStatus::try_from(row.status.as_str())?,
            raw_status: row.raw_status,
            paid_at: row.paid_at,
            channel: row.channel,
            failure_reason: row.failure_reason,
            link,
            customer_email: row.customer_email,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, PaymentError> {
        let link = payment.link.as_ref();
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            INSERT INTO payments
                (id, reference, provider, checkout_id, amount, currency, pay_currency,
                 status, raw_status, request_id, request_type, customer_email, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment.id)
        .bind(payment.reference.as_str())
        .bind(payment.provider.as_str())
        .bind(payment.checkout_id.as_deref())
        .bind(payment.money.amount())
        .bind(payment.money.currency().as_str())
        .bind(payment.pay_currency.as_deref())
        .bind(payment.status().as_str())
        .bind(payment.raw_status.as_deref())
        .bind(link.map(|l| l.request_id.as_str()))
        .bind(link.map(|l| l.request_type.as_str()))
        .bind(&payment.customer_email)
        .bind(&payment.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PaymentError::Validation(format!("reference {} already exists", payment.reference))
            } else {
                PaymentError::Database(e)
            }
        })?;

        row.try_into()
    }

    async fn fetch_by_reference(
        &self,
        reference: &Reference,
    ) -> Result<Option<Payment>, PaymentError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1"
        ))
        .bind(reference.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Payment::try_from)
        .transpose()
    }

    async fn fetch_for_request(
        &self,
        request_id: &str,
        request_type: RequestType,
    ) -> Result<Vec<Payment>, PaymentError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE request_id = $1 AND request_type = $2
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(request_id)
        .bind(request_type.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }

    /// Advisory lock on the reference, then read, decide and write in one
    /// transaction. Concurrent verifications of one payment serialize here.
    async fn apply_verification(
        &self,
        reference: &Reference,
        update: &StatusUpdate,
        actor: &str,
    ) -> Result<TransitionOutcome, PaymentError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET LOCAL lock_timeout = '5s'")
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(reference.as_str())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1"
        ))
        .bind(reference.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| PaymentError::NotFound(format!("payment {reference}")))?;
        let mut payment = Payment::try_from(row)?;

        let outcome = payment.apply(update, Utc::now());
        match &outcome {
            TransitionOutcome::Updated { .. } => {
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = $2, raw_status = $3, provider_transaction_id = $4,
                        paid_at = $5, channel = $6, failure_reason = $7, updated_at = $8
                    WHERE id = $1
                    "#,
                )
                .bind(payment.id)
                .bind(payment.status.as_str())
                .bind(payment.raw_status.as_deref())
                .bind(payment.provider_transaction_id.as_deref())
                .bind(payment.paid_at)
                .bind(payment.channel.as_deref())
                .bind(payment.failure_reason.as_deref())
                .bind(payment.updated_at)
                .execute(&mut *tx)
                .await?;

                if let Some(entry) = payment.history_entry(&outcome, actor) {
                    insert_history_entry(&mut tx, &entry).await?;
                }
            }
            TransitionOutcome::Unchanged(_) | TransitionOutcome::Anomaly { .. } => {
                // Status stays put; only a first-seen provider id is recorded.
                sqlx::query(
                    r#"
                    UPDATE payments
                    SET provider_transaction_id = COALESCE(provider_transaction_id, $2)
                    WHERE id = $1 AND provider_transaction_id IS NULL AND $2::text IS NOT NULL
                    "#,
                )
                .bind(payment.id)
                .bind(update.provider_transaction_id.as_deref())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

impl PaymentStore for PgPaymentStore {
    fn insert<'a>(&'a self, payment: &'a NewPayment) -> StoreFuture<'a, Payment> {
        Box::pin(self.insert_payment(payment))
    }

    fn find_by_reference<'a>(
        &'a self,
        reference: &'a Reference,
    ) -> StoreFuture<'a, Option<Payment>> {
        Box::pin(self.fetch_by_reference(reference))
    }

    fn find_for_request<'a>(
        &'a self,
        request_id: &'a str,
        request_type: RequestType,
    ) -> StoreFuture<'a, Vec<Payment>> {
        Box::pin(self.fetch_for_request(request_id, request_type))
    }

    fn record_verification<'a>(
        &'a self,
        reference: &'a Reference,
        update: &'a StatusUpdate,
        actor: &'a str,
    ) -> StoreFuture<'a, TransitionOutcome> {
        Box::pin(self.apply_verification(reference, update, actor))
    }
}
