use {
    marketpay::{
        AppState,
        adapters::{nowpayments::NowPaymentsAdapter, paystack::PaystackAdapter},
        config::AppConfig,
        domain::error::PaymentError,
        infra::postgres::PgPaymentStore,
        services::{
            gateway::PaymentGateway,
            webhook::{CardBankWebhookAuthenticator, CryptoIpnAuthenticator},
        },
        transport::http::router,
    },
    sqlx::postgres::PgPoolOptions,
    std::{net::SocketAddr, sync::Arc, time::Duration},
    tokio::signal,
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| PaymentError::Configuration("DATABASE_URL must be set".into()))?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let gateway = PaymentGateway::new(
        Arc::new(PaystackAdapter::new(config.paystack())?),
        Arc::new(NowPaymentsAdapter::new(config.nowpayments())?),
        Arc::new(PgPaymentStore::new(pool)),
        config.gateway_settings(),
    );

    // The card/bank gateway signs webhooks with the account's secret key.
    let mut card_bank_auth = CardBankWebhookAuthenticator::new(config.paystack_secret_key.clone())?;
    if let Some(ips) = config.paystack_ip_allowlist.clone() {
        card_bank_auth = card_bank_auth.with_ip_allowlist(ips);
    }
    let crypto_auth = CryptoIpnAuthenticator::new(config.nowpayments_ipn_secret.clone())?;

    let state = AppState::new(Arc::new(gateway), card_bank_auth, crypto_auth);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, sandbox = config.sandbox, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl+c: {e}");
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
