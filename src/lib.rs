pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;
pub mod transport;

use {
    services::{
        gateway::PaymentGateway,
        webhook::{CardBankWebhookAuthenticator, CryptoIpnAuthenticator, WebhookProcessor},
    },
    std::sync::Arc,
};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<PaymentGateway>,
    pub webhooks: Arc<WebhookProcessor>,
    pub card_bank_auth: Arc<CardBankWebhookAuthenticator>,
    pub crypto_auth: Arc<CryptoIpnAuthenticator>,
}

impl AppState {
    pub fn new(
        gateway: Arc<PaymentGateway>,
        card_bank_auth: CardBankWebhookAuthenticator,
        crypto_auth: CryptoIpnAuthenticator,
    ) -> Self {
        Self {
            webhooks: Arc::new(WebhookProcessor::new(gateway.clone())),
            gateway,
            card_bank_auth: Arc::new(card_bank_auth),
            crypto_auth: Arc::new(crypto_auth),
        }
    }
}
