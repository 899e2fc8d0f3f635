//! EcoFashion Commerce - marketplace checkout and settlement service

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ecofashion_commerce::api::{router, AppState};
use ecofashion_commerce::config::Config;
use ecofashion_commerce::payments::VnPayClient;
use ecofashion_commerce::publisher::EventPublisher;
use ecofashion_commerce::services::Marketplace;
use ecofashion_commerce::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url, config.database_max_connections).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, keeping state in memory");
            Arc::new(MemoryStore::new())
        }
    };
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will only be logged");
                None
            }
        },
        None => None,
    };
    if config.vnpay.is_none() {
        tracing::warn!("VNPAY_TMN_CODE not set, gateway payments disabled");
    }

    let marketplace = Arc::new(Marketplace::new(store, config.commerce.clone(), config.vnpay.clone().map(VnPayClient::new), EventPublisher::new(nats)));
    spawn_expiry_sweep(marketplace.clone(), config.expiry_sweep);

    let app = router(AppState { marketplace });
    tracing::info!("🚀 EcoFashion Commerce listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

/// Returns stock held by checkout sessions nobody paid for.
fn spawn_expiry_sweep(marketplace: Arc<Marketplace>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = marketplace.checkout.expire_stale_sessions(chrono::Utc::now()).await {
                tracing::error!(error = %e, "checkout expiry sweep failed");
            }
        }
    });
}
