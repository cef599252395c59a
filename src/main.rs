use axum::{
    Router,
    routing::{get, post},
};
use booking_funnel::{
    config::FunnelConfig,
    route_handler::{
        command_handler, payment_config_handler, query_handler, reconciliation_handler,
        start_handler, vehicles_handler,
    },
    state::new_application_state,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking_funnel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FunnelConfig::from_env()?;
    let state = new_application_state(&config)?;
    info!(
        mode = ?state.payment.mode,
        currency = %state.payment.currency,
        "payment settings resolved"
    );

    // Paid-status updates that failed inline are retried in the background,
    // and runs left idle are dropped on the same tick.
    let funnels = state.funnels.clone();
    let period = config.reconcile_interval;
    let idle_timeout = config.idle_timeout;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let reconciled = funnels.services().reconciliation().retry_pending().await;
            if reconciled > 0 {
                info!(reconciled, "pending bookings marked as paid");
            }
            let evicted = funnels.evict_idle(idle_timeout).await;
            if evicted > 0 {
                info!(evicted, "idle funnels evicted");
            }
        }
    });

    // A run is created with POST /funnel; after that a single logical endpoint
    // serves the view (GET) and takes commands (POST).
    let router = Router::new()
        .route("/funnel", post(start_handler))
        .route("/funnel/{funnel_id}", get(query_handler).post(command_handler))
        .route("/funnel/{funnel_id}/vehicles", get(vehicles_handler))
        .route("/payment-config", get(payment_config_handler))
        .route("/reconciliation", get(reconciliation_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router).await?;
    Ok(())
}
