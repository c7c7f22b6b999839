use ridesync::config::AppConfig;
use ridesync::error::AppError;
use ridesync::services::reconcile::ProfileSync;
use ridesync::state::SessionContext;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    info!(api = %config.api_base_url, store = ?config.store, "starting sync pass");
    let ctx = SessionContext::from_config(config).await?;

    match ctx.current_actor() {
        Some(actor) => info!(actor_id = %actor.id, role = %actor.role, "session found"),
        None => warn!("no actor stored on this device; log in first"),
    }

    match ctx.reconciler.sync_profile().await {
        Ok(ProfileSync::Synced) => info!("profile edit delivered"),
        Ok(outcome) => info!(?outcome, "profile sync"),
        Err(err) => warn!("profile sync failed: {err}"),
    }

    let view = ctx.reconciler.refresh_trips().await;
    info!(source = ?view.source, shown = view.trips.len(), "recent trips");
    for trip in &view.trips {
        info!(
            trip_id = %trip.id,
            status = %trip.status,
            to = %trip.destination,
            amount = trip.payment.amount,
            currency = %trip.payment.currency,
            rating = ?trip.rating,
            "trip"
        );
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ridesync=debug".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
