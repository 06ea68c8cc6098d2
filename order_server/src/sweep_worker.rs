use chrono::Duration;
use log::*;
use order_engine::{db_types::Order, OrderFlowApi, OrderFlowError, PaymentGatewayDatabase, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the stale order sweep. Every `interval`, pending orders older than `threshold` are cancelled.
/// Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_sweep_worker(
    api: OrderFlowApi<SqliteDatabase>,
    threshold: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    let period = interval.to_std().unwrap_or(std::time::Duration::from_secs(600));
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        info!(
            "🕰️ Stale order sweep started. Pending orders older than {} minutes are cancelled.",
            threshold.num_minutes()
        );
        loop {
            timer.tick().await;
            if let Err(e) = run_sweep(&api, threshold).await {
                error!("🕰️ Error running the stale order sweep: {e}");
            }
        }
    })
}

/// Runs the sweep once and returns the orders it cancelled.
pub async fn run_sweep<B: PaymentGatewayDatabase>(
    api: &OrderFlowApi<B>,
    threshold: Duration,
) -> Result<Vec<Order>, OrderFlowError> {
    debug!("🕰️ Running the stale order sweep");
    let cancelled = api.cancel_stale_orders(threshold).await?;
    if !cancelled.is_empty() {
        info!("🕰️ {} stale orders cancelled", cancelled.len());
        debug!("🕰️ Cancelled orders: {}", order_list(&cancelled));
    }
    Ok(cancelled)
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] user: {} total: {} {}", o.id, o.user_id, o.total_amount, o.currency))
        .collect::<Vec<String>>()
        .join(", ")
}
