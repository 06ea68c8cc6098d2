use chrono::{DateTime, Utc};

use crate::{
    db_types::OrderStatusType,
    traits::{DailyTotal, OrderFlowError, StatusTotal},
};

/// Aggregate, read-only queries over the order history.
#[allow(async_fn_in_trait)]
pub trait ReportingManagement {
    /// Order counts and summed totals, grouped by status. Statuses without orders are omitted.
    async fn fetch_status_totals(&self) -> Result<Vec<StatusTotal>, OrderFlowError>;

    /// Per-day order counts (all orders) and revenue (orders in one of `revenue_statuses`) for orders created at or
    /// after `since`. Days without orders are omitted.
    async fn fetch_daily_totals(
        &self,
        since: DateTime<Utc>,
        revenue_statuses: &[OrderStatusType],
    ) -> Result<Vec<DailyTotal>, OrderFlowError>;
}
