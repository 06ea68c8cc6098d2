use std::fmt::Debug;

use chrono::{Days, NaiveDate, NaiveTime, TimeZone, Utc};
use log::*;

use crate::{
    db_types::{Capability, Money, OrderStatusType, Principal},
    engine_api::report_objects::{DailyStats, OrderStats, StatusCount},
    traits::{DailyTotal, OrderFlowError, ReportingManagement},
};

/// Length of the trailing daily series, today included.
pub const TRAILING_DAYS: u64 = 7;

pub struct ReportingApi<B> {
    db: B,
}

impl<B> Debug for ReportingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReportingApi")
    }
}

impl<B> ReportingApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ReportingApi<B>
where B: ReportingManagement
{
    /// Order totals for the admin dashboard.
    ///
    /// Revenue sums the totals of `paid`, `shipped`, `delivered` and `refunded` orders. Refunded orders count towards
    /// revenue, so the figure is gross bookings rather than net takings.
    pub async fn order_stats(&self, principal: &Principal) -> Result<OrderStats, OrderFlowError> {
        principal.require(Capability::ViewReports)?;
        let totals = self.db.fetch_status_totals().await?;
        let total_orders = totals.iter().map(|t| t.count).sum();
        let total_revenue: Money = totals
            .iter()
            .filter(|t| OrderStatusType::REVENUE.contains(&t.status))
            .map(|t| t.amount)
            .sum();
        let by_status = totals.iter().map(StatusCount::from).collect();

        let today = Utc::now().date_naive();
        let first_day = today.checked_sub_days(Days::new(TRAILING_DAYS - 1)).unwrap_or(today);
        let since = Utc.from_utc_datetime(&first_day.and_time(NaiveTime::default()));
        let daily = self.db.fetch_daily_totals(since, &OrderStatusType::REVENUE).await?;
        let daily = fill_days(first_day, today, &daily);
        info!("🧾️ Admin {} fetched order stats: {total_orders} orders, {total_revenue} revenue", principal.user_id);
        Ok(OrderStats { total_orders, total_revenue, by_status, daily })
    }
}

/// Builds a contiguous daily series from `first` to `last` inclusive, with zeroes for days the backend did not report.
fn fill_days(first: NaiveDate, last: NaiveDate, totals: &[DailyTotal]) -> Vec<DailyStats> {
    first
        .iter_days()
        .take_while(|d| *d <= last)
        .map(|date| {
            totals
                .iter()
                .find(|t| t.day.parse::<NaiveDate>().map(|d| d == date).unwrap_or(false))
                .map(|t| DailyStats { date, count: t.count, revenue: t.revenue })
                .unwrap_or_else(|| DailyStats::empty(date))
        })
        .collect()
}
