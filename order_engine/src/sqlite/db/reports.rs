use chrono::{DateTime, Utc};
use log::trace;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::OrderStatusType,
    traits::{DailyTotal, OrderFlowError, StatusTotal},
};

pub async fn fetch_status_totals(conn: &mut SqliteConnection) -> Result<Vec<StatusTotal>, OrderFlowError> {
    let totals = sqlx::query_as(
        "SELECT status, COUNT(*) AS count, COALESCE(SUM(total_amount), 0) AS amount FROM orders GROUP BY status \
         ORDER BY status",
    )
    .fetch_all(conn)
    .await?;
    Ok(totals)
}

/// Order counts and revenue per UTC calendar day, for orders created at or after `since`. Only orders whose status is
/// in `revenue_statuses` contribute to revenue; every order contributes to the count. Days without orders are absent.
pub async fn fetch_daily_totals(
    since: DateTime<Utc>,
    revenue_statuses: &[OrderStatusType],
    conn: &mut SqliteConnection,
) -> Result<Vec<DailyTotal>, OrderFlowError> {
    let mut builder = QueryBuilder::new("SELECT date(created_at) AS day, COUNT(*) AS count, ");
    if revenue_statuses.is_empty() {
        builder.push("0 AS revenue ");
    } else {
        builder.push("COALESCE(SUM(CASE WHEN status IN (");
        let mut statuses = builder.separated(", ");
        for status in revenue_statuses {
            statuses.push_bind(*status);
        }
        builder.push(") THEN total_amount ELSE 0 END), 0) AS revenue ");
    }
    builder.push("FROM orders WHERE unixepoch(created_at) >= ");
    builder.push_bind(since.timestamp());
    builder.push(" GROUP BY day ORDER BY day");
    trace!("🗃️ Executing query: {}", builder.sql());
    let totals = builder.build_query_as::<DailyTotal>().fetch_all(conn).await?;
    Ok(totals)
}
