use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Money, OrderStatusType},
    traits::StatusTotal,
};

/// The admin dashboard figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    pub total_orders: i64,
    /// Gross bookings: the totals of every order that was paid at some point, refunded orders included.
    pub total_revenue: Money,
    pub by_status: Vec<StatusCount>,
    /// One entry per day, oldest first, ending today (UTC).
    pub daily: Vec<DailyStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: OrderStatusType,
    pub count: i64,
}

impl From<&StatusTotal> for StatusCount {
    fn from(total: &StatusTotal) -> Self {
        Self { status: total.status, count: total.count }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub count: i64,
    pub revenue: Money,
}

impl DailyStats {
    pub fn empty(date: NaiveDate) -> Self {
        Self { date, count: 0, revenue: Money::default() }
    }
}
