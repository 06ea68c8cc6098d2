use std::collections::HashMap;

use order_engine::db_types::OrderId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

//--------------------------------------       Razorpay        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Razorpay returns an empty array rather than an empty object when there are no notes.
    #[serde(default)]
    pub notes: Value,
}

impl RazorpayOrder {
    pub fn note_order_id(&self) -> Option<OrderId> {
        note_as_i64(&self.notes, "order_id").map(OrderId::from)
    }

    pub fn note_user_id(&self) -> Option<i64> {
        note_as_i64(&self.notes, "user_id")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RazorpayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
}

/// Notes are string-valued in Razorpay, but older integrations stored numbers. Accept both.
pub(crate) fn note_as_i64(notes: &Value, key: &str) -> Option<i64> {
    match notes.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

//--------------------------------------        Stripe         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    pub fn metadata_order_id(&self) -> Option<OrderId> {
        self.metadata.get("order_id").and_then(|s| s.parse::<i64>().ok()).map(OrderId::from)
    }

    pub fn metadata_user_id(&self) -> Option<i64> {
        self.metadata.get("user_id").and_then(|s| s.parse::<i64>().ok())
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeRefund {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}
