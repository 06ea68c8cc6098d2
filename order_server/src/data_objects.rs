use order_engine::{db_types::ProductId, traits::PaymentClaim};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToCartParams {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// The fields handed to the client by Razorpay's checkout once a payment completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RazorpayVerification {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

impl From<RazorpayVerification> for PaymentClaim {
    fn from(value: RazorpayVerification) -> Self {
        PaymentClaim {
            provider_order_id: value.razorpay_order_id,
            payment_id: value.razorpay_payment_id,
            signature: Some(value.razorpay_signature),
        }
    }
}

/// A Stripe payment intent is its own payment reference, so the claim carries the intent id twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfirmation {
    pub payment_intent_id: String,
}

impl From<StripeConfirmation> for PaymentClaim {
    fn from(value: StripeConfirmation) -> Self {
        PaymentClaim {
            provider_order_id: value.payment_intent_id.clone(),
            payment_id: value.payment_intent_id,
            signature: None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn quantity_defaults_to_one() {
        let params: AddToCartParams = serde_json::from_str(r#"{"product_id": 4}"#).unwrap();
        assert_eq!(params.product_id, ProductId(4));
        assert_eq!(params.quantity, 1);
        let params: AddToCartParams = serde_json::from_str(r#"{"product_id": 4, "quantity": 3}"#).unwrap();
        assert_eq!(params.quantity, 3);
    }

    #[test]
    fn claims() {
        let claim = PaymentClaim::from(RazorpayVerification {
            razorpay_order_id: "order_1".into(),
            razorpay_payment_id: "pay_1".into(),
            razorpay_signature: "abc".into(),
        });
        assert_eq!(claim.provider_order_id, "order_1");
        assert_eq!(claim.signature.as_deref(), Some("abc"));
        let claim = PaymentClaim::from(StripeConfirmation { payment_intent_id: "pi_1".into() });
        assert_eq!(claim.provider_order_id, "pi_1");
        assert_eq!(claim.payment_id, "pi_1");
        assert!(claim.signature.is_none());
    }
}
