use thiserror::Error;

use crate::db_types::{Capability, OrderId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("User {user_id} is not allowed to {capability}")]
    PermissionDenied { user_id: i64, capability: Capability },
    #[error("User {user_id} cannot claim a payment for order {order_id}")]
    UnauthorizedClaim { order_id: OrderId, user_id: i64 },
}
