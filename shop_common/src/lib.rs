mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyParseError, DEFAULT_CURRENCY};
pub use secret::Secret;
