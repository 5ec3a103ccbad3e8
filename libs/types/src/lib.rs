//! Shared domain types for Tickflow services.
//!
//! Everything that crosses a service boundary lives here: the securities
//! model, the request DTOs the message router deserializes, the response
//! envelope, and the canonical tick event produced by the feed connector.

pub mod ahp;
pub mod response;
pub mod stock;
pub mod subscription;
pub mod tick;
pub mod user;

pub use ahp::{AhpConfig, AhpConfigRequest};
pub use response::Response;
pub use stock::{Stock, StockRequest, YearData, YearDataRequest};
pub use subscription::{Subscription, SubscriptionRequest};
pub use tick::TickEvent;
pub use user::{User, UserRequest};
