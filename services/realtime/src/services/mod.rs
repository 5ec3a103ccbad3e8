//! Domain services behind the message router. Every mutation runs under the
//! per-key lock discipline in [`crate::lock`].

pub mod ahp;
pub mod stock;
pub mod subscription;
pub mod user;

pub use ahp::AhpConfigService;
pub use stock::StockService;
pub use subscription::SubscriptionService;
pub use user::UserService;
