pub mod health;
pub mod hooks;
pub mod send;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use hooks::{device_token_written, promotion_created};
pub use send::{preflight, send_notification};
