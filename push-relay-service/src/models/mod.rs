pub mod events;
pub mod message;

pub use events::{DeviceTokenWrite, Promotion, PromotionCreated};
pub use message::{BatchSummary, DispatchEntry, Message, SendRequest, SendResponse};
