//! Domain models for mirrored mail entities

pub mod label;
mod message;
mod watermark;

pub use message::{Message, MessageBuilder, MessageId};
pub use watermark::{HistoryId, Watermark};
