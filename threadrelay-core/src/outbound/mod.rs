//! Outbound side of the pipeline: chat boundary, queue, splitting and retry.

pub mod adapter;
pub mod queue;
pub mod retry;
pub mod split;

pub use adapter::{Affordance, ChatAdapter, DeliveryError};
pub use queue::{take_batch, MessageQueue, QueueSettings};
pub use retry::{deliver_with_retry, RetryPolicy};
pub use split::split_message;
