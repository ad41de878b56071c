//! The comment feed: records, the bounded buffer, live metrics and CSV encoding.

pub mod buffer;
pub mod comment;
pub mod csv;
pub mod metrics;

// Re-export commonly used types
pub use buffer::{EventBuffer, FEED_CAPACITY};
pub use comment::{Comment, CommentId, DEFAULT_NICKNAME, DEFAULT_USERNAME};
pub use metrics::{format_duration, rate_per_minute, LiveStats, IDLE_DURATION};
