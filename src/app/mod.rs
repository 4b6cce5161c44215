pub mod context;
pub mod error;

pub use context::WatchContext;
pub use error::{FeedwatchError, Result};
