pub mod error;
pub mod time;

pub use error::{PushgateError, Result};
pub use time::parse_duration;
