//! pushgate-api: the push/scrape listener.
//!
//! ```text
//! POST|PUT /metrics[/<label>/<value>...]  → Aggregate::ingest → 202
//! GET      /metrics                       → Aggregate::render (streamed)
//! ```

pub mod error;
pub mod handlers;
pub mod router;

pub use error::ApiError;
pub use router::{ApiConfig, api_router};
