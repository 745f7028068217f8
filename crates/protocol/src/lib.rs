pub mod constants;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::{Endpoint, endpoint_url};
pub use messages::{BlockFields, ExistQuery, ExistResponse, MergeRequest};
pub use types::{ErrorCode, Rejection};
