//! Request id generation for log and span correlation.
//!
//! Ids never leave the process: forwarded requests carry no extra headers.

use uuid::Uuid;

/// Generate a new request id (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
