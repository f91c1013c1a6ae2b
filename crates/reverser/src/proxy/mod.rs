//! `/proxy/<identifier>` dispatch: path resolution, forwarding and request ids.

pub mod correlation;
pub mod dispatch;
pub mod forward;

pub use dispatch::Dispatcher;
