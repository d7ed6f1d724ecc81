//! Review analysis.
//!
//! The aggregator and its tuning table are pure and synchronous; nothing in
//! this module performs IO.

pub mod aggregator;
pub mod summary;
pub mod tuning;

pub use aggregator::{aggregate, is_work_related};
pub use tuning::Tuning;
