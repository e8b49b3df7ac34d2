//! Scaling constraint engine
//!
//! Turns raw recommendations into bounded targets:
//! - `horizontal`: replica counts, limited by scaling rules, stabilization and min/max
//! - `vertical`: container requests, clamped per container
//! - `history`: monotonic targets and the capped action log kept in the status

pub mod history;
pub mod horizontal;
pub mod vertical;

pub use history::HistoryError;
pub use horizontal::{HorizontalDecision, bound};
pub use vertical::{VerticalDecision, bound_containers};
