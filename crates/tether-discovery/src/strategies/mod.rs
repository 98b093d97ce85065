//! Discovery strategies
//!
//! Each strategy is best-effort: a total failure contributes nothing and is
//! logged at debug, never aborting the run. Candidates stream out through an
//! mpsc sender as they are found so the engine can begin verification before
//! a strategy finishes.

pub mod advert;
pub mod neighbors;
pub mod overlay;
pub mod sweep;
