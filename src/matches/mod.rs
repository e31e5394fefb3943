//! # Match records and the collection pipeline.
//!
//! The scanner hands finalized matches to a bounded queue; worker tasks
//! drain it, normalize timestamps, and persist compressed artifacts with
//! atomic lock-then-rename writes. Losing a match is preferred over blocking
//! the scanner: a stalled scanner stalls the worker's own stdout pipe.

mod collector;
mod record;
pub(crate) mod writer;

pub(crate) use collector::{CollectorOptions, MatchCollector};
pub use record::{Kill, Location, Match, Team, BLUE_TEAM, PINK_TEAM};
