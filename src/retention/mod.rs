//! Telemetry retention.
//!
//! A sweep walks every device in the store and deletes telemetry events
//! whose `timestamp` is at or before a cutoff computed once when the sweep
//! starts:
//! 1. Discovery lists root collections, then device documents in each, and
//!    resolves the events collection beneath every device
//! 2. Each device's events are deleted one bounded page at a time, each page
//!    committed as a single atomic batch, until a page finds nothing
//!
//! The scheduled worker repeats the sweep on a fixed interval. Sweeps keep no
//! state between runs, so an interrupted sweep is finished by the next one.

mod discovery;
mod page;
mod sweep;
mod worker;

#[cfg(test)]
mod tests;

pub use discovery::{SweepTarget, discover_targets};
pub use page::delete_expired_page;
pub use sweep::{DeviceSweep, SweepError, SweepOptions, SweepReport, Sweeper};
pub use worker::start_retention_worker;
