//! # Event subscribers.
//!
//! Subscribers observe supervisor [`Event`](crate::Event)s without being able
//! to slow the supervisor loop down.
//!
//! ## Architecture
//! ```text
//! supervisor loop ── publish(Event) ──► Bus ──► subscriber listener ──► SubscriberSet::emit
//!                                                                  ┌─────────┼─────────┐
//!                                                                  ▼         ▼         ▼
//!                                                             LogWriter AliveTracker  custom
//! ```
//!
//! ## Built-in subscribers
//! - [`LogWriter`]: renders lifecycle events as `tracing` records
//! - [`AliveTracker`]: keeps the last known live pid per slot

mod alive;
mod log;
mod set;
mod subscribe;

pub use alive::AliveTracker;
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
