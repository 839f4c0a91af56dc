//! # vigil-core
//!
//! Core types shared by every Vigil crate.
//!
//! - [`event`] - the immutable [`SecurityEvent`] record and its type taxonomy
//! - [`severity`] - the totally ordered [`SeverityLevel`]
//! - [`clock`] - injectable time source used for expiry and timestamps
//! - [`error`] - construction errors for the event model

pub mod clock;
pub mod error;
pub mod event;
pub mod severity;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{EventError, EventResult};
pub use event::{EventDetails, SecurityEvent, SecurityEventBuilder, SecurityEventType};
pub use severity::SeverityLevel;
