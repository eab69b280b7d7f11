//! Types shared between camera workers and the controller.
//!
//! Workers only ever push [`ScannerEvent`]s towards the controller; final
//! outcomes ([`PackWithCodes`], [`PackBadCodes`]) are produced on the
//! controller side and never travel back to a worker.

pub mod events;
pub mod utils;

pub use events::*;
