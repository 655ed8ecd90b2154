#![warn(missing_docs)]
//! Headless session harness: a game facade without rendering, a loopback
//! host-and-clients driver and JSON run reports.

mod game;
mod harness;
mod report;

pub use game::*;
pub use harness::*;
pub use report::*;
