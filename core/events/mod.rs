//! # Wire-friendly Execution Events
//!
//! None of these events include references to existing data, and they are all self-contained with
//! primitives that make them easy to encode in a wire-friendly format for a log streamer.
//!
mod channel;
mod consumer;
pub mod event;

pub use channel::*;
pub use consumer::*;
pub use event::*;
