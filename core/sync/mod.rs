//! Sync primitives for the scheduler's shared state, swapped for `shuttle`'s when model-checking
//! the ready queue with `--cfg shuttle`.
//!

#[cfg(all(shuttle, test))]
pub(crate) use shuttle::{sync::*, thread};

#[cfg(not(all(shuttle, test)))]
pub(crate) use std::sync::*;

#[cfg(all(not(shuttle), test))]
#[allow(unused_imports)]
pub(crate) use std::thread;
