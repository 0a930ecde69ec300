//! # Sandboxes
//!
//! A sandbox is a private, throw-away directory where a single action runs. The `SandboxManager`
//! creates one per execution and stages the action's declared inputs into it. The resulting
//! `SandboxInstance` is removed as soon as it is dropped.
//!
//! The on-disk layout of a sandbox is:
//!
//! ```text
//! <sandbox_root>/<uuid>/
//!   execroot/   the working directory of the action
//!   tmp/        its scratch space, exposed as TMPDIR
//!   stdout.log
//!   stderr.log
//! ```
//!
mod error;
mod instance;
mod manager;
mod stage;

pub use error::*;
pub use instance::*;
pub use manager::*;

/// How inputs are placed inside a sandbox.
///
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MaterializationMode {
    /// Inputs are copied, so nothing the action does to them can reach the original.
    #[default]
    Copy,

    /// Inputs are hard-linked. Cheaper, but writes through an input modify the original.
    Hardlink,

    /// Inputs are symlinked to their original location.
    Symlink,
}
