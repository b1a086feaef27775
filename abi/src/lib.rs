//! Kairos scheduling ABI types
//!
//! Canonical definitions for the task vocabulary shared between the
//! scheduling core, the blocking primitives, and the kernel subsystems that
//! consume them. Having a single source of truth keeps task states, priority
//! ranges, and error codes identical on both sides of every call.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod error;
pub mod task;

pub use error::*;
pub use task::*;
