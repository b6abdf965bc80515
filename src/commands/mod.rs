//! Command handlers behind the `drift` binary.

pub mod capture;
pub mod diff;
pub mod stream;
