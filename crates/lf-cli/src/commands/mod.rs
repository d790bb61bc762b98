//! Command implementations

pub(crate) mod common;
pub mod run;
pub mod status;
