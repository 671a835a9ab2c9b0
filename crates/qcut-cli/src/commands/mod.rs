//! CLI command implementations.

pub mod calibrate;
pub mod common;
pub mod plot;
pub mod run;
pub mod summarize;
