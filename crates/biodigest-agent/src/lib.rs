//! biodigest-agent — configuration, run orchestration and digest output for
//! the `biodigest` binary.

pub mod config;
pub mod output;
pub mod pipeline;
