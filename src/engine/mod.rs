//! Core engine — the per-tick fetch → score → gate → execute pipeline.

pub mod executor;
pub mod runner;
