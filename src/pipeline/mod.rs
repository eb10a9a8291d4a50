//! Downsampling pipeline: configuration, work units, output chunks and the
//! parallel runner tying them together.
pub mod chunk;
pub mod config;
pub mod runner;
pub mod units;
