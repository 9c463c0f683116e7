//! # CumView Parallel
//!
//! Worker-pool strategies for running independent jobs.
//!
//! This crate provides:
//! - `ProcessingMode`: sequential, all-cores, or fixed-size pool execution
//! - Fail-fast fallible mapping over a slice of jobs

pub mod strategy;

pub use strategy::{num_cpus, ParallelStrategy, PoolError, ProcessingMode};
