#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Observability: process metrics.

pub mod metrics;
