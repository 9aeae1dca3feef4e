#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Monitoring: Prometheus metrics for the broker.

pub mod metrics;
