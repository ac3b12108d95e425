// Copyright (c) 2026 The tor-dam developers
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// RPC requests served.
    pub rpc_requests_total: IntCounter,
    /// RPC requests that returned an error.
    pub rpc_failures_total: IntCounter,
    /// Successful outbound announces.
    pub announces_total: IntCounter,
    /// Failed outbound announces.
    pub announce_failures_total: IntCounter,
    /// Malformed identifiers dropped while absorbing peer lists.
    pub garbage_peers_total: IntCounter,
    /// Known peers gauge.
    pub peers_known: IntGauge,
    /// Validated peers gauge.
    pub peers_validated: IntGauge,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let rpc_requests_total = IntCounter::new("tordam_rpc_requests_total", "RPC requests served")
            .map_err(|_| MetricsError::Prom)?;
        let rpc_failures_total =
            IntCounter::new("tordam_rpc_failures_total", "RPC requests that failed")
                .map_err(|_| MetricsError::Prom)?;
        let announces_total =
            IntCounter::new("tordam_announces_total", "Successful outbound announces")
                .map_err(|_| MetricsError::Prom)?;
        let announce_failures_total = IntCounter::new(
            "tordam_announce_failures_total",
            "Failed outbound announces",
        )
        .map_err(|_| MetricsError::Prom)?;
        let garbage_peers_total = IntCounter::new(
            "tordam_garbage_peers_total",
            "Malformed identifiers dropped during absorption",
        )
        .map_err(|_| MetricsError::Prom)?;
        let peers_known =
            IntGauge::new("tordam_peers_known", "Known peers").map_err(|_| MetricsError::Prom)?;
        let peers_validated = IntGauge::new("tordam_peers_validated", "Validated peers")
            .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(rpc_requests_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(rpc_failures_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(announces_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(announce_failures_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(garbage_peers_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(peers_known.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(peers_validated.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            rpc_requests_total,
            rpc_failures_total,
            announces_total,
            announce_failures_total,
            garbage_peers_total,
            peers_known,
            peers_validated,
        })
    }

    /// Render the current metrics in the Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|_| MetricsError::Prom)
    }
}
