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

//! tor-dam: decentralized peer discovery over Tor v3 hidden services.
//!
//! Every participant runs an identical node that:
//! - publishes itself as a hidden service,
//! - proves ownership of its identity to peers through a signed
//!   challenge-response (`ann.Init` / `ann.Validate`),
//! - gossips its validated peer list outward, bootstrapping from seeds.
//!
//! The library is organized as:
//! - [`core`]: validators, node identity, the shared peer registry
//! - [`networking`]: announce responder/initiator, JSON-RPC transport,
//!   seed fanout, Tor daemon supervision
//! - [`monitoring`]: Prometheus process metrics

/// Runtime configuration (defaults, config file, overrides).
pub mod config;
/// Core protocol primitives (validators, identity, peer registry).
pub mod core;
/// Observability (Prometheus metrics).
pub mod monitoring;
/// Announce protocol, JSON-RPC transport, fanout, Tor supervision.
pub mod networking;
/// The process-wide context object.
pub mod node;
