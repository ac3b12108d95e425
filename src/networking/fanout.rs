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

//! Seed fanout and bootstrap loop.
//!
//! Each round announces concurrently to the union of the configured seeds
//! and every validated peer learned so far, then dumps the registry as JSON
//! on stdout. With an announce interval configured the loop repeats
//! forever; without one it runs a single round.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    core::{peers::RegistryError, sanity::{validate_onion_internal, SanityError}},
    networking::initiator,
    node::Node,
};

/// Validate the configured seed identifiers. Called once at startup;
/// a bad seed is a configuration error, not a runtime condition.
pub fn validate_seeds(seeds: &[String]) -> Result<(), SanityError> {
    for seed in seeds {
        validate_onion_internal(seed)?;
    }
    Ok(())
}

/// Announce concurrently to every current target. Returns the number of
/// successful handshakes.
pub async fn announce_round(node: &Arc<Node>) -> usize {
    let mut targets = node.cfg.seeds.clone();
    targets.extend(node.peers.validated_peers(usize::MAX));
    targets.sort();
    targets.dedup();
    targets.retain(|t| *t != node.onion);

    if targets.is_empty() {
        warn!("no targets to announce to");
        return 0;
    }

    let tasks: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let node = Arc::clone(node);
            tokio::spawn(async move {
                match initiator::announce(&node, &target).await {
                    Ok(()) => {
                        node.metrics.announces_total.inc();
                        true
                    }
                    Err(e) => {
                        warn!(peer = %target, err = %e, "announce failed");
                        node.metrics.announce_failures_total.inc();
                        false
                    }
                }
            })
        })
        .collect();

    join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(true)))
        .count()
}

/// The bootstrap control loop.
pub async fn run(node: Arc<Node>) -> Result<(), RegistryError> {
    loop {
        let succ = announce_round(&node).await;
        if succ == 0 {
            warn!("no successful announces");
        } else {
            info!(count = succ, "successfully announced");
        }

        node.metrics.peers_known.set(node.peers.len() as i64);
        node.metrics
            .peers_validated
            .set(node.peers.validated_peers(usize::MAX).len() as i64);
        if let Ok(rendered) = node.metrics.render() {
            debug!(metrics = %rendered, "round metrics");
        }

        // The registry dump is the program's output, not a log line.
        println!("{}", node.peers.export_json()?);

        match node.cfg.announce_interval {
            Some(secs) if secs > 0 => tokio::time::sleep(Duration::from_secs(secs)).await,
            _ => return Ok(()),
        }
    }
}
