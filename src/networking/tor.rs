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

//! Tor daemon supervision.
//!
//! The daemon is spawned with `tor -f -` and configured entirely over
//! stdin. The core depends on two observable outputs: the SOCKS port we
//! picked for it, and the hidden-service hostname file it writes. The
//! child is killed on drop, so it cannot outlive the process on any exit
//! path, panics included.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use thiserror::Error;
use tokio::{io::AsyncWriteExt, net::TcpListener, process::Command, time::Instant};
use tracing::info;

use crate::core::sanity::validate_onion_address;

/// Tor supervision errors.
#[derive(Debug, Error)]
pub enum TorError {
    #[error("io")]
    Io,
    #[error("failed to spawn tor daemon")]
    Spawn,
    #[error("hidden service hostname was not published in time")]
    HostnameTimeout,
    #[error("tor published an invalid hidden service hostname")]
    BadHostname,
}

/// Pick an ephemeral localhost port for Tor's SocksPort.
pub async fn ephemeral_socks_addr() -> Result<SocketAddr, TorError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|_| TorError::Io)?;
    listener.local_addr().map_err(|_| TorError::Io)
}

/// Render the torrc fed to `tor -f -`.
pub fn torrc(datadir: &Path, listen: SocketAddr, socks: SocketAddr, portmap: &[String]) -> String {
    let mut hsports = vec![format!("HiddenServicePort {} {}", listen.port(), listen)];
    for entry in portmap {
        if let Some((src, dst)) = entry.split_once(':') {
            hsports.push(format!("HiddenServicePort {src} 127.0.0.1:{dst}"));
        }
    }

    format!(
        "Log warn syslog\n\
         RunAsDaemon 0\n\
         DataDirectory {}\n\
         SocksPort {}\n\
         HiddenServiceDir {}\n\
         {}\n",
        datadir.join("tor").display(),
        socks,
        datadir.join("hs").display(),
        hsports.join("\n"),
    )
}

/// A running Tor daemon, killed when dropped.
pub struct TorProcess {
    child: tokio::process::Child,
    socks_addr: SocketAddr,
    datadir: PathBuf,
}

impl TorProcess {
    /// Spawn the Tor daemon for this node.
    pub async fn spawn(
        datadir: &Path,
        listen: SocketAddr,
        portmap: &[String],
    ) -> Result<Self, TorError> {
        let socks_addr = ephemeral_socks_addr().await?;
        info!(socks = %socks_addr, "forking tor daemon");

        let mut child = Command::new("tor")
            .arg("-f")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|_| TorError::Spawn)?;

        let mut stdin = child.stdin.take().ok_or(TorError::Spawn)?;
        let config = torrc(datadir, listen, socks_addr, portmap);
        stdin
            .write_all(config.as_bytes())
            .await
            .map_err(|_| TorError::Io)?;
        drop(stdin);

        Ok(Self {
            child,
            socks_addr,
            datadir: datadir.to_path_buf(),
        })
    }

    /// The SOCKS5 proxy address of this Tor instance.
    pub fn socks_addr(&self) -> SocketAddr {
        self.socks_addr
    }

    /// Wait for Tor to publish the hidden service hostname and return it
    /// without its trailing newline.
    pub async fn hostname(&self, wait: Duration) -> Result<String, TorError> {
        let path = self.datadir.join("hs").join("hostname");
        let deadline = Instant::now() + wait;

        loop {
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => {
                    let host = raw.trim_end_matches('\n').to_string();
                    validate_onion_address(&host).map_err(|_| TorError::BadHostname)?;
                    return Ok(host);
                }
                Err(_) if Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(_) => return Err(TorError::HostnameTimeout),
            }
        }
    }

    /// Kill the daemon explicitly. Drop does the same.
    pub async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}
