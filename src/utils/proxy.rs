// src/utils/proxy.rs

//! Round-robin rotation over SOCKS5 tunnels.
//!
//! Each tunnel is an `ssh -D` dynamic forward authenticated with the
//! configured private key. The tunnel owns the HTTP client that dials
//! through it; a tunnel whose dial fails is dropped for the rest of the
//! process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::ProxyConfig;

/// How long a freshly spawned tunnel gets to open its local listener.
const DIAL_TIMEOUT: Duration = Duration::from_secs(15);

/// One live SOCKS5 tunnel and the client bound to it.
#[derive(Debug)]
pub struct Tunnel {
    name: String,
    client: reqwest::Client,
    process: Mutex<Option<Child>>,
}

impl Tunnel {
    /// Wrap an already listening SOCKS5 endpoint.
    pub fn new(name: impl Into<String>, local_addr: &str, timeout: Duration) -> Result<Self> {
        let proxy = reqwest::Proxy::all(format!("socks5h://{local_addr}"))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            name: name.into(),
            client,
            process: Mutex::new(None),
        })
    }

    /// Spawn `ssh -N -D` for `config` and wait for its listener.
    pub async fn start(
        config: &ProxyConfig,
        private_key_path: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let child = Command::new("ssh")
            .arg("-N")
            .arg("-D")
            .arg(&config.local_addr)
            .arg("-i")
            .arg(private_key_path)
            .args(["-o", "ExitOnForwardFailure=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .args(["-o", "ServerAliveInterval=30"])
            .arg(ssh_destination(config))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::Proxy(format!("spawn ssh for {}: {e}", config.remote_addr)))?;

        let tunnel = Self::new(config.remote_addr.clone(), &config.local_addr, timeout)?;
        *tunnel.lock_process() = Some(child);

        wait_for_listener(&config.local_addr, cancel).await?;
        log::info!(
            "Proxy tunnel {} listening on {}",
            config.remote_addr,
            config.local_addr
        );
        Ok(tunnel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn lock_process(&self) -> std::sync::MutexGuard<'_, Option<Child>> {
        self.process.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Terminate the ssh process, if we own one.
    pub fn close(&self) {
        if let Some(mut child) = self.lock_process().take() {
            if let Err(e) = child.start_kill() {
                log::warn!("Failed to stop tunnel {}: {}", self.name, e);
            }
        }
    }
}

fn ssh_destination(config: &ProxyConfig) -> String {
    match config.remote_addr.rsplit_once(':') {
        Some((host, port)) if port.parse::<u16>().is_ok() => {
            format!("ssh://{}@{}:{}", config.username, host, port)
        }
        _ => format!("{}@{}", config.username, config.remote_addr),
    }
}

async fn wait_for_listener(addr: &str, cancel: &CancellationToken) -> Result<()> {
    let deadline = tokio::time::Instant::now() + DIAL_TIMEOUT;
    loop {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(AppError::Proxy(format!("tunnel on {addr} never came up")));
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
    }
}

#[derive(Debug, Default)]
struct RotatorState {
    tunnels: Vec<Arc<Tunnel>>,
    next: usize,
}

/// Hands out tunnels in round-robin order.
#[derive(Debug, Default)]
pub struct ProxyRotator {
    state: Mutex<RotatorState>,
}

impl ProxyRotator {
    pub fn from_tunnels(tunnels: Vec<Tunnel>) -> Self {
        Self {
            state: Mutex::new(RotatorState {
                tunnels: tunnels.into_iter().map(Arc::new).collect(),
                next: 0,
            }),
        }
    }

    /// Start every configured tunnel concurrently. Tunnels that fail to
    /// come up are logged and left out.
    pub async fn start(
        configs: &[ProxyConfig],
        private_key_path: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let results = future::join_all(
            configs
                .iter()
                .map(|c| Tunnel::start(c, private_key_path, timeout, cancel)),
        )
        .await;

        let mut tunnels = Vec::new();
        for (config, result) in configs.iter().zip(results) {
            match result {
                Ok(tunnel) => tunnels.push(tunnel),
                Err(e) => log::error!("Failed to start tunnel {}: {}", config.remote_addr, e),
            }
        }
        if tunnels.is_empty() {
            return Err(AppError::NoProxy);
        }
        Ok(Self::from_tunnels(tunnels))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RotatorState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Next tunnel in rotation.
    pub fn next(&self) -> Result<Arc<Tunnel>> {
        let mut state = self.lock();
        if state.tunnels.is_empty() {
            return Err(AppError::NoProxy);
        }
        let idx = state.next % state.tunnels.len();
        state.next = (idx + 1) % state.tunnels.len();
        Ok(Arc::clone(&state.tunnels[idx]))
    }

    /// Drop a tunnel whose dial failed.
    pub fn remove(&self, tunnel: &Arc<Tunnel>) {
        let mut state = self.lock();
        let before = state.tunnels.len();
        state.tunnels.retain(|t| !Arc::ptr_eq(t, tunnel));
        if state.tunnels.len() < before {
            log::warn!(
                "Removed proxy tunnel {} ({} remaining)",
                tunnel.name(),
                state.tunnels.len()
            );
            tunnel.close();
            if state.next >= state.tunnels.len() {
                state.next = 0;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every tunnel.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        for tunnel in state.tunnels.drain(..) {
            tunnel.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotator(n: usize) -> ProxyRotator {
        let tunnels = (0..n)
            .map(|i| {
                Tunnel::new(
                    format!("t{i}"),
                    &format!("127.0.0.1:{}", 1080 + i),
                    Duration::from_secs(10),
                )
                .unwrap()
            })
            .collect();
        ProxyRotator::from_tunnels(tunnels)
    }

    #[test]
    fn round_robin_order() {
        let rotator = rotator(3);
        let names: Vec<String> = (0..5)
            .map(|_| rotator.next().unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["t0", "t1", "t2", "t0", "t1"]);
    }

    #[test]
    fn removal_skips_failed_tunnel() {
        let rotator = rotator(3);
        let first = rotator.next().unwrap();
        rotator.remove(&first);
        assert_eq!(rotator.len(), 2);
        let names: Vec<String> = (0..4)
            .map(|_| rotator.next().unwrap().name().to_string())
            .collect();
        assert!(!names.contains(&"t0".to_string()));
    }

    #[test]
    fn empty_rotator_fails() {
        let rotator = rotator(1);
        let only = rotator.next().unwrap();
        rotator.remove(&only);
        assert!(matches!(rotator.next(), Err(AppError::NoProxy)));
    }

    #[test]
    fn destination_formatting() {
        let config = ProxyConfig {
            username: "scraper".into(),
            remote_addr: "10.1.1.1:2222".into(),
            local_addr: "127.0.0.1:1080".into(),
        };
        assert_eq!(ssh_destination(&config), "ssh://scraper@10.1.1.1:2222");
    }
}
