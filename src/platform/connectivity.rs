use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Online/offline signal consulted once per resolution.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Considers the device online when the weather API host accepts a TCP connection.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn from_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let url = reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid weather API URL: {base_url}"))?;
        let host = url
            .host_str()
            .with_context(|| format!("Weather API URL has no host: {base_url}"))?;
        let port = url
            .port_or_known_default()
            .with_context(|| format!("Weather API URL has no port: {base_url}"))?;
        Ok(Self::new(host, port, timeout))
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "Connectivity probe failed");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "Connectivity probe timed out");
                false
            }
        }
    }
}

/// Fixed answer, switchable at runtime. Used for `--offline` and in tests.
#[derive(Debug)]
pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_probe_from_base_url_uses_default_port() {
        let probe =
            TcpProbe::from_base_url("https://api.openweathermap.org", Duration::from_secs(1))
                .unwrap();
        assert_eq!(probe.host, "api.openweathermap.org");
        assert_eq!(probe.port, 443);

        let probe = TcpProbe::from_base_url("http://127.0.0.1:8080/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(probe.port, 8080);
    }

    #[tokio::test]
    async fn test_probe_reports_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_secs(1));
        assert!(probe.is_online().await);
    }

    #[tokio::test]
    async fn test_probe_reports_closed_port_offline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new("127.0.0.1", port, Duration::from_millis(500));
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn test_static_connectivity_switches() {
        let connectivity = StaticConnectivity::new(true);
        assert!(connectivity.is_online().await);
        connectivity.set_online(false);
        assert!(!connectivity.is_online().await);
    }
}
