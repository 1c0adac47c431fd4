// The `CachedIp` collaborator (spec §1, §4.5, §5): the real Anthropic IPv4
// address, resolved once at startup and persisted to disk so a later run
// doesn't need to re-resolve it through a DNS path the host's own hijack
// may by then have captured.

use crate::error::{ProxyError, Result};
use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Clone)]
pub struct CachedIp {
    inner: Arc<RwLock<IpAddr>>,
}

impl CachedIp {
    pub fn get(&self) -> IpAddr {
        *self.inner.read().expect("cached IP lock poisoned")
    }

    /// Atomic replace (spec §5 shared-resource rule (a)): callers never see
    /// a torn value, only "before" or "after".
    pub fn set(&self, addr: IpAddr) {
        *self.inner.write().expect("cached IP lock poisoned") = addr;
    }

    /// Load a persisted address from `cache_path` if present, otherwise
    /// resolve `host` via the system resolver, persist the result with
    /// mode 0600, and return it.
    pub async fn load_or_resolve(host: &str, cache_path: &str) -> Result<Self> {
        if let Some(addr) = read_cache(cache_path) {
            info!(%addr, path = cache_path, "loaded cached upstream IP");
            return Ok(Self { inner: Arc::new(RwLock::new(addr)) });
        }

        let addr = resolve_ipv4(host).await?;
        info!(%addr, host, "resolved upstream IP");
        write_cache(cache_path, addr);
        Ok(Self { inner: Arc::new(RwLock::new(addr)) })
    }
}

fn read_cache(cache_path: &str) -> Option<IpAddr> {
    std::fs::read_to_string(cache_path).ok()?.trim().parse().ok()
}

/// Best-effort persistence: a write failure must not prevent the gateway
/// from starting, only the on-disk cache for the *next* run is lost.
fn write_cache(cache_path: &str, addr: IpAddr) {
    if let Some(parent) = Path::new(cache_path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if std::fs::write(cache_path, addr.to_string()).is_ok() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(cache_path, std::fs::Permissions::from_mode(0o600));
        }
    }
}

async fn resolve_ipv4(host: &str) -> Result<IpAddr> {
    let target = format!("{host}:443");
    let addrs = tokio::net::lookup_host(&target)
        .await
        .map_err(|e| ProxyError::Passthrough(format!("failed to resolve {host}: {e}")))?;

    addrs
        .map(|socket_addr| socket_addr.ip())
        .find(|ip| ip.is_ipv4())
        .ok_or_else(|| ProxyError::Passthrough(format!("no A record found for {host}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn round_trips_through_the_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ip.cache");
        let addr = IpAddr::V4(Ipv4Addr::new(160, 79, 104, 10));
        write_cache(path.to_str().unwrap(), addr);

        let loaded = read_cache(path.to_str().unwrap());
        assert_eq!(loaded, Some(addr));
    }

    #[test]
    fn missing_cache_file_yields_none() {
        assert_eq!(read_cache("/nonexistent/path/to/ip.cache"), None);
    }

    #[test]
    fn set_replaces_the_cached_value() {
        let cached = CachedIp { inner: Arc::new(RwLock::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)))) };
        cached.set(IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)));
        assert_eq!(cached.get(), IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)));
    }
}
