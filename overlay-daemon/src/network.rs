//! Listener binding and LAN address discovery

use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Interface name fragments that mark virtual adapters
const VIRTUAL_INTERFACE_PATTERNS: &[&str] = &[
    "virtualbox",
    "vbox",
    "vmware",
    "vmnet",
    "docker",
    "br-",
    "bridge",
    "virbr",
    "veth",
    "vethernet",
    "hyper-v",
    "wsl",
    "tap",
    "tun",
    "zerotier",
    "tailscale",
];

/// Interface name fragments that mark physical wired/wireless adapters
const PHYSICAL_INTERFACE_PATTERNS: &[&str] =
    &["wifi", "wi-fi", "wlan", "wlp", "ethernet", "eth", "enp"];

const FALLBACK_HOST: &str = "localhost";

#[derive(Error, Debug)]
pub enum BindError {
    #[error("no free port in {first}..={last} after {attempts} attempts")]
    Exhausted { first: u16, last: u16, attempts: u32 },

    #[error("failed to bind port {port}: {source}")]
    Io {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Score an IPv4 address for "most likely reachable from other devices".
///
/// Common home router ranges rank highest; named physical adapters get a
/// bonus and virtual adapters are pushed below everything else.
pub fn address_score(interface: &str, ip: Ipv4Addr) -> i32 {
    let [a, b, c, _] = ip.octets();

    let mut score = match (a, b, c) {
        (192, 168, 0 | 1) => 100,
        (10, 0, 0) => 90,
        (192, 168, _) => 80,
        (10, _, _) => 70,
        (172, _, _) => 60,
        _ => 0,
    };

    let name = interface.to_lowercase();
    if PHYSICAL_INTERFACE_PATTERNS.iter().any(|p| name.contains(p)) {
        score += 20;
    }
    if VIRTUAL_INTERFACE_PATTERNS.iter().any(|p| name.contains(p)) {
        score -= 200;
    }

    score
}

/// Highest scoring candidate; the first one wins a tie
pub fn best_address<'a, I>(candidates: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = (&'a str, Ipv4Addr)>,
{
    let mut best: Option<(i32, Ipv4Addr)> = None;
    for (name, ip) in candidates {
        let score = address_score(name, ip);
        debug!("Address candidate {} ({}): score {}", ip, name, score);
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, ip));
        }
    }
    best.map(|(_, ip)| ip)
}

/// Pick the LAN address to advertise, or `localhost` when there is none
pub fn select_address() -> String {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!("Failed to enumerate network interfaces: {}", e);
            return FALLBACK_HOST.to_string();
        }
    };

    let candidates: Vec<(String, Ipv4Addr)> = interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_link_local() => Some((iface.name, ip)),
            _ => None,
        })
        .collect();

    best_address(candidates.iter().map(|(name, ip)| (name.as_str(), *ip)))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| FALLBACK_HOST.to_string())
}

/// Try `preferred`, then each following port while `bind` reports the port
/// as taken, giving up after `max_retries` attempts.
///
/// Any error other than "address in use" ends the search immediately.
pub async fn bind_ports<T, F, Fut>(
    preferred: u16,
    max_retries: u32,
    mut bind: F,
) -> Result<(T, u16), BindError>
where
    F: FnMut(u16) -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let mut port = preferred;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match bind(port).await {
            Ok(bound) => return Ok((bound, port)),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                warn!("Port {} is in use", port);
                let next = port.checked_add(1);
                match next {
                    Some(next) if attempts < max_retries => port = next,
                    _ => {
                        return Err(BindError::Exhausted {
                            first: preferred,
                            last: port,
                            attempts,
                        })
                    }
                }
            }
            Err(source) => return Err(BindError::Io { port, source }),
        }
    }
}

/// Bind a TCP listener on `host`, moving up from `preferred` while ports are
/// taken. Returns the listener and the port actually bound.
pub async fn bind_with_retry(
    host: IpAddr,
    preferred: u16,
    max_retries: u32,
) -> Result<(TcpListener, u16), BindError> {
    let (listener, port) = bind_ports(preferred, max_retries, |port| {
        TcpListener::bind(SocketAddr::new(host, port))
    })
    .await?;

    // Port 0 asks the OS to choose
    let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
    info!("Listening on {}:{}", host, port);

    Ok((listener, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn in_use() -> io::Error {
        io::Error::new(io::ErrorKind::AddrInUse, "in use")
    }

    #[tokio::test]
    async fn test_skips_occupied_ports() {
        let occupied: HashSet<u16> = [3000, 3001].into_iter().collect();
        let mut tried = Vec::new();

        let result = bind_ports(3000, 5, |port| {
            tried.push(port);
            let result = if occupied.contains(&port) { Err(in_use()) } else { Ok(port) };
            async move { result }
        })
        .await
        .unwrap();

        assert_eq!(result, (3002, 3002));
        assert_eq!(tried, vec![3000, 3001, 3002]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let result = bind_ports(3000, 3, |_| async { Err::<(), _>(in_use()) }).await;

        match result {
            Err(BindError::Exhausted { first, last, attempts }) => {
                assert_eq!((first, last, attempts), (3000, 3002, 3));
            }
            other => panic!("Expected exhaustion, got {:?}", other.map(|(_, p)| p)),
        }
    }

    #[tokio::test]
    async fn test_other_errors_are_fatal() {
        let result = bind_ports(3000, 10, |_| async {
            Err::<(), _>(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        })
        .await;

        assert!(matches!(result, Err(BindError::Io { port: 3000, .. })));
    }

    #[tokio::test]
    async fn test_stops_at_last_port() {
        let result = bind_ports(u16::MAX, 10, |_| async { Err::<(), _>(in_use()) }).await;
        assert!(matches!(
            result,
            Err(BindError::Exhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_real_listener_taken_port_exhausts_budget() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        match bind_with_retry(IpAddr::V4(Ipv4Addr::LOCALHOST), port, 1).await {
            Err(BindError::Exhausted { attempts: 1, .. }) => {}
            other => panic!("Expected exhaustion, got {:?}", other.map(|(_, p)| p)),
        }
    }

    #[test]
    fn test_address_scoring() {
        assert_eq!(address_score("wlan0", Ipv4Addr::new(192, 168, 1, 20)), 120);
        assert_eq!(address_score("enp3s0", Ipv4Addr::new(10, 0, 0, 5)), 110);
        assert_eq!(address_score("docker0", Ipv4Addr::new(172, 17, 0, 1)), -140);
        assert_eq!(address_score("foo", Ipv4Addr::new(100, 64, 0, 1)), 0);
    }

    #[test]
    fn test_best_address_prefers_physical_lan() {
        let candidates = [
            ("docker0", Ipv4Addr::new(172, 17, 0, 1)),
            ("vEthernet (WSL)", Ipv4Addr::new(192, 168, 0, 1)),
            ("wlp2s0", Ipv4Addr::new(192, 168, 1, 42)),
        ];
        assert_eq!(best_address(candidates), Some(Ipv4Addr::new(192, 168, 1, 42)));
    }

    #[test]
    fn test_best_address_tie_keeps_first() {
        let candidates = [
            ("eth0", Ipv4Addr::new(192, 168, 1, 10)),
            ("eth1", Ipv4Addr::new(192, 168, 0, 10)),
        ];
        assert_eq!(best_address(candidates), Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(best_address(std::iter::empty::<(&str, Ipv4Addr)>()), None);
    }

    #[test]
    fn test_select_address_never_empty() {
        assert!(!select_address().is_empty());
    }
}
