//! Client address extraction.
//!
//! Proxy headers are consulted in a fixed order and only a public address is
//! accepted from them. Anything else falls back to the socket peer.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use axum::http::HeaderMap;

/// Headers checked for a forwarded client address, in order.
pub const FORWARDED_HEADERS: &[&str] = &["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

/// Pick the client address for admission decisions.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    for name in FORWARDED_HEADERS {
        let value = match headers.get(*name).and_then(|v| v.to_str().ok()) {
            Some(v) => v,
            None => continue,
        };

        // X-Forwarded-For is a comma separated chain; the client comes first.
        let first = value.split(',').next().unwrap_or("").trim();
        match first.parse::<IpAddr>() {
            Ok(ip) if is_public(&ip) => return ip,
            Ok(ip) => {
                tracing::trace!("Ignoring non-public {} address {}", name, ip);
            }
            Err(_) => {
                tracing::trace!("Ignoring unparsable {} value {:?}", name, value);
            }
        }
    }

    peer.ip()
}

/// Whether `ip` is neither private nor reserved.
pub fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(&v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        // 0.0.0.0/8
        || octets[0] == 0
        // 100.64.0.0/10 shared address space
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        // 192.0.0.0/24 protocol assignments
        || (octets[0] == 192 && octets[1] == 0 && octets[2] == 0)
        // 198.18.0.0/15 benchmarking
        || (octets[0] == 198 && (octets[1] & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || octets[0] >= 240)
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (segments[0] & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (segments[0] & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (segments[0] == 0x2001 && segments[1] == 0x0db8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.5:40000".parse().unwrap()
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_no_headers_uses_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()), peer().ip());
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let h = headers(&[
            ("cf-connecting-ip", "203.0.113.9"),
            ("x-forwarded-for", "8.8.8.8"),
        ]);
        // 203.0.113.0/24 is documentation space, so the next header wins.
        assert_eq!(client_ip(&h, peer()), "8.8.8.8".parse::<IpAddr>().unwrap());

        let h = headers(&[
            ("cf-connecting-ip", "1.1.1.1"),
            ("x-forwarded-for", "8.8.8.8"),
        ]);
        assert_eq!(client_ip(&h, peer()), "1.1.1.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forwarded_for_first_element() {
        let h = headers(&[("x-forwarded-for", "9.9.9.9, 10.0.0.1, 172.16.0.1")]);
        assert_eq!(client_ip(&h, peer()), "9.9.9.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_private_forwarded_address_ignored() {
        let h = headers(&[("x-forwarded-for", "192.168.1.20"), ("x-real-ip", "127.0.0.1")]);
        assert_eq!(client_ip(&h, peer()), peer().ip());
    }

    #[test]
    fn test_garbage_header_ignored() {
        let h = headers(&[("x-real-ip", "not-an-ip")]);
        assert_eq!(client_ip(&h, peer()), peer().ip());
    }

    #[test]
    fn test_real_ip_fallback() {
        let h = headers(&[("x-forwarded-for", "unknown"), ("x-real-ip", "2606:4700::1111")]);
        assert_eq!(
            client_ip(&h, peer()),
            "2606:4700::1111".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_is_public() {
        for ip in ["8.8.8.8", "1.1.1.1", "2606:4700::1111"] {
            assert!(is_public(&ip.parse().unwrap()), "{} should be public", ip);
        }
        for ip in [
            "10.1.2.3",
            "172.16.0.1",
            "192.168.0.1",
            "127.0.0.1",
            "169.254.1.1",
            "0.0.0.0",
            "100.64.0.1",
            "240.0.0.1",
            "::1",
            "fd00::1",
            "fe80::1",
            "::ffff:192.168.0.1",
        ] {
            assert!(!is_public(&ip.parse().unwrap()), "{} should not be public", ip);
        }
    }
}
