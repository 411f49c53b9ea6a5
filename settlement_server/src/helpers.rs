use std::{net::IpAddr, str::FromStr, sync::OnceLock};

use actix_web::HttpRequest;
use log::{debug, trace};
use regex::Regex;

use crate::config::ServerOptions;

fn forwarded_for_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"for="?(?P<ip>[^;,"]+)"#).ok()).as_ref()
}

/// The client's address, for the audit log. In decreasing order of preference:
/// 1. The first address in `X-Forwarded-For`, if `use_x_forwarded_for` is set.
/// 2. The `for=` address in `Forwarded`, if `use_forwarded` is set.
/// 3. The peer address of the connection.
pub fn get_remote_ip(req: &HttpRequest, options: ServerOptions) -> Option<IpAddr> {
    let mut result = None;
    if options.use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if options.use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| forwarded_for_pattern().and_then(|re| re.captures(v)))
            .and_then(|caps| caps.name("ip"))
            .and_then(|m| IpAddr::from_str(m.as_str().trim()).ok());
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    fn opts(use_x_forwarded_for: bool, use_forwarded: bool) -> ServerOptions {
        ServerOptions { use_x_forwarded_for, use_forwarded }
    }

    #[test]
    fn forwarded_headers_are_opt_in() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.2"))
            .insert_header(("Forwarded", "for=198.51.100.4;proto=https"))
            .to_http_request();
        assert_eq!(get_remote_ip(&req, opts(false, false)), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(get_remote_ip(&req, opts(true, false)), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(get_remote_ip(&req, opts(false, true)), Some("198.51.100.4".parse().unwrap()));
        assert_eq!(get_remote_ip(&req, opts(true, true)), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn garbage_falls_back_to_peer() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "not-an-ip"))
            .to_http_request();
        assert_eq!(get_remote_ip(&req, opts(true, true)), Some("10.0.0.1".parse().unwrap()));
    }
}
