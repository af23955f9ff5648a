use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};

/// Caller address resolved for this request, stored as an extension.
///
/// The webhook handler keys API-key abuse on this, so reputation follows
/// the network peer rather than whatever user id the payload claims.
#[derive(Clone, Debug)]
pub struct ClientIp(pub IpAddr);

/// Best-effort client address from proxy headers.
///
/// `X-Forwarded-For` wins (first hop in the list), then `X-Real-IP`.
/// Unparseable values are ignored rather than treated as errors.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        return forwarded
            .to_str()
            .ok()
            .and_then(|list| list.split(',').next())
            .and_then(|hop| hop.trim().parse().ok());
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Resolve the caller's IP and attach it to the request.
///
/// Falls back to the socket peer address when no proxy header is present.
/// `ConnectInfo` is optional so the same router runs under in-process test
/// clients that never open a socket; those requests simply carry no
/// [`ClientIp`].
pub async fn extract_client_ip(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    mut request: Request,
    next: Next,
) -> Response {
    let ip = forwarded_ip(request.headers())
        .or_else(|| connect_info.map(|ConnectInfo(addr)| addr.ip()));
    if let Some(ip) = ip {
        request.extensions_mut().insert(ClientIp(ip));
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let map = headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(forwarded_ip(&map), Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn real_ip_is_second_choice() {
        let map = headers(&[("x-real-ip", "2001:db8::1")]);
        assert_eq!(forwarded_ip(&map), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn garbage_headers_resolve_to_none() {
        let map = headers(&[("x-forwarded-for", "not-an-address")]);
        assert_eq!(forwarded_ip(&map), None);
        assert_eq!(forwarded_ip(&HeaderMap::new()), None);
    }
}
