//! Client IP extraction utilities.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, connect_info::MockConnectInfo},
    http::HeaderName,
};

/// Extract the client IP address.
///
/// If `ip_header` is set (running behind a proxy), the first entry of that
/// header is used and a missing or unparseable header is an error; there is
/// no fallback to the socket address. Otherwise the `ConnectInfo` peer
/// address is used, or the `MockConnectInfo` one when the router is driven
/// without a listener.
pub fn extract_client_ip<B>(
    request: &axum::extract::Request<B>,
    ip_header: Option<&HeaderName>,
) -> Result<String, &'static str> {
    match ip_header {
        Some(name) => {
            let value = request
                .headers()
                .get(name)
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            let first = value.split(',').next().unwrap_or("").trim();
            first
                .parse::<IpAddr>()
                .map(|ip| ip.to_string())
                .map_err(|_| "IP header does not contain an IP address")
        }
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0)
            .or_else(|| {
                request
                    .extensions()
                    .get::<MockConnectInfo<SocketAddr>>()
                    .map(|mock| mock.0)
            })
            .map(|addr| addr.ip().to_string())
            .ok_or("No client IP available"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_header_ip() {
        let header = HeaderName::from_static("x-forwarded-for");
        let request = axum::extract::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();

        assert_eq!(
            extract_client_ip(&request, Some(&header)),
            Ok("203.0.113.7".to_string())
        );
    }

    #[test]
    fn test_header_required_when_configured() {
        let header = HeaderName::from_static("x-real-ip");
        let request = axum::extract::Request::builder()
            .body(Body::empty())
            .unwrap();
        assert!(extract_client_ip(&request, Some(&header)).is_err());

        let request = axum::extract::Request::builder()
            .header("x-real-ip", "not-an-ip")
            .body(Body::empty())
            .unwrap();
        assert!(extract_client_ip(&request, Some(&header)).is_err());
    }

    #[test]
    fn test_connect_info() {
        let mut request = axum::extract::Request::builder()
            .body(Body::empty())
            .unwrap();
        assert!(extract_client_ip(&request, None).is_err());

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4242))));
        assert_eq!(
            extract_client_ip(&request, None),
            Ok("192.0.2.1".to_string())
        );
    }

    #[test]
    fn test_mock_connect_info() {
        let mut request = axum::extract::Request::builder()
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(MockConnectInfo(SocketAddr::from(([198, 51, 100, 9], 80))));

        assert_eq!(
            extract_client_ip(&request, None),
            Ok("198.51.100.9".to_string())
        );
    }
}
