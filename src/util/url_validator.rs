use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Reasons a feed URL is refused at registration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (feeds must be http or https)")]
    UnsupportedScheme(String),
    #[error("Feed URL has no host")]
    MissingHost,
    #[error("Feed URL must not embed credentials")]
    Credentials,
    #[error("Private address not allowed: {0} (set allow_private_hosts to permit it)")]
    PrivateAddress(String),
    #[error("Localhost not allowed (set allow_private_hosts to permit it)")]
    Localhost,
}

/// Checks a URL before it is registered as a feed.
///
/// Only `http` and `https` with a host are accepted, and `user:pass@`
/// credentials are refused since they would be stored in plain text. Unless
/// `allow_private` is set, loopback, RFC 1918, link-local, unique-local and
/// unspecified addresses are refused too, so a shared database can't be
/// pointed at internal services.
///
/// Hostnames are not resolved; a public name pointing at a private address
/// passes.
///
/// # Examples
///
/// ```
/// use gator::util::validate_url;
///
/// let url = validate_url(" https://blog.example.com/index.xml ", false).unwrap();
/// assert_eq!(url.host_str(), Some("blog.example.com"));
///
/// assert!(validate_url("http://localhost:8080/rss", false).is_err());
/// assert!(validate_url("http://localhost:8080/rss", true).is_ok());
/// assert!(validate_url("file:///etc/passwd", true).is_err());
/// ```
pub fn validate_url(input: &str, allow_private: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(input.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::Credentials);
    }

    let ip = match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            if !allow_private && is_localhost_name(domain) {
                return Err(UrlValidationError::Localhost);
            }
            return Ok(url);
        }
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
    };

    if !allow_private {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateAddress(ip.to_string()));
        }
    }
    Ok(url)
}

fn is_localhost_name(domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    domain == "localhost" || domain.ends_with(".localhost")
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return mapped.is_loopback() || is_private_ip(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link local
            v6.is_unspecified() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}
