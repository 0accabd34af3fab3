//! Proxy descriptor parsing and validation
//!
//! Sessions can egress through a per-session proxy. Callers supply proxies in
//! either URL form (`scheme://[user:pass@]host:port`) or the compact
//! colon-separated form (`host:port[:user[:pass]]`).

use crate::error::{Error, Result, TaskError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A parsed proxy descriptor applied to one isolated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySpec {
    /// Proxy scheme: `http`, `https`, or `socks5`
    pub scheme: String,
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Optional username
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
}

impl ProxySpec {
    /// Parse a proxy string in URL or colon-separated form.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(bad("empty proxy string"));
        }

        if input.contains("://") {
            return Self::parse_url(input);
        }

        let parts: Vec<&str> = input.split(':').collect();
        match parts.len() {
            2 => Self::from_parts("http", parts[0], parts[1], None, None),
            3 => Self::from_parts("http", parts[0], parts[1], Some(parts[2]), None),
            4 => Self::from_parts("http", parts[0], parts[1], Some(parts[2]), Some(parts[3])),
            _ => Err(bad(format!("unrecognized proxy format: {}", redact(input)))),
        }
    }

    fn parse_url(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| bad(format!("invalid proxy URL: {}", e)))?;

        let scheme = url.scheme().to_string();
        if !matches!(scheme.as_str(), "http" | "https" | "socks5") {
            return Err(bad(format!("unsupported proxy scheme: {}", scheme)));
        }

        let host = url
            .host_str()
            .ok_or_else(|| bad("proxy URL missing host"))?
            .to_string();
        let port = url.port().ok_or_else(|| bad("proxy URL missing port"))?;

        let username = (!url.username().is_empty()).then(|| url.username().to_string());
        let password = url.password().map(|p| p.to_string());

        Ok(Self {
            scheme,
            host,
            port,
            username,
            password,
        })
    }

    fn from_parts(
        scheme: &str,
        host: &str,
        port: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<Self> {
        if host.is_empty() {
            return Err(bad("proxy host is empty"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| bad(format!("invalid proxy port: {}", port)))?;

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            username: username.map(|u| u.to_string()),
            password: password.map(|p| p.to_string()),
        })
    }

    /// Server address without credentials, as handed to the browser driver.
    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// True when the proxy carries credentials
    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }
}

/// Display with the password redacted; safe for logs.
impl fmt::Display for ProxySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(user) => write!(f, "{} (user: {})", self.server(), user),
            None => write!(f, "{}", self.server()),
        }
    }
}

fn bad(msg: impl Into<String>) -> Error {
    Error::Task(TaskError::BadParameters(msg.into()))
}

fn redact(input: &str) -> String {
    // Do not echo possible credentials back into error messages
    let parts: Vec<&str> = input.split(':').collect();
    if parts.len() > 2 {
        format!("{}:{}:...", parts[0], parts[1])
    } else {
        input.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let proxy = ProxySpec::parse("10.0.0.5:8080").unwrap();
        assert_eq!(proxy.scheme, "http");
        assert_eq!(proxy.host, "10.0.0.5");
        assert_eq!(proxy.port, 8080);
        assert!(proxy.username.is_none());
        assert_eq!(proxy.server(), "http://10.0.0.5:8080");
    }

    #[test]
    fn test_parse_host_port_user_pass() {
        let proxy = ProxySpec::parse("proxy.example.net:3128:alice:s3cret").unwrap();
        assert_eq!(proxy.username.as_deref(), Some("alice"));
        assert_eq!(proxy.password.as_deref(), Some("s3cret"));
        assert!(proxy.has_credentials());
    }

    #[test]
    fn test_parse_url_form() {
        let proxy = ProxySpec::parse("socks5://bob:pw@127.0.0.1:1080").unwrap();
        assert_eq!(proxy.scheme, "socks5");
        assert_eq!(proxy.host, "127.0.0.1");
        assert_eq!(proxy.port, 1080);
        assert_eq!(proxy.username.as_deref(), Some("bob"));
        assert_eq!(proxy.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_parse_url_without_credentials() {
        let proxy = ProxySpec::parse("http://proxy.example.net:8080").unwrap();
        assert!(!proxy.has_credentials());
        assert_eq!(proxy.server(), "http://proxy.example.net:8080");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(ProxySpec::parse("").is_err());
        assert!(ProxySpec::parse("justahost").is_err());
        assert!(ProxySpec::parse("host:notaport").is_err());
        assert!(ProxySpec::parse("ftp://host:21").is_err());
        assert!(ProxySpec::parse("a:b:c:d:e").is_err());
    }

    #[test]
    fn test_display_redacts_password() {
        let proxy = ProxySpec::parse("proxy.example.net:3128:alice:s3cret").unwrap();
        let shown = proxy.to_string();
        assert!(shown.contains("alice"));
        assert!(!shown.contains("s3cret"));
    }

    #[test]
    fn test_error_does_not_echo_credentials() {
        let err = ProxySpec::parse("h:1:u:p:extra").unwrap_err();
        assert!(!err.to_string().contains(":p"));
    }
}
