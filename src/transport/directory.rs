//! HTTPS lookup that resolves a site identifier + email to relay
//! coordinates, ahead of a [`crate::transport::relay::RelayNegotiator`]
//! negotiation.

use serde::Deserialize;
use thiserror::Error;

use crate::constants::DIRECTORY_URL;

/// Errors from the site directory lookup.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The HTTP request itself failed (network, TLS, timeout).
    #[error("directory request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server replied with a non-200 status.
    #[error("directory lookup failed: HTTP {0}")]
    Status(reqwest::StatusCode),

    /// The response didn't match the expected schema.
    #[error("directory response schema mismatch: {0}")]
    Schema(String),
}

/// A module's relay coordinates, as returned by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEndpoint {
    /// The module's public or relay-visible IP address.
    pub ip_address: String,
    /// The module's port.
    pub port: u16,
    /// Hex-encoded XOR-mapped address used in the relay's connect request.
    pub xoraddr: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct DirectoryResponse {
    site: Vec<SiteEntry>,
}

#[derive(Debug, Deserialize)]
struct SiteEntry {
    module: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
struct ModuleEntry {
    #[serde(rename = "ipAddress")]
    ip_address: String,
    port: u16,
    xoraddr: String,
}

/// Resolves a `(site_id, email)` pair to relay coordinates via the
/// vendor's site directory.
pub struct SiteDirectoryClient {
    client: reqwest::blocking::Client,
}

impl SiteDirectoryClient {
    /// Build a client with a browser-ish `User-Agent`, matching what the
    /// directory expects.
    pub fn new() -> Result<Self, DirectoryError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/3.0 (compatible; Indy Library)")
            .build()?;
        Ok(Self { client })
    }

    /// Look up the first site's first module for `site_id`/`email`.
    pub fn lookup(&self, site_id: &str, email: &str) -> Result<ModuleEndpoint, DirectoryError> {
        let response = self
            .client
            .get(DIRECTORY_URL)
            .query(&[("name", site_id), ("email", email)])
            .send()?;

        if !response.status().is_success() {
            return Err(DirectoryError::Status(response.status()));
        }

        let body: DirectoryResponse = response
            .json()
            .map_err(|e| DirectoryError::Schema(e.to_string()))?;

        let module = body
            .site
            .into_iter()
            .next()
            .and_then(|s| s.module.into_iter().next())
            .ok_or_else(|| DirectoryError::Schema("no site/module in response".into()))?;

        let xoraddr = hex::decode(&module.xoraddr)
            .map_err(|e| DirectoryError::Schema(format!("invalid xoraddr hex: {e}")))?;

        Ok(ModuleEndpoint {
            ip_address: module.ip_address,
            port: module.port,
            xoraddr,
        })
    }
}

impl Default for SiteDirectoryClient {
    fn default() -> Self {
        Self::new().expect("building the default HTTP client cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_site_module_schema() {
        let json = serde_json::json!({
            "site": [{
                "module": [{
                    "ipAddress": "10.0.0.5",
                    "port": 10000,
                    "xoraddr": "deadbeef"
                }]
            }]
        });
        let parsed: DirectoryResponse = serde_json::from_value(json).unwrap();
        let module = &parsed.site[0].module[0];
        assert_eq!(module.ip_address, "10.0.0.5");
        assert_eq!(module.port, 10000);
        assert_eq!(hex::decode(&module.xoraddr).unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn empty_site_list_is_schema_error() {
        let json = serde_json::json!({ "site": [] });
        let parsed: DirectoryResponse = serde_json::from_value(json).unwrap();
        assert!(parsed.site.into_iter().next().is_none());
    }
}
