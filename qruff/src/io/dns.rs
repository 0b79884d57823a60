/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Host name resolution.
//!
//! [`resolve`] hands back a byte payload (JSON) rather than typed records so
//! that it can travel through the same byte-oriented channels as file
//! contents.  [`decode_records`] turns it back into [`AddrRecord`]s.
//!
//! Payload shape:
//! ```json
//! [{"family": "ipv4", "address": "127.0.0.1", "port": 0}]
//! ```

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("empty host name")]
    EmptyHost,

    #[error("lookup of '{host}' failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{host}' resolved to no addresses")]
    NoAddresses { host: String },

    #[error("cannot encode address records: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload handed to [`decode_records`] is not a record array.
    #[error("malformed address payload: {0}")]
    Malformed(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddrFamily {
    Ipv4,
    Ipv6,
}

/// One resolved socket address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrRecord {
    pub family: AddrFamily,
    pub address: IpAddr,
    pub port: u16,
}

impl From<SocketAddr> for AddrRecord {
    fn from(addr: SocketAddr) -> Self {
        let family = match addr {
            SocketAddr::V4(_) => AddrFamily::Ipv4,
            SocketAddr::V6(_) => AddrFamily::Ipv6,
        };
        Self {
            family,
            address: addr.ip(),
            port: addr.port(),
        }
    }
}

/// Resolve `host` into typed records, duplicates removed, resolver order kept.
pub async fn lookup(host: &str, port: u16) -> Result<Vec<AddrRecord>, ResolutionError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(ResolutionError::EmptyHost);
    }

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| {
            warn!(host, error = %source, "name lookup failed");
            ResolutionError::Lookup {
                host: host.to_string(),
                source,
            }
        })?;

    let mut records: Vec<AddrRecord> = Vec::new();
    for record in addrs.map(AddrRecord::from) {
        if !records.contains(&record) {
            records.push(record);
        }
    }

    if records.is_empty() {
        return Err(ResolutionError::NoAddresses {
            host: host.to_string(),
        });
    }
    debug!(host, count = records.len(), "host resolved");
    Ok(records)
}

/// Resolve `host` and return the JSON-encoded record array.
pub async fn resolve(host: &str) -> Result<Vec<u8>, ResolutionError> {
    let records = lookup(host, 0).await?;
    encode_records(&records)
}

pub fn encode_records(records: &[AddrRecord]) -> Result<Vec<u8>, ResolutionError> {
    serde_json::to_vec(records).map_err(ResolutionError::Encode)
}

/// Parse a payload produced by [`resolve`].
///
/// Any malformed input yields [`ResolutionError::Malformed`].
pub fn decode_records(payload: &[u8]) -> Result<Vec<AddrRecord>, ResolutionError> {
    serde_json::from_slice(payload).map_err(ResolutionError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn literal_address_resolves_without_resolver() {
        let payload = resolve("127.0.0.1").await.unwrap();
        let records = decode_records(&payload).unwrap();
        assert_eq!(
            records,
            vec![AddrRecord {
                family: AddrFamily::Ipv4,
                address: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 0,
            }]
        );
    }

    #[tokio::test]
    async fn ipv6_literal_is_tagged_ipv6() {
        let records = lookup("::1", 502).await.unwrap();
        assert_eq!(records[0].family, AddrFamily::Ipv6);
        assert_eq!(records[0].port, 502);
    }

    #[tokio::test]
    async fn empty_host_is_rejected() {
        assert!(matches!(resolve("  ").await, Err(ResolutionError::EmptyHost)));
    }

    #[test]
    fn payload_uses_lowercase_family_names() {
        let payload = encode_records(&[AddrRecord {
            family: AddrFamily::Ipv4,
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            port: 502,
        }])
        .unwrap();
        let text = String::from_utf8(payload).unwrap();
        assert_eq!(text, r#"[{"family":"ipv4","address":"10.0.0.1","port":502}]"#);
    }

    #[test]
    fn malformed_payloads_are_errors_not_panics() {
        let cases: [&[u8]; 6] = [
            b"",
            b"not json",
            b"{\"family\":\"ipv4\"}",
            b"[{\"family\":\"ipx\",\"address\":\"1.2.3.4\",\"port\":1}]",
            b"[{\"family\":\"ipv4\",\"address\":\"999.1.1.1\",\"port\":1}]",
            &[0xff, 0x00, 0x7b],
        ];
        for case in cases {
            assert!(
                matches!(decode_records(case), Err(ResolutionError::Malformed(_))),
                "payload {case:?} should be rejected"
            );
        }
    }

    #[test]
    fn empty_array_decodes_to_no_records() {
        assert!(decode_records(b"[]").unwrap().is_empty());
    }
}
