//! Strict compound-lookup API client.
//!
//! Protocol per name:
//! - `GET <base>/compound/name/<name>/cids/JSON` → `{IdentifierList: {CID: [..]}}`
//! - `GET <base>/compound/cid/<cid>/property/<csv>/JSON` →
//!   `{PropertyTable: {Properties: [{MolecularFormula, MolecularWeight, IUPACName, ..}]}}`
//!
//! Per-request timeout is strict (2 s by default). 429 surfaces
//! immediately as rate-limited; timeouts and 5xx retry with exponential
//! backoff up to the configured attempt cap.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;

use nd_domain::config::LookupConfig;
use nd_domain::error::{Error, Result};

const PROPERTY_CSV: &str = "MolecularFormula,MolecularWeight,IUPACName";
const BACKOFF_BASE_MS: u64 = 250;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct CidResponse {
    #[serde(rename = "IdentifierList")]
    identifier_list: Option<IdentifierList>,
}

#[derive(Debug, Deserialize)]
struct IdentifierList {
    #[serde(rename = "CID", default)]
    cid: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct PropertyResponse {
    #[serde(rename = "PropertyTable")]
    property_table: Option<PropertyTable>,
}

#[derive(Debug, Deserialize)]
struct PropertyTable {
    #[serde(rename = "Properties", default)]
    properties: Vec<CompoundProperties>,
}

/// Selected properties returned by the lookup service.
#[derive(Debug, Clone, Deserialize, serde::Serialize, PartialEq)]
pub struct CompoundProperties {
    #[serde(rename = "MolecularFormula", default)]
    pub molecular_formula: Option<String>,
    #[serde(rename = "MolecularWeight", default, deserialize_with = "de_weight")]
    pub molecular_weight: Option<f64>,
    #[serde(rename = "IUPACName", default)]
    pub iupac_name: Option<String>,
}

/// The service reports molecular weight either as a number or a string.
fn de_weight<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limiter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Minimum-interval limiter: spaces outbound requests so the configured
/// requests-per-second cap is never exceeded.
struct RateLimiter {
    min_interval: Duration,
    next_allowed: Mutex<Instant>,
}

impl RateLimiter {
    fn new(rate_per_sec: u32) -> Self {
        Self {
            min_interval: Duration::from_millis(1000 / u64::from(rate_per_sec.max(1))),
            next_allowed: Mutex::new(Instant::now()),
        }
    }

    async fn acquire(&self) {
        let wait = {
            let mut next = self.next_allowed.lock();
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.min_interval;
            slot.saturating_duration_since(now)
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LookupClient {
    base_url: String,
    client: reqwest::Client,
    limiter: RateLimiter,
    max_retries: u32,
}

impl LookupClient {
    pub fn new(config: &LookupConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            limiter: RateLimiter::new(config.rate_per_sec),
            max_retries: config.max_retries,
        })
    }

    /// Search a compound by name and return its first CID.
    pub async fn search_compound(&self, name: &str) -> Result<u64> {
        let encoded = encode_path_segment(name);
        let url = format!("{}/compound/name/{encoded}/cids/JSON", self.base_url);
        let body: CidResponse = self.get_json(&url, name).await?;

        body.identifier_list
            .and_then(|l| l.cid.first().copied())
            .ok_or_else(|| Error::NotFound(format!("compound '{name}' has no CID")))
    }

    /// Retrieve selected properties for a CID.
    pub async fn compound_properties(&self, cid: u64) -> Result<CompoundProperties> {
        let url = format!(
            "{}/compound/cid/{cid}/property/{PROPERTY_CSV}/JSON",
            self.base_url
        );
        let body: PropertyResponse = self.get_json(&url, &cid.to_string()).await?;

        body.property_table
            .and_then(|t| t.properties.into_iter().next())
            .ok_or_else(|| Error::NotFound(format!("no properties for CID {cid}")))
    }

    /// Rate-limited GET with retry/backoff on transient failures.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;

            match self.try_get(url).await {
                Ok(body) => {
                    return serde_json::from_str(&body).map_err(|e| {
                        Error::Upstream {
                            service: "lookup".into(),
                            message: format!("malformed response for '{what}': {e}"),
                        }
                    });
                }
                Err(e) => {
                    let retryable = matches!(
                        e,
                        Error::Timeout(_) | Error::Upstream { .. } | Error::Http(_)
                    );
                    if !retryable || attempt >= self.max_retries {
                        return Err(e);
                    }
                    let backoff = Duration::from_millis(BACKOFF_BASE_MS << attempt);
                    attempt += 1;
                    tracing::warn!(
                        target = what,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "lookup retry"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn try_get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("lookup request timed out: {url}"))
            } else {
                Error::Http(e.to_string())
            }
        })?;

        match response.status().as_u16() {
            200 => response
                .text()
                .await
                .map_err(|e| Error::Http(e.to_string())),
            404 => Err(Error::NotFound(format!("lookup 404: {url}"))),
            429 => Err(Error::RateLimited("lookup API returned 429".into())),
            status if status >= 500 => Err(Error::Upstream {
                service: "lookup".into(),
                message: format!("status {status}"),
            }),
            status => Err(Error::Http(format!("unexpected status {status}"))),
        }
    }
}

/// Percent-encode the characters that matter in a path segment.
fn encode_path_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            ' ' => out.push_str("%20"),
            '/' => out.push_str("%2F"),
            '?' => out.push_str("%3F"),
            '#' => out.push_str("%23"),
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segment_encoding() {
        assert_eq!(encode_path_segment("olive oil"), "olive%20oil");
        assert_eq!(encode_path_segment("salt"), "salt");
        assert_eq!(encode_path_segment("a/b?c"), "a%2Fb%3Fc");
    }

    #[test]
    fn cid_response_parses() {
        let body = r#"{"IdentifierList": {"CID": [962, 1000]}}"#;
        let parsed: CidResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.identifier_list.unwrap().cid[0], 962);
    }

    #[test]
    fn empty_cid_list_is_absent() {
        let body = r#"{"IdentifierList": {"CID": []}}"#;
        let parsed: CidResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.identifier_list.unwrap().cid.is_empty());
    }

    #[test]
    fn property_response_parses_string_weight() {
        let body = r#"{"PropertyTable": {"Properties": [
            {"MolecularFormula": "C18H27NO3", "MolecularWeight": "305.4", "IUPACName": "capsaicin"}
        ]}}"#;
        let parsed: PropertyResponse = serde_json::from_str(body).unwrap();
        let props = parsed
            .property_table
            .unwrap()
            .properties
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(props.molecular_formula.as_deref(), Some("C18H27NO3"));
        assert_eq!(props.molecular_weight, Some(305.4));
    }

    #[test]
    fn property_response_parses_numeric_weight() {
        let body = r#"{"PropertyTable": {"Properties": [
            {"MolecularFormula": "H2O", "MolecularWeight": 18.015}
        ]}}"#;
        let parsed: PropertyResponse = serde_json::from_str(body).unwrap();
        let props = parsed
            .property_table
            .unwrap()
            .properties
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(props.molecular_weight, Some(18.015));
    }

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(5); // 200ms interval
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // Third acquisition must wait at least two intervals.
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}
