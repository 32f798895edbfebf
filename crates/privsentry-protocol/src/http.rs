//! HTTP-backed primaries: an external PII analyzer and a de-identification service.
//!
//! Both are fail-fast: a single request with a timeout, no retries. Any
//! failure is returned as `Error::Http` so the fallback tier takes over.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::detect::{DetectionEngine, Finding};
use crate::redact::{Deidentified, RedactionService};
use privsentry_core::{Error, PiiType, PiiTypeSet, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::Http(e.to_string()))
}

fn post_json<R: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<R> {
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .map_err(|e| Error::Http(format!("Request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        return Err(Error::Http(format!("API error {}: {}", status, body)));
    }
    response
        .json()
        .map_err(|e| Error::Http(format!("Bad response: {}", e)))
}

#[derive(Deserialize)]
struct AnalyzerHit {
    entity_type: String,
    start: usize,
    end: usize,
    #[serde(default)]
    score: f32,
}

/// Analyzer speaking `POST {base}/analyze`.
pub struct HttpAnalyzer {
    client: Client,
    url: String,
}

impl HttpAnalyzer {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: client()?,
            url: format!("{}/analyze", base_url.trim_end_matches('/')),
        })
    }
}

impl DetectionEngine for HttpAnalyzer {
    fn name(&self) -> &'static str {
        "http-analyzer"
    }

    fn analyze(&self, text: &str, entity_types: &[PiiType], language: &str) -> Result<Vec<Finding>> {
        let entities: Vec<&str> = entity_types.iter().map(|t| t.label()).collect();
        let body = json!({
            "text": text,
            "language": language,
            "entities": entities,
        });
        debug!("Analyzing {} bytes via {}", text.len(), self.url);

        let hits: Vec<AnalyzerHit> = post_json(&self.client, &self.url, &body)?;
        Ok(hits
            .into_iter()
            .filter_map(|h| {
                let entity_type = h.entity_type.parse::<PiiType>().ok()?;
                Some(Finding {
                    entity_type,
                    start: h.start,
                    end: h.end,
                    score: h.score,
                })
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct DeidentifyResponse {
    item: DeidentifyItem,
}

#[derive(Deserialize)]
struct DeidentifyItem {
    value: String,
}

/// Type-aware masking service speaking `POST {base}/deidentify`.
pub struct DeidentifyService {
    client: Client,
    url: String,
    project: String,
    mask_char: char,
}

impl DeidentifyService {
    pub fn new(base_url: &str, project: &str, mask_char: char) -> Result<Self> {
        if project.trim().is_empty() {
            return Err(Error::Config("redaction service requires a project".into()));
        }
        Ok(Self {
            client: client()?,
            url: format!("{}/deidentify", base_url.trim_end_matches('/')),
            project: project.to_string(),
            mask_char,
        })
    }
}

impl RedactionService for DeidentifyService {
    fn name(&self) -> &'static str {
        "deidentify"
    }

    fn deidentify(&self, text: &str, info_types: &PiiTypeSet) -> Result<Deidentified> {
        let info_types_json: Vec<_> = info_types
            .iter()
            .map(|t| json!({ "name": t.label() }))
            .collect();
        let body = json!({
            "parent": format!("projects/{}", self.project),
            "inspect_config": { "info_types": info_types_json },
            "deidentify_config": {
                "info_type_transformations": {
                    "transformations": [{
                        "primitive_transformation": {
                            "character_mask_config": {
                                "masking_character": self.mask_char.to_string(),
                            }
                        }
                    }]
                }
            },
            "item": { "value": text },
        });

        let response: DeidentifyResponse = post_json(&self.client, &self.url, &body)?;
        Ok(Deidentified {
            text: response.item.value,
            masked: info_types.clone(),
            unmasked: PiiTypeSet::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on the discard port.
    const DEAD_URL: &str = "http://127.0.0.1:9";

    #[test]
    fn test_analyzer_url() {
        let analyzer = HttpAnalyzer::new("http://localhost:5002/").unwrap();
        assert_eq!(analyzer.url, "http://localhost:5002/analyze");
    }

    #[test]
    fn test_unreachable_analyzer_is_http_error() {
        let analyzer = HttpAnalyzer::new(DEAD_URL).unwrap();
        let err = analyzer.analyze("x", PiiType::all(), "en").unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }

    #[test]
    fn test_deidentify_requires_project() {
        assert!(matches!(
            DeidentifyService::new(DEAD_URL, " ", '#'),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unreachable_deidentify_is_http_error() {
        let svc = DeidentifyService::new(DEAD_URL, "acme", '#').unwrap();
        let types: PiiTypeSet = [PiiType::UsSsn].into();
        assert!(matches!(svc.deidentify("x", &types), Err(Error::Http(_))));
    }

    #[test]
    fn test_analyzer_response_drops_unknown_labels() {
        let hits: Vec<AnalyzerHit> = serde_json::from_str(
            r#"[{"entity_type":"US_SSN","start":0,"end":11,"score":0.85},
                {"entity_type":"IP_ADDRESS","start":12,"end":20}]"#,
        )
        .unwrap();
        let known: Vec<PiiType> = hits
            .iter()
            .filter_map(|h| h.entity_type.parse().ok())
            .collect();
        assert_eq!(known, vec![PiiType::UsSsn]);
    }
}
