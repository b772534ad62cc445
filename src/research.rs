use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::SearchConfig;

/// Snippets kept in the evidence summary.
const SUMMARY_CAP: usize = 12;
const QUERY_CAP: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchStatus {
    Disabled,
    Error,
    Ok,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snippet {
    pub source: &'static str,
    pub title: String,
    pub snippet: String,
    pub link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchFailure {
    pub status_code: u16,
    pub message: String,
    pub error_status: String,
    pub hint: String,
}

/// The aggregator's only output. `status` is always meaningful; a run that
/// found nothing is still `Ok` with empty results.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceBundle {
    pub status: ResearchStatus,
    pub results: Vec<Snippet>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<SearchFailure>,
}

impl EvidenceBundle {
    fn disabled() -> Self {
        Self {
            status: ResearchStatus::Disabled,
            results: Vec::new(),
            summary: String::new(),
            failure: None,
        }
    }
}

pub struct ResearchClient {
    http: Client,
    api_key: Option<String>,
    cx: Option<String>,
}

impl ResearchClient {
    pub fn new(http: Client, cfg: &SearchConfig) -> Self {
        Self {
            http,
            api_key: cfg.api_key.clone(),
            cx: cfg
                .cx
                .as_deref()
                .map(normalize_cx)
                .filter(|cx| !cx.is_empty()),
        }
    }

    /// Fan out the site-scoped probes and aggregate. Never returns an error;
    /// total API failure is reported through `status` and `failure`.
    pub async fn tasting_notes(&self, query: &str) -> EvidenceBundle {
        let (Some(key), Some(cx)) = (self.api_key.as_deref(), self.cx.as_deref()) else {
            info!(target: "rickhouse.search", "search provider not configured, skipping research");
            return EvidenceBundle::disabled();
        };

        let base = sanitize_query(query);
        if base.is_empty() {
            return EvidenceBundle::disabled();
        }

        // Kept small to avoid quota burn.
        let probes: [(&'static str, String, u8); 5] = [
            ("general", format!("{base} tasting notes nose palate finish"), 4),
            ("distiller", format!("site:distiller.com {base} tasting notes"), 3),
            ("whisky.com", format!("site:whisky.com {base} tasting notes"), 3),
            ("reddit", format!("site:reddit.com {base} tasting notes"), 3),
            ("wine-searcher", format!("site:wine-searcher.com {base} tasting notes"), 2),
        ];

        let futures = probes
            .iter()
            .map(|(source, q, num)| self.probe(key, cx, source, q, *num));
        let outcomes = join_all(futures).await;

        let mut merged: Vec<Snippet> = Vec::new();
        let mut first_failure: Option<SearchFailure> = None;
        for outcome in outcomes {
            match outcome {
                Ok(snippets) => merged.extend(snippets),
                Err(failure) => {
                    warn!(
                        target: "rickhouse.search",
                        status = failure.status_code,
                        message = %failure.message,
                        hint = %failure.hint,
                        "probe failed"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(failure);
                    }
                }
            }
        }

        if merged.is_empty() {
            if let Some(failure) = first_failure {
                return EvidenceBundle {
                    status: ResearchStatus::Error,
                    results: Vec::new(),
                    summary: String::new(),
                    failure: Some(failure),
                };
            }
            return EvidenceBundle {
                status: ResearchStatus::Ok,
                results: Vec::new(),
                summary: String::new(),
                failure: None,
            };
        }

        let deduped = dedupe_by_link(merged);
        let summary = build_summary(&deduped);
        info!(target: "rickhouse.search", results = deduped.len(), "research aggregated");

        EvidenceBundle {
            status: ResearchStatus::Ok,
            results: deduped,
            summary,
            failure: None,
        }
    }

    async fn probe(
        &self,
        key: &str,
        cx: &str,
        source: &'static str,
        query: &str,
        num: u8,
    ) -> Result<Vec<Snippet>, SearchFailure> {
        let num = num.clamp(1, 10);
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}&num={num}",
            urlencoding::encode(key),
            urlencoding::encode(cx),
            urlencoding::encode(query),
        );

        let response = self.http.get(&url).send().await.map_err(|err| SearchFailure {
            status_code: 0,
            message: err.to_string(),
            error_status: String::new(),
            hint: String::new(),
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let parsed: Option<Value> = serde_json::from_str(&body).ok();
            let message = parsed
                .as_ref()
                .and_then(|v| v["error"]["message"].as_str())
                .map(String::from)
                .unwrap_or_else(|| body.chars().take(500).collect());
            let error_status = parsed
                .as_ref()
                .and_then(|v| v["error"]["status"].as_str())
                .unwrap_or_default()
                .to_string();
            let hint = cse_hint(status.as_u16(), &message)
                .unwrap_or_default()
                .to_string();
            return Err(SearchFailure {
                status_code: status.as_u16(),
                message,
                error_status,
                hint,
            });
        }

        let data: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        let items = data["items"].as_array().cloned().unwrap_or_default();
        Ok(items
            .iter()
            .filter_map(|item| {
                Some(Snippet {
                    source,
                    title: item["title"].as_str()?.to_string(),
                    snippet: item["snippet"].as_str().unwrap_or_default().to_string(),
                    link: item["link"].as_str()?.to_string(),
                })
            })
            .collect())
    }
}

/// Remediation hints for the failure modes this API actually produces.
pub fn cse_hint(status_code: u16, message: &str) -> Option<&'static str> {
    let m = message.to_lowercase();
    if status_code == 403 && (m.contains("has not been used") || m.contains("it is disabled")) {
        return Some("Enable the Custom Search API for the project that owns this API key.");
    }
    if (status_code == 400 || status_code == 403) && m.contains("api key not valid") {
        return Some(
            "GOOGLE_API_KEY is invalid (wrong key/project) or was rotated. Create a new key and update the environment.",
        );
    }
    if (status_code == 403 || status_code == 429)
        && (m.contains("quota") || m.contains("rate limit") || m.contains("daily limit"))
    {
        return Some("Custom Search quota/rate limit exceeded. Check quotas and billing for the project.");
    }
    if status_code == 400 && m.contains("cx") {
        return Some(
            "GOOGLE_CSE_CX looks invalid. Use the Programmable Search Engine 'Search engine ID' (cx=...).",
        );
    }
    if status_code == 403 && m.contains("billing") {
        return Some("Billing is required for this project. Attach a billing account and retry.");
    }
    None
}

/// Accepts a bare engine id, a querystring, or a pasted control-panel URL
/// containing `cx=`.
pub fn normalize_cx(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("cx=") {
        let qs = raw.split_once('?').map_or(raw, |(_, q)| q);
        for pair in qs.split('&') {
            if let Some(value) = pair.strip_prefix("cx=")
                && !value.trim().is_empty()
            {
                return value.trim().to_string();
            }
        }
    }
    raw.to_string()
}

fn sanitize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(QUERY_CAP)
        .collect::<String>()
        .trim()
        .to_string()
}

fn dedupe_by_link(snippets: Vec<Snippet>) -> Vec<Snippet> {
    let mut seen = std::collections::HashSet::new();
    snippets
        .into_iter()
        .filter(|snippet| !snippet.link.is_empty() && seen.insert(snippet.link.clone()))
        .collect()
}

fn build_summary(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .take(SUMMARY_CAP)
        .map(|s| format!("[{}] {}: {} ({})", s.source, s.title, s.snippet, s.link))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(source: &'static str, title: &str, link: &str) -> Snippet {
        Snippet {
            source,
            title: title.into(),
            snippet: "notes of caramel and oak".into(),
            link: link.into(),
        }
    }

    #[tokio::test]
    async fn missing_credentials_disable_research() {
        let client = ResearchClient::new(
            Client::new(),
            &SearchConfig {
                api_key: None,
                cx: Some("abc".into()),
            },
        );
        let bundle = client.tasting_notes("old forester 1920").await;
        assert_eq!(bundle.status, ResearchStatus::Disabled);
        assert!(bundle.results.is_empty());
    }

    #[test]
    fn hint_table_matches_known_failure_modes() {
        assert!(
            cse_hint(403, "Custom Search API has not been used in project 42")
                .unwrap()
                .contains("Enable the Custom Search API")
        );
        assert!(cse_hint(400, "API key not valid").unwrap().contains("GOOGLE_API_KEY"));
        assert!(cse_hint(429, "Quota exceeded").unwrap().contains("quota"));
        assert!(cse_hint(400, "Invalid value for cx").unwrap().contains("cx="));
        assert!(cse_hint(403, "Billing must be enabled").unwrap().contains("billing account"));
        assert_eq!(cse_hint(500, "internal error"), None);
    }

    #[test]
    fn cx_extraction_handles_pasted_urls() {
        assert_eq!(normalize_cx("a1b2c3:d4e5"), "a1b2c3:d4e5");
        assert_eq!(
            normalize_cx("https://cse.google.com/cse?cx=a1b2c3%3Ad4e5&hl=en"),
            "a1b2c3%3Ad4e5"
        );
        assert_eq!(normalize_cx("cx=plain-id&foo=bar"), "plain-id");
        assert_eq!(normalize_cx(""), "");
    }

    #[test]
    fn dedupe_keeps_first_occurrence_in_probe_order() {
        let merged = vec![
            snippet("general", "Review A", "https://a.example/1"),
            snippet("distiller", "Review A again", "https://a.example/1"),
            snippet("reddit", "Thread", "https://r.example/2"),
            snippet("reddit", "No link", ""),
        ];
        let deduped = dedupe_by_link(merged);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source, "general");
        assert_eq!(deduped[1].link, "https://r.example/2");
    }

    #[test]
    fn summary_caps_at_twelve_and_tags_sources() {
        let many: Vec<Snippet> = (0..20)
            .map(|i| snippet("general", "Review", &format!("https://e.example/{i}")))
            .collect();
        let summary = build_summary(&many);
        assert_eq!(summary.lines().count(), 12);
        assert!(summary.starts_with("[general] Review: "));
        assert!(summary.contains("(https://e.example/0)"));
    }

    #[test]
    fn queries_are_collapsed_and_capped() {
        assert_eq!(sanitize_query("  old   forester\n1920 "), "old forester 1920");
        let long = "x".repeat(500);
        assert_eq!(sanitize_query(&long).len(), QUERY_CAP);
    }
}
