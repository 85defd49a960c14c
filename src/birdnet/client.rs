//! HTTP client for the BirdNET-Go REST API.
//!
//! Only the read side is used: `GET /api/detections` and `GET /api/species`.
//! All connection details come from [`BirdnetConfig`].

use chrono::{Duration, Local};
use thiserror::Error;

use crate::birdnet::detections::Detection;
use crate::config::BirdnetConfig;

/// `limit` used by [`BirdnetClient::recent_detections`].
const RECENT_LIMIT: usize = 10_000;

// ---------------------------------------------------------------------------
// BirdnetError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum BirdnetError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("BirdNET-Go request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("BirdNET-Go returned HTTP {0}")]
    Status(u16),

    #[error("failed to parse BirdNET-Go response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for BirdnetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BirdnetError::Timeout
        } else {
            BirdnetError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// DetectionQuery
// ---------------------------------------------------------------------------

/// Filters for `GET /api/detections`.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionQuery {
    pub limit: usize,
    pub offset: usize,
    pub species: Option<String>,
    pub min_confidence: Option<f64>,
    /// `YYYY-MM-DD`
    pub date_from: Option<String>,
    /// `YYYY-MM-DD`
    pub date_to: Option<String>,
}

impl Default for DetectionQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            species: None,
            min_confidence: None,
            date_from: None,
            date_to: None,
        }
    }
}

impl DetectionQuery {
    /// Query-string pairs in the server's camelCase naming.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ];
        if let Some(species) = &self.species {
            params.push(("species", species.clone()));
        }
        if let Some(min) = self.min_confidence {
            params.push(("minConfidence", min.to_string()));
        }
        if let Some(from) = &self.date_from {
            params.push(("dateFrom", from.clone()));
        }
        if let Some(to) = &self.date_to {
            params.push(("dateTo", to.clone()));
        }
        params
    }
}

// ---------------------------------------------------------------------------
// BirdnetClient
// ---------------------------------------------------------------------------

pub struct BirdnetClient {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl BirdnetClient {
    /// Build a client from config. The HTTP client carries the per-request
    /// timeout from `config.timeout_secs`.
    pub fn from_config(config: &BirdnetConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size.max(1),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `true` when the detections endpoint answers 200, or 401 (reachable
    /// but protected).
    pub async fn test_connection(&self) -> bool {
        let url = format!("{}/api/detections", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                log::debug!("birdnet: connection test → HTTP {status}");
                status == 200 || status == 401
            }
            Err(e) => {
                log::warn!("birdnet: cannot reach {}: {e}", self.base_url);
                false
            }
        }
    }

    /// One page of detections.
    pub async fn get_detections(&self, query: &DetectionQuery) -> Result<Vec<Detection>, BirdnetError> {
        let url = format!("{}/api/detections", self.base_url);
        let response = self.client.get(&url).query(&query.to_params()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BirdnetError::Status(status.as_u16()));
        }

        response
            .json::<Vec<Detection>>()
            .await
            .map_err(|e| BirdnetError::Parse(e.to_string()))
    }

    /// Page through detections matching `query` until a short or empty page,
    /// returning at most `max`.
    ///
    /// A failure on the first page is returned; a failure on a later page
    /// ends paging and keeps what was fetched.
    pub async fn get_all_detections(
        &self,
        query: &DetectionQuery,
        max: usize,
    ) -> Result<Vec<Detection>, BirdnetError> {
        let mut all = Vec::new();
        let mut page = DetectionQuery {
            limit: self.page_size,
            offset: query.offset,
            ..query.clone()
        };

        while all.len() < max {
            let batch = match self.get_detections(&page).await {
                Ok(batch) => batch,
                Err(e) if all.is_empty() => return Err(e),
                Err(e) => {
                    log::warn!("birdnet: stopping after {} detections: {e}", all.len());
                    break;
                }
            };

            let fetched = batch.len();
            all.extend(batch);
            log::info!("Fetched {} detections so far...", all.len());

            if fetched < self.page_size {
                break;
            }
            page.offset += self.page_size;
        }

        all.truncate(max);
        Ok(all)
    }

    /// Species known to the server. Entries are passed through untouched.
    pub async fn get_species_list(&self) -> Result<Vec<serde_json::Value>, BirdnetError> {
        let url = format!("{}/api/species", self.base_url);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BirdnetError::Status(status.as_u16()));
        }

        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| BirdnetError::Parse(e.to_string()))
    }

    /// Detections since the calendar day `hours` ago.
    pub async fn recent_detections(&self, hours: u32) -> Result<Vec<Detection>, BirdnetError> {
        let query = DetectionQuery {
            limit: RECENT_LIMIT,
            date_from: Some(date_from_hours(hours)),
            ..DetectionQuery::default()
        };
        self.get_detections(&query).await
    }
}

fn date_from_hours(hours: u32) -> String {
    (Local::now() - Duration::hours(i64::from(hours)))
        .format("%Y-%m-%d")
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Minimal HTTP/1.1 server: answers each request with `respond(target)`
    /// and records request targets.
    async fn serve<F>(respond: F) -> (String, Arc<Mutex<Vec<String>>>)
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_task = Arc::clone(&seen);
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let respond = Arc::clone(&respond);
                let seen = Arc::clone(&seen_task);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).to_string();
                    let target = head
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or("/")
                        .to_string();
                    seen.lock().unwrap().push(target.clone());

                    let (status, body) = respond(&target);
                    let reply = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}/"), seen)
    }

    fn client_for(base_url: &str, page_size: usize) -> BirdnetClient {
        BirdnetClient::from_config(&BirdnetConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            page_size,
            max_detections: 100,
        })
    }

    fn page_of(n: usize) -> String {
        let items: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"commonName":"Bird {i}","confidence":0.5}}"#))
            .collect();
        format!("[{}]", items.join(","))
    }

    fn offset_of(target: &str) -> usize {
        target
            .split(['?', '&'])
            .find_map(|p| p.strip_prefix("offset="))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    #[test]
    fn params_include_only_set_filters() {
        let q = DetectionQuery::default();
        assert_eq!(
            q.to_params(),
            vec![("limit", "100".to_string()), ("offset", "0".to_string())]
        );

        let q = DetectionQuery {
            limit: 10,
            offset: 20,
            species: Some("Robin".into()),
            min_confidence: Some(0.75),
            date_from: Some("2024-05-01".into()),
            date_to: Some("2024-05-02".into()),
        };
        let keys: Vec<&str> = q.to_params().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            ["limit", "offset", "species", "minConfidence", "dateFrom", "dateTo"]
        );
        assert!(q.to_params().contains(&("minConfidence", "0.75".to_string())));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(client_for("http://host:8080/", 10).base_url(), "http://host:8080");
    }

    #[test]
    fn date_from_is_a_calendar_day() {
        let d = date_from_hours(24);
        assert_eq!(d.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&d, "%Y-%m-%d").is_ok());
    }

    #[tokio::test]
    async fn connection_test_accepts_200_and_401() {
        let (ok, _) = serve(|_| (200, "[]".into())).await;
        assert!(client_for(&ok, 10).test_connection().await);

        let (locked, _) = serve(|_| (401, "{}".into())).await;
        assert!(client_for(&locked, 10).test_connection().await);

        let (broken, _) = serve(|_| (500, "{}".into())).await;
        assert!(!client_for(&broken, 10).test_connection().await);
    }

    #[tokio::test]
    async fn connection_test_fails_when_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        assert!(!client_for(&format!("http://{addr}"), 10).test_connection().await);
    }

    #[tokio::test]
    async fn get_detections_sends_query_and_parses() {
        let (url, seen) = serve(|_| (200, page_of(2))).await;
        let client = client_for(&url, 10);
        let query = DetectionQuery {
            species: Some("Robin".into()),
            ..DetectionQuery::default()
        };

        let list = client.get_detections(&query).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].species(), "Bird 1");

        let target = seen.lock().unwrap()[0].clone();
        assert!(target.starts_with("/api/detections?"));
        assert!(target.contains("species=Robin"));
        assert!(target.contains("limit=100"));
    }

    #[tokio::test]
    async fn http_error_and_bad_json_are_reported() {
        let (url, _) = serve(|_| (503, "{}".into())).await;
        let err = client_for(&url, 10)
            .get_detections(&DetectionQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BirdnetError::Status(503)));

        let (url, _) = serve(|_| (200, "not json".into())).await;
        let err = client_for(&url, 10)
            .get_detections(&DetectionQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BirdnetError::Parse(_)));
    }

    #[tokio::test]
    async fn paging_stops_on_short_page() {
        // 3 full pages of 4, then 1.
        let (url, seen) = serve(|target| {
            let n = if offset_of(target) < 12 { 4 } else { 1 };
            (200, page_of(n))
        })
        .await;

        let list = client_for(&url, 4)
            .get_all_detections(&DetectionQuery::default(), 100)
            .await
            .unwrap();

        assert_eq!(list.len(), 13);
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn paging_truncates_to_max() {
        let (url, seen) = serve(|_| (200, page_of(4))).await;

        let list = client_for(&url, 4)
            .get_all_detections(&DetectionQuery::default(), 6)
            .await
            .unwrap();

        assert_eq!(list.len(), 6);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn paging_keeps_partial_results_after_later_failure() {
        let (url, _) = serve(|target| {
            if offset_of(target) == 0 {
                (200, page_of(4))
            } else {
                (500, "{}".into())
            }
        })
        .await;

        let list = client_for(&url, 4)
            .get_all_detections(&DetectionQuery::default(), 100)
            .await
            .unwrap();
        assert_eq!(list.len(), 4);
    }

    #[tokio::test]
    async fn species_list_is_passed_through() {
        let (url, seen) =
            serve(|_| (200, r#"[{"name":"Robin"},"Wren"]"#.into())).await;

        let species = client_for(&url, 10).get_species_list().await.unwrap();
        assert_eq!(species.len(), 2);
        assert_eq!(species[0]["name"], "Robin");
        assert_eq!(seen.lock().unwrap()[0], "/api/species");
    }

    #[tokio::test]
    async fn recent_uses_large_limit_and_date_from() {
        let (url, seen) = serve(|_| (200, "[]".into())).await;

        let list = client_for(&url, 10).recent_detections(24).await.unwrap();
        assert!(list.is_empty());

        let target = seen.lock().unwrap()[0].clone();
        assert!(target.contains("limit=10000"));
        assert!(target.contains("dateFrom="));
    }
}
