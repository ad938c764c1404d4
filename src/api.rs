use std::time::Duration;

use data::InternalError;
use data::annotation::{Annotation, AnnotationKind, AnnotationPatch, DrawingPoint, Style};
use exchange::{Candle, Interval};
use serde::{Deserialize, Serialize};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin client for the candlepad-server HTTP API. Mutations resolve
/// to the server's committed copy, which the caller then applies to
/// the local annotation store.
#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSummary {
    pub ok: bool,
    pub inserted: u64,
    pub symbol: String,
    pub interval: String,
}

#[derive(Serialize)]
struct CreateDrawing<'a> {
    symbol: &'a str,
    #[serde(rename = "type")]
    kind: AnnotationKind,
    points: &'a [DrawingPoint],
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a Style>,
}

#[derive(Serialize)]
struct SyncRequest<'a> {
    symbol: &'a str,
    interval: String,
}

fn http_client() -> Result<reqwest::Client, InternalError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| InternalError::Fetch(e.to_string()))
}

/// Surface the server's `{error}` payload as-is when present.
async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or_default();
    body.get("error")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .unwrap_or_else(|| status.to_string())
}

impl Client {
    pub fn from_env() -> Self {
        let base_url = std::env::var("CANDLEPAD_API")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http://127.0.0.1:8787".to_owned());
        Self { base_url }
    }

    pub async fn candles(
        &self,
        symbol: String,
        interval: Interval,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<Candle>, InternalError> {
        let url = format!(
            "{}/api/candles?symbol={symbol}&interval={interval}&from={from_ms}&to={to_ms}",
            self.base_url,
        );
        let response = http_client()?
            .get(&url)
            .send()
            .await
            .map_err(|e| InternalError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InternalError::Fetch(error_body(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| InternalError::Fetch(e.to_string()))
    }

    /// Ask the server to backfill, blocking until it finishes so the
    /// follow-up candle fetch sees the new rows.
    pub async fn sync(
        &self,
        symbol: String,
        interval: Interval,
    ) -> Result<SyncSummary, InternalError> {
        let url = format!("{}/api/sync", self.base_url);
        let response = http_client()?
            .post(&url)
            .json(&SyncRequest {
                symbol: &symbol,
                interval: interval.to_string(),
            })
            .send()
            .await
            .map_err(|e| InternalError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InternalError::Fetch(error_body(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| InternalError::Fetch(e.to_string()))
    }

    pub async fn drawings(&self, symbol: String) -> Result<Vec<Annotation>, InternalError> {
        let url = format!("{}/api/drawings?symbol={symbol}", self.base_url);
        let response = http_client()?
            .get(&url)
            .send()
            .await
            .map_err(|e| InternalError::Persist(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InternalError::Persist(error_body(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| InternalError::Persist(e.to_string()))
    }

    pub async fn create_drawing(
        &self,
        symbol: String,
        kind: AnnotationKind,
        points: Vec<DrawingPoint>,
        style: Option<Style>,
    ) -> Result<Annotation, InternalError> {
        let url = format!("{}/api/drawings", self.base_url);
        let response = http_client()?
            .post(&url)
            .json(&CreateDrawing {
                symbol: &symbol,
                kind,
                points: &points,
                style: style.as_ref(),
            })
            .send()
            .await
            .map_err(|e| InternalError::Persist(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InternalError::Persist(error_body(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| InternalError::Persist(e.to_string()))
    }

    pub async fn update_drawing(
        &self,
        id: i64,
        patch: AnnotationPatch,
    ) -> Result<Annotation, InternalError> {
        let url = format!("{}/api/drawings/{id}", self.base_url);
        let response = http_client()?
            .put(&url)
            .json(&patch)
            .send()
            .await
            .map_err(|e| InternalError::Persist(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InternalError::Persist(error_body(response).await));
        }
        response
            .json()
            .await
            .map_err(|e| InternalError::Persist(e.to_string()))
    }

    pub async fn delete_drawing(&self, id: i64) -> Result<i64, InternalError> {
        let url = format!("{}/api/drawings/{id}", self.base_url);
        let response = http_client()?
            .delete(&url)
            .send()
            .await
            .map_err(|e| InternalError::Persist(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InternalError::Persist(error_body(response).await));
        }
        Ok(id)
    }
}
