//! reqwest client for the attrition analytics API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::FilterCatalog;
use crate::clients::traits::AnalyticsService;
use crate::config::Config;
use crate::error::{Result, WhosNextError};
use crate::filters::FilterSelection;
use crate::models::{
    AttributeValue, CategoryCount, EmployeeRecord, OverviewSnapshot, PredictionRequest,
    PredictionResult, RecommendationRequest, RecommendationResponse,
};

const BREAKDOWN_PREFIX: &str = "attrition_by_";
const BODY_EXCERPT_CHARS: usize = 300;

pub struct HttpAnalyticsClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpAnalyticsClient {
    pub fn new(base_url: &str, timeout: Duration, api_token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| WhosNextError::Config {
            message: format!("invalid service URL '{}': {}", base_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(WhosNextError::Config {
                message: format!("service URL '{}' cannot carry a path", base_url),
            });
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()
            .map_err(|e| WhosNextError::Config {
                message: format!("Failed to build reqwest client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url,
            api_token,
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.service.base_url,
            config.request_timeout(),
            config.runtime.api_token.clone(),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.endpoint(segments))
            .header("Accept", "application/json")
            .header("x-request-id", uuid::Uuid::new_v4().to_string());
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Send and map transport errors and non-success statuses onto the
    /// error taxonomy.
    async fn send(&self, operation: &str, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                WhosNextError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            } else {
                WhosNextError::transport(operation, e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(operation, status, &body))
    }

    async fn decode<T: DeserializeOwned>(&self, operation: &str, response: Response) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| WhosNextError::transport(operation, e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| WhosNextError::Serialization {
            message: format!("{} response: {}", operation, e),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, operation: &str, segments: &[&str]) -> Result<T> {
        let response = self
            .send(operation, self.request(Method::GET, segments))
            .await?;
        self.decode(operation, response).await
    }

    async fn post_json<B, T>(&self, operation: &str, segments: &[&str], body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .send(operation, self.request(Method::POST, segments).json(body))
            .await?;
        self.decode(operation, response).await
    }
}

fn user_agent() -> String {
    format!("whos-next/{}", env!("CARGO_PKG_VERSION"))
}

/// Classify a non-success response.
fn status_error(operation: &str, status: StatusCode, body: &str) -> WhosNextError {
    let detail = extract_detail(body);
    match status {
        StatusCode::NOT_FOUND => WhosNextError::NotFound {
            resource: format!("{} ({})", operation, detail),
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            WhosNextError::ValidationRejected { message: detail }
        }
        StatusCode::PAYMENT_REQUIRED | StatusCode::TOO_MANY_REQUESTS => {
            WhosNextError::QuotaExhausted { message: detail }
        }
        _ => WhosNextError::transport(operation, format!("HTTP {}: {}", status, detail)),
    }
}

/// Pull a readable message out of an error body. Understands FastAPI's
/// `{"detail": "..."}` and `{"detail": [{"msg": "..."}]}` shapes.
fn extract_detail(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|v| v.get("detail"));
    match detail {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("msg").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => body.chars().take(BODY_EXCERPT_CHARS).collect(),
    }
}

#[derive(Deserialize)]
struct FiltersWire {
    #[serde(default, alias = "units")]
    departments: Vec<String>,
    #[serde(default, alias = "subcategories")]
    job_roles: Vec<String>,
    #[serde(default, alias = "mapping")]
    roles_by_department: Option<BTreeMap<String, Vec<String>>>,
}

impl From<FiltersWire> for FilterCatalog {
    fn from(wire: FiltersWire) -> Self {
        match wire.roles_by_department {
            Some(mapping) => FilterCatalog::new(wire.departments, wire.job_roles, mapping),
            None => {
                tracing::debug!("service sent no unit mapping; every unit allows every role");
                FilterCatalog::unmapped(wire.departments, wire.job_roles)
            }
        }
    }
}

#[derive(Deserialize)]
struct StatsWire {
    #[serde(default)]
    kpis: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    breakdowns: BTreeMap<String, Vec<Value>>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

impl From<StatsWire> for OverviewSnapshot {
    fn from(wire: StatsWire) -> Self {
        let kpis = wire
            .kpis
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect();

        let mut breakdowns: BTreeMap<String, Vec<CategoryCount>> = wire
            .breakdowns
            .into_iter()
            .map(|(dimension, rows)| (dimension, rows.iter().filter_map(category_count).collect()))
            .collect();
        for (key, value) in wire.rest {
            let Some(dimension) = key.strip_prefix(BREAKDOWN_PREFIX) else {
                continue;
            };
            let rows = value
                .as_array()
                .map(|rows| rows.iter().filter_map(category_count).collect())
                .unwrap_or_default();
            breakdowns.insert(dimension.to_string(), rows);
        }

        OverviewSnapshot { kpis, breakdowns }
    }
}

/// One breakdown row. Accepts `{"category", "count"}`, the
/// `{"value": <category>, "count"}` shape, and the older
/// `{"name": <category>, "value": <count>}` shape.
fn category_count(row: &Value) -> Option<CategoryCount> {
    let obj = row.as_object()?;
    let (category, count) = if let Some(count) = obj.get("count") {
        let category = obj
            .get("category")
            .or_else(|| obj.get("value"))
            .or_else(|| obj.get("name"))?;
        (category, count)
    } else {
        (obj.get("category").or_else(|| obj.get("name"))?, obj.get("value")?)
    };
    let category = match category {
        Value::String(s) => s.clone(),
        Value::Null => return None,
        other => other.to_string(),
    };
    let count = count
        .as_u64()
        .or_else(|| count.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))?;
    Some(CategoryCount { category, count })
}

fn employee_record(raw: serde_json::Map<String, Value>) -> EmployeeRecord {
    raw.into_iter()
        .filter_map(|(name, value)| {
            let value = match value {
                Value::Number(n) => AttributeValue::Number(n.as_f64()?),
                Value::String(s) => AttributeValue::Text(s),
                Value::Bool(b) => AttributeValue::Text(if b { "Yes" } else { "No" }.to_string()),
                Value::Null => return None,
                other => {
                    tracing::debug!("skipping nested attribute '{}': {}", name, other);
                    return None;
                }
            };
            Some((name, value))
        })
        .collect()
}

#[derive(Deserialize)]
struct CreditsWire {
    #[serde(alias = "remaining_credits", alias = "credits")]
    remaining: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelsWire {
    Wrapped { models: Vec<String> },
    Bare(Vec<String>),
}

#[async_trait]
impl AnalyticsService for HttpAnalyticsClient {
    async fn filter_catalog(&self) -> Result<FilterCatalog> {
        let wire: FiltersWire = self.get_json("filters", &["filters"]).await?;
        Ok(wire.into())
    }

    async fn aggregate_stats(&self, selection: &FilterSelection) -> Result<OverviewSnapshot> {
        let wire: StatsWire = self.post_json("stats", &["stats"], selection).await?;
        Ok(wire.into())
    }

    async fn employee(&self, employee_id: &str) -> Result<Option<EmployeeRecord>> {
        let result: Result<serde_json::Map<String, Value>> =
            self.get_json("employee", &["employees", employee_id]).await;
        match result {
            Ok(raw) => Ok(Some(employee_record(raw))),
            Err(WhosNextError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        let result: PredictionResult = self.post_json("predict", &["predict"], request).await?;
        result.validate()?;
        Ok(result)
    }

    async fn generate_recommendations(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse> {
        self.post_json("recommendations", &["recommendations"], request)
            .await
    }

    async fn credit_balance(&self) -> Result<u32> {
        let wire: CreditsWire = self.get_json("credits", &["credits"]).await?;
        Ok(wire.remaining)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let wire: ModelsWire = self.get_json("models", &["models"]).await?;
        Ok(match wire {
            ModelsWire::Wrapped { models } | ModelsWire::Bare(models) => models,
        })
    }
}
