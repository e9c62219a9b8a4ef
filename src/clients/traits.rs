use async_trait::async_trait;

use crate::catalog::FilterCatalog;
use crate::error::Result;
use crate::filters::FilterSelection;
use crate::models::{
    EmployeeRecord, OverviewSnapshot, PredictionRequest, PredictionResult, RecommendationRequest,
    RecommendationResponse,
};

/// The remote analytics service, seen from the client.
///
/// Implementations return typed errors and never retry; the engine decides
/// what a failure means for the slot it was fetching.
#[async_trait]
pub trait AnalyticsService: Send + Sync {
    async fn filter_catalog(&self) -> Result<FilterCatalog>;

    async fn aggregate_stats(&self, selection: &FilterSelection) -> Result<OverviewSnapshot>;

    /// `Ok(None)` when the service has no employee with this id.
    async fn employee(&self, employee_id: &str) -> Result<Option<EmployeeRecord>>;

    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult>;

    async fn generate_recommendations(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse>;

    async fn credit_balance(&self) -> Result<u32>;

    async fn list_models(&self) -> Result<Vec<String>>;
}
