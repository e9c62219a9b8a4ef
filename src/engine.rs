//! The dashboard event loop.
//!
//! `Dashboard` owns every controller. Operator commands mutate controllers
//! synchronously and spawn at most one remote call each; every spawned call
//! reports back exactly once through the completion channel, and the owner
//! applies the completion with [`Dashboard::apply`]. Slots are only ever
//! mutated on the owner's side, so no locking is involved.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::catalog::FilterCatalog;
use crate::clients::AnalyticsService;
use crate::config::Config;
use crate::credits::CreditLedger;
use crate::error::{Result, WhosNextError};
use crate::filters::FilterSelectionStore;
use crate::generation::{Disposition, Generation};
use crate::lookup::{EmployeeLookupController, LookupStatus};
use crate::models::{
    AttributeValue, EmployeeRecord, OverviewSnapshot, PredictionResult, RecommendationResponse,
};
use crate::overview::{DependentFetchOrchestrator, OverviewState};
use crate::suggest::unknown_name_message;
use crate::workflow::{PredictionPhase, PredictionWorkflowController};

/// Result of one remote call, addressed to the slot that issued it.
#[derive(Debug)]
pub enum Completion {
    Overview {
        generation: Generation,
        result: Result<OverviewSnapshot>,
    },
    Lookup {
        generation: Generation,
        employee_id: String,
        result: Result<Option<EmployeeRecord>>,
    },
    Prediction {
        generation: Generation,
        result: Result<PredictionResult>,
    },
    Recommendation {
        generation: Generation,
        result: Result<RecommendationResponse>,
    },
}

/// The four independently refreshed parts of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Overview,
    Lookup,
    Prediction,
    Recommendation,
}

impl Completion {
    pub fn slot(&self) -> Slot {
        match self {
            Completion::Overview { .. } => Slot::Overview,
            Completion::Lookup { .. } => Slot::Lookup,
            Completion::Prediction { .. } => Slot::Prediction,
            Completion::Recommendation { .. } => Slot::Recommendation,
        }
    }
}

/// The per-employee workflow as one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    Idle,
    Searching,
    Found,
    NotFound,
    LookupFailed,
    Predicting,
    Predicted,
    Recommending,
    Recommended,
}

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub request_timeout: Duration,
    pub default_model: String,
    pub fallback_models: Vec<String>,
    pub select_all_on_start: bool,
}

impl From<&Config> for DashboardSettings {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            default_model: config.dashboard.default_model.clone(),
            fallback_models: config.dashboard.models.clone(),
            select_all_on_start: config.dashboard.select_all_on_start,
        }
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        (&Config::default()).into()
    }
}

pub struct Dashboard {
    service: Arc<dyn AnalyticsService>,
    settings: DashboardSettings,
    filters: FilterSelectionStore,
    overview: DependentFetchOrchestrator,
    lookup: EmployeeLookupController,
    workflow: PredictionWorkflowController,
    ledger: CreditLedger,
    models: Vec<String>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl Dashboard {
    /// Load the catalog, credit balance and model list, then apply the
    /// initial selection. Only a missing catalog is fatal.
    pub async fn connect(
        service: Arc<dyn AnalyticsService>,
        settings: DashboardSettings,
    ) -> Result<Self> {
        let timeout = settings.request_timeout;
        let (catalog, credits, models) = tokio::join!(
            with_timeout("filters", timeout, service.filter_catalog()),
            with_timeout("credits", timeout, service.credit_balance()),
            with_timeout("models", timeout, service.list_models()),
        );
        let catalog = catalog?;

        let ledger = match credits {
            Ok(remaining) => CreditLedger::seeded(remaining),
            Err(err) => {
                tracing::warn!("credit balance unavailable, recommendations disabled: {}", err);
                CreditLedger::unseeded()
            }
        };
        let models = match models {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => settings.fallback_models.clone(),
            Err(err) => {
                tracing::warn!("model list unavailable, using configured models: {}", err);
                settings.fallback_models.clone()
            }
        };
        tracing::info!(
            "dashboard connected: {} units, {} sub-categories, {} models, credits {:?}",
            catalog.units().len(),
            catalog.subcategories().len(),
            models.len(),
            ledger.remaining()
        );

        let mut dashboard = Self::with_parts(service, settings, catalog, ledger, models);
        if dashboard.settings.select_all_on_start && dashboard.filters.select_all() {
            dashboard.selection_changed();
        }
        Ok(dashboard)
    }

    /// Assemble a dashboard from already-fetched startup state.
    pub fn with_parts(
        service: Arc<dyn AnalyticsService>,
        settings: DashboardSettings,
        catalog: FilterCatalog,
        ledger: CreditLedger,
        models: Vec<String>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            service,
            settings,
            filters: FilterSelectionStore::new(catalog),
            overview: DependentFetchOrchestrator::new(),
            lookup: EmployeeLookupController::new(),
            workflow: PredictionWorkflowController::new(),
            ledger,
            models,
            completions_tx,
            completions_rx,
            in_flight: 0,
        }
    }

    pub fn filters(&self) -> &FilterSelectionStore {
        &self.filters
    }

    pub fn overview(&self) -> &OverviewState {
        self.overview.state()
    }

    pub fn lookup(&self) -> &EmployeeLookupController {
        &self.lookup
    }

    pub fn workflow(&self) -> &PredictionWorkflowController {
        &self.workflow
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn default_model(&self) -> &str {
        &self.settings.default_model
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn can_recommend(&self) -> bool {
        self.ledger.can_recommend()
            && matches!(
                self.workflow.phase(),
                PredictionPhase::Predicted { .. } | PredictionPhase::Recommended { .. }
            )
    }

    pub fn stage(&self) -> WorkflowStage {
        match self.lookup.status() {
            LookupStatus::Idle => WorkflowStage::Idle,
            LookupStatus::Searching { .. } => WorkflowStage::Searching,
            LookupStatus::NotFound { .. } => WorkflowStage::NotFound,
            LookupStatus::Failed { .. } => WorkflowStage::LookupFailed,
            LookupStatus::Found { .. } => match self.workflow.phase() {
                PredictionPhase::Idle => WorkflowStage::Found,
                PredictionPhase::Predicting { .. } => WorkflowStage::Predicting,
                PredictionPhase::Predicted { .. } => WorkflowStage::Predicted,
                PredictionPhase::Recommending { .. } => WorkflowStage::Recommending,
                PredictionPhase::Recommended { .. } => WorkflowStage::Recommended,
            },
        }
    }

    pub fn toggle_unit(&mut self, unit: &str, on: bool) -> Result<()> {
        if self.filters.select_unit(unit, on)? {
            self.selection_changed();
        }
        Ok(())
    }

    pub fn toggle_subcategory(&mut self, subcategory: &str, on: bool) {
        if self.filters.select_subcategory(subcategory, on) {
            self.selection_changed();
        }
    }

    /// Apply a complete filter scope at once, issuing at most one overview
    /// request. See [`FilterSelectionStore::scope`].
    pub fn apply_filters(&mut self, units: &[String], subcategories: &[String]) -> Result<()> {
        let changed = self.filters.scope(units, subcategories)?;
        for subcategory in subcategories {
            if !self.filters.is_allowed(subcategory) {
                tracing::warn!("ignoring '{}': not offered by the selected units", subcategory);
            }
        }
        if changed {
            self.selection_changed();
        }
        Ok(())
    }

    pub fn clear_filters(&mut self) {
        if self.filters.clear() {
            self.selection_changed();
        }
    }

    fn selection_changed(&mut self) {
        let Some(request) = self.overview.on_selection_changed(self.filters.selection()) else {
            return;
        };
        let generation = request.generation;
        let selection = request.selection;
        let service = Arc::clone(&self.service);
        let timeout = self.settings.request_timeout;
        self.spawn(
            async move {
                let result =
                    with_timeout("stats", timeout, service.aggregate_stats(&selection)).await;
                Completion::Overview { generation, result }
            },
            move |err| Completion::Overview {
                generation,
                result: Err(err),
            },
        );
    }

    /// Look up an employee. Any displayed prediction and recommendations are
    /// cleared now, before the response arrives.
    pub fn search(&mut self, identifier: &str) -> Result<()> {
        let request = self.lookup.begin(identifier)?;
        self.workflow.reset();

        let service = Arc::clone(&self.service);
        let timeout = self.settings.request_timeout;
        let (generation, employee_id) = (request.generation, request.employee_id.clone());
        self.spawn(
            async move {
                let result =
                    with_timeout("employee", timeout, service.employee(&request.employee_id)).await;
                Completion::Lookup {
                    generation: request.generation,
                    employee_id: request.employee_id,
                    result,
                }
            },
            move |err| Completion::Lookup {
                generation,
                employee_id,
                result: Err(err),
            },
        );
        Ok(())
    }

    /// Edit the what-if working copy. Has no effect on a displayed
    /// prediction until [`Dashboard::predict`] is called again.
    pub fn set_override(&mut self, attribute: &str, value: AttributeValue) -> Result<()> {
        self.lookup.set_override(attribute, value)
    }

    pub fn clear_override(&mut self, attribute: &str) -> bool {
        self.lookup.clear_override(attribute)
    }

    pub fn reset_overrides(&mut self) {
        self.lookup.reset_overrides();
    }

    /// Score the found employee with overrides merged in. `model` defaults to
    /// the configured model.
    pub fn predict(&mut self, model: Option<&str>) -> Result<()> {
        let model_id = model.unwrap_or(self.settings.default_model.as_str()).trim().to_string();
        if !self.models.is_empty() && !self.models.iter().any(|m| *m == model_id) {
            return Err(WhosNextError::invalid(unknown_name_message(
                "model",
                &model_id,
                &self.models,
            )));
        }
        let (employee_id, features) = match self.lookup.found() {
            Some((id, _)) => (id.to_string(), self.lookup.effective_record().unwrap_or_default()),
            None => {
                return Err(WhosNextError::invalid(
                    "no employee found; search for one before predicting",
                ));
            }
        };
        let pending = self
            .workflow
            .begin_prediction(&employee_id, &model_id, features)?;

        let service = Arc::clone(&self.service);
        let timeout = self.settings.request_timeout;
        let generation = pending.generation;
        self.spawn(
            async move {
                let result =
                    with_timeout("predict", timeout, service.predict(&pending.request)).await;
                Completion::Prediction { generation, result }
            },
            move |err| Completion::Prediction {
                generation,
                result: Err(err),
            },
        );
        Ok(())
    }

    /// Request recommendations for the displayed prediction. The credit gate
    /// is evaluated now, against the ledger as it is at issue time.
    pub fn recommend(&mut self) -> Result<()> {
        let pending = self.workflow.begin_recommendation(&self.ledger)?;

        let service = Arc::clone(&self.service);
        let timeout = self.settings.request_timeout;
        let generation = pending.generation;
        self.spawn(
            async move {
                let result = with_timeout(
                    "recommendations",
                    timeout,
                    service.generate_recommendations(&pending.request),
                )
                .await;
                Completion::Recommendation { generation, result }
            },
            move |err| Completion::Recommendation {
                generation,
                result: Err(err),
            },
        );
        Ok(())
    }

    /// Run `request` on the runtime. If the task dies before producing a
    /// completion, `on_failure` builds one so the slot still settles.
    fn spawn<F, E>(&mut self, request: F, on_failure: E)
    where
        F: Future<Output = Completion> + Send + 'static,
        E: FnOnce(WhosNextError) -> Completion + Send + 'static,
    {
        let tx = self.completions_tx.clone();
        self.in_flight += 1;
        let task = tokio::spawn(request);
        tokio::spawn(async move {
            let completion = match task.await {
                Ok(completion) => completion,
                Err(err) => {
                    tracing::error!("request task failed: {}", err);
                    on_failure(err.into())
                }
            };
            // The dashboard may be gone; its completions no longer matter.
            let _ = tx.send(completion);
        });
    }

    /// Wait for the next completion. `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        if self.in_flight == 0 {
            return None;
        }
        self.completions_rx.recv().await
    }

    /// Route a completion to the controller that owns its slot.
    pub fn apply(&mut self, completion: Completion) -> Disposition {
        self.in_flight = self.in_flight.saturating_sub(1);
        let slot = completion.slot();
        let disposition = match completion {
            Completion::Overview { generation, result } => self.overview.complete(generation, result),
            Completion::Lookup {
                generation,
                employee_id,
                result,
            } => self.lookup.complete(generation, &employee_id, result),
            Completion::Prediction { generation, result } => {
                self.workflow.complete_prediction(generation, result)
            }
            Completion::Recommendation { generation, result } => {
                self.workflow
                    .complete_recommendation(generation, result, &mut self.ledger)
            }
        };
        tracing::debug!("{:?} completion {:?}", slot, disposition);
        disposition
    }

    /// Apply completions until nothing is in flight.
    pub async fn settle(&mut self) {
        while let Some(completion) = self.next_completion().await {
            self.apply(completion);
        }
    }
}

/// Bound a remote call by the configured timeout.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, request: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(WhosNextError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
