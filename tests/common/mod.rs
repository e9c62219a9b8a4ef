#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use whos_next::catalog::FilterCatalog;
use whos_next::clients::AnalyticsService;
use whos_next::error::{Result, WhosNextError};
use whos_next::filters::FilterSelection;
use whos_next::models::{
    AttributeValue, CategoryCount, Driver, EmployeeRecord, OverviewSnapshot, PredictionRequest,
    PredictionResult, RecommendationRequest, RecommendationResponse, RiskLevel,
};
use whos_next::{Dashboard, DashboardSettings};

/// Held response: the matching request waits until released.
pub struct Gate(Option<oneshot::Sender<()>>);

impl Gate {
    pub fn release(mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Scripted analytics service.
///
/// Responses are deterministic functions of the request, so a test can tell
/// which request a displayed value came from. Requests are keyed as
/// `stats:<units>`, `employee:<id>`, `predict:<id>` and
/// `recommendations:<id>`.
pub struct FakeService {
    catalog: FilterCatalog,
    employees: BTreeMap<String, EmployeeRecord>,
    models: Vec<String>,
    credits: Mutex<u32>,
    gates: Mutex<HashMap<String, VecDeque<oneshot::Receiver<()>>>>,
    failures: Mutex<HashMap<String, VecDeque<WhosNextError>>>,
    calls: Mutex<Vec<String>>,
    crashes: Mutex<HashSet<String>>,
}

pub fn sample_catalog() -> FilterCatalog {
    let mut mapping = BTreeMap::new();
    mapping.insert(
        "Sales".to_string(),
        vec!["Sales Executive".to_string(), "Manager".to_string()],
    );
    mapping.insert(
        "Research".to_string(),
        vec!["Research Scientist".to_string(), "Manager".to_string()],
    );
    mapping.insert("HR".to_string(), vec!["Human Resources".to_string()]);
    FilterCatalog::from_mapping(mapping)
}

pub fn sample_employee() -> EmployeeRecord {
    let mut record = EmployeeRecord::new();
    record.insert("Age".into(), AttributeValue::Number(34.0));
    record.insert("MonthlyIncome".into(), AttributeValue::Number(4200.0));
    record.insert("OverTime".into(), AttributeValue::from("Yes"));
    record.insert("Department".into(), AttributeValue::from("Sales"));
    record
}

fn unit_key(selection: &FilterSelection) -> String {
    selection
        .units
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(",")
}

/// Snapshot whose `units` KPI and Department breakdown identify the selection.
pub fn snapshot_for(selection: &FilterSelection) -> OverviewSnapshot {
    let mut snapshot = OverviewSnapshot::default();
    snapshot
        .kpis
        .insert("units".into(), selection.units.len() as f64);
    snapshot
        .kpis
        .insert("subcategories".into(), selection.subcategories.len() as f64);
    snapshot.breakdowns.insert(
        "Department".into(),
        selection
            .units
            .iter()
            .map(|u| CategoryCount {
                category: u.clone(),
                count: 10,
            })
            .collect(),
    );
    snapshot
}

/// OverTime=Yes scores HIGH, anything else LOW.
pub fn score(request: &PredictionRequest) -> PredictionResult {
    let overtime = request.features.get("OverTime") == Some(&AttributeValue::from("Yes"));
    let (probability, risk_level) = if overtime {
        (0.8, RiskLevel::High)
    } else {
        (0.3, RiskLevel::Low)
    };
    PredictionResult {
        probability,
        risk_level,
        drivers: vec![Driver {
            factor: "OverTime".into(),
            magnitude: probability,
            qualitative_impact: "increases risk".into(),
        }],
        model_id: request.model_id.clone(),
        reliability_metrics: None,
    }
}

impl FakeService {
    pub fn new(credits: u32) -> Self {
        let mut employees = BTreeMap::new();
        employees.insert("7".to_string(), sample_employee());
        let mut other = sample_employee();
        other.insert("OverTime".into(), AttributeValue::from("No"));
        employees.insert("8".to_string(), other);
        Self {
            catalog: sample_catalog(),
            employees,
            models: vec!["GradientBoosting".into(), "RandomForest".into()],
            credits: Mutex::new(credits),
            gates: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            crashes: Mutex::new(HashSet::new()),
        }
    }

    /// Hold the next request with this key until the gate is released.
    pub fn hold(&self, key: &str) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(rx);
        Gate(Some(tx))
    }

    /// Fail the next request with this key.
    pub fn fail_next(&self, key: &str, error: WhosNextError) {
        self.failures
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(error);
    }

    /// Panic inside the next request with this key.
    pub fn crash_next(&self, key: &str) {
        self.crashes.lock().unwrap().insert(key.to_string());
    }

    pub fn set_credits(&self, credits: u32) {
        *self.credits.lock().unwrap() = credits;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    async fn enter(&self, key: String) -> Result<()> {
        self.calls.lock().unwrap().push(key.clone());
        let crash = self.crashes.lock().unwrap().remove(&key);
        if crash {
            panic!("service crashed handling {}", key);
        }
        let gate = self
            .gates
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AnalyticsService for FakeService {
    async fn filter_catalog(&self) -> Result<FilterCatalog> {
        self.enter("filters".into()).await?;
        Ok(self.catalog.clone())
    }

    async fn aggregate_stats(&self, selection: &FilterSelection) -> Result<OverviewSnapshot> {
        self.enter(format!("stats:{}", unit_key(selection))).await?;
        Ok(snapshot_for(selection))
    }

    async fn employee(&self, employee_id: &str) -> Result<Option<EmployeeRecord>> {
        self.enter(format!("employee:{}", employee_id)).await?;
        Ok(self.employees.get(employee_id).cloned())
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        self.enter(format!("predict:{}", request.employee_id)).await?;
        Ok(score(request))
    }

    async fn generate_recommendations(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse> {
        self.enter(format!("recommendations:{}", request.employee_id))
            .await?;
        let mut credits = self.credits.lock().unwrap();
        if *credits == 0 {
            return Err(WhosNextError::QuotaExhausted {
                message: "no credits left".into(),
            });
        }
        *credits -= 1;
        Ok(RecommendationResponse {
            recommendations: vec![format!(
                "Review workload for employee {} ({})",
                request.employee_id, request.risk_level
            )],
            remaining_credits: *credits,
        })
    }

    async fn credit_balance(&self) -> Result<u32> {
        self.enter("credits".into()).await?;
        Ok(*self.credits.lock().unwrap())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.enter("models".into()).await?;
        Ok(self.models.clone())
    }
}

pub fn settings(select_all_on_start: bool) -> DashboardSettings {
    DashboardSettings {
        request_timeout: Duration::from_secs(5),
        default_model: "GradientBoosting".into(),
        fallback_models: vec!["GradientBoosting".into()],
        select_all_on_start,
    }
}

pub async fn dashboard(fake: &Arc<FakeService>, select_all_on_start: bool) -> Dashboard {
    let service: Arc<dyn AnalyticsService> = fake.clone();
    Dashboard::connect(service, settings(select_all_on_start))
        .await
        .expect("dashboard connects")
}
