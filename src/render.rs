//! Plain-terminal views of dashboard state.

use prettytable::{Table, row};

use crate::catalog::FilterCatalog;
use crate::credits::CreditLedger;
use crate::filters::FilterSelection;
use crate::lookup::{EmployeeLookupController, LookupStatus};
use crate::models::{OverviewSnapshot, RecommendationSet};
use crate::overview::OverviewState;
use crate::workflow::ScoredPrediction;

fn mark(on: bool) -> &'static str {
    if on { "x" } else { "" }
}

/// Units with their sub-categories, marking what is currently selected.
pub fn catalog_table(catalog: &FilterCatalog, selection: Option<&FilterSelection>) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Unit", "Selected", "Sub-categories"]);
    for unit in catalog.units() {
        let subs = catalog
            .subcategories_of(unit)
            .iter()
            .map(|sub| match selection {
                Some(sel) if sel.subcategories.contains(sub) => format!("[{}]", sub),
                _ => sub.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let selected = selection.is_some_and(|sel| sel.units.contains(unit));
        table.add_row(row![unit, mark(selected), subs]);
    }
    table
}

pub fn kpi_table(snapshot: &OverviewSnapshot) -> Table {
    let mut table = Table::new();
    table.add_row(row!["KPI", "Value"]);
    for (name, value) in &snapshot.kpis {
        table.add_row(row![name, format_kpi(name, *value)]);
    }
    table
}

fn format_kpi(name: &str, value: f64) -> String {
    // Rates arrive from the service already expressed as percentages.
    if name.contains("rate") {
        format!("{:.1}%", value)
    } else if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

pub fn breakdown_table(snapshot: &OverviewSnapshot, dimension: &str) -> Table {
    let mut table = Table::new();
    table.add_row(row![dimension, "Count"]);
    for entry in snapshot.breakdown(dimension) {
        table.add_row(row![entry.category, entry.count]);
    }
    table
}

/// One line describing the overview slot.
pub fn overview_status(state: &OverviewState) -> String {
    match state {
        OverviewState::NoSelection => "No units selected.".to_string(),
        OverviewState::Loading { generation } => format!("Loading overview ({})...", generation),
        OverviewState::Ready { generation, snapshot } => format!(
            "Overview {}: {} KPIs, {} breakdowns",
            generation,
            snapshot.kpis.len(),
            snapshot.breakdowns.len()
        ),
        OverviewState::Unavailable { reason, .. } => format!("Overview unavailable: {}", reason),
    }
}

pub fn print_overview(state: &OverviewState) {
    println!("{}", overview_status(state));
    if let OverviewState::Ready { snapshot, .. } = state {
        kpi_table(snapshot).printstd();
        for dimension in snapshot.breakdowns.keys() {
            breakdown_table(snapshot, dimension).printstd();
        }
    }
}

/// Baseline profile next to the what-if value for every overridden attribute.
/// A failed lookup keeps showing the previous profile.
pub fn profile_table(lookup: &EmployeeLookupController) -> Option<Table> {
    let record = lookup.profile()?;
    let overrides = lookup.overrides();
    let mut table = Table::new();
    table.add_row(row!["Attribute", "Value", "What-if"]);
    for (name, value) in record {
        let what_if = overrides.get(name).map(ToString::to_string).unwrap_or_default();
        table.add_row(row![name, value, what_if]);
    }
    Some(table)
}

pub fn lookup_status(status: &LookupStatus) -> String {
    match status {
        LookupStatus::Idle => "No employee selected.".to_string(),
        LookupStatus::Searching { employee_id } => format!("Searching for {}...", employee_id),
        LookupStatus::Found { employee_id } => format!("Employee {}", employee_id),
        LookupStatus::NotFound { employee_id } => format!("No employee with id {}", employee_id),
        LookupStatus::Failed {
            employee_id,
            reason,
        } => format!("Lookup for {} failed: {}", employee_id, reason),
    }
}

pub fn prediction_summary(prediction: &ScoredPrediction) -> String {
    format!(
        "Employee {}: {:.1}% attrition probability, risk {} ({})",
        prediction.employee_id,
        prediction.result.probability * 100.0,
        prediction.result.risk_level,
        prediction.result.model_id
    )
}

pub fn drivers_table(prediction: &ScoredPrediction) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Factor", "Magnitude", "Impact"]);
    for driver in &prediction.result.drivers {
        table.add_row(row![
            driver.factor,
            format!("{:.3}", driver.magnitude),
            driver.qualitative_impact
        ]);
    }
    table
}

pub fn print_prediction(prediction: &ScoredPrediction) {
    println!("{}", prediction_summary(prediction));
    if !prediction.result.drivers.is_empty() {
        drivers_table(prediction).printstd();
    }
    if let Some(metrics) = &prediction.result.reliability_metrics {
        for (name, value) in metrics {
            println!("  {}: {:.3}", name, value);
        }
    }
}

pub fn print_recommendations(recommendations: &RecommendationSet) {
    if recommendations.actions.is_empty() {
        println!("No recommendations returned.");
        return;
    }
    for (i, action) in recommendations.actions.iter().enumerate() {
        println!("{}. {}", i + 1, action);
    }
}

pub fn credits_line(ledger: &CreditLedger) -> String {
    match (ledger.remaining(), ledger.synced_at()) {
        (Some(n), Some(at)) => format!(
            "{} recommendation credits remaining (as of {})",
            n,
            at.format("%H:%M:%S UTC")
        ),
        (Some(n), None) => format!("{} recommendation credits remaining", n),
        (None, _) => "Credit balance unknown; recommendations disabled.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeValue, CategoryCount, EmployeeRecord, PredictionResult, RiskLevel};
    use crate::generation::{Disposition, GenerationCounter};
    use std::collections::BTreeMap;

    #[test]
    fn kpi_rates_render_as_percentages() {
        assert_eq!(format_kpi("attrition_rate", 16.12), "16.1%");
        assert_eq!(format_kpi("attrition_rate", 0.5), "0.5%");
        assert_eq!(format_kpi("total_employees", 1470.0), "1470");
        assert_eq!(format_kpi("avg_tenure", 7.25), "7.25");
    }

    #[test]
    fn breakdown_has_header_plus_rows() {
        let mut snapshot = OverviewSnapshot::default();
        snapshot.breakdowns.insert(
            "Department".into(),
            vec![
                CategoryCount { category: "Sales".into(), count: 92 },
                CategoryCount { category: "R&D".into(), count: 133 },
            ],
        );
        assert_eq!(breakdown_table(&snapshot, "Department").len(), 3);
        assert_eq!(breakdown_table(&snapshot, "Gender").len(), 1);
    }

    #[test]
    fn catalog_marks_selection() {
        let mut mapping = BTreeMap::new();
        mapping.insert("Sales".to_string(), vec!["Sales Executive".to_string()]);
        mapping.insert("Research".to_string(), vec!["Scientist".to_string()]);
        let catalog = FilterCatalog::from_mapping(mapping);
        let mut selection = FilterSelection::default();
        selection.units.insert("Sales".into());
        selection.subcategories.insert("Sales Executive".into());
        let rendered = catalog_table(&catalog, Some(&selection)).to_string();
        assert!(rendered.contains("[Sales Executive]"));
        assert!(!rendered.contains("[Scientist]"));
    }

    #[test]
    fn profile_shows_what_if_column() {
        let mut lookup = EmployeeLookupController::new();
        let request = lookup.begin("7").unwrap();
        let mut record = EmployeeRecord::new();
        record.insert("OverTime".into(), AttributeValue::from("Yes"));
        assert_eq!(
            lookup.complete(request.generation, "7", Ok(Some(record))),
            Disposition::Applied
        );
        lookup.set_override("OverTime", AttributeValue::from("No")).unwrap();
        let rendered = profile_table(&lookup).unwrap().to_string();
        assert!(rendered.contains("OverTime"));
        assert!(rendered.contains("No"));
    }

    #[test]
    fn summary_mentions_risk_and_model() {
        let prediction = ScoredPrediction {
            employee_id: "1".into(),
            result: PredictionResult {
                probability: 0.42,
                risk_level: RiskLevel::Medium,
                drivers: vec![],
                model_id: "RandomForest".into(),
                reliability_metrics: None,
            },
        };
        assert_eq!(
            prediction_summary(&prediction),
            "Employee 1: 42.0% attrition probability, risk MEDIUM (RandomForest)"
        );
    }

    #[test]
    fn overview_status_lines() {
        let mut counter = GenerationCounter::new();
        let generation = counter.advance();
        assert_eq!(
            overview_status(&OverviewState::Unavailable {
                generation,
                reason: "timeout".into()
            }),
            "Overview unavailable: timeout"
        );
        assert_eq!(overview_status(&OverviewState::NoSelection), "No units selected.");
    }

    #[test]
    fn unseeded_credits_line() {
        assert_eq!(
            credits_line(&CreditLedger::unseeded()),
            "Credit balance unknown; recommendations disabled."
        );
    }
}
