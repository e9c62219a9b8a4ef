//! Employee lookup and the editable "what-if" working copy.

use std::sync::Arc;

use crate::error::{ErrorKind, Result, WhosNextError};
use crate::generation::{Disposition, Generation, GenerationCounter};
use crate::models::{merge, AttributeValue, EmployeeRecord, OverrideDelta};
use crate::suggest::unknown_name_message;

/// Outcome of the most recent lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupStatus {
    Idle,
    Searching { employee_id: String },
    Found { employee_id: String },
    NotFound { employee_id: String },
    Failed { employee_id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupRequest {
    pub generation: Generation,
    pub employee_id: String,
}

#[derive(Debug)]
pub struct EmployeeLookupController {
    generations: GenerationCounter,
    status: LookupStatus,
    profile: Option<(String, Arc<EmployeeRecord>)>,
    overrides: OverrideDelta,
}

impl Default for EmployeeLookupController {
    fn default() -> Self {
        Self::new()
    }
}

impl EmployeeLookupController {
    pub fn new() -> Self {
        Self {
            generations: GenerationCounter::new(),
            status: LookupStatus::Idle,
            profile: None,
            overrides: OverrideDelta::new(),
        }
    }

    pub fn status(&self) -> &LookupStatus {
        &self.status
    }

    /// The displayed profile. Survives a failed lookup, not a not-found one.
    pub fn profile(&self) -> Option<&EmployeeRecord> {
        self.profile.as_ref().map(|(_, record)| record.as_ref())
    }

    pub fn profile_id(&self) -> Option<&str> {
        self.profile.as_ref().map(|(id, _)| id.as_str())
    }

    pub fn overrides(&self) -> &OverrideDelta {
        &self.overrides
    }

    /// The record to score, if the last lookup found one.
    pub fn found(&self) -> Option<(&str, &EmployeeRecord)> {
        match (&self.status, &self.profile) {
            (LookupStatus::Found { .. }, Some((id, record))) => Some((id.as_str(), &**record)),
            _ => None,
        }
    }

    /// Record with the override delta merged in.
    pub fn effective_record(&self) -> Option<EmployeeRecord> {
        self.profile()
            .map(|record| merge(record, &self.overrides))
    }

    /// Start a lookup, superseding any previous one.
    pub fn begin(&mut self, identifier: &str) -> Result<LookupRequest> {
        let employee_id = identifier.trim();
        if employee_id.is_empty() {
            return Err(WhosNextError::invalid("employee id cannot be empty"));
        }
        let generation = self.generations.advance();
        self.status = LookupStatus::Searching {
            employee_id: employee_id.to_string(),
        };
        tracing::debug!("looking up employee '{}' at {}", employee_id, generation);
        Ok(LookupRequest {
            generation,
            employee_id: employee_id.to_string(),
        })
    }

    /// Apply a lookup response. `Ok(None)` means the service has no such
    /// employee.
    pub fn complete(
        &mut self,
        generation: Generation,
        employee_id: &str,
        result: Result<Option<EmployeeRecord>>,
    ) -> Disposition {
        if !self.generations.is_current(generation) {
            tracing::debug!("discarding stale lookup for '{}' ({})", employee_id, generation);
            return Disposition::Discarded;
        }
        let employee_id = employee_id.to_string();
        match result {
            Ok(Some(record)) => {
                tracing::info!(
                    "employee '{}' found ({} attributes)",
                    employee_id,
                    record.len()
                );
                self.profile = Some((employee_id.clone(), Arc::new(record)));
                self.overrides.clear();
                self.status = LookupStatus::Found { employee_id };
            }
            Ok(None) => self.mark_not_found(employee_id),
            Err(err) if err.kind() == ErrorKind::NotFound => self.mark_not_found(employee_id),
            Err(err) => {
                tracing::warn!("lookup of '{}' failed: {}", employee_id, err);
                self.status = LookupStatus::Failed {
                    employee_id,
                    reason: err.to_string(),
                };
            }
        }
        Disposition::Applied
    }

    fn mark_not_found(&mut self, employee_id: String) {
        tracing::info!("employee '{}' not found", employee_id);
        self.profile = None;
        self.overrides.clear();
        self.status = LookupStatus::NotFound { employee_id };
    }

    /// Hypothesize a value for one attribute of the found record.
    ///
    /// The attribute must exist and keep its kind. Setting it back to the
    /// baseline removes the override.
    pub fn set_override(&mut self, attribute: &str, value: AttributeValue) -> Result<()> {
        let Some((_, record)) = self.found() else {
            return Err(WhosNextError::invalid(
                "no employee loaded; search for one before editing overrides",
            ));
        };
        let Some(baseline) = record.get(attribute) else {
            return Err(WhosNextError::invalid(unknown_name_message(
                "attribute",
                attribute,
                record.keys(),
            )));
        };
        if baseline.kind() != value.kind() {
            return Err(WhosNextError::invalid(format!(
                "attribute '{}' is {:?}, got {:?} value '{}'",
                attribute,
                baseline.kind(),
                value.kind(),
                value
            )));
        }
        if *baseline == value {
            self.overrides.remove(attribute);
        } else {
            self.overrides.insert(attribute.to_string(), value);
        }
        Ok(())
    }

    pub fn clear_override(&mut self, attribute: &str) -> bool {
        self.overrides.remove(attribute).is_some()
    }

    pub fn reset_overrides(&mut self) {
        self.overrides.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(overtime: &str, income: f64) -> EmployeeRecord {
        let mut r = EmployeeRecord::new();
        r.insert("OverTime".into(), overtime.into());
        r.insert("MonthlyIncome".into(), income.into());
        r
    }

    fn found(ctrl: &mut EmployeeLookupController, id: &str, rec: EmployeeRecord) {
        let req = ctrl.begin(id).unwrap();
        ctrl.complete(req.generation, &req.employee_id, Ok(Some(rec)));
    }

    #[test]
    fn new_found_resets_overrides() {
        let mut ctrl = EmployeeLookupController::new();
        found(&mut ctrl, "E001", record("Yes", 3000.0));
        ctrl.set_override("OverTime", "No".into()).unwrap();
        assert_eq!(ctrl.overrides().len(), 1);

        found(&mut ctrl, "E002", record("Yes", 5000.0));
        assert!(ctrl.overrides().is_empty());
        assert_eq!(ctrl.profile_id(), Some("E002"));
    }

    #[test]
    fn failure_keeps_profile_but_not_found_clears_it() {
        let mut ctrl = EmployeeLookupController::new();
        found(&mut ctrl, "E001", record("Yes", 3000.0));

        let req = ctrl.begin("E050").unwrap();
        ctrl.complete(
            req.generation,
            &req.employee_id,
            Err(WhosNextError::transport("employee", "reset by peer")),
        );
        assert!(matches!(ctrl.status(), LookupStatus::Failed { .. }));
        assert_eq!(ctrl.profile_id(), Some("E001"));
        assert!(ctrl.found().is_none());

        let req = ctrl.begin("E099").unwrap();
        ctrl.complete(req.generation, &req.employee_id, Ok(None));
        assert_eq!(
            ctrl.status(),
            &LookupStatus::NotFound {
                employee_id: "E099".into()
            }
        );
        assert!(ctrl.profile().is_none());
    }

    #[test]
    fn stale_lookup_is_dropped() {
        let mut ctrl = EmployeeLookupController::new();
        let slow = ctrl.begin("E001").unwrap();
        let fast = ctrl.begin("E002").unwrap();
        ctrl.complete(fast.generation, &fast.employee_id, Ok(Some(record("No", 1.0))));
        assert_eq!(
            ctrl.complete(slow.generation, &slow.employee_id, Ok(Some(record("Yes", 2.0)))),
            Disposition::Discarded
        );
        assert_eq!(ctrl.profile_id(), Some("E002"));
    }

    #[test]
    fn override_validation() {
        let mut ctrl = EmployeeLookupController::new();
        assert!(ctrl.set_override("OverTime", "No".into()).is_err());

        found(&mut ctrl, "E001", record("Yes", 3000.0));
        assert!(ctrl.set_override("Overtime", "No".into()).is_err());
        assert!(ctrl.set_override("MonthlyIncome", "lots".into()).is_err());

        ctrl.set_override("MonthlyIncome", 6500.0.into()).unwrap();
        ctrl.set_override("MonthlyIncome", 3000.0.into()).unwrap();
        assert!(ctrl.overrides().is_empty());
    }

    #[test]
    fn blank_identifier_rejected() {
        let mut ctrl = EmployeeLookupController::new();
        assert!(ctrl.begin("   ").is_err());
        assert_eq!(ctrl.status(), &LookupStatus::Idle);
    }
}
