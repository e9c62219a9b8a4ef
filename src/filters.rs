//! Operator filter selection with cascade invalidation.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::catalog::FilterCatalog;
use crate::error::Result;

/// The operator's current multi-select state.
///
/// Invariant: `subcategories ⊆ ⋃ catalog[u] for u in units`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSelection {
    #[serde(rename = "departments")]
    pub units: BTreeSet<String>,
    #[serde(rename = "job_roles")]
    pub subcategories: BTreeSet<String>,
}

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.subcategories.is_empty()
    }
}

/// Holds the selection and keeps it consistent with the catalog.
#[derive(Debug)]
pub struct FilterSelectionStore {
    catalog: FilterCatalog,
    selection: FilterSelection,
    allowed: Vec<String>,
}

impl FilterSelectionStore {
    pub fn new(catalog: FilterCatalog) -> Self {
        Self {
            catalog,
            selection: FilterSelection::default(),
            allowed: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &FilterCatalog {
        &self.catalog
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    /// Sub-categories the operator may currently pick, in catalog order.
    pub fn allowed_subcategories(&self) -> &[String] {
        &self.allowed
    }

    pub fn is_allowed(&self, subcategory: &str) -> bool {
        self.allowed.iter().any(|s| s == subcategory)
    }

    /// Add or remove a unit. Returns whether the observable selection changed.
    pub fn select_unit(&mut self, unit: &str, on: bool) -> Result<bool> {
        self.catalog.require_unit(unit)?;
        let changed = if on {
            self.selection.units.insert(unit.to_string())
        } else {
            self.selection.units.remove(unit)
        };
        if changed {
            self.recompute_allowed();
        }
        Ok(changed)
    }

    /// Add or remove a sub-category. Selecting one that is not currently
    /// allowed is ignored. Returns whether the selection changed.
    pub fn select_subcategory(&mut self, subcategory: &str, on: bool) -> bool {
        if on {
            if !self.is_allowed(subcategory) {
                tracing::debug!("ignoring disallowed sub-category '{}'", subcategory);
                return false;
            }
            self.selection.subcategories.insert(subcategory.to_string())
        } else {
            self.selection.subcategories.remove(subcategory)
        }
    }

    /// Select every unit and every sub-category they allow.
    pub fn select_all(&mut self) -> bool {
        let before = self.selection.clone();
        self.selection.units = self.catalog.units().iter().cloned().collect();
        self.recompute_allowed();
        self.selection.subcategories = self.allowed.iter().cloned().collect();
        before != self.selection
    }

    /// Replace the whole selection in one step. An empty unit list means every
    /// unit; sub-categories the resulting units do not offer are skipped. With
    /// neither units nor sub-categories this is [`select_all`](Self::select_all).
    pub fn scope(&mut self, units: &[String], subcategories: &[String]) -> Result<bool> {
        if units.is_empty() && subcategories.is_empty() {
            return Ok(self.select_all());
        }
        for unit in units {
            self.catalog.require_unit(unit)?;
        }
        let before = self.selection.clone();
        self.selection.units = if units.is_empty() {
            self.catalog.units().iter().cloned().collect()
        } else {
            units.iter().cloned().collect()
        };
        self.selection.subcategories.clear();
        self.recompute_allowed();
        for subcategory in subcategories {
            self.select_subcategory(subcategory, true);
        }
        Ok(before != self.selection)
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.selection.is_empty();
        self.selection = FilterSelection::default();
        self.recompute_allowed();
        changed
    }

    /// Recompute the allowed set from the unit set alone and prune the
    /// selected sub-categories to it.
    fn recompute_allowed(&mut self) {
        self.allowed = self.catalog.allowed_for(&self.selection.units);
        let allowed: BTreeSet<&str> = self.allowed.iter().map(String::as_str).collect();
        let before = self.selection.subcategories.len();
        self.selection
            .subcategories
            .retain(|s| allowed.contains(s.as_str()));
        let pruned = before - self.selection.subcategories.len();
        if pruned > 0 {
            tracing::debug!("pruned {} sub-categories no longer allowed", pruned);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store() -> FilterSelectionStore {
        let mut mapping = BTreeMap::new();
        mapping.insert("Sales".to_string(), vec!["Rep".into(), "Manager".into()]);
        mapping.insert("HR".to_string(), vec!["HR".into(), "Manager".into()]);
        FilterSelectionStore::new(FilterCatalog::new(
            vec!["Sales".into(), "HR".into()],
            vec!["Rep".into(), "Manager".into(), "HR".into()],
            mapping,
        ))
    }

    #[test]
    fn disallowed_subcategory_is_ignored() {
        let mut store = store();
        assert!(!store.select_subcategory("Rep", true));
        store.select_unit("HR", true).unwrap();
        assert!(!store.select_subcategory("Rep", true));
        assert!(store.selection().subcategories.is_empty());
    }

    #[test]
    fn repeated_toggle_reports_no_change() {
        let mut store = store();
        assert!(store.select_unit("Sales", true).unwrap());
        assert!(!store.select_unit("Sales", true).unwrap());
        assert!(!store.select_unit("HR", false).unwrap());
    }

    #[test]
    fn shared_subcategory_survives_while_any_parent_selected() {
        let mut store = store();
        store.select_unit("Sales", true).unwrap();
        store.select_unit("HR", true).unwrap();
        store.select_subcategory("Manager", true);
        store.select_unit("Sales", false).unwrap();
        assert!(store.selection().subcategories.contains("Manager"));
        store.select_unit("HR", false).unwrap();
        assert!(store.selection().is_empty());
    }

    #[test]
    fn select_all_then_clear() {
        let mut store = store();
        assert!(store.select_all());
        assert_eq!(store.selection().subcategories.len(), 3);
        assert!(!store.select_all());
        assert!(store.clear());
        assert!(store.allowed_subcategories().is_empty());
    }

    #[test]
    fn scope_with_roles_only_spans_every_unit() {
        let mut store = store();
        assert!(store.scope(&[], &["Manager".into()]).unwrap());
        assert_eq!(store.selection().units.len(), 2);
        assert_eq!(
            store.selection().subcategories.iter().collect::<Vec<_>>(),
            vec!["Manager"]
        );
        assert!(!store.scope(&[], &["Manager".into()]).unwrap());
    }

    #[test]
    fn scope_replaces_previous_selection() {
        let mut store = store();
        store.select_all();
        assert!(store.scope(&["HR".into()], &["Rep".into()]).unwrap());
        assert_eq!(store.selection().units.iter().collect::<Vec<_>>(), vec!["HR"]);
        assert!(store.selection().subcategories.is_empty());

        assert!(store.scope(&["Finance".into()], &[]).is_err());
        assert_eq!(store.selection().units.len(), 1);
    }

    #[test]
    fn unknown_unit_is_rejected_without_change() {
        let mut store = store();
        assert!(store.select_unit("Finance", true).is_err());
        assert!(store.selection().is_empty());
    }
}
