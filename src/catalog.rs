//! Static unit → sub-category table driving the cascading filters.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WhosNextError};
use crate::suggest::unknown_name_message;

/// Immutable mapping from organizational unit (department) to the
/// sub-categories (job roles) that exist inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCatalog {
    units: Vec<String>,
    subcategories: Vec<String>,
    by_unit: BTreeMap<String, Vec<String>>,
}

impl FilterCatalog {
    /// Build a catalog from an explicit unit → sub-category mapping.
    ///
    /// Unit order follows `units`; sub-category order follows `subcategories`,
    /// with any sub-category named only in the mapping appended in first-seen
    /// order. Duplicates are dropped.
    pub fn new(
        units: Vec<String>,
        subcategories: Vec<String>,
        mapping: BTreeMap<String, Vec<String>>,
    ) -> Self {
        let mut unit_list = dedup(units);
        for unit in mapping.keys() {
            if !unit_list.contains(unit) {
                unit_list.push(unit.clone());
            }
        }

        let mut sub_list = dedup(subcategories);
        for subs in mapping.values() {
            for sub in subs {
                if !sub_list.contains(sub) {
                    sub_list.push(sub.clone());
                }
            }
        }

        let by_unit = unit_list
            .iter()
            .map(|unit| {
                let subs = mapping.get(unit).cloned().unwrap_or_default();
                (unit.clone(), dedup(subs))
            })
            .collect();

        Self {
            units: unit_list,
            subcategories: sub_list,
            by_unit,
        }
    }

    /// Catalog for services that only publish the flat lists: every unit
    /// allows every sub-category.
    pub fn unmapped(units: Vec<String>, subcategories: Vec<String>) -> Self {
        let subcategories = dedup(subcategories);
        let mapping = units
            .iter()
            .map(|u| (u.clone(), subcategories.clone()))
            .collect();
        Self::new(units, subcategories, mapping)
    }

    pub fn from_mapping(mapping: BTreeMap<String, Vec<String>>) -> Self {
        Self::new(Vec::new(), Vec::new(), mapping)
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn subcategories(&self) -> &[String] {
        &self.subcategories
    }

    pub fn contains_unit(&self, unit: &str) -> bool {
        self.by_unit.contains_key(unit)
    }

    /// Sub-categories of a single unit, in catalog order.
    pub fn subcategories_of(&self, unit: &str) -> &[String] {
        self.by_unit.get(unit).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `⋃ catalog[u] for u in units`, in the catalog's global sub-category
    /// order. Depends only on the set of units, never on how it was reached.
    pub fn allowed_for(&self, units: &BTreeSet<String>) -> Vec<String> {
        let union: BTreeSet<&str> = units
            .iter()
            .flat_map(|u| self.subcategories_of(u))
            .map(String::as_str)
            .collect();
        self.subcategories
            .iter()
            .filter(|s| union.contains(s.as_str()))
            .cloned()
            .collect()
    }

    /// Reject names the catalog does not know, suggesting the closest one.
    pub fn require_unit(&self, unit: &str) -> Result<()> {
        if self.contains_unit(unit) {
            return Ok(());
        }
        Err(WhosNextError::invalid(unknown_name_message(
            "unit",
            unit,
            &self.units,
        )))
    }
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_catalog() -> FilterCatalog {
        let mut mapping = BTreeMap::new();
        mapping.insert(
            "Sales".to_string(),
            vec!["Rep".to_string(), "Manager".to_string()],
        );
        mapping.insert(
            "HR".to_string(),
            vec!["HR".to_string(), "Manager".to_string()],
        );
        FilterCatalog::new(
            vec!["Sales".into(), "HR".into()],
            vec!["Rep".into(), "Manager".into(), "HR".into()],
            mapping,
        )
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn union_follows_catalog_order() {
        let catalog = scenario_catalog();
        assert_eq!(
            catalog.allowed_for(&set(&["HR", "Sales"])),
            vec!["Rep", "Manager", "HR"]
        );
        assert_eq!(catalog.allowed_for(&set(&["HR"])), vec!["Manager", "HR"]);
    }

    #[test]
    fn empty_unit_set_allows_nothing() {
        assert!(scenario_catalog().allowed_for(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn unmapped_catalog_allows_everything_per_unit() {
        let catalog = FilterCatalog::unmapped(
            vec!["Sales".into(), "R&D".into()],
            vec!["Rep".into(), "Scientist".into(), "Rep".into()],
        );
        assert_eq!(catalog.subcategories(), &["Rep", "Scientist"]);
        assert_eq!(catalog.subcategories_of("R&D"), &["Rep", "Scientist"]);
    }

    #[test]
    fn unknown_unit_gets_a_suggestion() {
        let err = scenario_catalog().require_unit("Sale").unwrap_err();
        assert!(err.to_string().contains("Did you mean 'Sales'?"));
    }
}
