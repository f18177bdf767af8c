//! Weight table for alternative-cause scoring.
//! A read-only view over the knowledge base's weighted indicators, grouped
//! by category in knowledge-base order.

use causalyx_common::{IndicatorFamily, KnowledgeBase, SubtypeKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightEntry {
    pub indicator: String,
    pub weight: f64,
    pub family: IndicatorFamily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub key: String,
    pub label: String,
    pub kind: SubtypeKind,
    pub entries: Vec<WeightEntry>,
}

impl CategoryWeights {
    /// Sum of all weights, i.e. the uncapped maximum this category can reach.
    pub fn ceiling(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightTable {
    pub categories: Vec<CategoryWeights>,
}

impl WeightTable {
    pub fn from_knowledge_base(kb: &KnowledgeBase) -> Self {
        let categories = kb
            .subtypes
            .iter()
            .map(|s| CategoryWeights {
                key: s.key.clone(),
                label: s.label.clone(),
                kind: s.kind,
                entries: s
                    .indicators
                    .iter()
                    .map(|i| WeightEntry {
                        indicator: i.name.clone(),
                        weight: i.weight,
                        family: i.family,
                    })
                    .collect(),
            })
            .collect();
        Self { categories }
    }

    /// Every weight in [0, 1] and every risk factor exactly 0.
    pub fn validate(&self) -> bool {
        self.categories.iter().flat_map(|c| c.entries.iter()).all(|e| {
            (0.0..=1.0).contains(&e.weight)
                && (e.family != IndicatorFamily::RiskFactor || e.weight == 0.0)
        })
    }

    pub fn category(&self, key: &str) -> Option<&CategoryWeights> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn weight_of(&self, indicator: &str) -> Option<f64> {
        self.categories
            .iter()
            .flat_map(|c| c.entries.iter())
            .find(|e| e.indicator == indicator)
            .map(|e| e.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_table_is_valid() {
        let kb = KnowledgeBase::embedded().unwrap();
        let table = WeightTable::from_knowledge_base(&kb);
        assert!(table.validate());
        assert_eq!(table.categories.len(), 8);
        assert_eq!(table.weight_of("giant_cells_on_biopsy"), Some(1.0));
        assert_eq!(table.weight_of("smoking_history"), Some(0.0));
    }

    #[test]
    fn test_some_categories_exceed_cap() {
        let kb = KnowledgeBase::embedded().unwrap();
        let table = WeightTable::from_knowledge_base(&kb);
        // Uncapped sums above 1.0 are why scores are clamped rather than normalised.
        assert!(table.category("giant_cell_myocarditis").unwrap().ceiling() > 1.0);
        assert!(table.category("narrative_nuance").unwrap().ceiling() < 1.0);
    }

    #[test]
    fn test_weighted_risk_factor_invalid() {
        let kb = KnowledgeBase::embedded().unwrap();
        let mut table = WeightTable::from_knowledge_base(&kb);
        for c in &mut table.categories {
            for e in &mut c.entries {
                if e.indicator == "age_over_50" {
                    e.weight = 0.1;
                }
            }
        }
        assert!(!table.validate());
    }
}
