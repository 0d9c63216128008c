//! Participation rules: tag keyword mappings and allowed categories.
//!
//! Rules live in `site_config` under the `participation_rules` key as a
//! JSON blob. When the row is missing, empty, or unreadable the compiled
//! defaults in [`ParticipationRules::default`] apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::PostStore;

pub const RULES_KEY: &str = "participation_rules";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationRules {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub allowed_categories: Vec<String>,
    /// Tag name → keywords that imply it.
    #[serde(default)]
    pub tag_mappings: BTreeMap<String, Vec<String>>,
}

impl Default for ParticipationRules {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut tag_mappings = BTreeMap::new();
        tag_mappings.insert("Muon".to_string(), strings(&["Muon", "MUON"]));
        tag_mappings.insert("MuP".to_string(), strings(&["MuP", "MUP", "μP"]));
        tag_mappings.insert("Shampoo".to_string(), strings(&["Shampoo", "SHAMPOO"]));
        tag_mappings.insert("uP".to_string(), strings(&["uP", "UP", "μP"]));

        Self {
            keywords: strings(&["Muon", "MuP", "Shampoo", "uP", "participation"]),
            allowed_categories: strings(&["Participation D"]),
            tag_mappings,
        }
    }
}

impl ParticipationRules {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.allowed_categories.is_empty() && self.tag_mappings.is_empty()
    }
}

/// Load rules from the store, falling back to the compiled defaults.
pub async fn load_rules(store: &dyn PostStore) -> ParticipationRules {
    match store.load_participation_rules().await {
        Ok(Some(rules)) if !rules.is_empty() => rules,
        Ok(_) => {
            tracing::info!("No stored participation rules; using defaults");
            ParticipationRules::default()
        }
        Err(e) => {
            tracing::warn!("Failed to load participation rules from store: {:#}", e);
            ParticipationRules::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_deterministic() {
        assert_eq!(ParticipationRules::default(), ParticipationRules::default());
        let rules = ParticipationRules::default();
        assert_eq!(rules.tag_mappings.len(), 4);
        assert_eq!(rules.allowed_categories, vec!["Participation D".to_string()]);
    }

    #[test]
    fn partial_json_fills_missing_fields() {
        let rules: ParticipationRules =
            serde_json::from_str(r#"{"tag_mappings": {"Adam": ["adam"]}}"#).unwrap();
        assert!(rules.keywords.is_empty());
        assert_eq!(rules.tag_mappings["Adam"], vec!["adam".to_string()]);
        assert!(!rules.is_empty());

        let empty: ParticipationRules = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }
}
