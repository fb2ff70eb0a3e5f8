use crate::utils::error::Result;
use crate::utils::validation::{validate_member, validate_value_domain, Validate};
use serde::{Deserialize, Serialize};

/// The fixed value domains the scans validate against.
///
/// Loaded from `[taxonomy]`; defaults match the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    pub ingredients: Vec<String>,
    pub card_types: Vec<String>,
    pub keg_statuses: Vec<String>,
    pub default_card_type: String,
    pub default_display_order: i64,
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            ingredients: ["THC", "Kratom", "Kava", "Mushroom", "CBD", "Caffeine"]
                .map(String::from)
                .to_vec(),
            card_types: ["draft", "can", "shot", "keg"].map(String::from).to_vec(),
            keg_statuses: ["full", "half", "empty"].map(String::from).to_vec(),
            default_card_type: "draft".to_string(),
            default_display_order: 999,
        }
    }
}

impl Taxonomy {
    pub fn is_ingredient(&self, value: &str) -> bool {
        self.ingredients.iter().any(|i| i == value)
    }

    pub fn is_card_type(&self, value: &str) -> bool {
        self.card_types.iter().any(|c| c == value)
    }

    pub fn is_keg_status(&self, value: &str) -> bool {
        self.keg_statuses.iter().any(|k| k == value)
    }
}

impl Validate for Taxonomy {
    fn validate(&self) -> Result<()> {
        validate_value_domain("taxonomy.ingredients", &self.ingredients)?;
        validate_value_domain("taxonomy.card_types", &self.card_types)?;
        validate_value_domain("taxonomy.keg_statuses", &self.keg_statuses)?;
        validate_member(
            "taxonomy.default_card_type",
            &self.default_card_type,
            &self.card_types,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_taxonomy_is_valid() {
        let taxonomy = Taxonomy::default();
        assert!(taxonomy.validate().is_ok());
        assert!(taxonomy.is_ingredient("Kava"));
        assert!(!taxonomy.is_ingredient("needs_review"));
        assert!(taxonomy.is_card_type("keg"));
        assert!(!taxonomy.is_keg_status("broken"));
    }

    #[test]
    fn test_default_card_type_must_be_a_card_type() {
        let taxonomy = Taxonomy {
            default_card_type: "bottle".to_string(),
            ..Taxonomy::default()
        };
        assert!(taxonomy.validate().is_err());
    }

    #[test]
    fn test_extended_taxonomy() {
        let mut taxonomy = Taxonomy::default();
        taxonomy.ingredients.push("Kanna".to_string());
        assert!(taxonomy.validate().is_ok());
        assert!(taxonomy.is_ingredient("Kanna"));
    }
}
