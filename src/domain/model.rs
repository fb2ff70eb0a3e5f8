use serde::{Deserialize, Serialize};
use std::fmt;

/// (namespace, key) of the ingredient metafield.
pub const INGREDIENT_FIELD: (&str, &str) = ("inventory", "active_ingredient");
/// (namespace, key) of the product → bar menu item reference.
pub const MENU_REFERENCE_FIELD: (&str, &str) = ("bar", "menu_reference");

pub const NEEDS_REVIEW: &str = "needs_review";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metafield {
    pub namespace: String,
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    pub id: String,
    pub title: String,
    pub product_type: String,
    pub vendor: String,
    pub tags: Vec<String>,
    pub sku: Option<String>,
    pub updated_at: Option<String>,
    pub metafields: Vec<Metafield>,
}

impl Product {
    /// 空字串視為未設定（清除後的 metafield 會是空值）
    pub fn metafield(&self, (namespace, key): (&str, &str)) -> Option<&str> {
        self.metafields
            .iter()
            .find(|m| m.namespace == namespace && m.key == key)
            .and_then(|m| m.value.as_deref())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn sku_or_placeholder(&self) -> &str {
        self.sku.as_deref().unwrap_or("N/A")
    }

    pub fn text(&self) -> ProductText<'_> {
        ProductText {
            title: &self.title,
            product_type: &self.product_type,
            tags: &self.tags,
            vendor: &self.vendor,
        }
    }
}

/// The free-text fields the classifier looks at.
#[derive(Debug, Clone, Copy)]
pub struct ProductText<'a> {
    pub title: &'a str,
    pub product_type: &'a str,
    pub tags: &'a [String],
    pub vendor: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    #[serde(rename = "bar")]
    Bar,
    #[serde(rename = "take-home")]
    TakeHome,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::TakeHome => "take-home",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Ingredient {
    Known(String),
    NeedsReview,
}

impl Ingredient {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(name) => name,
            Self::NeedsReview => NEEDS_REVIEW,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl From<String> for Ingredient {
    fn from(value: String) -> Self {
        if value == NEEDS_REVIEW {
            Self::NeedsReview
        } else {
            Self::Known(value)
        }
    }
}

impl From<Ingredient> for String {
    fn from(value: Ingredient) -> Self {
        match value {
            Ingredient::Known(name) => name,
            Ingredient::NeedsReview => NEEDS_REVIEW.to_string(),
        }
    }
}

impl fmt::Display for Ingredient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub layer: Layer,
    pub ingredient: Ingredient,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordStatus {
    #[default]
    Active,
    Draft,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Draft => "DRAFT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub key: String,
    pub value: Option<String>,
}

/// A generic structured record (Shopify metaobject).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaobjectRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub status: RecordStatus,
    pub fields: Vec<RecordField>,
    pub updated_at: Option<String>,
}

impl MetaobjectRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .and_then(|f| f.value.as_deref())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn set_field(&mut self, key: &str, value: Option<String>) {
        match self.fields.iter_mut().find(|f| f.key == key) {
            Some(field) => field.value = value,
            None => self.fields.push(RecordField {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }
}

/// On-premise menu listing as read from a `bar_menu_item` record.
///
/// Values are kept raw; the menu scan decides what is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarMenuItem {
    pub id: String,
    pub product_reference: Option<String>,
    pub menu_label: Option<String>,
    pub size_oz: Option<String>,
    pub card_type: Option<String>,
    pub keg_status: Option<String>,
    pub display_order: Option<String>,
    pub seasonal_flag: bool,
}

impl From<&MetaobjectRecord> for BarMenuItem {
    fn from(record: &MetaobjectRecord) -> Self {
        let owned = |key: &str| record.field(key).map(str::to_string);
        Self {
            id: record.id.clone(),
            product_reference: owned("product_reference"),
            menu_label: owned("menu_label"),
            size_oz: owned("size_oz"),
            card_type: owned("card_type"),
            keg_status: owned("keg_status"),
            display_order: owned("display_order"),
            seasonal_flag: record.field("seasonal_flag") == Some("true"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metafield_counts_as_absent() {
        let product = Product {
            id: "gid://shopify/Product/1".to_string(),
            metafields: vec![
                Metafield {
                    namespace: "bar".to_string(),
                    key: "menu_reference".to_string(),
                    value: Some(String::new()),
                },
                Metafield {
                    namespace: "inventory".to_string(),
                    key: "active_ingredient".to_string(),
                    value: Some("Kava".to_string()),
                },
            ],
            ..Product::default()
        };

        assert_eq!(product.metafield(MENU_REFERENCE_FIELD), None);
        assert_eq!(product.metafield(INGREDIENT_FIELD), Some("Kava"));
        assert_eq!(product.sku_or_placeholder(), "N/A");
    }

    #[test]
    fn test_ingredient_serializes_as_plain_string() {
        let json = serde_json::to_string(&Ingredient::NeedsReview).unwrap();
        assert_eq!(json, "\"needs_review\"");

        let parsed: Ingredient = serde_json::from_str("\"Kratom\"").unwrap();
        assert_eq!(parsed, Ingredient::Known("Kratom".to_string()));
    }

    #[test]
    fn test_layer_serialization() {
        assert_eq!(serde_json::to_string(&Layer::TakeHome).unwrap(), "\"take-home\"");
        assert_eq!(Layer::Bar.to_string(), "bar");
    }

    #[test]
    fn test_bar_menu_item_from_record() {
        let mut record = MetaobjectRecord {
            id: "gid://shopify/Metaobject/7".to_string(),
            record_type: "bar_menu_item".to_string(),
            ..MetaobjectRecord::default()
        };
        record.set_field("product_reference", Some("gid://shopify/Product/1".to_string()));
        record.set_field("card_type", Some("can".to_string()));
        record.set_field("seasonal_flag", Some("true".to_string()));
        record.set_field("keg_status", Some("".to_string()));

        let item = BarMenuItem::from(&record);
        assert_eq!(item.product_reference.as_deref(), Some("gid://shopify/Product/1"));
        assert_eq!(item.card_type.as_deref(), Some("can"));
        assert_eq!(item.keg_status, None);
        assert!(item.seasonal_flag);
        assert!(record.is_active());
    }
}
