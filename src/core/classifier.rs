//! Ordered-rule product classifier.
//!
//! Every rule list is evaluated top-down and the first match wins, so the
//! position of a rule is its priority. A product that mentions both kava and
//! THC is Kava because the kava rule comes first, wherever the words appear
//! in the text.

use crate::config::toml_config::ClassifierConfig;
use crate::domain::model::{Classification, Ingredient, Layer, ProductText};
use crate::domain::ports::ConfigProvider;
use crate::domain::taxonomy::Taxonomy;
use crate::utils::error::Result;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

pub struct HeuristicClassifier {
    ingredient_rules: Vec<(Regex, String)>,
    bar_product_types: HashSet<String>,
    bar_rules: Vec<Regex>,
    card_type_rules: Vec<(Regex, String)>,
    default_card_type: String,
}

fn compile(pattern: &str) -> Result<Regex> {
    Ok(RegexBuilder::new(pattern).case_insensitive(true).build()?)
}

impl HeuristicClassifier {
    pub fn new(config: &ClassifierConfig, taxonomy: &Taxonomy) -> Result<Self> {
        let ingredient_rules = config
            .ingredient_rules
            .iter()
            .map(|rule| Ok((compile(&rule.pattern)?, rule.ingredient.clone())))
            .collect::<Result<Vec<_>>>()?;
        let bar_rules = config
            .bar_rules
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>>>()?;
        let card_type_rules = config
            .card_type_rules
            .iter()
            .map(|rule| Ok((compile(&rule.pattern)?, rule.card_type.clone())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            ingredient_rules,
            bar_product_types: config
                .bar_product_types
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
            bar_rules,
            card_type_rules,
            default_card_type: taxonomy.default_card_type.clone(),
        })
    }

    pub fn from_config<C: ConfigProvider + ?Sized>(config: &C) -> Result<Self> {
        Self::new(config.classifier(), config.taxonomy())
    }

    /// Never fails: no signal means `needs_review` / `take-home`.
    pub fn classify(&self, product: ProductText<'_>) -> Classification {
        let text = search_text(product);
        let product_type = product.product_type.trim().to_lowercase();

        let ingredient = self.detect_ingredient(&text);
        let layer = self.detect_layer(&text, &product_type);
        let card_type = match layer {
            Layer::Bar => Some(self.infer_card_type(&format!(
                "{} {}",
                product.title, product.product_type
            ))),
            Layer::TakeHome => None,
        };

        Classification {
            layer,
            ingredient,
            card_type,
        }
    }

    pub fn detect_ingredient(&self, text: &str) -> Ingredient {
        self.ingredient_rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(text))
            .map(|(_, ingredient)| Ingredient::Known(ingredient.clone()))
            .unwrap_or(Ingredient::NeedsReview)
    }

    /// `product_type` must already be lower-cased.
    pub fn detect_layer(&self, text: &str, product_type: &str) -> Layer {
        if self.bar_product_types.contains(product_type)
            || self.bar_rules.iter().any(|pattern| pattern.is_match(text))
        {
            Layer::Bar
        } else {
            Layer::TakeHome
        }
    }

    pub fn infer_card_type(&self, text: &str) -> String {
        let text = text.to_lowercase();
        self.card_type_rules
            .iter()
            .find(|(pattern, _)| pattern.is_match(&text))
            .map(|(_, card_type)| card_type.clone())
            .unwrap_or_else(|| self.default_card_type.clone())
    }
}

/// title, type, tags and vendor, lower-cased and space-joined
pub fn search_text(product: ProductText<'_>) -> String {
    format!(
        "{} {} {} {}",
        product.title,
        product.product_type,
        product.tags.join(" "),
        product.vendor
    )
    .to_lowercase()
}
