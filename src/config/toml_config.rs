use crate::domain::ports::ConfigProvider;
use crate::domain::taxonomy::Taxonomy;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Process-wide configuration, built once at start and passed by reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub shop: ShopConfig,
    pub taxonomy: Taxonomy,
    pub classifier: ClassifierConfig,
    pub scan: ScanConfig,
    pub output: OutputConfig,
    pub webhook: WebhookConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub name: String,
    pub api_version: String,
    pub access_token: Option<String>,
    /// 覆寫 GraphQL 端點（測試或代理用）
    pub endpoint: Option<String>,
    pub page_size: usize,
    pub timeout_seconds: u64,
    pub menu_item_type: String,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            api_version: "2024-10".to_string(),
            access_token: None,
            endpoint: None,
            page_size: 50,
            timeout_seconds: 30,
            menu_item_type: "bar_menu_item".to_string(),
        }
    }
}

impl ShopConfig {
    pub fn graphql_endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://{}.myshopify.com/admin/api/{}/graphql.json",
                self.name, self.api_version
            ),
        }
    }

    /// 未替換的 ${VAR} 佔位符視為未設定
    pub fn access_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty() && !t.contains("${"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientRule {
    pub pattern: String,
    pub ingredient: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardTypeRule {
    pub pattern: String,
    pub card_type: String,
}

/// Ordered classifier rules. Lists, never maps: position is priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub ingredient_rules: Vec<IngredientRule>,
    pub bar_product_types: Vec<String>,
    pub bar_rules: Vec<String>,
    pub card_type_rules: Vec<CardTypeRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let ingredient = |pattern: &str, ingredient: &str| IngredientRule {
            pattern: pattern.to_string(),
            ingredient: ingredient.to_string(),
        };
        let card = |pattern: &str, card_type: &str| CardTypeRule {
            pattern: pattern.to_string(),
            card_type: card_type.to_string(),
        };

        Self {
            ingredient_rules: vec![
                ingredient(r"\b(kava)\b", "Kava"),
                ingredient(r"\b(kratom|mitragyna)\b", "Kratom"),
                ingredient(
                    r"\b(thc|delta-?9|delta-?8|cannabis|hemp living|mellow fellow)\b",
                    "THC",
                ),
                ingredient(
                    r"\b(mushroom|fungi|psilocybin|amanita|lion'?s mane|reishi)\b",
                    "Mushroom",
                ),
                ingredient(r"\b(cbd|cannabidiol)\b", "CBD"),
                ingredient(r"\b(caffeine|coffee|energy)\b", "Caffeine"),
            ],
            bar_product_types: [
                "beverage", "draft", "shot", "can", "drink", "seltzer", "cocktail", "pour", "tap",
            ]
            .map(String::from)
            .to_vec(),
            bar_rules: vec![
                r"\b(draft|keg|tap|on tap|pours?)\b".to_string(),
                r"\b(shot|shots)\b".to_string(),
                r"\b(can|canned|seltzer)\b".to_string(),
                r"\b(beverage|drink|cocktail)\b".to_string(),
            ],
            card_type_rules: vec![
                card(r"\b(draft|keg|tap|pour)\b", "draft"),
                card(r"\b(can|canned|seltzer)\b", "can"),
                card(r"\b(shot|shots)\b", "shot"),
                card(r"\b(keg)\b", "keg"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub fix_mode: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { fix_mode: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// 預期的吧台商品數；未設定時以有效的 bar menu item 數為分母
    pub expected_bar_products: Option<usize>,
    pub ingredient_coverage_target: f64,
    pub bar_coverage_target: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            expected_bar_products: None,
            ingredient_coverage_target: 90.0,
            bar_coverage_target: 95.0,
        }
    }
}

impl ReconcileConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;
        toml::from_str(&processed).map_err(|e| ReconcileError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${SHOPIFY_ACCESS_TOKEN})；找不到的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")?;
        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });
        Ok(result.into_owned())
    }

    fn validate_classifier(&self) -> Result<()> {
        for (index, rule) in self.classifier.ingredient_rules.iter().enumerate() {
            let field = format!("classifier.ingredient_rules[{}]", index);
            validation::validate_pattern(&field, &rule.pattern)?;
            validation::validate_member(&field, &rule.ingredient, &self.taxonomy.ingredients)?;
        }
        for (index, pattern) in self.classifier.bar_rules.iter().enumerate() {
            validation::validate_pattern(&format!("classifier.bar_rules[{}]", index), pattern)?;
        }
        for (index, rule) in self.classifier.card_type_rules.iter().enumerate() {
            let field = format!("classifier.card_type_rules[{}]", index);
            validation::validate_pattern(&field, &rule.pattern)?;
            validation::validate_member(&field, &rule.card_type, &self.taxonomy.card_types)?;
        }
        Ok(())
    }
}

impl Validate for ReconcileConfig {
    fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.shop.endpoint {
            validation::validate_url("shop.endpoint", endpoint)?;
        }
        validation::validate_non_empty_string("shop.api_version", &self.shop.api_version)?;
        validation::validate_non_empty_string("shop.menu_item_type", &self.shop.menu_item_type)?;
        validation::validate_range("shop.page_size", self.shop.page_size, 1, 250)?;
        validation::validate_positive_number(
            "shop.timeout_seconds",
            self.shop.timeout_seconds as usize,
            1,
        )?;
        validation::validate_path("output.path", &self.output.path)?;
        validation::validate_range(
            "report.ingredient_coverage_target",
            self.report.ingredient_coverage_target,
            0.0,
            100.0,
        )?;
        validation::validate_range(
            "report.bar_coverage_target",
            self.report.bar_coverage_target,
            0.0,
            100.0,
        )?;

        self.taxonomy.validate()?;
        self.validate_classifier()?;

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}

impl ConfigProvider for ReconcileConfig {
    fn shop(&self) -> &ShopConfig {
        &self.shop
    }

    fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    fn classifier(&self) -> &ClassifierConfig {
        &self.classifier
    }

    fn report(&self) -> &ReportConfig {
        &self.report
    }

    fn fix_mode(&self) -> bool {
        self.scan.fix_mode
    }

    fn webhook_secret(&self) -> Option<&str> {
        self.webhook
            .secret
            .as_deref()
            .filter(|s| !s.trim().is_empty() && !s.contains("${"))
    }
}
