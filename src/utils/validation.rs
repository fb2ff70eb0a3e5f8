use crate::utils::error::{ReconcileError, Result};
use regex::Regex;
use std::collections::HashSet;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(field_name, url_str, format!("Invalid URL format: {}", e))),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| ReconcileError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// 值域清單：不可為空、不可有空白項目、不可重複
pub fn validate_value_domain(field_name: &str, values: &[String]) -> Result<()> {
    if values.is_empty() {
        return Err(invalid(field_name, "[]", "Value list cannot be empty"));
    }

    let mut seen = HashSet::new();
    for value in values {
        validate_non_empty_string(field_name, value)?;
        if !seen.insert(value.as_str()) {
            return Err(invalid(field_name, value, "Duplicate value"));
        }
    }
    Ok(())
}

pub fn validate_member(field_name: &str, value: &str, allowed: &[String]) -> Result<()> {
    if !allowed.iter().any(|a| a == value) {
        return Err(invalid(
            field_name,
            value,
            format!("Must be one of: {}", allowed.join(", ")),
        ));
    }
    Ok(())
}

pub fn validate_pattern(field_name: &str, pattern: &str) -> Result<()> {
    Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| invalid(field_name, pattern, format!("Invalid regular expression: {}", e)))
}

fn invalid(field_name: &str, value: &str, reason: impl Into<String>) -> ReconcileError {
    ReconcileError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("shop.endpoint", "https://example.myshopify.com").is_ok());
        assert!(validate_url("shop.endpoint", "http://localhost:8080/graphql").is_ok());
        assert!(validate_url("shop.endpoint", "").is_err());
        assert!(validate_url("shop.endpoint", "invalid-url").is_err());
        assert!(validate_url("shop.endpoint", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("shop.page_size", 50, 1).is_ok());
        assert!(validate_positive_number("shop.page_size", 0, 1).is_err());
    }

    #[test]
    fn test_validate_value_domain() {
        let ok = vec!["draft".to_string(), "can".to_string()];
        assert!(validate_value_domain("taxonomy.card_types", &ok).is_ok());

        let dup = vec!["draft".to_string(), "draft".to_string()];
        assert!(validate_value_domain("taxonomy.card_types", &dup).is_err());

        assert!(validate_value_domain("taxonomy.card_types", &[]).is_err());

        let blank = vec!["draft".to_string(), "  ".to_string()];
        assert!(validate_value_domain("taxonomy.card_types", &blank).is_err());
    }

    #[test]
    fn test_validate_member_and_pattern() {
        let allowed = vec!["full".to_string(), "half".to_string()];
        assert!(validate_member("keg", "full", &allowed).is_ok());
        assert!(validate_member("keg", "broken", &allowed).is_err());

        assert!(validate_pattern("rule", r"\b(kava)\b").is_ok());
        assert!(validate_pattern("rule", r"\b(kava").is_err());
    }

    #[test]
    fn test_validate_required_field() {
        let present = Some("secret".to_string());
        let missing: Option<String> = None;
        assert_eq!(validate_required_field("webhook.secret", &present).unwrap(), "secret");
        assert!(matches!(
            validate_required_field("webhook.secret", &missing),
            Err(ReconcileError::MissingConfigError { .. })
        ));
    }
}
