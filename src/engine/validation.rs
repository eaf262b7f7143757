//! Validation rule evaluation
//!
//! All applicable checks run and every failure is collected, so a caller
//! sees the complete list of violations at once rather than the first.

use url::Url;

use crate::registry::{SettingValue, ValidationRule};

/// Evaluate a rule against a value, returning every violation in rule order
pub fn check_rule(rule: &ValidationRule, value: &SettingValue) -> Vec<String> {
    let mut violations = Vec::new();
    let text = value.to_string();

    if rule.min.is_some() || rule.max.is_some() {
        match text.trim().parse::<i64>() {
            Ok(n) => {
                if let Some(min) = rule.min {
                    if n < min {
                        violations.push(format!("must be at least {}", min));
                    }
                }
                if let Some(max) = rule.max {
                    if n > max {
                        violations.push(format!("must be at most {}", max));
                    }
                }
            }
            Err(_) => violations.push("must be a number".to_string()),
        }
    }

    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(&text)) {
            violations.push(format!("must be one of: {}", allowed.join(", ")));
        }
    }

    if rule.absolute_url {
        match Url::parse(&text) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => violations.push("must be an absolute http or https URL".to_string()),
        }
    }

    if let Some(pattern) = &rule.pattern {
        if !pattern.is_match(&text) {
            violations.push(format!("must match pattern {}", pattern.as_str()));
        }
    }

    violations
}
