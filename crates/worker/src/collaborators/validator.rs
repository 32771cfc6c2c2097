use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use scaffolder_errors::{PoolError, PoolResult};

pub trait Validator: Send + Sync {
    fn validate(&self, input: &Value, rules: &ValidationRules) -> PoolResult<ValidationReport>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<String>,
    #[serde(rename = "enum")]
    pub allowed: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationRules {
    pub required: Vec<String>,
    /// 缺失时只产生警告
    pub recommended: Vec<String>,
    pub properties: BTreeMap<String, FieldRule>,
    pub allow_unknown: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            recommended: Vec::new(),
            properties: BTreeMap::new(),
            allow_unknown: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub score: u32,
}

impl ValidationReport {
    fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        let penalty = errors.len() as u32 * 20 + warnings.len() as u32 * 5;
        Self {
            valid: errors.is_empty(),
            score: 100u32.saturating_sub(penalty),
            errors,
            warnings,
        }
    }
}

/// 基于规则表的对象校验器
///
/// 规则本身有误（例如非法正则）返回 `Err`，输入不符合规则体现在报告里。
#[derive(Debug, Default, Clone)]
pub struct RuleValidator;

impl RuleValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_field(
        name: &str,
        value: &Value,
        rule: &FieldRule,
        errors: &mut Vec<String>,
    ) -> PoolResult<()> {
        if let Some(expected) = rule.field_type {
            if !expected.matches(value) {
                errors.push(format!("字段 '{name}' 类型应为 {expected:?}"));
                return Ok(());
            }
        }

        if let Some(s) = value.as_str() {
            let len = s.chars().count();
            if let Some(min) = rule.min_length {
                if len < min {
                    errors.push(format!("字段 '{name}' 长度不能小于 {min}"));
                }
            }
            if let Some(max) = rule.max_length {
                if len > max {
                    errors.push(format!("字段 '{name}' 长度不能大于 {max}"));
                }
            }
            if let Some(pattern) = &rule.pattern {
                let re = Regex::new(pattern).map_err(|e| {
                    PoolError::invalid_payload(format!("字段 '{name}' 的正则无效: {e}"))
                })?;
                if !re.is_match(s) {
                    errors.push(format!("字段 '{name}' 不匹配模式 {pattern}"));
                }
            }
        }

        if let Some(items) = value.as_array() {
            if let Some(min) = rule.min_length {
                if items.len() < min {
                    errors.push(format!("字段 '{name}' 至少需要 {min} 项"));
                }
            }
            if let Some(max) = rule.max_length {
                if items.len() > max {
                    errors.push(format!("字段 '{name}' 最多允许 {max} 项"));
                }
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = rule.min {
                if n < min {
                    errors.push(format!("字段 '{name}' 不能小于 {min}"));
                }
            }
            if let Some(max) = rule.max {
                if n > max {
                    errors.push(format!("字段 '{name}' 不能大于 {max}"));
                }
            }
        }

        if let Some(allowed) = &rule.allowed {
            if !allowed.contains(value) {
                errors.push(format!("字段 '{name}' 的值不在允许范围内"));
            }
        }

        Ok(())
    }
}

impl Validator for RuleValidator {
    fn validate(&self, input: &Value, rules: &ValidationRules) -> PoolResult<ValidationReport> {
        let Some(object) = input.as_object() else {
            return Ok(ValidationReport::from_findings(
                vec!["输入必须是对象".to_string()],
                Vec::new(),
            ));
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for name in &rules.required {
            if object.get(name).map_or(true, Value::is_null) {
                errors.push(format!("缺少必填字段 '{name}'"));
            }
        }
        for name in &rules.recommended {
            if object.get(name).map_or(true, Value::is_null) {
                warnings.push(format!("建议提供字段 '{name}'"));
            }
        }

        for (name, value) in object {
            match rules.properties.get(name) {
                Some(rule) => Self::check_field(name, value, rule, &mut errors)?,
                None if !rules.allow_unknown => errors.push(format!("不允许的字段 '{name}'")),
                None => {}
            }
        }

        Ok(ValidationReport::from_findings(errors, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(value: Value) -> ValidationRules {
        serde_json::from_value(value).unwrap()
    }

    fn project_rules() -> ValidationRules {
        rules(json!({
            "required": ["name", "version"],
            "recommended": ["description"],
            "properties": {
                "name": { "type": "string", "minLength": 1, "maxLength": 32, "pattern": "^[a-z][a-z0-9-]*$" },
                "version": { "type": "string" },
                "port": { "type": "integer", "min": 1, "max": 65535 },
                "license": { "enum": ["MIT", "Apache-2.0"] }
            }
        }))
    }

    #[test]
    fn test_valid_input_scores_with_warnings() {
        let report = RuleValidator::new()
            .validate(&json!({ "name": "my-app", "version": "0.1.0", "port": 8080 }), &project_rules())
            .unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.score, 95);
    }

    #[test]
    fn test_collects_every_error() {
        let report = RuleValidator::new()
            .validate(
                &json!({ "name": "My App", "port": 70000, "license": "GPL" }),
                &project_rules(),
            )
            .unwrap();
        assert!(!report.valid);
        // 缺少version、name不匹配、port越界、license不在枚举中
        assert_eq!(report.errors.len(), 4, "{:?}", report.errors);
        assert_eq!(report.score, 100 - 4 * 20 - 5);
    }

    #[test]
    fn test_type_mismatch_and_unknown_fields() {
        let strict = rules(json!({
            "properties": { "port": { "type": "integer" } },
            "allowUnknown": false
        }));
        let report = RuleValidator::new()
            .validate(&json!({ "port": "80", "extra": true }), &strict)
            .unwrap();
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_non_object_input_is_reported_not_raised() {
        let report = RuleValidator::new()
            .validate(&json!("just a string"), &ValidationRules::default())
            .unwrap();
        assert!(!report.valid);
        assert_eq!(report.score, 80);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let broken = rules(json!({ "properties": { "name": { "pattern": "([a-z" } } }));
        let result = RuleValidator::new().validate(&json!({ "name": "x" }), &broken);
        assert!(matches!(result, Err(PoolError::InvalidPayload(_))));
    }

    #[test]
    fn test_score_floors_at_zero() {
        let many = rules(json!({ "required": ["a", "b", "c", "d", "e", "f"] }));
        let report = RuleValidator::new().validate(&json!({}), &many).unwrap();
        assert_eq!(report.score, 0);
    }
}
