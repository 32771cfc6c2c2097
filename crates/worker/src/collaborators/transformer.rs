use serde::{Deserialize, Serialize};

use scaffolder_errors::{PoolError, PoolResult};

pub trait Transformer: Send + Sync {
    fn transform(&self, content: &str, spec: &TransformSpec) -> PoolResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStyle {
    Snake,
    Kebab,
    Camel,
    Pascal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum TransformStep {
    Trim,
    Uppercase,
    Lowercase,
    Replace { from: String, to: String },
    Prefix { value: String },
    Suffix { value: String },
    Indent { width: usize },
    Case { style: CaseStyle },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    #[serde(default)]
    pub steps: Vec<TransformStep>,
}

/// 按顺序执行 `steps` 的变换流水线
#[derive(Debug, Default, Clone)]
pub struct PipelineTransformer;

const MAX_INDENT_WIDTH: usize = 64;

impl PipelineTransformer {
    pub fn new() -> Self {
        Self
    }

    fn apply(content: String, step: &TransformStep) -> PoolResult<String> {
        let out = match step {
            TransformStep::Trim => content.trim().to_string(),
            TransformStep::Uppercase => content.to_uppercase(),
            TransformStep::Lowercase => content.to_lowercase(),
            TransformStep::Replace { from, to } => {
                if from.is_empty() {
                    return Err(PoolError::invalid_payload("replace 的 from 不能为空"));
                }
                content.replace(from.as_str(), to)
            }
            TransformStep::Prefix { value } => format!("{value}{content}"),
            TransformStep::Suffix { value } => format!("{content}{value}"),
            TransformStep::Indent { width } => {
                if *width > MAX_INDENT_WIDTH {
                    return Err(PoolError::invalid_payload(format!(
                        "indent 宽度 {width} 超过上限 {MAX_INDENT_WIDTH}"
                    )));
                }
                let pad = " ".repeat(*width);
                content
                    .split('\n')
                    .map(|line| {
                        if line.trim().is_empty() {
                            line.to_string()
                        } else {
                            format!("{pad}{line}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            TransformStep::Case { style } => convert_case(&content, *style),
        };
        Ok(out)
    }
}

impl Transformer for PipelineTransformer {
    fn transform(&self, content: &str, spec: &TransformSpec) -> PoolResult<String> {
        spec.steps
            .iter()
            .try_fold(content.to_string(), |acc, step| Self::apply(acc, step))
    }
}

fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in input.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        if let Some(p) = prev {
            if c.is_uppercase() && (p.is_lowercase() || p.is_ascii_digit()) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
        prev = Some(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn convert_case(input: &str, style: CaseStyle) -> String {
    let words = split_words(input);
    match style {
        CaseStyle::Snake => words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("_"),
        CaseStyle::Kebab => words.iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("-"),
        CaseStyle::Pascal => words.iter().map(|w| capitalize(w)).collect(),
        CaseStyle::Camel => words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.to_lowercase() } else { capitalize(w) })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(steps: serde_json::Value) -> TransformSpec {
        serde_json::from_value(json!({ "steps": steps })).unwrap()
    }

    #[test]
    fn test_steps_apply_in_order() {
        let out = PipelineTransformer::new()
            .transform(
                "  hello world  ",
                &spec(json!([
                    { "op": "trim" },
                    { "op": "replace", "from": "world", "to": "scaffold" },
                    { "op": "uppercase" },
                    { "op": "prefix", "value": "// " },
                    { "op": "suffix", "value": "\n" }
                ])),
            )
            .unwrap();
        assert_eq!(out, "// HELLO SCAFFOLD\n");
    }

    #[test]
    fn test_case_styles() {
        let t = PipelineTransformer::new();
        let case = |style: &str| {
            t.transform("userProfile-service v2", &spec(json!([{ "op": "case", "style": style }])))
                .unwrap()
        };
        assert_eq!(case("snake"), "user_profile_service_v2");
        assert_eq!(case("kebab"), "user-profile-service-v2");
        assert_eq!(case("camel"), "userProfileServiceV2");
        assert_eq!(case("pascal"), "UserProfileServiceV2");
    }

    #[test]
    fn test_indent_skips_blank_lines() {
        let out = PipelineTransformer::new()
            .transform("fn a() {}\n\nfn b() {}", &spec(json!([{ "op": "indent", "width": 4 }])))
            .unwrap();
        assert_eq!(out, "    fn a() {}\n\n    fn b() {}");
    }

    #[test]
    fn test_indent_width_is_capped() {
        let t = PipelineTransformer::new();
        let at_cap = t
            .transform("x", &spec(json!([{ "op": "indent", "width": 64 }])))
            .unwrap();
        assert_eq!(at_cap.len(), 65);

        let result = t.transform("x", &spec(json!([{ "op": "indent", "width": 1_000_000_000_000u64 }])));
        assert!(matches!(result, Err(PoolError::InvalidPayload(_))));
    }

    #[test]
    fn test_empty_replace_pattern_is_rejected() {
        let result = PipelineTransformer::new().transform(
            "abc",
            &spec(json!([{ "op": "replace", "from": "", "to": "x" }])),
        );
        assert!(matches!(result, Err(PoolError::InvalidPayload(_))));
    }

    #[test]
    fn test_unknown_op_fails_to_parse() {
        let parsed = serde_json::from_value::<TransformSpec>(json!({ "steps": [{ "op": "explode" }] }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_empty_spec_is_identity() {
        let out = PipelineTransformer::new()
            .transform("unchanged", &TransformSpec::default())
            .unwrap();
        assert_eq!(out, "unchanged");
    }
}
