use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde_json::Value;

use scaffolder_errors::{PoolError, PoolResult};

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> PoolResult<String>;
}

/// 基于minijinja的模板渲染器
///
/// 生成的是源码而不是HTML，所以不做转义。缺失的值（包括缺失值上的属性访问）渲染为空字符串，
/// 模板末尾的换行保留。
#[derive(Debug, Clone)]
pub struct JinjaRenderer {
    env: Environment<'static>,
}

impl JinjaRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        Self { env }
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(&self, template: &str, context: &Value) -> PoolResult<String> {
        self.env
            .render_str(template, context)
            .map_err(|e| match e.line() {
                Some(line) => PoolError::template(format!("第 {line} 行: {e}")),
                None => PoolError::template(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, context: Value) -> PoolResult<String> {
        JinjaRenderer::new().render(template, &context)
    }

    #[test]
    fn test_variables_and_dotted_paths() {
        let out = render(
            "# {{name}}\n\nby {{ author.name }} <{{ author.email }}>",
            json!({ "name": "demo-cli", "author": { "name": "Ada", "email": "ada@example.com" } }),
        )
        .unwrap();
        assert_eq!(out, "# demo-cli\n\nby Ada <ada@example.com>");
    }

    #[test]
    fn test_missing_values_render_empty_without_escaping() {
        let out = render(
            "[{{ missing }}][{{ author.email }}] {{ html }}",
            json!({ "html": "<b>&</b>" }),
        )
        .unwrap();
        assert_eq!(out, "[][] <b>&</b>");
    }

    #[test]
    fn test_loops_over_lists() {
        let out = render(
            "deps:{% for dep in deps %} {{ dep.name }}@{{ dep.version }}{% endfor %}",
            json!({ "deps": [ { "name": "serde", "version": "1" }, { "name": "tokio", "version": "1.42" } ] }),
        )
        .unwrap();
        assert_eq!(out, "deps: serde@1 tokio@1.42");

        let out = render("{% for tag in tags %}<{{ tag }}>{% endfor %}", json!({ "tags": ["a", "b"] })).unwrap();
        assert_eq!(out, "<a><b>");
    }

    #[test]
    fn test_conditionals_comments_and_filters() {
        let template =
            "{# header #}{% if license %}License: {{ license | upper }}{% else %}Unlicensed{% endif %}";
        assert_eq!(render(template, json!({ "license": "mit" })).unwrap(), "License: MIT");
        assert_eq!(render(template, json!({})).unwrap(), "Unlicensed");
        assert_eq!(render(template, json!({ "license": "" })).unwrap(), "Unlicensed");
    }

    #[test]
    fn test_trailing_newline_kept() {
        assert_eq!(render("{{ name }}\n", json!({ "name": "x" })).unwrap(), "x\n");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(render("hello {{ name", json!({})), Err(PoolError::Template(_))));
        assert!(matches!(render("{% if a %}open", json!({})), Err(PoolError::Template(_))));
        assert!(matches!(render("{% if a %}x{% endfor %}", json!({})), Err(PoolError::Template(_))));
        assert!(matches!(render("x{% endif %}", json!({})), Err(PoolError::Template(_))));
    }
}
