//! Test data builders for creating tasks
//!
//! Every builder produces a payload the default executors accept, so tests
//! only override what they care about.

use scaffolder_domain::{Task, TaskKind};
use serde_json::{json, Value};

/// Builder for creating test Task entities
pub struct TaskBuilder {
    id: Option<String>,
    kind: TaskKind,
    payload: Value,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self::render("Hello {{name}}", json!({ "name": "scaffolder" }))
    }

    pub fn render(template: &str, context: Value) -> Self {
        Self {
            id: None,
            kind: TaskKind::Render,
            payload: json!({ "template": template, "context": context }),
        }
    }

    pub fn validate(input: Value, rules: Value) -> Self {
        Self {
            id: None,
            kind: TaskKind::Validate,
            payload: json!({ "input": input, "rules": rules }),
        }
    }

    pub fn transform(content: &str, steps: Value) -> Self {
        Self {
            id: None,
            kind: TaskKind::Transform,
            payload: json!({ "content": content, "spec": { "steps": steps } }),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Task {
        match self.id {
            Some(id) => Task::with_id(id, self.kind, self.payload),
            None => Task::new(self.kind, self.payload),
        }
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `count` render tasks with ids `task-0..` that render to `item-0..`
pub fn numbered_render_tasks(count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| {
            TaskBuilder::render("item-{{n}}", json!({ "n": i }))
                .with_id(format!("task-{i}"))
                .build()
        })
        .collect()
}

/// One task of each kind, in render, validate, transform order
pub fn mixed_tasks() -> Vec<Task> {
    vec![
        TaskBuilder::render("{{greeting}}, {{user.name}}!", json!({
            "greeting": "Hi",
            "user": { "name": "Ada" }
        }))
        .with_id("mixed-render")
        .build(),
        TaskBuilder::validate(
            json!({ "name": "demo" }),
            json!({ "required": ["name", "version"] }),
        )
        .with_id("mixed-validate")
        .build(),
        TaskBuilder::transform("  My Component  ", json!([
            { "op": "trim" },
            { "op": "case", "style": "kebab" }
        ]))
        .with_id("mixed-transform")
        .build(),
    ]
}
