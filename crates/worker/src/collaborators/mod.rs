//! 渲染、校验、变换三类协作者
//!
//! 调度核心只依赖这里的trait签名；默认实现覆盖脚手架生成所需的常见情形。

pub mod template;
pub mod transformer;
pub mod validator;

pub use template::{JinjaRenderer, TemplateRenderer};
pub use transformer::{CaseStyle, PipelineTransformer, TransformSpec, TransformStep, Transformer};
pub use validator::{FieldRule, FieldType, RuleValidator, ValidationReport, ValidationRules, Validator};
