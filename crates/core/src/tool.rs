//! Tool trait, descriptors, and the tool registry.
//!
//! Tools are capability providers: a weather lookup, a currency
//! conversion, a calculator. Each one is described by a [`ToolDescriptor`]
//! (name, parameter schema, timeout and retry policy) and implemented by a
//! handler. The registry is the single, introspectable source of the tool
//! manifest the model sees.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Default per-attempt handler timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Category used when a descriptor doesn't name one.
pub const DEFAULT_CATEGORY: &str = "general";

/// Expected JSON type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    /// Any non-null JSON value
    Any,
}

impl ParamType {
    /// Whether `value` satisfies this type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.is_finite() && n.fract() == 0.0)
            }
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => !value.is_null(),
        }
    }

    /// JSON Schema `type` keyword, if this type constrains one.
    pub fn schema_name(&self) -> Option<&'static str> {
        match self {
            Self::String => Some("string"),
            Self::Number => Some("number"),
            Self::Integer => Some("integer"),
            Self::Boolean => Some("boolean"),
            Self::Array => Some("array"),
            Self::Object => Some("object"),
            Self::Any => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_name().unwrap_or("any"))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A custom per-parameter check run after the type check passes.
pub type ParamValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Schema entry for a single tool parameter.
#[derive(Clone)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
    pub validator: Option<ParamValidator>,
}

impl ParamSpec {
    /// A required parameter.
    pub fn required(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            required: true,
            validator: None,
        }
    }

    /// An optional parameter.
    pub fn optional(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Attach a custom validator.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }
}

impl fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("param_type", &self.param_type)
            .field("required", &self.required)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Everything the dispatcher needs to know about a tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Unique name within a registry
    pub name: String,
    pub description: String,
    pub version: String,
    /// Capability category; circuit breakers are keyed by it
    pub category: String,
    /// Parameters, in declaration order (validation reports in this order)
    pub parameters: Vec<ParamSpec>,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    /// Whether execution failures are retried with backoff
    pub retryable: bool,
    /// Retries after the first attempt (only when `retryable`)
    pub max_retries: u32,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: "1.0.0".into(),
            category: DEFAULT_CATEGORY.into(),
            parameters: Vec::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retryable: false,
            max_retries: 0,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Mark the tool retryable with up to `max_retries` retries.
    pub fn retry(mut self, max_retries: u32) -> Self {
        self.retryable = true;
        self.max_retries = max_retries;
        self
    }

    /// Check `params` against the schema.
    ///
    /// Collects every violation instead of stopping at the first one, in
    /// parameter declaration order, so the same input always yields the
    /// same list.
    pub fn validate(&self, params: &Value) -> Result<(), Vec<String>> {
        let empty = Map::new();
        let object = match params {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(vec![format!(
                    "parameters must be a JSON object, got {}",
                    json_type_name(other)
                )]);
            }
        };

        let mut violations = Vec::new();
        for spec in &self.parameters {
            match object.get(&spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        violations.push(format!("missing required parameter '{}'", spec.name));
                    }
                }
                Some(value) if !spec.param_type.matches(value) => {
                    violations.push(format!(
                        "parameter '{}' expected {}, got {}",
                        spec.name,
                        spec.param_type,
                        json_type_name(value)
                    ));
                }
                Some(value) => {
                    if let Some(validator) = &spec.validator
                        && let Err(reason) = validator(value)
                    {
                        violations.push(format!("parameter '{}': {}", spec.name, reason));
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// JSON Schema for the parameters, as sent in the tool manifest.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.parameters {
            let mut prop = Map::new();
            if let Some(ty) = spec.param_type.schema_name() {
                prop.insert("type".into(), Value::String(ty.into()));
            }
            prop.insert("description".into(), Value::String(spec.description.clone()));
            properties.insert(spec.name.clone(), Value::Object(prop));
            if spec.required {
                required.push(Value::String(spec.name.clone()));
            }
        }
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Render the manifest entry for the model gateway.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Per-invocation context handed to a handler.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub task_id: String,
    pub iteration: u32,
    pub call_id: String,
}

/// A tool handler.
///
/// Handlers own all side effects of a tool call. They may fail; the
/// dispatcher turns every failure into an observation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value, ToolError>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

/// The set of tools available to the reasoning loop, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names are unique: a second tool with the same name
    /// is rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Builder-style registration for wiring code.
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Result<Self, ToolError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Descriptors of every registered tool, sorted by name.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut descriptors: Vec<&ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// The tool manifest, sorted by name so prompts are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.descriptors().into_iter().map(ToolDescriptor::to_definition).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool {
        descriptor: ToolDescriptor,
    }

    impl EchoTool {
        fn new(name: &str) -> Self {
            Self {
                descriptor: ToolDescriptor::new(name, "Echoes back the input").param(
                    ParamSpec::required("text", ParamType::String, "Text to echo"),
                ),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            Ok(params["text"].clone())
        }
    }

    fn currency_descriptor() -> ToolDescriptor {
        ToolDescriptor::new("convertCurrency", "Convert money")
            .param(
                ParamSpec::required("amount", ParamType::Number, "Amount").with_validator(|v| {
                    match v.as_f64() {
                        Some(n) if n >= 0.0 => Ok(()),
                        _ => Err("must be non-negative".into()),
                    }
                }),
            )
            .param(ParamSpec::required("from", ParamType::String, "Source currency"))
            .param(ParamSpec::required("to", ParamType::String, "Target currency"))
            .param(ParamSpec::optional("round", ParamType::Integer, "Decimal places"))
    }

    #[test]
    fn valid_parameters_pass() {
        let d = currency_descriptor();
        assert!(d.validate(&json!({"amount": 10, "from": "USD", "to": "EUR"})).is_ok());
        assert!(d.validate(&json!({"amount": 10.5, "from": "USD", "to": "EUR", "round": 2})).is_ok());
    }

    #[test]
    fn all_violations_are_accumulated_in_order() {
        let d = currency_descriptor();
        let errors = d
            .validate(&json!({"amount": -1, "to": 42, "round": 1.5}))
            .unwrap_err();
        assert_eq!(
            errors,
            vec![
                "parameter 'amount': must be non-negative".to_string(),
                "missing required parameter 'from'".to_string(),
                "parameter 'to' expected string, got integer".to_string(),
                "parameter 'round' expected integer, got number".to_string(),
            ]
        );
    }

    #[test]
    fn integer_accepts_integral_floats_only() {
        assert!(ParamType::Integer.matches(&json!(10)));
        assert!(ParamType::Integer.matches(&json!(10.0)));
        assert!(ParamType::Integer.matches(&json!(-3.0)));
        assert!(!ParamType::Integer.matches(&json!(1.5)));
        assert!(!ParamType::Integer.matches(&json!("10")));

        let d = currency_descriptor();
        assert!(d.validate(&json!({"amount": 1, "from": "USD", "to": "EUR", "round": 2.0})).is_ok());
    }

    #[test]
    fn validation_is_idempotent() {
        let d = currency_descriptor();
        let params = json!({"amount": "ten", "from": null});
        assert_eq!(d.validate(&params), d.validate(&params));
    }

    #[test]
    fn null_and_missing_are_equivalent() {
        let d = currency_descriptor();
        let a = d.validate(&json!({"amount": 1, "from": null, "to": "EUR"})).unwrap_err();
        let b = d.validate(&json!({"amount": 1, "to": "EUR"})).unwrap_err();
        assert_eq!(a, b);
    }

    #[test]
    fn non_object_parameters_rejected() {
        let d = currency_descriptor();
        let errors = d.validate(&json!([1, 2])).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("JSON object"));
    }

    #[test]
    fn schema_lists_required_parameters() {
        let schema = currency_descriptor().parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["amount"]["type"], "number");
        assert_eq!(schema["required"], json!(["amount", "from", "to"]));
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo"))).unwrap();
        let err = registry.register(Arc::new(EchoTool::new("echo"))).unwrap_err();
        assert_eq!(err, ToolError::AlreadyRegistered("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_manifest_is_sorted() {
        let registry = ToolRegistry::new()
            .with(Arc::new(EchoTool::new("zeta")))
            .unwrap()
            .with(Arc::new(EchoTool::new("alpha")))
            .unwrap();
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn registry_lookup_and_execute() {
        let registry = ToolRegistry::new().with(Arc::new(EchoTool::new("echo"))).unwrap();
        let tool = registry.get("echo").unwrap();
        let out = tool
            .execute(json!({"text": "hello"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(out, json!("hello"));
        assert!(registry.get("nonexistent").is_none());
    }
}
