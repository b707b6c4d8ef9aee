#[cfg(feature = "sample-tools")]
pub mod catalog;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{BoxError, SchemaError, ToolError};

/// Primitive type tag carried by a tool parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub enum_values: Option<Vec<String>>,
    pub default: Option<Value>,
}

impl ToolParameter {
    pub fn required(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            enum_values: None,
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: ParamType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Sets a default value. A parameter with a default is never required.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    fn allows(&self, value: &Value) -> bool {
        let Some(allowed) = &self.enum_values else {
            return true;
        };
        let rendered = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        allowed.iter().any(|candidate| *candidate == rendered)
    }
}

/// Declared shape of a tool: its name, description and ordered parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
    name: String,
    description: String,
    parameters: Vec<ToolParameter>,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SchemaError::EmptyToolName);
        }

        let mut seen = HashSet::new();
        for parameter in &parameters {
            if !seen.insert(parameter.name.as_str()) {
                return Err(SchemaError::DuplicateParameter {
                    tool: name,
                    parameter: parameter.name.clone(),
                });
            }
            if let Some(default) = &parameter.default {
                if !parameter.allows(default) {
                    return Err(SchemaError::DefaultOutsideEnum {
                        tool: name,
                        parameter: parameter.name.clone(),
                    });
                }
            }
        }

        Ok(Self {
            name,
            description: description.into(),
            parameters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &[ToolParameter] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }

    /// Renders the function-tool wire shape expected at agent creation.
    pub fn to_definition(&self) -> ToolDefinition {
        let mut properties = Properties::default();
        let mut required = Vec::new();

        for parameter in &self.parameters {
            properties.push(
                parameter.name.clone(),
                PropertySchema {
                    type_: parameter.param_type,
                    description: parameter.description.clone(),
                    enum_values: parameter.enum_values.clone(),
                    default: parameter.default.clone(),
                },
            );
            if parameter.required {
                required.push(parameter.name.clone());
            }
        }

        ToolDefinition {
            type_: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: ParametersSchema {
                    type_: "object".to_string(),
                    properties,
                    required,
                },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub type_: String,
    pub function: FunctionDefinition,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParametersSchema,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParametersSchema {
    #[serde(rename = "type")]
    pub type_: String,
    pub properties: Properties,
    pub required: Vec<String>,
}

/// Property schemas keyed by parameter name, serialized in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties(Vec<(String, PropertySchema)>);

impl Properties {
    pub fn push(&mut self, name: String, schema: PropertySchema) {
        self.0.push((name, schema));
    }

    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, schema)| schema)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, schema) in &self.0 {
            map.serialize_entry(name, schema)?;
        }
        map.end()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub type_: ParamType,
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Maps a Rust type used in a [`Signature`] to a parameter type tag.
pub trait TypeHint {
    const PARAM_TYPE: ParamType;
}

macro_rules! type_hint {
    ($tag:ident => $($ty:ty),+) => {
        $(impl TypeHint for $ty {
            const PARAM_TYPE: ParamType = ParamType::$tag;
        })+
    };
}

type_hint!(Integer => i32, i64, u32, u64, usize);
type_hint!(Number => f32, f64);
type_hint!(Boolean => bool);
type_hint!(String => String);
type_hint!(Object => Map<String, Value>);

impl TypeHint for &str {
    const PARAM_TYPE: ParamType = ParamType::String;
}

impl<T> TypeHint for Vec<T> {
    const PARAM_TYPE: ParamType = ParamType::Array;
}

#[derive(Clone, Debug)]
struct SignatureParam {
    name: String,
    hint: Option<ParamType>,
    default: Option<Value>,
}

/// Formal parameter list of a handler, used to infer [`ToolParameter`]s when
/// none are declared.
///
/// Unannotated parameters infer as `string`; parameters without a default
/// infer as required.
#[derive(Clone, Debug, Default)]
pub struct Signature {
    params: Vec<SignatureParam>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg<T: TypeHint>(self, name: impl Into<String>) -> Self {
        self.push(name, Some(T::PARAM_TYPE), None)
    }

    pub fn arg_or<T: TypeHint>(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.push(name, Some(T::PARAM_TYPE), Some(default.into()))
    }

    pub fn untyped(self, name: impl Into<String>) -> Self {
        self.push(name, None, None)
    }

    pub fn untyped_or(self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.push(name, None, Some(default.into()))
    }

    fn push(mut self, name: impl Into<String>, hint: Option<ParamType>, default: Option<Value>) -> Self {
        self.params.push(SignatureParam {
            name: name.into(),
            hint,
            default,
        });
        self
    }

    pub fn infer(&self) -> Vec<ToolParameter> {
        self.params
            .iter()
            .map(|param| {
                let base = ToolParameter::required(
                    param.name.clone(),
                    param.hint.unwrap_or(ParamType::String),
                    format!("Parameter {}", param.name),
                );
                match &param.default {
                    Some(default) => base.with_default(default.clone()),
                    None => base,
                }
            })
            .collect()
    }
}

/// Parameter source for [`ToolRegistry::register`].
#[derive(Clone, Debug)]
pub enum Parameters {
    Declared(Vec<ToolParameter>),
    Inferred(Signature),
}

impl Parameters {
    fn resolve(self) -> Vec<ToolParameter> {
        match self {
            Parameters::Declared(parameters) => parameters,
            Parameters::Inferred(signature) => signature.infer(),
        }
    }
}

impl From<Vec<ToolParameter>> for Parameters {
    fn from(parameters: Vec<ToolParameter>) -> Self {
        Parameters::Declared(parameters)
    }
}

impl From<Signature> for Parameters {
    fn from(signature: Signature) -> Self {
        Parameters::Inferred(signature)
    }
}

/// Validated, default-filled named arguments handed to a tool handler.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolArgs {
    tool: String,
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|value| !value.is_null())
    }

    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(name, "string"))
    }

    pub fn opt_str(&self, name: &str) -> Result<Option<&str>, ToolError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| self.invalid(name, "string")),
        }
    }

    pub fn i64(&self, name: &str) -> Result<i64, ToolError> {
        self.get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| self.invalid(name, "integer"))
    }

    pub fn f64(&self, name: &str) -> Result<f64, ToolError> {
        self.get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| self.invalid(name, "number"))
    }

    pub fn bool(&self, name: &str) -> Result<bool, ToolError> {
        self.get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.invalid(name, "boolean"))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }

    fn invalid(&self, name: &str, expected: &str) -> ToolError {
        ToolError::InvalidArguments {
            tool: self.tool.clone(),
            message: format!("field '{name}' must be a {expected}"),
        }
    }
}

type ToolHandler = dyn Fn(ToolArgs) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;

#[derive(Clone)]
struct RegisteredTool {
    spec: ToolSpec,
    handler: Arc<ToolHandler>,
}

/// Name-indexed tool set owned by one agent session.
///
/// Written during setup, then shared read-only (typically behind an `Arc`).
/// Schemas are reported in registration order.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field(
                "tools",
                &self.tools.iter().map(|tool| tool.spec.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`.
    ///
    /// Fails with [`ToolError::DuplicateTool`] when the name is taken; the
    /// existing registration is left untouched.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: impl Into<Parameters>,
        handler: F,
    ) -> Result<&ToolSpec, ToolError>
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }

        let spec = ToolSpec::new(name, description, parameters.into().resolve())?;
        let handler: Arc<ToolHandler> = Arc::new(move |args| Box::pin(handler(args)));

        let position = self.tools.len();
        self.index.insert(spec.name().to_string(), position);
        self.tools.push(RegisteredTool { spec, handler });

        let spec = &self.tools[position].spec;
        info!(
            tool = spec.name(),
            parameters = spec.parameters().len(),
            "registered tool"
        );
        Ok(spec)
    }

    pub fn schema(&self, name: &str) -> Option<&ToolSpec> {
        self.lookup(name).map(|tool| &tool.spec)
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.iter().map(|tool| &tool.spec)
    }

    pub fn all_schemas(&self) -> Vec<ToolDefinition> {
        self.specs().map(ToolSpec::to_definition).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validates `arguments` against the tool's parameters and runs it.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let tool = self
            .lookup(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let args = bind_arguments(&tool.spec, arguments)?;
        debug!(tool = name, "executing tool");

        match (tool.handler)(args).await {
            Ok(value) => {
                debug!(tool = name, "tool completed");
                Ok(value)
            }
            Err(source) => {
                warn!(tool = name, error = %source, "tool failed");
                Err(ToolError::Execution {
                    tool: name.to_string(),
                    source,
                })
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|position| &self.tools[*position])
    }
}

fn bind_arguments(spec: &ToolSpec, arguments: Value) -> Result<ToolArgs, ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: spec.name().to_string(),
        message,
    };

    let mut values = match arguments {
        Value::Object(values) => values,
        Value::Null => Map::new(),
        _ => return Err(invalid("arguments must be a JSON object".to_string())),
    };

    if let Some(unknown) = values.keys().find(|key| spec.parameter(key).is_none()) {
        return Err(invalid(format!("unknown field: {unknown}")));
    }

    for parameter in spec.parameters() {
        if let Some(value) = values.get(&parameter.name) {
            if value.is_null() && !parameter.required {
                continue;
            }
            if !parameter.param_type.matches(value) {
                return Err(invalid(format!(
                    "field '{}' must be of type {}",
                    parameter.name,
                    parameter.param_type.as_str()
                )));
            }
            if !parameter.allows(value) {
                return Err(invalid(format!(
                    "field '{}' must be one of {:?}",
                    parameter.name,
                    parameter.enum_values.as_deref().unwrap_or_default()
                )));
            }
            continue;
        }

        if parameter.required {
            return Err(invalid(format!("missing required field: {}", parameter.name)));
        }
        if let Some(default) = &parameter.default {
            values.insert(parameter.name.clone(), default.clone());
        }
    }

    Ok(ToolArgs {
        tool: spec.name().to_string(),
        values,
    })
}
