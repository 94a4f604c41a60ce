//! Tool descriptors, providers, and the registry.
//!
//! Providers hand the registry a list of [`ToolDef`]s built with
//! [`ToolDef::builder`]. The registry is assembled once at startup and is
//! read-only afterwards.

pub mod analytics;
pub mod collection;
pub mod database;
pub mod document;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::convert::BoundArgs;
use crate::error::{McpError, Result};
use crate::store::{DocStore, StoreError, StoreResult};

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// UTF-8 text.
    String,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 64-bit float.
    Double,
    /// Boolean flag.
    Boolean,
    /// JSON array, passed through as-is.
    Array,
    /// JSON object, passed through as-is.
    Object,
}

impl ParamType {
    /// JSON Schema `type` keyword for this parameter type.
    pub fn json_type(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer | ParamType::Long => "integer",
            ParamType::Double => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Primitive kinds have a zero value and are never required.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            ParamType::Integer | ParamType::Long | ParamType::Double | ParamType::Boolean
        )
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Long => "long",
            ParamType::Double => "double",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        };
        f.write_str(name)
    }
}

/// A single declared tool parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    /// Argument key in the `arguments` object
    pub name: String,
    /// Declared type
    pub ty: ParamType,
    /// Reference kinds may be declared nullable, which makes them optional
    pub nullable: bool,
}

impl ParamDef {
    /// Whether the parameter is listed in the schema's `required` array.
    pub fn required(&self) -> bool {
        !self.ty.is_primitive() && !self.nullable
    }
}

/// The callable half of a tool.
pub trait ToolHandler: Send + Sync {
    /// Invoke the tool with arguments already bound to the declared types.
    fn call(&self, args: BoundArgs) -> Result<JsonValue>;
}

impl<F> ToolHandler for F
where
    F: Fn(BoundArgs) -> Result<JsonValue> + Send + Sync,
{
    fn call(&self, args: BoundArgs) -> Result<JsonValue> {
        (self)(args)
    }
}

/// A tool definition: name, description, parameters and the bound handler.
#[derive(Clone)]
pub struct ToolDef {
    /// Tool name (e.g., "insertDocument")
    pub name: String,
    /// Tool description
    pub description: String,
    /// Parameters in declaration order
    pub params: Vec<ParamDef>,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDef")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ToolDef {
    /// Start building a tool definition.
    pub fn builder(name: &str, description: &str) -> ToolDefBuilder {
        ToolDefBuilder {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
            handler: None,
        }
    }

    /// Invoke the underlying handler.
    pub fn invoke(&self, args: BoundArgs) -> Result<JsonValue> {
        self.handler.call(args)
    }

    /// Entry for the `tools/list` response.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": crate::schema::schema_for(self),
        })
    }
}

/// Builder for [`ToolDef`].
pub struct ToolDefBuilder {
    name: String,
    description: String,
    params: Vec<ParamDef>,
    handler: Option<Arc<dyn ToolHandler>>,
}

impl ToolDefBuilder {
    /// Declare a parameter. Reference kinds declared this way are required.
    pub fn param(mut self, name: &str, ty: ParamType) -> Self {
        self.params.push(ParamDef {
            name: name.to_string(),
            ty,
            nullable: false,
        });
        self
    }

    /// Declare a parameter that may be omitted.
    pub fn nullable(mut self, name: &str, ty: ParamType) -> Self {
        self.params.push(ParamDef {
            name: name.to_string(),
            ty,
            nullable: true,
        });
        self
    }

    /// Attach the callable.
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(BoundArgs) -> Result<JsonValue> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Validate and produce the definition.
    pub fn build(self) -> Result<ToolDef> {
        if self.name.trim().is_empty() {
            return Err(McpError::InvalidDescriptor(
                "tool name cannot be empty".to_string(),
            ));
        }

        for (i, param) in self.params.iter().enumerate() {
            if param.name.trim().is_empty() {
                return Err(McpError::InvalidDescriptor(format!(
                    "{}: parameter {} has an empty name",
                    self.name, i
                )));
            }
            if self.params[..i].iter().any(|p| p.name == param.name) {
                return Err(McpError::InvalidDescriptor(format!(
                    "{}: parameter '{}' declared twice",
                    self.name, param.name
                )));
            }
        }

        let handler = self.handler.ok_or_else(|| {
            McpError::InvalidDescriptor(format!("{}: no handler attached", self.name))
        })?;

        Ok(ToolDef {
            name: self.name,
            description: self.description,
            params: self.params,
            handler,
        })
    }
}

/// A source of tools.
pub trait ToolProvider: Send + Sync {
    /// Provider name, used in configuration and diagnostics.
    fn name(&self) -> &str;

    /// All tools this provider exports, in the order they should be listed.
    fn tools(&self) -> Result<Vec<ToolDef>>;
}

/// What to do when two tools share a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Fail registration.
    #[default]
    Reject,
    /// Keep the later definition in the earlier slot.
    LastWins,
}

/// Registry of all available tools.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
    index: HashMap<String, usize>,
    providers: Vec<String>,
}

impl ToolRegistry {
    /// Build a registry from the given providers.
    ///
    /// A provider whose tools cannot be built is skipped with a warning.
    pub fn register(providers: &[Box<dyn ToolProvider>], policy: CollisionPolicy) -> Result<Self> {
        let mut registry = Self::empty();

        for provider in providers {
            let tools = match provider.tools() {
                Ok(tools) => tools,
                Err(e) => {
                    warn!("Skipping provider '{}': {}", provider.name(), e);
                    continue;
                }
            };

            let count = tools.len();
            for tool in tools {
                registry.insert(tool, policy)?;
            }
            registry.providers.push(provider.name().to_string());
            info!("Scanned provider '{}' and found {} tools", provider.name(), count);
        }

        Ok(registry)
    }

    /// A registry with no tools.
    pub fn empty() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            providers: Vec::new(),
        }
    }

    fn insert(&mut self, tool: ToolDef, policy: CollisionPolicy) -> Result<()> {
        match self.index.get(&tool.name) {
            Some(&slot) => match policy {
                CollisionPolicy::Reject => Err(McpError::DuplicateTool(tool.name)),
                CollisionPolicy::LastWins => {
                    warn!("Tool '{}' registered twice, keeping the later one", tool.name);
                    self.tools[slot] = tool;
                    Ok(())
                }
            },
            None => {
                debug!("Discovered tool: {} - {}", tool.name, tool.description);
                self.index.insert(tool.name.clone(), self.tools.len());
                self.tools.push(tool);
                Ok(())
            }
        }
    }

    /// Find a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&ToolDef> {
        self.index
            .get(name)
            .map(|&slot| &self.tools[slot])
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))
    }

    /// All tools in registration order.
    pub fn list_all(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Names of the providers that contributed tools.
    pub fn provider_names(&self) -> &[String] {
        &self.providers
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.tools.iter().map(|t| t.name.as_str()).collect();
        f.debug_struct("ToolRegistry")
            .field("tools", &names)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Report a store outcome as a text message.
///
/// Store failures are tool-domain failures: they come back as a successful
/// result carrying a "Failed to ..." message. Only lock poisoning escapes as an
/// error.
pub(crate) fn report_message<T>(
    result: StoreResult<T>,
    success: impl FnOnce(T) -> String,
    failure: &str,
) -> Result<JsonValue> {
    match result {
        Ok(value) => Ok(JsonValue::String(success(value))),
        Err(StoreError::Poisoned) => Err(McpError::Internal(StoreError::Poisoned.to_string())),
        Err(e) => {
            warn!("{}: {}", failure, e);
            Ok(JsonValue::String(format!("{}: {}", failure, e)))
        }
    }
}

/// Report a store outcome as a JSON value, or `{"error": ...}` on failure.
pub(crate) fn report_value<T>(
    result: StoreResult<T>,
    success: impl FnOnce(T) -> JsonValue,
) -> Result<JsonValue> {
    match result {
        Ok(value) => Ok(success(value)),
        Err(StoreError::Poisoned) => Err(McpError::Internal(StoreError::Poisoned.to_string())),
        Err(e) => {
            warn!("Store operation failed: {}", e);
            Ok(json!({ "error": e.to_string() }))
        }
    }
}

/// Names of the providers shipped with this crate, in registration order.
/// Analytics comes last so public exposure is a prefix.
pub const PROVIDER_NAMES: &[&str] = &["database", "collection", "document", "analytics"];

/// Instantiate the named providers over a shared store.
///
/// Unknown names are skipped with a warning.
pub fn resolve_providers(names: &[String], store: &Arc<DocStore>) -> Vec<Box<dyn ToolProvider>> {
    let mut providers: Vec<Box<dyn ToolProvider>> = Vec::new();

    for name in names {
        match name.as_str() {
            "database" => providers.push(Box::new(database::DatabaseTools::new(store.clone()))),
            "collection" => {
                providers.push(Box::new(collection::CollectionTools::new(store.clone())))
            }
            "document" => providers.push(Box::new(document::DocumentTools::new(store.clone()))),
            "analytics" => {
                providers.push(Box::new(analytics::AnalyticsTools::new(store.clone())))
            }
            other => warn!("Could not resolve provider '{}', skipping", other),
        }
    }

    providers
}
