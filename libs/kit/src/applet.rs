//! Applet trees: one parameter/dispatch model for CLI and HTTP.
//!
//! An applet is a tree of invocable nodes. Leaves execute their handler;
//! internal nodes route a child selector further down, falling back to
//! their own parameters when no child is selected. The CLI renders each
//! node as a subcommand with flags and the HTTP adapter mounts each node
//! as a route with query/body fields, but both bind raw input through the
//! same declarations before any handler runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z0-9_-]+$").ok());

fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(name))
}

#[derive(Debug, Error)]
pub enum AppletError {
    #[error("invalid parameter or node name: {0:?}")]
    InvalidName(String),
    #[error("abbreviation must be a single ascii letter or digit: {0:?}")]
    InvalidAbbr(char),
    #[error("duplicate parameter: {0}")]
    DuplicateParameter(String),
    #[error("duplicate child: {0}")]
    DuplicateChild(String),
    #[error("missing required parameter: {0}")]
    MissingParameter(String),
    #[error("invalid value for parameter {name}: expected {expected}")]
    InvalidValue { name: String, expected: ParamKind },
    #[error("not directly invocable, expected a subcommand")]
    NotInvocable,
}

/// What went wrong during a dispatch, split by who caused it.
///
/// Binding failures are the caller's fault and map to usage errors (CLI)
/// or 4xx responses (HTTP); handler failures are the extension's fault and
/// map to a printed error (CLI) or a 500 (HTTP).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Binding(#[from] AppletError),
    #[error("{0:#}")]
    Handler(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Str => "a string",
            Self::Int => "an integer",
            Self::Float => "a float",
            Self::Bool => "a boolean",
        };
        f.write_str(name)
    }
}

/// One declared parameter, shared verbatim by both transports.
///
/// Names match `^[a-z0-9-_]+$` (case-insensitive) and are normalized to
/// underscores internally; the CLI renders them back with dashes.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    abbr: Option<char>,
    kind: ParamKind,
    required: bool,
    default: Option<Value>,
    help: String,
}

impl Parameter {
    pub fn new(name: &str) -> Result<Self, AppletError> {
        if !is_valid_name(name) {
            return Err(AppletError::InvalidName(name.to_owned()));
        }
        Ok(Self {
            name: name.replace('-', "_"),
            abbr: None,
            kind: ParamKind::Str,
            required: false,
            default: None,
            help: String::new(),
        })
    }

    /// Single-character short flag for the CLI transport.
    pub fn abbr(mut self, abbr: char) -> Result<Self, AppletError> {
        if !abbr.is_ascii_alphanumeric() {
            return Err(AppletError::InvalidAbbr(abbr));
        }
        self.abbr = Some(abbr);
        Ok(self)
    }

    pub fn kind(mut self, kind: ParamKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn help(mut self, help: &str) -> Self {
        self.help = help.to_owned();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_kind(&self) -> ParamKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn help_text(&self) -> &str {
        &self.help
    }

    pub fn long_flag(&self) -> String {
        format!("--{}", self.name.replace('_', "-"))
    }

    pub fn short_flag(&self) -> Option<String> {
        self.abbr.map(|abbr| format!("-{abbr}"))
    }

    pub fn abbr_char(&self) -> Option<char> {
        self.abbr
    }
}

/// Bound parameter values, keyed by normalized name.
pub type Params = BTreeMap<String, Value>;

/// What a handler produced, rendered per transport:
/// nothing, a scalar printed as-is / wrapped as `{"result": ...}`, or a
/// mapping printed `key: value` per line / serialized under `result`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    None,
    Scalar(Value),
    Mapping(Map<String, Value>),
}

impl Outcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Scalar(Value::String(text.into()))
    }

    /// The HTTP body form: the outcome under a `result` field.
    pub fn to_body(&self) -> Value {
        let result = match self {
            Self::None => Value::Null,
            Self::Scalar(value) => value.clone(),
            Self::Mapping(mapping) => Value::Object(mapping.clone()),
        };
        serde_json::json!({ "result": result })
    }
}

pub type Handler = Box<dyn Fn(&Params) -> anyhow::Result<Outcome> + Send + Sync>;

/// A node in the applet tree.
///
/// Child names are unique among siblings; parameter names are unique
/// within the node. Root nodes are resolved by name from the extension
/// registry; children are declared statically by their parent's builder.
pub struct Node {
    help: String,
    parameters: Vec<Parameter>,
    children: BTreeMap<String, Node>,
    handler: Option<Handler>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("help", &self.help)
            .field("parameters", &self.parameters)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl Node {
    pub fn new(help: &str) -> Self {
        Self {
            help: help.to_owned(),
            parameters: Vec::new(),
            children: BTreeMap::new(),
            handler: None,
        }
    }

    pub fn parameter(mut self, parameter: Parameter) -> Result<Self, AppletError> {
        if self.parameters.iter().any(|p| p.name() == parameter.name()) {
            return Err(AppletError::DuplicateParameter(parameter.name().to_owned()));
        }
        self.parameters.push(parameter);
        Ok(self)
    }

    pub fn child(mut self, name: &str, node: Node) -> Result<Self, AppletError> {
        if !is_valid_name(name) {
            return Err(AppletError::InvalidName(name.to_owned()));
        }
        if self.children.contains_key(name) {
            return Err(AppletError::DuplicateChild(name.to_owned()));
        }
        self.children.insert(name.to_owned(), node);
        Ok(self)
    }

    pub fn handler(
        mut self,
        handler: impl Fn(&Params) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Walks `selectors` down the tree and executes the reached node.
    ///
    /// While the leading selector names a declared child, dispatch recurses
    /// into it with the remaining selectors and the same raw values.
    /// Otherwise the current node binds its own parameters from `raw` and
    /// calls its handler; a node without one fails with
    /// [`AppletError::NotInvocable`].
    pub fn dispatch(&self, selectors: &[&str], raw: &Map<String, Value>) -> Result<Outcome, DispatchError> {
        if let Some((first, rest)) = selectors.split_first() {
            if let Some(child) = self.children.get(*first) {
                return child.dispatch(rest, raw);
            }
        }
        let handler = self.handler.as_ref().ok_or(AppletError::NotInvocable)?;
        let params = bind(&self.parameters, raw)?;
        handler(&params).map_err(DispatchError::Handler)
    }

    /// Resolves a selector path without executing anything.
    pub fn descend(&self, selectors: &[&str]) -> Option<&Node> {
        match selectors.split_first() {
            None => Some(self),
            Some((first, rest)) => self.children.get(*first).and_then(|child| child.descend(rest)),
        }
    }
}

/// Extracts declared parameters from raw input.
///
/// A missing required parameter fails before any handler runs; a missing
/// optional one takes its declared default, or null without one. Raw keys
/// with no matching declaration are ignored. String inputs (the only form
/// the CLI produces) are coerced to the declared kind.
pub fn bind(parameters: &[Parameter], raw: &Map<String, Value>) -> Result<Params, AppletError> {
    let mut bound = Params::new();
    for parameter in parameters {
        let provided = raw.get(parameter.name()).filter(|value| !value.is_null());
        let value = match provided {
            Some(value) => coerce(parameter, value)?,
            None if parameter.required => {
                return Err(AppletError::MissingParameter(parameter.name().to_owned()));
            }
            None => parameter.default.clone().unwrap_or(Value::Null),
        };
        bound.insert(parameter.name().to_owned(), value);
    }
    Ok(bound)
}

fn coerce(parameter: &Parameter, value: &Value) -> Result<Value, AppletError> {
    let mismatch = || AppletError::InvalidValue {
        name: parameter.name().to_owned(),
        expected: parameter.kind,
    };
    match parameter.kind {
        ParamKind::Str => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        ParamKind::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => s.parse::<i64>().map(Value::from).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ParamKind::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s.parse::<f64>().map(Value::from).map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ParamKind::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
    }
}
