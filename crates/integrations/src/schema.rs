//! Field schemas describing what each integration operation accepts.
//!
//! These records are pure data; a catalog of them is deserialised from JSON
//! by [`StaticRegistry`](crate::StaticRegistry).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Whether an operation starts a workflow or runs inside one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Trigger,
    Action,
}

// ---------------------------------------------------------------------------
// FieldType / FieldSpec
// ---------------------------------------------------------------------------

/// Value type accepted by a configuration field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Email,
    Url,
    /// Any JSON object or array.
    Json,
    /// One of a fixed list of string values.
    Options(Vec<String>),
}

impl FieldType {
    /// Returns `true` if `value` is an acceptable (non-missing) value for this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Text, Value::String(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Email, Value::String(s)) => looks_like_email(s),
            (Self::Url, Value::String(s)) => looks_like_url(s),
            (Self::Json, Value::Object(_) | Value::Array(_)) => true,
            (Self::Options(allowed), Value::String(s)) => allowed.iter().any(|a| a == s),
            _ => false,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Email => write!(f, "email"),
            Self::Url => write!(f, "url"),
            Self::Json => write!(f, "json"),
            Self::Options(values) => write!(f, "one of [{}]", values.join(", ")),
        }
    }
}

fn looks_like_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

fn looks_like_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.chars().any(char::is_whitespace))
}

/// One configuration field of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Fields listed under `requiredFields` are always required; this flag
    /// lets an entry under `optionalFields` opt in as well.
    #[serde(default)]
    pub required: bool,
}

// ---------------------------------------------------------------------------
// Field issues
// ---------------------------------------------------------------------------

/// Why a single configuration entry was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldProblem {
    /// The key is not declared by the operation's schema.
    UnknownField,
    /// The value does not match the declared type.
    TypeMismatch { expected: String },
}

/// A per-field configuration error, surfaced so the caller can correct and resubmit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: FieldProblem,
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.problem {
            FieldProblem::UnknownField => write!(f, "'{}': unknown field", self.field),
            FieldProblem::TypeMismatch { expected } => {
                write!(f, "'{}': expected {expected}", self.field)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// OperationSchema / IntegrationSpec
// ---------------------------------------------------------------------------

/// A trigger or action offered by an integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSchema {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub required_fields: Vec<FieldSpec>,
    #[serde(default)]
    pub optional_fields: Vec<FieldSpec>,
}

/// Outcome of checking a config map against an [`OperationSchema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCheck {
    /// Required fields that are absent, null, or blank.
    pub missing: Vec<String>,
}

impl ConfigCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

impl OperationSchema {
    fn field(&self, name: &str) -> Option<(&FieldSpec, bool)> {
        self.required_fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| (f, true))
            .or_else(|| {
                self.optional_fields
                    .iter()
                    .find(|f| f.name == name)
                    .map(|f| (f, f.required))
            })
    }

    /// Names of every field that must be filled in before the node is runnable.
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.required_fields
            .iter()
            .chain(self.optional_fields.iter().filter(|f| f.required))
            .map(|f| f.name.as_str())
    }

    /// Check `config` against this schema.
    ///
    /// Unknown keys and wrongly-typed values are errors, all reported at once
    /// in key order. Missing required values are not errors; they are listed
    /// in the returned [`ConfigCheck`] and keep the node incomplete.
    pub fn check(&self, config: &Map<String, Value>) -> Result<ConfigCheck, Vec<FieldIssue>> {
        let mut issues = Vec::new();

        for (key, value) in config {
            match self.field(key) {
                None => issues.push(FieldIssue {
                    field: key.clone(),
                    problem: FieldProblem::UnknownField,
                }),
                Some((spec, _)) => {
                    if !is_blank(value) && !spec.field_type.accepts(value) {
                        issues.push(FieldIssue {
                            field: key.clone(),
                            problem: FieldProblem::TypeMismatch {
                                expected: spec.field_type.to_string(),
                            },
                        });
                    }
                }
            }
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        let missing = self
            .required_names()
            .filter(|name| config.get(*name).map_or(true, is_blank))
            .map(str::to_owned)
            .collect();

        Ok(ConfigCheck { missing })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Catalog entry for one external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Whether nodes on this integration need a credential before they can run.
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub operations: Vec<OperationSchema>,
}

impl IntegrationSpec {
    pub fn operation(&self, operation_id: &str) -> Option<&OperationSchema> {
        self.operations.iter().find(|op| op.id == operation_id)
    }

    pub fn supports(&self, role: Role) -> bool {
        self.operations.iter().any(|op| op.role == role)
    }
}
