//! Typed-data validation
//!
//! Deep structural checks for EIP-712 style payloads (`types` + `domain` +
//! `message`) before they are shown to a human approver or handed to a
//! signer.
//!
//! ## Rules
//!
//! 1. Without an explicit `primaryType`, the root is the first type (in
//!    declaration order, ignoring `EIP712Domain`) that no other type
//!    references.
//! 2. The root must be declared.
//! 3. Every declared field must be present, except `bytes` and `string`
//!    fields which may be empty or absent.
//! 4. `address` fields must be `0x` followed by 40 hex digits.
//! 5. `T[]` / `T[N]` fields must be arrays (of length `N`), and each element
//!    is validated against `T`.
//!
//! Errors carry a path such as `items[1].token`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Name of the domain metadata type
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// Maximum struct/array nesting depth accepted
pub const MAX_DEPTH: usize = 64;

/// Typed-data validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypedDataError {
    /// Payload is not a JSON object (or JSON text of one)
    #[error("typed data must be a JSON object")]
    NotAnObject,

    /// `types` is missing or malformed
    #[error("invalid types: {0}")]
    InvalidTypes(String),

    /// Declared primary type does not exist
    #[error("Primary type {0} is not defined")]
    UnknownPrimaryType(String),

    /// No root type could be inferred
    #[error("cannot infer primary type: {0}")]
    NoRootType(String),

    /// A required field is absent
    #[error("Required field {0} is missing")]
    MissingField(String),

    /// Value at path is not an object
    #[error("Expected object at {0}")]
    ExpectedObject(String),

    /// Value at path is not an array
    #[error("Expected array at {0}")]
    ExpectedArray(String),

    /// Fixed-size array has the wrong length
    #[error("Expected {expected} elements at {path}, found {found}")]
    ArrayLength {
        /// Field path
        path: String,
        /// Declared length
        expected: usize,
        /// Actual length
        found: usize,
    },

    /// Address field is malformed
    #[error("Invalid address at {0}")]
    InvalidAddress(String),

    /// Field type is neither primitive nor declared
    #[error("Unknown type {kind} at {path}")]
    UnknownType {
        /// Field path
        path: String,
        /// Offending type name
        kind: String,
    },

    /// Nesting exceeds [`MAX_DEPTH`]
    #[error("Maximum nesting depth exceeded at {0}")]
    TooDeep(String),
}

/// One field of a struct type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedField {
    /// Field name
    pub name: String,
    /// Field type (e.g. `address`, `Mail`, `Item[]`)
    #[serde(rename = "type")]
    pub kind: String,
}

/// A parsed typed-data payload
#[derive(Debug, Clone, PartialEq)]
pub struct TypedData {
    /// Struct types in declaration order
    types: Vec<(String, Vec<TypedField>)>,
    /// Explicit root type, if given
    primary_type: Option<String>,
    /// Domain object
    domain: Value,
    /// Message object
    message: Value,
}

impl TypedData {
    /// Parse from a JSON value. String values are parsed as JSON text, as
    /// `eth_signTypedData_v4` callers usually send them.
    pub fn from_value(value: &Value) -> Result<Self, TypedDataError> {
        match value {
            Value::String(text) => Self::parse(text),
            Value::Object(map) => Self::from_map(map),
            _ => Err(TypedDataError::NotAnObject),
        }
    }

    /// Parse from JSON text
    pub fn parse(text: &str) -> Result<Self, TypedDataError> {
        let value: Value = serde_json::from_str(text).map_err(|_| TypedDataError::NotAnObject)?;
        match &value {
            Value::Object(map) => Self::from_map(map),
            _ => Err(TypedDataError::NotAnObject),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self, TypedDataError> {
        let raw_types = map
            .get("types")
            .ok_or_else(|| TypedDataError::MissingField("types".into()))?
            .as_object()
            .ok_or_else(|| TypedDataError::InvalidTypes("types must be an object".into()))?;

        let mut types = Vec::with_capacity(raw_types.len());
        for (name, fields) in raw_types {
            let fields: Vec<TypedField> = serde_json::from_value(fields.clone()).map_err(|_| {
                TypedDataError::InvalidTypes(format!("fields of {} must be a list of {{name, type}}", name))
            })?;
            types.push((name.clone(), fields));
        }

        let primary_type = match map.get("primaryType") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name.clone()),
            Some(_) => {
                return Err(TypedDataError::InvalidTypes(
                    "primaryType must be a string".into(),
                ));
            }
        };

        let domain = map
            .get("domain")
            .cloned()
            .ok_or_else(|| TypedDataError::MissingField("domain".into()))?;
        if !domain.is_object() {
            return Err(TypedDataError::ExpectedObject("domain".into()));
        }

        let message = map
            .get("message")
            .cloned()
            .ok_or_else(|| TypedDataError::MissingField("message".into()))?;

        Ok(Self {
            types,
            primary_type,
            domain,
            message,
        })
    }

    /// Declared type names in declaration order
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|(name, _)| name.as_str())
    }

    /// Fields of a declared type
    pub fn fields(&self, name: &str) -> Option<&[TypedField]> {
        self.types
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, fields)| fields.as_slice())
    }

    /// Domain object
    pub fn domain(&self) -> &Value {
        &self.domain
    }

    /// Message object
    pub fn message(&self) -> &Value {
        &self.message
    }

    /// The declared primary type, or the inferred one
    pub fn primary_type(&self) -> Result<&str, TypedDataError> {
        match &self.primary_type {
            Some(name) => {
                if self.fields(name).is_none() {
                    return Err(TypedDataError::UnknownPrimaryType(name.clone()));
                }
                Ok(name)
            }
            None => self.infer_primary_type(),
        }
    }

    /// Infer the root: the first non-domain type no other type references
    pub fn infer_primary_type(&self) -> Result<&str, TypedDataError> {
        let mut referenced = HashSet::new();
        for (name, fields) in &self.types {
            if name == DOMAIN_TYPE {
                continue;
            }
            for field in fields {
                let base = base_type(&field.kind);
                if base != name.as_str() {
                    referenced.insert(base);
                }
            }
        }

        self.types
            .iter()
            .map(|(name, _)| name.as_str())
            .find(|name| *name != DOMAIN_TYPE && !referenced.contains(name))
            .ok_or_else(|| TypedDataError::NoRootType(self.describe_cycle()))
    }

    fn describe_cycle(&self) -> String {
        let start = match self.type_names().find(|name| *name != DOMAIN_TYPE) {
            Some(name) => name,
            None => return "no struct types declared".into(),
        };

        // Follow the first struct reference out of each type until one repeats
        let mut trail: Vec<&str> = vec![start];
        let mut current = start;
        loop {
            let next = self.fields(current).and_then(|fields| {
                fields
                    .iter()
                    .map(|f| base_type(&f.kind))
                    .find(|base| *base != current && *base != DOMAIN_TYPE && self.fields(base).is_some())
            });
            let Some(next) = next else {
                return format!("every type is referenced by another ({})", trail.join(", "));
            };
            if let Some(pos) = trail.iter().position(|seen| *seen == next) {
                let mut cycle: Vec<&str> = trail[pos..].to_vec();
                cycle.push(next);
                return format!("types form a cycle ({})", cycle.join(" -> "));
            }
            trail.push(next);
            current = next;
        }
    }

    /// Validate the whole payload, returning the root type name
    pub fn validate(&self) -> Result<&str, TypedDataError> {
        let root = self.primary_type()?;
        if self.fields(DOMAIN_TYPE).is_some() {
            self.validate_struct(DOMAIN_TYPE, &self.domain, "domain", 0)?;
        }
        if root != DOMAIN_TYPE {
            self.validate_struct(root, &self.message, "", 0)?;
        }
        Ok(root)
    }

    fn validate_struct(
        &self,
        type_name: &str,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<(), TypedDataError> {
        if depth > MAX_DEPTH {
            return Err(TypedDataError::TooDeep(display_path(path, type_name)));
        }
        let object = value
            .as_object()
            .ok_or_else(|| TypedDataError::ExpectedObject(display_path(path, type_name)))?;
        let fields = self.fields(type_name).ok_or_else(|| TypedDataError::UnknownType {
            path: display_path(path, type_name),
            kind: type_name.to_string(),
        })?;

        for field in fields {
            let field_path = join_path(path, &field.name);
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if !may_be_empty(&field.kind) {
                        return Err(TypedDataError::MissingField(field_path));
                    }
                }
                Some(inner) => self.validate_value(&field.kind, inner, &field_path, depth + 1)?,
            }
        }
        Ok(())
    }

    fn validate_value(
        &self,
        kind: &str,
        value: &Value,
        path: &str,
        depth: usize,
    ) -> Result<(), TypedDataError> {
        if depth > MAX_DEPTH {
            return Err(TypedDataError::TooDeep(path.to_string()));
        }

        if let Some((element, length)) = split_array(kind) {
            let items = value
                .as_array()
                .ok_or_else(|| TypedDataError::ExpectedArray(path.to_string()))?;
            if let Some(length) = length {
                let expected = length.parse::<usize>().map_err(|_| TypedDataError::UnknownType {
                    path: path.to_string(),
                    kind: kind.to_string(),
                })?;
                if items.len() != expected {
                    return Err(TypedDataError::ArrayLength {
                        path: path.to_string(),
                        expected,
                        found: items.len(),
                    });
                }
            }
            for (i, item) in items.iter().enumerate() {
                self.validate_value(element, item, &format!("{}[{}]", path, i), depth + 1)?;
            }
            return Ok(());
        }

        if kind == "address" {
            return match value.as_str() {
                Some(address) if is_valid_address(address) => Ok(()),
                _ => Err(TypedDataError::InvalidAddress(path.to_string())),
            };
        }

        if self.fields(kind).is_some() {
            return self.validate_struct(kind, value, path, depth);
        }

        if is_primitive(kind) {
            Ok(())
        } else {
            Err(TypedDataError::UnknownType {
                path: path.to_string(),
                kind: kind.to_string(),
            })
        }
    }
}

/// Validate a typed-data payload, returning the root type name
pub fn validate(value: &Value) -> Result<String, TypedDataError> {
    let data = TypedData::from_value(value)?;
    data.validate().map(str::to_string)
}

/// Check the canonical address format: `0x` + 40 hex digits
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(digits) => digits.len() == 40 && hex::decode(digits).is_ok(),
        None => false,
    }
}

/// Strip every array suffix: `Item[2][]` -> `Item`
fn base_type(kind: &str) -> &str {
    match kind.find('[') {
        Some(idx) => &kind[..idx],
        None => kind,
    }
}

/// Split the outermost array suffix: `Item[2][]` -> (`Item[2]`, None)
fn split_array(kind: &str) -> Option<(&str, Option<&str>)> {
    let inner = kind.strip_suffix(']')?;
    let open = inner.rfind('[')?;
    let length = &inner[open + 1..];
    Some((&inner[..open], (!length.is_empty()).then_some(length)))
}

fn may_be_empty(kind: &str) -> bool {
    kind == "bytes" || kind == "string"
}

fn is_primitive(kind: &str) -> bool {
    let sized = |prefix: &str, max: u32| {
        kind.strip_prefix(prefix).is_some_and(|bits| {
            bits.is_empty() || bits.parse::<u32>().is_ok_and(|n| n > 0 && n <= max)
        })
    };
    matches!(kind, "bool" | "string" | "bytes" | "address")
        || sized("uint", 256)
        || sized("int", 256)
        || (kind != "bytes" && sized("bytes", 32))
}

fn join_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}

fn display_path(path: &str, type_name: &str) -> String {
    if path.is_empty() {
        type_name.to_string()
    } else {
        path.to_string()
    }
}

/// Collect every declared type reachable from `root`, for diagnostics
pub fn reachable_types<'a>(data: &'a TypedData, root: &'a str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(name) = stack.pop() {
        if !seen.insert(name) {
            continue;
        }
        order.push(name);
        if let Some(fields) = data.fields(name) {
            for field in fields.iter().rev() {
                let base = base_type(&field.kind);
                if data.fields(base).is_some() {
                    stack.push(base);
                }
            }
        }
    }
    order
}
