// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core value type for rule bindings and computed values

use super::resource::Resource;
use chrono::{DateTime, FixedOffset, NaiveDate};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Computed values produced by one rule firing, in write order
pub type ComputedValues = IndexMap<String, Value>;

/// Utility namespaces bound into every session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// The rule output map (`data.put`, `data.get`)
    Data,
    /// FHIRPath extraction helper (`fhirPath.extractValue`)
    FhirPath,
    /// Register helper functions (`service.retrieveRelatedResources`)
    Service,
    /// Date helper (`dates.daysBetween`)
    Dates,
    /// String helpers (`StringUtils.capitalize`)
    StringUtils,
    /// Numeric helpers (`Math.max`)
    Math,
}

impl Namespace {
    /// Binding name of the namespace
    pub fn binding_name(self) -> &'static str {
        match self {
            Namespace::Data => "data",
            Namespace::FhirPath => "fhirPath",
            Namespace::Service => "service",
            Namespace::Dates => "dates",
            Namespace::StringUtils => "StringUtils",
            Namespace::Math => "Math",
        }
    }

    /// All namespaces
    pub const ALL: [Namespace; 6] = [
        Namespace::Data,
        Namespace::FhirPath,
        Namespace::Service,
        Namespace::Dates,
        Namespace::StringUtils,
        Namespace::Math,
    ];
}

/// Value bound to a name or produced by an expression
///
/// The set is closed: expressions never see host objects, only these variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value (64-bit signed)
    Integer(i64),
    /// Decimal value with arbitrary precision
    Decimal(Decimal),
    /// String value
    String(String),
    /// Date value (without time)
    Date(NaiveDate),
    /// DateTime value with timezone
    DateTime(DateTime<FixedOffset>),
    /// FHIR resource (shared, never copied)
    Resource(Arc<Resource>),
    /// Complex non-resource FHIR data (HumanName, Reference, ...)
    Element(JsonValue),
    /// Ordered list of values
    List(Vec<Value>),
    /// Utility namespace
    Namespace(Namespace),
}

impl Value {
    /// Create a list value
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::List(values.into_iter().collect())
    }

    /// Create a list of resources
    pub fn resources<'a>(resources: impl IntoIterator<Item = &'a Arc<Resource>>) -> Self {
        Value::List(
            resources
                .into_iter()
                .map(|resource| Value::Resource(Arc::clone(resource)))
                .collect(),
        )
    }

    /// Convert a JSON value
    ///
    /// Objects carrying a `resourceType` become resources, other objects become
    /// elements. Strings are kept as strings, dates included.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    let text = n.to_string();
                    Decimal::from_str(&text)
                        .or_else(|_| Decimal::from_scientific(&text))
                        .map(Value::Decimal)
                        .unwrap_or(Value::String(text))
                }
            }
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(obj) if obj.contains_key("resourceType") => {
                match Resource::from_json(json.clone()) {
                    Ok(resource) => Value::Resource(Arc::new(resource)),
                    Err(_) => Value::Element(json.clone()),
                }
            }
            JsonValue::Object(_) => Value::Element(json.clone()),
        }
    }

    /// Convert to JSON for output
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null | Value::Namespace(_) => JsonValue::Null,
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Integer(i) => JsonValue::Number((*i).into()),
            Value::Decimal(d) => serde_json::Number::from_str(&d.normalize().to_string())
                .map(JsonValue::Number)
                .unwrap_or_else(|_| JsonValue::String(d.to_string())),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Date(d) => JsonValue::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            Value::Resource(resource) => resource.as_json().clone(),
            Value::Element(json) => json.clone(),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
        }
    }

    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Resource(_) => "Resource",
            Value::Element(_) => "Element",
            Value::List(_) => "List",
            Value::Namespace(_) => "Namespace",
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by conditions, `!`, `&&` and `||`
    ///
    /// Null, `false`, zero, the empty string and the empty list are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Decimal(d) => !d.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            _ => true,
        }
    }

    /// Get as boolean if the value is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer if the value is an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as decimal, widening integers
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as string slice if the value is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the resource if the value is one
    pub fn as_resource(&self) -> Option<&Arc<Resource>> {
        match self {
            Value::Resource(resource) => Some(resource),
            _ => None,
        }
    }

    /// Get list items if the value is a list
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert to a list: null becomes empty, scalars become singletons
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            other => vec![other],
        }
    }

    /// Resources contained in the value (a single resource or a list of them)
    pub fn resource_items(&self) -> Vec<Arc<Resource>> {
        match self {
            Value::Resource(resource) => vec![Arc::clone(resource)],
            Value::List(items) => items
                .iter()
                .filter_map(|item| item.as_resource().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Read a member of a resource or element
    ///
    /// Returns `None` when the value has no members or the member is absent.
    /// Choice-type members (`value` for `valueQuantity`) are resolved.
    pub fn member(&self, name: &str) -> Option<Value> {
        let json = match self {
            Value::Resource(resource) => resource.get_property(name),
            Value::Element(json) => super::resource::json_property(json, name),
            _ => None,
        }?;
        Some(Value::from_json(json))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{}", d.normalize()),
            Value::String(s) => f.write_str(s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Value::Resource(resource) => f.write_str(&resource.reference()),
            Value::Element(json) => write!(f, "{json}"),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|item| item.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Namespace(ns) => f.write_str(ns.binding_name()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<Arc<Resource>> for Value {
    fn from(value: Arc<Resource>) -> Self {
        Value::Resource(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion() {
        assert_eq!(Value::from_json(&json!(true)), Value::Boolean(true));
        assert_eq!(Value::from_json(&json!(42)), Value::Integer(42));
        assert_eq!(
            Value::from_json(&json!(1.5)),
            Value::Decimal(Decimal::new(15, 1))
        );
        assert_eq!(
            Value::from_json(&json!("2024-01-01")),
            Value::String("2024-01-01".into())
        );
        assert!(matches!(
            Value::from_json(&json!({"resourceType": "Patient", "id": "p1"})),
            Value::Resource(_)
        ));
        assert!(matches!(
            Value::from_json(&json!({"family": "Doe"})),
            Value::Element(_)
        ));
        assert_eq!(
            Value::from_json(&json!([1, 2])),
            Value::List(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(!Value::List(Vec::new()).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
        assert!(Value::Integer(3).is_truthy());
    }

    #[test]
    fn test_member_access() {
        let patient = Value::from_json(&json!({
            "resourceType": "Patient",
            "id": "p1",
            "name": [{"family": "Doe", "given": ["Jane"]}],
            "deceasedBoolean": false
        }));
        let names = patient.member("name").unwrap();
        let first = names.as_list().unwrap()[0].clone();
        assert_eq!(first.member("family"), Some(Value::String("Doe".into())));
        assert_eq!(patient.member("deceased"), Some(Value::Boolean(false)));
        assert_eq!(patient.member("gender"), None);
    }

    #[test]
    fn test_display_and_serialize() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Decimal(Decimal::new(250, 2)).to_string(), "2.5");
        assert_eq!(
            serde_json::to_value(Value::list([Value::Integer(1), Value::from("a")])).unwrap(),
            json!([1, "a"])
        );
    }
}
