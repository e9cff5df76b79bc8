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

//! FHIR resource wrapper types

use crate::error::EngineError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A FHIR resource addressed by type and id
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// The JSON representation of the resource
    data: Value,
    /// Resource type, read from `resourceType`
    resource_type: String,
    /// Logical id, read from `id`
    id: Option<String>,
}

impl Resource {
    /// Create a resource from JSON
    ///
    /// Fails when the JSON is not an object with a string `resourceType`.
    pub fn from_json(data: Value) -> Result<Self, EngineError> {
        let resource_type = data
            .as_object()
            .and_then(|obj| obj.get("resourceType"))
            .and_then(|rt| rt.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| EngineError::InvalidResource {
                message: "missing resourceType".to_string(),
            })?;
        let id = data
            .get("id")
            .and_then(|id| id.as_str())
            .map(|s| s.to_string());

        Ok(Self {
            data,
            resource_type,
            id,
        })
    }

    /// Get a reference to the JSON data
    pub fn as_json(&self) -> &Value {
        &self.data
    }

    /// Get the JSON representation
    pub fn to_json(&self) -> Value {
        self.data.clone()
    }

    /// Get the resource type
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Get the raw id if present
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Logical id without type prefix or history suffix; empty when the resource has no id
    pub fn logical_id(&self) -> String {
        self.id
            .as_deref()
            .map(extract_logical_id)
            .unwrap_or_default()
    }

    /// Relative reference (`Type/id`) to this resource
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type, self.logical_id())
    }

    /// Get a property, resolving choice types (`value` finds `valueQuantity`)
    pub fn get_property(&self, path: &str) -> Option<&Value> {
        json_property(&self.data, path)
    }

    /// Check if the resource has a property
    pub fn has_property(&self, path: &str) -> bool {
        self.get_property(path).is_some()
    }
}

/// Read a property from a JSON object, resolving FHIR choice types
pub fn json_property<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let obj = json.as_object()?;
    if let Some(value) = obj.get(path) {
        return Some(value);
    }

    // Choice type: `value` -> `valueString`, `deceased` -> `deceasedBoolean`
    obj.iter()
        .find(|(key, _)| {
            key.strip_prefix(path)
                .is_some_and(|suffix| CHOICE_TYPE_SUFFIXES.contains(&suffix))
        })
        .map(|(_, value)| value)
}

const CHOICE_TYPE_SUFFIXES: &[&str] = &[
    "Boolean",
    "Integer",
    "Decimal",
    "String",
    "Date",
    "DateTime",
    "Time",
    "Instant",
    "Uri",
    "Url",
    "Canonical",
    "Code",
    "Id",
    "Markdown",
    "PositiveInt",
    "UnsignedInt",
    "Base64Binary",
    "Quantity",
    "CodeableConcept",
    "Coding",
    "Reference",
    "Period",
    "Range",
    "Ratio",
    "Age",
    "Duration",
    "Attachment",
    "Identifier",
    "SampledData",
    "Timing",
    "Annotation",
    "HumanName",
    "Address",
    "ContactPoint",
    "Money",
];

/// Extract the logical id from an id or a reference string
///
/// `Patient/123/_history/2` and `123` both yield `123`. Absolute URLs keep
/// only the id segment.
pub fn extract_logical_id(reference: &str) -> String {
    let without_history = match reference.find("/_history") {
        Some(index) => &reference[..index],
        None => reference,
    };
    without_history
        .rsplit('/')
        .next()
        .unwrap_or(without_history)
        .to_string()
}

/// Split a relative reference into resource type and logical id
pub fn split_reference(reference: &str) -> Option<(&str, String)> {
    let without_history = match reference.find("/_history") {
        Some(index) => &reference[..index],
        None => reference,
    };
    let mut segments = without_history.rsplitn(2, '/');
    let id = segments.next()?;
    let prefix = segments.next()?;
    let resource_type = prefix.rsplit('/').next().unwrap_or(prefix);
    if resource_type.is_empty() || id.is_empty() {
        return None;
    }
    Some((resource_type, id.to_string()))
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.data.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = Value::deserialize(deserializer)?;
        Resource::from_json(data).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<Value> for Resource {
    type Error = EngineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Resource::from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_identity() {
        let resource = Resource::from_json(json!({
            "resourceType": "CarePlan",
            "id": "CarePlan/cp-1/_history/3"
        }))
        .unwrap();
        assert_eq!(resource.resource_type(), "CarePlan");
        assert_eq!(resource.logical_id(), "cp-1");
        assert_eq!(resource.reference(), "CarePlan/cp-1");
    }

    #[test]
    fn test_missing_resource_type() {
        assert!(Resource::from_json(json!({"id": "x"})).is_err());
        assert!(Resource::from_json(json!("Patient")).is_err());
    }

    #[test]
    fn test_extract_logical_id() {
        assert_eq!(extract_logical_id("Patient/123"), "123");
        assert_eq!(extract_logical_id("123"), "123");
        assert_eq!(extract_logical_id("Patient/123/_history/1"), "123");
        assert_eq!(
            extract_logical_id("http://example.org/fhir/Patient/abc"),
            "abc"
        );
    }

    #[test]
    fn test_split_reference() {
        assert_eq!(
            split_reference("Patient/123"),
            Some(("Patient", "123".to_string()))
        );
        assert_eq!(
            split_reference("http://example.org/fhir/Group/g1/_history/2"),
            Some(("Group", "g1".to_string()))
        );
        assert_eq!(split_reference("123"), None);
    }

    #[test]
    fn test_choice_type_property() {
        let resource = Resource::from_json(json!({
            "resourceType": "Observation",
            "valueQuantity": {"value": 5}
        }))
        .unwrap();
        assert!(resource.get_property("value").is_some());
        assert!(resource.get_property("valueQuantity").is_some());
        assert!(!resource.has_property("status"));
    }
}
