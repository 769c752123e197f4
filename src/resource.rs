//! Supported resource types and record wrappers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResolveError;

/// The closed set of resource types the resolver understands.
///
/// Records of any other type may appear in a bundle; they are carried along
/// but never indexed or resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// A request for a diagnostic service
    DiagnosticOrder,
    /// A person with a formal responsibility in healthcare
    Practitioner,
    /// The subject of care
    Patient,
    /// A grouping of people or services
    Organization,
    /// Findings and interpretation of diagnostic tests
    DiagnosticReport,
    /// Measurements and simple assertions
    Observation,
}

impl ResourceType {
    /// The canonical resourceType string
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::DiagnosticOrder => "DiagnosticOrder",
            ResourceType::Practitioner => "Practitioner",
            ResourceType::Patient => "Patient",
            ResourceType::Organization => "Organization",
            ResourceType::DiagnosticReport => "DiagnosticReport",
            ResourceType::Observation => "Observation",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DiagnosticOrder" => Ok(ResourceType::DiagnosticOrder),
            "Practitioner" => Ok(ResourceType::Practitioner),
            "Patient" => Ok(ResourceType::Patient),
            "Organization" => Ok(ResourceType::Organization),
            "DiagnosticReport" => Ok(ResourceType::DiagnosticReport),
            "Observation" => Ok(ResourceType::Observation),
            other => Err(ResolveError::unsupported_resource_type(other)),
        }
    }
}

/// A single bundle record: its JSON representation plus the type and id
/// extracted once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The JSON representation of the record
    data: Value,
    /// Parsed resource type, `None` for unsupported types
    resource_type: Option<ResourceType>,
    /// The record id, if present
    id: Option<String>,
}

impl Record {
    /// Wrap a parsed JSON record
    pub fn from_json(data: Value) -> Self {
        let resource_type = data
            .as_object()
            .and_then(|obj| obj.get("resourceType"))
            .and_then(|rt| rt.as_str())
            .and_then(|s| s.parse().ok());

        let id = data
            .as_object()
            .and_then(|obj| obj.get("id"))
            .and_then(|id| id.as_str())
            .map(|s| s.to_string());

        Self {
            data,
            resource_type,
            id,
        }
    }

    /// Get a reference to the JSON data
    pub fn as_json(&self) -> &Value {
        &self.data
    }

    /// Get an independent deep copy of the JSON data
    pub fn to_json(&self) -> Value {
        self.data.clone()
    }

    /// Get the resource type, if it is one of the supported set
    pub fn resource_type(&self) -> Option<ResourceType> {
        self.resource_type
    }

    /// Get the record id, if present
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Extract the identifier from a reference string of the form `"Type/id"`.
///
/// The identifier is the text after the last `/`; a reference with no `/`
/// carries no identifier.
pub fn referenced_id(reference: &str) -> Option<&str> {
    reference.rfind('/').map(|slash| &reference[slash + 1..])
}
