//! Bundle record list and its lookup index

use log::debug;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{ResolveError, Result};
use crate::resource::{Record, ResourceType, referenced_id};

/// A flat, ordered collection of records with a (type, id) lookup index.
///
/// The bundle is immutable once built; all lookups hand out references into
/// it and all resolution downstream works on deep copies, so one bundle can
/// back any number of concurrent resolutions.
#[derive(Debug, Clone)]
pub struct Bundle {
    records: Vec<Record>,
    /// (type, id) -> record position; first occurrence wins
    id_index: FxHashMap<(ResourceType, String), usize>,
    /// type -> record positions in insertion order
    type_index: FxHashMap<ResourceType, Vec<usize>>,
}

impl Bundle {
    /// Build a bundle from an already-flattened record list.
    pub fn from_records(records: Vec<Value>) -> Self {
        let records: Vec<Record> = records.into_iter().map(Record::from_json).collect();

        let mut id_index = FxHashMap::default();
        let mut type_index: FxHashMap<ResourceType, Vec<usize>> = FxHashMap::default();

        for (position, record) in records.iter().enumerate() {
            let Some(resource_type) = record.resource_type() else {
                continue;
            };
            type_index.entry(resource_type).or_default().push(position);
            if let Some(id) = record.id() {
                id_index
                    .entry((resource_type, id.to_string()))
                    .or_insert(position);
            }
        }

        Self {
            records,
            id_index,
            type_index,
        }
    }

    /// Build a bundle from a parsed FHIR bundle value, plucking
    /// `entry[].resource`. Entries without a `resource` are skipped.
    pub fn from_json(bundle: &Value) -> Result<Self> {
        let entries = bundle
            .get("entry")
            .and_then(Value::as_array)
            .ok_or_else(|| ResolveError::invalid_input("bundle has no entry array"))?;

        let records = entries
            .iter()
            .filter_map(|entry| entry.get("resource"))
            .cloned()
            .collect();

        Ok(Self::from_records(records))
    }

    /// Number of records in the bundle
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the bundle holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, in bundle order
    pub fn records(&self) -> impl Iterator<Item = &Value> {
        self.records.iter().map(Record::as_json)
    }

    /// Look up a record by type and id. Absence is not an error.
    pub fn find_one(&self, resource_type: ResourceType, id: &str) -> Option<&Value> {
        self.id_index
            .get(&(resource_type, id.to_string()))
            .map(|&position| self.records[position].as_json())
    }

    /// First record of the given type matching the predicate, in bundle order.
    pub fn find_first<P>(&self, resource_type: ResourceType, predicate: P) -> Option<&Value>
    where
        P: Fn(&Value) -> bool,
    {
        self.find_all(resource_type).find(|record| predicate(*record))
    }

    /// All records of the given type, in bundle order.
    pub fn find_all(&self, resource_type: ResourceType) -> impl Iterator<Item = &Value> {
        self.type_index
            .get(&resource_type)
            .into_iter()
            .flatten()
            .map(|&position| self.records[position].as_json())
    }

    /// Resolve a reference string against records of the given type,
    /// returning a deep, independently-owned copy of the target.
    ///
    /// A reference with no `/` carries no identifier and resolves to `None`,
    /// as does an identifier absent from the bundle.
    pub fn resolve_reference(&self, reference: &str, resource_type: ResourceType) -> Option<Value> {
        let Some(id) = referenced_id(reference) else {
            debug!("reference '{reference}' has no identifier suffix");
            return None;
        };

        let resolved = self.find_one(resource_type, id).cloned();
        if resolved.is_none() {
            debug!("no {resource_type} with id '{id}' in bundle");
        }
        resolved
    }
}
