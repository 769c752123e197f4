//! Bundle resolution: embedding referenced records into a materialized graph

use log::debug;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bundle::Bundle;
use crate::error::{ResolveError, Result};
use crate::resource::{ResourceType, referenced_id};

/// The fully materialized output of one resolution call.
///
/// Field names serialize as `diagnosticOrder` / `diagnosticReport` /
/// `observations`, the shape the rendering layer consumes. `observations`
/// holds the same content as `diagnostic_report["result"]`, as an
/// independently owned collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBundle {
    /// The root order with `orderer` and `subject` embedded
    #[serde(rename = "diagnosticOrder")]
    pub diagnostic_order: Value,
    /// The matching report with all of its references embedded
    #[serde(rename = "diagnosticReport")]
    pub diagnostic_report: Value,
    /// The report's resolved result observations
    pub observations: Vec<Value>,
}

/// Resolves references inside a bundle, starting from a DiagnosticOrder.
///
/// The resolver only borrows the bundle and never mutates it; every embedded
/// record is a deep copy, so repeated or concurrent resolutions over the
/// same bundle are safe.
pub struct BundleResolver<'b> {
    bundle: &'b Bundle,
}

impl<'b> BundleResolver<'b> {
    /// Create a resolver over the given bundle
    pub fn new(bundle: &'b Bundle) -> Self {
        Self { bundle }
    }

    /// Resolve all references starting from a DiagnosticOrder.
    ///
    /// With `order_identifier_value` given, the root order is the first
    /// DiagnosticOrder whose `identifier[0].value` equals it; otherwise the
    /// first DiagnosticOrder in bundle order is used.
    pub fn resolve_order_and_report_references(
        &self,
        order_identifier_value: Option<&str>,
    ) -> Result<ResolvedBundle> {
        let diagnostic_order = match order_identifier_value {
            None => self.resolve_first_order()?,
            Some(value) => self.resolve_order_by_identifier(value)?,
        };

        let diagnostic_report = self.resolve_report(&diagnostic_order)?;
        let observations = diagnostic_report
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(ResolvedBundle {
            diagnostic_order,
            diagnostic_report,
            observations,
        })
    }

    /// Root order selection without a selector: first DiagnosticOrder in
    /// bundle order.
    fn resolve_first_order(&self) -> Result<Value> {
        let raw = self
            .bundle
            .find_all(ResourceType::DiagnosticOrder)
            .next()
            .ok_or_else(|| ResolveError::not_found("DiagnosticOrder", "first in bundle"))?;

        let mut order = raw.clone();
        self.resolve_order_fields(&mut order)?;
        Ok(order)
    }

    /// Root order selection by identifier value: first DiagnosticOrder whose
    /// `identifier[0].value` equals the selector.
    fn resolve_order_by_identifier(&self, identifier_value: &str) -> Result<Value> {
        let raw = self
            .bundle
            .find_first(ResourceType::DiagnosticOrder, |order| {
                order
                    .get("identifier")
                    .and_then(|identifiers| identifiers.get(0))
                    .and_then(|identifier| identifier.get("value"))
                    .and_then(Value::as_str)
                    == Some(identifier_value)
            })
            .ok_or_else(|| ResolveError::not_found("DiagnosticOrder", identifier_value))?;

        let mut order = raw.clone();
        self.resolve_order_fields(&mut order)?;
        Ok(order)
    }

    /// Internal order lookup by record id, used for a report's request
    /// entries. Distinct from the identifier-value scan above.
    fn resolve_order_by_id(&self, id: &str) -> Result<Value> {
        let mut order = self
            .bundle
            .find_one(ResourceType::DiagnosticOrder, id)
            .cloned()
            .ok_or_else(|| ResolveError::not_found("DiagnosticOrder", id))?;

        self.resolve_order_fields(&mut order)?;
        Ok(order)
    }

    /// Embed an order's direct references in place, on the resolver's own
    /// deep copy.
    fn resolve_order_fields(&self, order: &mut Value) -> Result<()> {
        if !order.is_object() {
            return Err(ResolveError::invalid_input("DiagnosticOrder is not an object"));
        }

        // orderer is optional; an unresolvable one is dropped silently
        if order.get("orderer").is_some() {
            let resolved = order
                .get("orderer")
                .and_then(|orderer| orderer.get("reference"))
                .and_then(Value::as_str)
                .and_then(|reference| {
                    self.bundle
                        .resolve_reference(reference, ResourceType::Practitioner)
                });

            if let Some(obj) = order.as_object_mut() {
                match resolved {
                    Some(practitioner) => {
                        obj.insert("orderer".to_string(), practitioner);
                    }
                    None => {
                        obj.remove("orderer");
                    }
                }
            }
        }

        // subject is mandatory; an unresolvable one leaves the field absent
        self.embed_reference(order, "subject", ResourceType::Patient)
    }

    /// Replace a `{reference}`-shaped field with the resolved record, or drop
    /// the field when the target is not in the bundle. A field without a
    /// reference string is invalid input.
    fn embed_reference(
        &self,
        record: &mut Value,
        field: &str,
        resource_type: ResourceType,
    ) -> Result<()> {
        let reference = record
            .get(field)
            .and_then(|value| value.get("reference"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                ResolveError::invalid_input(format!("missing {field}.reference"))
            })?;

        let resolved = self.bundle.resolve_reference(&reference, resource_type);
        if let Some(obj) = record.as_object_mut() {
            match resolved {
                Some(value) => {
                    obj.insert(field.to_string(), value);
                }
                None => {
                    obj.remove(field);
                }
            }
        }
        Ok(())
    }

    /// Resolve the report seeded by the resolved root order: the first
    /// DiagnosticReport whose request list starts with a reference to it.
    fn resolve_report(&self, order: &Value) -> Result<Value> {
        let order_id = order
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ResolveError::invalid_input("DiagnosticOrder is missing an id"))?;
        let order_reference = format!("DiagnosticOrder/{order_id}");

        let raw = self
            .bundle
            .find_first(ResourceType::DiagnosticReport, |report| {
                request_list(report)
                    .and_then(|requests| requests.first())
                    .and_then(|request| request.get("reference"))
                    .and_then(Value::as_str)
                    == Some(order_reference.as_str())
            })
            .ok_or_else(|| ResolveError::not_found("DiagnosticReport", &order_reference))?;

        let mut report = raw.clone();

        let requests = request_list(&report)
            .cloned()
            .ok_or_else(|| ResolveError::invalid_input("DiagnosticReport has no requestDetail"))?;

        self.embed_reference(&mut report, "subject", ResourceType::Patient)?;
        self.embed_reference(&mut report, "performer", ResourceType::Organization)?;

        // every referenced order is independently resolved, not just the root
        let mut resolved_requests = Vec::with_capacity(requests.len());
        for request in &requests {
            let id = request
                .get("reference")
                .and_then(Value::as_str)
                .and_then(referenced_id)
                .ok_or_else(|| {
                    ResolveError::invalid_input(
                        "DiagnosticReport request entry has no resolvable reference",
                    )
                })?;
            resolved_requests.push(self.resolve_order_by_id(id)?);
        }

        let results = report
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut observations = Vec::with_capacity(results.len());
        for result in &results {
            let reference = result
                .get("reference")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ResolveError::invalid_input("DiagnosticReport result entry has no reference")
                })?;
            let id = referenced_id(reference).ok_or_else(|| {
                ResolveError::invalid_input(format!(
                    "result reference '{reference}' has no identifier suffix"
                ))
            })?;
            let mut observation = self
                .bundle
                .find_one(ResourceType::Observation, id)
                .cloned()
                .ok_or_else(|| ResolveError::not_found("Observation", reference))?;

            let mut visited = FxHashSet::default();
            self.resolve_related(&mut observation, &mut visited)?;
            observations.push(observation);
        }

        if let Some(obj) = report.as_object_mut() {
            // normalize the legacy field name away
            obj.remove("request");
            obj.insert("requestDetail".to_string(), Value::Array(resolved_requests));
            obj.insert("result".to_string(), Value::Array(observations));
        }

        Ok(report)
    }

    /// Recursively resolve an observation's `related` chain in place.
    ///
    /// `visited` carries the ids on the current resolution path; a target id
    /// already on the path means the data loops and resolution fails with
    /// [`ResolveError::CycleDetected`]. Ids are removed again on the way
    /// out, so diamond-shaped (acyclic) sharing resolves normally.
    fn resolve_related(&self, observation: &mut Value, visited: &mut FxHashSet<String>) -> Result<()> {
        let observation_id = observation
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned);

        if let Some(id) = &observation_id {
            visited.insert(id.clone());
        }

        let result = self.resolve_related_entries(observation, observation_id.as_deref(), visited);

        if let Some(id) = &observation_id {
            visited.remove(id);
        }

        result
    }

    fn resolve_related_entries(
        &self,
        observation: &mut Value,
        observation_id: Option<&str>,
        visited: &mut FxHashSet<String>,
    ) -> Result<()> {
        let Some(related) = observation.get("related").and_then(Value::as_array).cloned() else {
            return Ok(());
        };

        let mut resolved_entries = Vec::with_capacity(related.len());
        for entry in related {
            let target_id = entry
                .get("target")
                .and_then(|target| target.get("reference"))
                .and_then(Value::as_str)
                .and_then(referenced_id)
                .map(str::to_owned);

            let Some(target_id) = target_id else {
                // no resolvable target: pass the entry through unchanged
                resolved_entries.push(entry);
                continue;
            };

            if Some(target_id.as_str()) == observation_id {
                debug!("dropping self-referential related entry on Observation '{target_id}'");
                continue;
            }

            if visited.contains(target_id.as_str()) {
                return Err(ResolveError::cycle_detected(target_id));
            }

            let mut target = self
                .bundle
                .find_one(ResourceType::Observation, &target_id)
                .cloned()
                .ok_or_else(|| ResolveError::not_found("Observation", &target_id))?;
            self.resolve_related(&mut target, visited)?;

            let mut resolved = Map::new();
            if let Some(entry_type) = entry.get("type") {
                resolved.insert("type".to_string(), entry_type.clone());
            }
            resolved.insert("target".to_string(), target);
            resolved_entries.push(Value::Object(resolved));
        }

        if let Some(obj) = observation.as_object_mut() {
            obj.insert("related".to_string(), Value::Array(resolved_entries));
        }
        Ok(())
    }
}

/// The report's request list, preferring `requestDetail` over the legacy
/// `request` field name.
fn request_list(report: &Value) -> Option<&Vec<Value>> {
    report
        .get("requestDetail")
        .or_else(|| report.get("request"))
        .and_then(Value::as_array)
}

/// Convenience entry point over [`BundleResolver`].
pub fn resolve_order_and_report_references(
    bundle: &Bundle,
    order_identifier_value: Option<&str>,
) -> Result<ResolvedBundle> {
    BundleResolver::new(bundle).resolve_order_and_report_references(order_identifier_value)
}
