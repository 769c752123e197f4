//! End-to-end resolution over a realistic lab-report bundle
//!
//! The fixture mirrors the demo data the resolver was written against: one
//! DiagnosticOrder (identifier value "123456"), its DiagnosticReport, and 75
//! observations grouped into 16 top-level result entries.

use octofhir_bundle::{Bundle, ResolveError, resolve_order_and_report_references};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const GROUP_COUNT: usize = 16;
const TOTAL_OBSERVATIONS: usize = 75;

fn demo_records() -> Vec<Value> {
    let mut records = vec![
        json!({
            "resourceType": "DiagnosticOrder",
            "id": "order-1",
            "identifier": [{"value": "123456"}],
            "orderer": {"reference": "Practitioner/pract-1"},
            "subject": {"reference": "Patient/pat-1"},
            "status": "completed",
        }),
        json!({
            "resourceType": "Practitioner",
            "id": "pract-1",
            "name": {"family": ["Osler"], "given": ["William"]},
        }),
        json!({
            "resourceType": "Patient",
            "id": "pat-1",
            "gender": "female",
            "birthDate": "1987-02-20",
        }),
        json!({
            "resourceType": "Organization",
            "id": "org-1",
            "name": "Central Clinical Laboratory",
        }),
    ];

    let mut result_entries = Vec::new();
    let mut observations = Vec::new();

    for group in 0..GROUP_COUNT {
        let group_id = format!("obs-{group}");
        // 11 groups of 4 members and 5 of 3 make 59 members, 75 total
        let member_count = if group < 11 { 4 } else { 3 };

        let mut related = Vec::new();
        for member in 0..member_count {
            let member_id = format!("{group_id}-{member}");
            observations.push(json!({
                "resourceType": "Observation",
                "id": member_id,
                "code": {"text": format!("analyte {group}.{member}")},
                "valueQuantity": {"value": 10 * group + member, "unit": "mg/dL"},
            }));
            related.push(json!({
                "type": "has-member",
                "target": {"reference": format!("Observation/{member_id}")},
            }));
        }

        observations.push(json!({
            "resourceType": "Observation",
            "id": group_id,
            "code": {"text": format!("panel {group}")},
            "related": related,
        }));
        result_entries.push(json!({"reference": format!("Observation/{group_id}")}));
    }

    records.push(json!({
        "resourceType": "DiagnosticReport",
        "id": "report-1",
        "requestDetail": [{"reference": "DiagnosticOrder/order-1"}],
        "subject": {"reference": "Patient/pat-1"},
        "performer": {"reference": "Organization/org-1"},
        "result": result_entries,
    }));
    records.extend(observations);
    records
}

fn demo_bundle() -> Bundle {
    Bundle::from_records(demo_records())
}

#[test]
fn embeds_referenced_resources_end_to_end() {
    let bundle = demo_bundle();
    let resolved = resolve_order_and_report_references(&bundle, Some("123456")).unwrap();

    assert_eq!(resolved.observations.len(), GROUP_COUNT);
    for observation in &resolved.observations {
        assert_eq!(observation["resourceType"], json!("Observation"));
    }

    assert_eq!(
        resolved.diagnostic_order["identifier"][0]["value"],
        json!("123456")
    );
    assert_eq!(
        resolved.diagnostic_report["requestDetail"][0]["identifier"][0]["value"],
        json!("123456")
    );
}

#[test]
fn fixture_has_expected_observation_count() {
    let observations = demo_records()
        .iter()
        .filter(|r| r["resourceType"] == json!("Observation"))
        .count();
    assert_eq!(observations, TOTAL_OBSERVATIONS);
}

#[test]
fn resolving_does_not_mutate_the_input_bundle() {
    let records = demo_records();
    let bundle = Bundle::from_records(records.clone());

    resolve_order_and_report_references(&bundle, Some("123456")).unwrap();

    let after: Vec<Value> = bundle.records().cloned().collect();
    assert_eq!(after, records);
}

#[test]
fn output_carries_no_reference_shaped_leftovers() {
    let bundle = demo_bundle();
    let resolved = resolve_order_and_report_references(&bundle, Some("123456")).unwrap();

    assert_eq!(
        resolved.diagnostic_order["orderer"]["resourceType"],
        json!("Practitioner")
    );
    assert_eq!(
        resolved.diagnostic_order["subject"]["resourceType"],
        json!("Patient")
    );
    assert_eq!(
        resolved.diagnostic_report["subject"]["resourceType"],
        json!("Patient")
    );
    assert_eq!(
        resolved.diagnostic_report["performer"]["resourceType"],
        json!("Organization")
    );

    for observation in &resolved.observations {
        let related = observation["related"].as_array().unwrap();
        assert!(!related.is_empty());
        for entry in related {
            // full embedded record, not a {"reference": ...} leftover
            assert_eq!(entry["target"]["resourceType"], json!("Observation"));
            assert!(entry["target"].get("reference").is_none());
        }
    }
}

#[test]
fn omitting_the_selector_picks_the_only_order() {
    let bundle = demo_bundle();
    let implicit = resolve_order_and_report_references(&bundle, None).unwrap();
    let explicit = resolve_order_and_report_references(&bundle, Some("123456")).unwrap();
    assert_eq!(implicit, explicit);
}

#[test]
fn unknown_selector_fails_with_not_found() {
    let bundle = demo_bundle();
    let err = resolve_order_and_report_references(&bundle, Some("000000")).unwrap_err();
    assert_eq!(err, ResolveError::not_found("DiagnosticOrder", "000000"));
}

#[test]
fn repeated_resolutions_share_no_mutable_substructure() {
    let bundle = demo_bundle();
    let mut first = resolve_order_and_report_references(&bundle, Some("123456")).unwrap();
    let second = resolve_order_and_report_references(&bundle, Some("123456")).unwrap();
    assert_eq!(first, second);

    first.diagnostic_order["subject"]["gender"] = json!("male");
    first.observations[0]["related"][0]["target"]["code"] = json!({"text": "tampered"});

    assert_eq!(second.diagnostic_order["subject"]["gender"], json!("female"));
    assert_eq!(
        second.observations[0]["related"][0]["target"]["code"]["text"],
        json!("analyte 0.0")
    );
}

#[test]
fn observations_equal_report_result() {
    let bundle = demo_bundle();
    let resolved = resolve_order_and_report_references(&bundle, Some("123456")).unwrap();
    assert_eq!(
        Value::Array(resolved.observations.clone()),
        resolved.diagnostic_report["result"]
    );
}

#[test]
fn serialized_output_uses_renderer_field_names() {
    let bundle = demo_bundle();
    let resolved = resolve_order_and_report_references(&bundle, Some("123456")).unwrap();

    let serialized = serde_json::to_value(&resolved).unwrap();
    let keys: Vec<&str> = serialized.as_object().unwrap().keys().map(String::as_str).collect();
    assert!(keys.contains(&"diagnosticOrder"));
    assert!(keys.contains(&"diagnosticReport"));
    assert!(keys.contains(&"observations"));
}

#[test]
fn resolves_from_a_full_bundle_value() {
    let entries: Vec<Value> = demo_records()
        .into_iter()
        .map(|resource| json!({"resource": resource}))
        .collect();
    let bundle = Bundle::from_json(&json!({
        "resourceType": "Bundle",
        "type": "collection",
        "entry": entries,
    }))
    .unwrap();

    let resolved = resolve_order_and_report_references(&bundle, Some("123456")).unwrap();
    assert_eq!(resolved.observations.len(), GROUP_COUNT);
}
