//! Reference-range filtering for resolved observation data
//!
//! A sibling utility to the resolver: pure predicates over the same JSON
//! record shapes, used to drop reference ranges that do not apply to a given
//! patient's age or gender. Not invoked by the resolver itself.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde_json::Value;

use crate::error::ResolveError;

/// Extension url marking a range as gender-specific
pub const ADMINISTRATIVE_GENDER_URL: &str = "http://hl7.org/fhir/ValueSet/administrative-gender";

/// FHIR quantity comparators, plus equality.
///
/// An explicit closed mapping from comparator tag to predicate; constructed
/// values are plain `Copy` tags with no shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityComparator {
    /// `<`
    LessThan,
    /// `<=`
    LessOrEqual,
    /// `>=`
    GreaterOrEqual,
    /// `>`
    GreaterThan,
    /// `==`
    Equal,
}

impl QuantityComparator {
    /// Default comparator for a range's low bound
    pub const LOW_DEFAULT: QuantityComparator = QuantityComparator::GreaterOrEqual;
    /// Default comparator for a range's high bound
    pub const HIGH_DEFAULT: QuantityComparator = QuantityComparator::LessOrEqual;

    /// Apply the comparator as a pure binary predicate
    pub fn compare(self, a: f64, b: f64) -> bool {
        match self {
            QuantityComparator::LessThan => a < b,
            QuantityComparator::LessOrEqual => a <= b,
            QuantityComparator::GreaterOrEqual => a >= b,
            QuantityComparator::GreaterThan => a > b,
            QuantityComparator::Equal => a == b,
        }
    }

    /// The comparator's FHIR token
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantityComparator::LessThan => "<",
            QuantityComparator::LessOrEqual => "<=",
            QuantityComparator::GreaterOrEqual => ">=",
            QuantityComparator::GreaterThan => ">",
            QuantityComparator::Equal => "==",
        }
    }
}

impl fmt::Display for QuantityComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantityComparator {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(QuantityComparator::LessThan),
            "<=" => Ok(QuantityComparator::LessOrEqual),
            ">=" => Ok(QuantityComparator::GreaterOrEqual),
            ">" => Ok(QuantityComparator::GreaterThan),
            "==" => Ok(QuantityComparator::Equal),
            other => Err(ResolveError::unsupported_comparator(other)),
        }
    }
}

/// The comparator declared on a quantity, falling back to `default` when the
/// field is absent or not a supported token.
fn comparator_or(quantity: &Value, default: QuantityComparator) -> QuantityComparator {
    match quantity.get("comparator").and_then(Value::as_str) {
        None => default,
        Some(token) => token.parse().unwrap_or_else(|_| {
            warn!("unknown quantity comparator '{token}', using {default}");
            default
        }),
    }
}

/// Convert an age quantity to years.
///
/// Supported UCUM codes: `mo` (months), `d` (days), `wk` (weeks); any other
/// code is taken as years. A quantity without a code or numeric value has no
/// year equivalent.
pub fn value_to_years(age_quantity: &Value) -> Option<f64> {
    let code = age_quantity.get("code")?.as_str()?;
    let value = age_quantity.get("value")?.as_f64()?;

    Some(match code {
        "mo" => value / 12.0,
        "d" => value / 365.0,
        "wk" => value * 7.0 / 365.0,
        _ => value,
    })
}

/// Whether a value fits in a range, honoring declared comparators and the
/// `>=` / `<=` bound defaults. A range with neither bound fits nothing.
pub fn value_in_range(value: f64, range: &Value) -> bool {
    let low = range
        .get("low")
        .and_then(|low| Some((low.get("value")?.as_f64()?, low)));
    let high = range
        .get("high")
        .and_then(|high| Some((high.get("value")?.as_f64()?, high)));

    match (low, high) {
        (Some((low_value, low)), Some((high_value, high))) => {
            comparator_or(low, QuantityComparator::LOW_DEFAULT).compare(value, low_value)
                && comparator_or(high, QuantityComparator::HIGH_DEFAULT).compare(value, high_value)
        }
        (Some((low_value, low)), None) => {
            comparator_or(low, QuantityComparator::LOW_DEFAULT).compare(value, low_value)
        }
        (None, Some((high_value, high))) => {
            comparator_or(high, QuantityComparator::HIGH_DEFAULT).compare(value, high_value)
        }
        (None, None) => false,
    }
}

/// Whether an age range applies to a patient of the given age in years.
///
/// Bounds carrying a UCUM code other than `a` (years) are converted to years
/// before comparing; a bound that cannot be converted never matches.
pub fn is_range_age_appropriate(range: &Value, patient_age_in_years: f64) -> bool {
    let bound_ok = |bound: Option<&Value>, default: QuantityComparator| -> bool {
        let Some(bound) = bound else {
            return true;
        };
        let value_in_years = if bound.get("code").and_then(Value::as_str) == Some("a") {
            bound.get("value").and_then(Value::as_f64)
        } else {
            value_to_years(bound)
        };
        match value_in_years {
            Some(bound_years) => {
                comparator_or(bound, default).compare(patient_age_in_years, bound_years)
            }
            None => false,
        }
    };

    bound_ok(range.get("low"), QuantityComparator::LOW_DEFAULT)
        && bound_ok(range.get("high"), QuantityComparator::HIGH_DEFAULT)
}

/// Filter out reference ranges that are age- or gender-specific and do not
/// apply to the given patient data.
///
/// Missing patient data disables the corresponding condition: without a
/// gender every gender-specific range applies, without an age every
/// age-specific range applies.
pub fn filter_ranges(
    reference_ranges: &[Value],
    patient_age_in_years: Option<f64>,
    patient_gender: Option<&str>,
) -> Vec<Value> {
    reference_ranges
        .iter()
        .filter(|range| {
            let gender_conditioned = range
                .get("modifierExtension")
                .and_then(Value::as_array)
                .and_then(|extensions| {
                    extensions.iter().find(|extension| {
                        extension.get("url").and_then(Value::as_str)
                            == Some(ADMINISTRATIVE_GENDER_URL)
                    })
                });

            let applies_gender_wise = match (patient_gender, gender_conditioned) {
                (Some(gender), Some(extension)) => {
                    extension.get("valueCode").and_then(Value::as_str) == Some(gender)
                }
                _ => true,
            };

            let applies_age_wise = match (range.get("age"), patient_age_in_years) {
                (Some(age_range), Some(age)) => is_range_age_appropriate(age_range, age),
                _ => true,
            };

            applies_gender_wise && applies_age_wise
        })
        .cloned()
        .collect()
}
