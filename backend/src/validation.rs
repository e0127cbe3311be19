//! Boundary checks for incoming applicant records.
//!
//! The request body is inspected as raw JSON so that every offending field is
//! reported at once, before any model runs.

use serde_json::{Map, Value};
use shared::{ApplicantRecord, Categorical};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid applicant record: {}", describe(.fields))]
pub struct ValidationErrors {
    /// Field name to reason.
    pub fields: BTreeMap<String, String>,
}

fn describe(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, reason)| format!("{}: {}", field, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    fn body(reason: &str) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("body".to_string(), reason.to_string());
        Self { fields }
    }
}

struct FieldReader<'a> {
    object: &'a Map<String, Value>,
    errors: BTreeMap<String, String>,
}

impl<'a> FieldReader<'a> {
    fn fail(&mut self, field: &str, reason: String) {
        self.errors.insert(field.to_string(), reason);
    }

    fn present(&mut self, field: &str) -> Option<&'a Value> {
        match self.object.get(field) {
            None | Some(Value::Null) => {
                self.fail(field, "field is required".to_string());
                None
            }
            Some(value) => Some(value),
        }
    }

    fn category<T: Categorical>(&mut self, field: &str) -> Option<T> {
        let value = self.present(field)?;
        let Some(raw) = value.as_str() else {
            self.fail(field, "expected a string".to_string());
            return None;
        };
        match raw.parse::<T>() {
            Ok(category) => Some(category),
            Err(_) => {
                self.fail(
                    field,
                    format!("unknown category '{}', expected one of {:?}", raw, T::LEVELS),
                );
                None
            }
        }
    }

    fn integer(&mut self, field: &str, range: RangeInclusive<i64>) -> Option<u32> {
        let value = self.present(field)?;
        let number = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            _ => None,
        };
        let Some(number) = number else {
            self.fail(field, "expected an integer".to_string());
            return None;
        };
        if !range.contains(&number) {
            let reason = if *range.end() == i64::from(u32::MAX) {
                format!("must be >= {}, got {}", range.start(), number)
            } else {
                format!("must be in [{}, {}], got {}", range.start(), range.end(), number)
            };
            self.fail(field, reason);
            return None;
        }
        u32::try_from(number).ok()
    }

    fn count(&mut self, field: &str) -> Option<u32> {
        self.integer(field, 0..=i64::from(u32::MAX))
    }

    fn flag(&mut self, field: &str) -> Option<u8> {
        self.integer(field, 0..=1).map(|v| v as u8)
    }
}

/// Checks every field of an applicant record and builds the typed record.
pub fn validate_applicant(body: &Value) -> Result<ApplicantRecord, ValidationErrors> {
    let Some(object) = body.as_object() else {
        return Err(ValidationErrors::body("expected a JSON object"));
    };
    let mut r = FieldReader {
        object,
        errors: BTreeMap::new(),
    };

    let sex = r.category("sex");
    let marrital_status = r.category("marrital_status");
    let age = r.integer("age", 18..=100);
    let n_of_liables = r.count("n_of_liables");
    let job = r.category("job");
    let foreign_worker = r.flag("foreign_worker");
    let present_employee_since = r.category("present_employee_since");
    let telephone = r.flag("telephone");
    let housing = r.category("housing");
    let present_residence_since = r.count("present_residence_since");
    let property = r.category("property");
    let checking_account = r.category("checking_account");
    let savings = r.category("savings");
    let credit_amount = r.count("credit_amount");
    let duration = r.integer("duration", 1..=120);
    let credit_history = r.integer("credit_history", 1..=5);
    let guarantors = r.category("guarantors");
    let other_installment_plans = r.category("other_installment_plans");
    let credits_at_bank = r.count("credits_at_bank");
    let purpose = r.category("purpose");

    if !r.errors.is_empty() {
        return Err(ValidationErrors { fields: r.errors });
    }

    let build = || {
        Some(ApplicantRecord {
            sex: sex?,
            marrital_status: marrital_status?,
            age: age?,
            n_of_liables: n_of_liables?,
            job: job?,
            foreign_worker: foreign_worker?,
            present_employee_since: present_employee_since?,
            telephone: telephone?,
            housing: housing?,
            present_residence_since: present_residence_since?,
            property: property?,
            checking_account: checking_account?,
            savings: savings?,
            credit_amount: credit_amount?,
            duration: duration?,
            credit_history: credit_history?,
            guarantors: guarantors?,
            other_installment_plans: other_installment_plans?,
            credits_at_bank: credits_at_bank?,
            purpose: purpose?,
        })
    };
    build().ok_or_else(|| ValidationErrors::body("incomplete record"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_body() -> Value {
        json!({
            "sex": "male",
            "marrital_status": "single",
            "age": 35,
            "n_of_liables": 1,
            "job": "qualified",
            "foreign_worker": 0,
            "present_employee_since": "1-4y",
            "telephone": 1,
            "housing": "own",
            "present_residence_since": 2,
            "property": "car or other",
            "checking_account": ">= 200 DM",
            "savings": "<100 DM",
            "credit_amount": 2000,
            "duration": 12,
            "credit_history": 3,
            "guarantors": "none",
            "other_installment_plans": "none",
            "credits_at_bank": 1,
            "purpose": "radio/television"
        })
    }

    fn with(field: &str, value: Value) -> Value {
        let mut body = sample_body();
        body[field] = value;
        body
    }

    #[test]
    fn accepts_complete_record() {
        let record = validate_applicant(&sample_body()).unwrap();
        assert_eq!(record.age, 35);
        assert_eq!(record.checking_account, shared::CheckingAccount::TwoHundredOrMore);
        assert_eq!(record.purpose, shared::Purpose::RadioTelevision);
    }

    #[test]
    fn age_bounds_are_inclusive() {
        assert!(validate_applicant(&with("age", json!(18))).is_ok());
        assert!(validate_applicant(&with("age", json!(100))).is_ok());

        for age in [17, 101] {
            let err = validate_applicant(&with("age", json!(age))).unwrap_err();
            assert_eq!(err.fields.len(), 1);
            assert!(err.fields["age"].contains("[18, 100]"));
        }
    }

    #[test]
    fn duration_and_credit_history_ranges() {
        assert!(validate_applicant(&with("duration", json!(0))).is_err());
        assert!(validate_applicant(&with("duration", json!(120))).is_ok());
        assert!(validate_applicant(&with("credit_history", json!(6))).is_err());
        assert!(validate_applicant(&with("credit_history", json!(1))).is_ok());
        assert!(validate_applicant(&with("foreign_worker", json!(2))).is_err());
        assert!(validate_applicant(&with("credit_amount", json!(-1))).is_err());
    }

    #[test]
    fn reports_every_offending_field() {
        let mut body = sample_body();
        let object = body.as_object_mut().unwrap();
        object.remove("housing");
        object.insert("purpose".into(), json!("vacation"));
        object.insert("age".into(), json!("thirty"));
        object.insert("telephone".into(), Value::Null);

        let err = validate_applicant(&body).unwrap_err();
        let fields: Vec<&str> = err.fields.keys().map(String::as_str).collect();
        assert_eq!(fields, ["age", "housing", "purpose", "telephone"]);
        assert!(err.fields["purpose"].contains("unknown category 'vacation'"));
        assert!(err.to_string().starts_with("Invalid applicant record: age: expected an integer"));
    }

    #[test]
    fn rejects_non_object_body() {
        let err = validate_applicant(&json!([1, 2, 3])).unwrap_err();
        assert!(err.fields.contains_key("body"));
    }
}
