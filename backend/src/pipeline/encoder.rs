use lazy_static::lazy_static;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{
    ApplicantRecord, Categorical, CheckingAccount, EmploymentDuration, Guarantors, Housing,
    InstallmentPlans, Job, MaritalStatus, Property, Purpose, Savings, Sex,
};
use std::ops::Range;

lazy_static! {
    /// Schema compiled into this binary; artifacts must match it exactly.
    pub static ref CURRENT_SCHEMA: FeatureSchema = FeatureSchema::build();
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("Unseen category '{category}' for field '{field}'")]
    UnseenCategory { field: String, category: String },
    #[error("Field '{0}' is not part of the applicant record")]
    UnknownField(String),
    #[error("Field '{0}' has the wrong kind for its encoding")]
    KindMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Number(f64),
    Category(&'static str),
}

/// How one applicant field becomes one or more feature columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldEncoding {
    Numeric { field: String },
    /// Rank of the level in `levels`.
    Ordinal { field: String, levels: Vec<String> },
    /// One indicator column per category, named `field_category`.
    OneHot { field: String, categories: Vec<String> },
}

impl FieldEncoding {
    pub fn field(&self) -> &str {
        match self {
            FieldEncoding::Numeric { field }
            | FieldEncoding::Ordinal { field, .. }
            | FieldEncoding::OneHot { field, .. } => field,
        }
    }

    fn width(&self) -> usize {
        match self {
            FieldEncoding::OneHot { categories, .. } => categories.len(),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub fields: Vec<FieldEncoding>,
    pub columns: Vec<String>,
}

fn numeric(field: &str) -> FieldEncoding {
    FieldEncoding::Numeric {
        field: field.to_string(),
    }
}

fn ordinal<T: Categorical>(field: &str) -> FieldEncoding {
    FieldEncoding::Ordinal {
        field: field.to_string(),
        levels: T::LEVELS.iter().map(|l| l.to_string()).collect(),
    }
}

fn one_hot<T: Categorical>(field: &str) -> FieldEncoding {
    FieldEncoding::OneHot {
        field: field.to_string(),
        categories: T::LEVELS.iter().map(|l| l.to_string()).collect(),
    }
}

/// Every applicant field with its raw value, in record order.
pub fn raw_fields(r: &ApplicantRecord) -> [(&'static str, RawValue); 20] {
    use RawValue::{Category, Number};
    [
        ("sex", Category(r.sex.label())),
        ("marrital_status", Category(r.marrital_status.label())),
        ("age", Number(f64::from(r.age))),
        ("n_of_liables", Number(f64::from(r.n_of_liables))),
        ("job", Category(r.job.label())),
        ("foreign_worker", Number(f64::from(r.foreign_worker))),
        ("present_employee_since", Category(r.present_employee_since.label())),
        ("telephone", Number(f64::from(r.telephone))),
        ("housing", Category(r.housing.label())),
        ("present_residence_since", Number(f64::from(r.present_residence_since))),
        ("property", Category(r.property.label())),
        ("checking_account", Category(r.checking_account.label())),
        ("savings", Category(r.savings.label())),
        ("credit_amount", Number(f64::from(r.credit_amount))),
        ("duration", Number(f64::from(r.duration))),
        ("credit_history", Number(f64::from(r.credit_history))),
        ("guarantors", Category(r.guarantors.label())),
        ("other_installment_plans", Category(r.other_installment_plans.label())),
        ("credits_at_bank", Number(f64::from(r.credits_at_bank))),
        ("purpose", Category(r.purpose.label())),
    ]
}

impl FeatureSchema {
    fn build() -> Self {
        let fields = vec![
            ordinal::<Sex>("sex"),
            one_hot::<MaritalStatus>("marrital_status"),
            numeric("age"),
            numeric("n_of_liables"),
            ordinal::<Job>("job"),
            numeric("foreign_worker"),
            ordinal::<EmploymentDuration>("present_employee_since"),
            numeric("telephone"),
            one_hot::<Housing>("housing"),
            numeric("present_residence_since"),
            one_hot::<Property>("property"),
            ordinal::<CheckingAccount>("checking_account"),
            ordinal::<Savings>("savings"),
            numeric("credit_amount"),
            numeric("duration"),
            numeric("credit_history"),
            one_hot::<Guarantors>("guarantors"),
            one_hot::<InstallmentPlans>("other_installment_plans"),
            numeric("credits_at_bank"),
            one_hot::<Purpose>("purpose"),
        ];
        Self::from_fields(fields)
    }

    pub fn from_fields(fields: Vec<FieldEncoding>) -> Self {
        let columns = fields
            .iter()
            .flat_map(|encoding| match encoding {
                FieldEncoding::OneHot { field, categories } => categories
                    .iter()
                    .map(|c| format!("{}_{}", field, c))
                    .collect::<Vec<_>>(),
                other => vec![other.field().to_string()],
            })
            .collect();
        Self { fields, columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// SHA-256 over the serialized schema; changes whenever a column or level changes.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// Column range owned by each applicant field.
    pub fn field_groups(&self) -> Vec<(String, Range<usize>)> {
        let mut start = 0;
        self.fields
            .iter()
            .map(|encoding| {
                let end = start + encoding.width();
                let group = (encoding.field().to_string(), start..end);
                start = end;
                group
            })
            .collect()
    }

    pub fn encode(&self, record: &ApplicantRecord) -> Result<Array1<f64>, EncodeError> {
        let raw = raw_fields(record);
        let mut features = Vec::with_capacity(self.width());

        for encoding in &self.fields {
            let name = encoding.field();
            let value = raw
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| *value)
                .ok_or_else(|| EncodeError::UnknownField(name.to_string()))?;

            match (encoding, value) {
                (FieldEncoding::Numeric { .. }, RawValue::Number(n)) => features.push(n),
                (FieldEncoding::Ordinal { levels, .. }, RawValue::Category(category)) => {
                    let rank = position(levels, name, category)?;
                    features.push(rank as f64);
                }
                (FieldEncoding::OneHot { categories, .. }, RawValue::Category(category)) => {
                    let hot = position(categories, name, category)?;
                    features
                        .extend((0..categories.len()).map(|i| if i == hot { 1.0 } else { 0.0 }));
                }
                _ => return Err(EncodeError::KindMismatch(name.to_string())),
            }
        }

        Ok(Array1::from(features))
    }
}

fn position(levels: &[String], field: &str, category: &str) -> Result<usize, EncodeError> {
    levels
        .iter()
        .position(|level| level == category)
        .ok_or_else(|| EncodeError::UnseenCategory {
            field: field.to_string(),
            category: category.to_string(),
        })
}
