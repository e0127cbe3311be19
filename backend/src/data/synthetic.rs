//! Seeded generator for a German-credit-like applicant sample.
//!
//! Marginals roughly follow the public Statlog data; the label is drawn from a
//! latent logistic score over checking account, duration, amount, savings,
//! age, credit history and housing, which gives about 70% good payers.

use super::{Dataset, LabeledApplicant};
use crate::models::sigmoid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    ApplicantRecord, Categorical, CheckingAccount, EmploymentDuration, Guarantors, Housing,
    InstallmentPlans, Job, MaritalStatus, Property, Purpose, Savings, Sex,
};

fn weighted_index<R: Rng>(rng: &mut R, weights: &[f64]) -> usize {
    let total: f64 = weights.iter().sum();
    let mut draw = rng.random::<f64>() * total;
    for (idx, w) in weights.iter().enumerate() {
        if draw < *w {
            return idx;
        }
        draw -= w;
    }
    weights.len() - 1
}

fn pick<T: Categorical, R: Rng>(rng: &mut R, weights: &[f64]) -> T {
    T::ALL[weighted_index(rng, weights).min(T::ALL.len() - 1)]
}

fn rank<T: Categorical>(value: T) -> f64 {
    T::ALL.iter().position(|v| *v == value).unwrap_or(0) as f64
}

fn applicant<R: Rng>(rng: &mut R) -> ApplicantRecord {
    const DURATIONS: [u32; 8] = [6, 9, 12, 18, 24, 36, 48, 60];
    let amount = 250.0 + (-(1.0 - rng.random::<f64>()).ln()) * 3000.0;

    ApplicantRecord {
        sex: pick(rng, &[0.31, 0.69]),
        marrital_status: pick::<MaritalStatus, _>(rng, &[0.55, 0.35, 0.10]),
        age: 19 + (rng.random::<f64>().powf(1.6) * 56.0) as u32,
        n_of_liables: if rng.random_bool(0.85) { 1 } else { 2 },
        job: pick::<Job, _>(rng, &[0.02, 0.20, 0.63, 0.15]),
        foreign_worker: u8::from(rng.random_bool(0.96)),
        present_employee_since: pick::<EmploymentDuration, _>(rng, &[0.06, 0.17, 0.34, 0.17, 0.26]),
        telephone: u8::from(rng.random_bool(0.4)),
        housing: pick::<Housing, _>(rng, &[0.71, 0.18, 0.11]),
        present_residence_since: rng.random_range(1..=4),
        property: pick::<Property, _>(rng, &[0.28, 0.23, 0.33, 0.16]),
        checking_account: pick::<CheckingAccount, _>(rng, &[0.39, 0.27, 0.27, 0.07]),
        savings: pick::<Savings, _>(rng, &[0.18, 0.60, 0.10, 0.06, 0.06]),
        credit_amount: amount.min(18_424.0) as u32,
        duration: DURATIONS[weighted_index(rng, &[0.08, 0.05, 0.25, 0.15, 0.22, 0.12, 0.08, 0.05])],
        credit_history: 1 + weighted_index(rng, &[0.04, 0.05, 0.53, 0.09, 0.29]) as u32,
        guarantors: pick::<Guarantors, _>(rng, &[0.91, 0.04, 0.05]),
        other_installment_plans: pick::<InstallmentPlans, _>(rng, &[0.81, 0.05, 0.14]),
        credits_at_bank: 1 + weighted_index(rng, &[0.63, 0.33, 0.03, 0.01]) as u32,
        purpose: pick::<Purpose, _>(
            rng,
            &[0.23, 0.10, 0.01, 0.10, 0.28, 0.05, 0.18, 0.02, 0.01, 0.02],
        ),
    }
}

/// Log-odds of being a good payer.
fn latent_score(r: &ApplicantRecord) -> f64 {
    let checking = match r.checking_account {
        CheckingAccount::NoAccount => 1.2,
        CheckingAccount::Negative => -0.6,
        CheckingAccount::BelowTwoHundred => -0.2,
        CheckingAccount::TwoHundredOrMore => 0.4,
    };
    let housing = if r.housing == Housing::Own { 0.3 } else { 0.0 };
    let sex = if r.sex == Sex::Male { 0.1 } else { 0.0 };

    0.5 + checking + housing + sex
        - 0.03 * (f64::from(r.duration) - 20.0)
        - 0.00008 * (f64::from(r.credit_amount) - 3000.0)
        + 0.2 * (rank(r.savings) - 1.0)
        + 0.015 * (f64::from(r.age) - 35.0)
        + 0.3 * (f64::from(r.credit_history) - 3.0)
}

pub fn synthesize(rows: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let rows = (0..rows)
        .map(|_| {
            let record = applicant(&mut rng);
            let risk = u8::from(rng.random_bool(sigmoid(latent_score(&record)).clamp(0.0, 1.0)));
            LabeledApplicant { record, risk }
        })
        .collect();
    Dataset { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_applicant;

    #[test]
    fn deterministic_for_a_seed() {
        assert_eq!(synthesize(20, 42).rows, synthesize(20, 42).rows);
        assert_ne!(synthesize(20, 42).rows, synthesize(20, 43).rows);
    }

    #[test]
    fn rows_pass_boundary_validation() {
        for row in synthesize(200, 7).rows {
            let body = serde_json::to_value(&row.record).unwrap();
            assert_eq!(validate_applicant(&body).unwrap(), row.record);
        }
    }

    #[test]
    fn both_classes_are_present() {
        let dataset = synthesize(1000, 42);
        let good = dataset.rows.iter().filter(|r| r.risk == 1).count();
        assert!(good > 500 && good < 900, "good payers: {}", good);
    }
}
