use std::collections::BTreeMap;
use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString, IntoStaticStr};

/// Identifiers of the four classifiers served by the backend.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ModelId {
    LogisticRegression,
    RandomForest,
    XgBoost,
    Mlp,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::LogisticRegression,
        ModelId::RandomForest,
        ModelId::XgBoost,
        ModelId::Mlp,
    ];
}

/// Binary target. `1` is the creditworthy class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum PayerLabel {
    #[serde(rename = "Bom Pagador")]
    #[display(fmt = "Bom Pagador")]
    Good,
    #[serde(rename = "Mau Pagador")]
    #[display(fmt = "Mau Pagador")]
    Bad,
}

impl PayerLabel {
    pub fn class(self) -> u8 {
        match self {
            PayerLabel::Good => 1,
            PayerLabel::Bad => 0,
        }
    }
}

/// A closed set of string categories, declared in rank order.
pub trait Categorical: Copy + PartialEq + FromStr + Into<&'static str> + 'static {
    const ALL: &'static [Self];
    const LEVELS: &'static [&'static str];

    fn label(self) -> &'static str {
        self.into()
    }
}

macro_rules! categorical {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
            EnumString, AsRefStr, IntoStaticStr,
        )]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                #[strum(serialize = $label)]
                $variant,
            )+
        }

        impl Categorical for $name {
            const ALL: &'static [$name] = &[$($name::$variant),+];
            const LEVELS: &'static [&'static str] = &[$($label),+];
        }
    };
}

categorical!(Sex {
    Female => "female",
    Male => "male",
});

categorical!(MaritalStatus {
    Single => "single",
    MarriedOrWidowed => "married/widowed",
    Divorced => "divorced",
});

categorical!(
    /// Skill level, lowest first.
    Job {
        UnskilledNonResident => "unemployed/unskilled non-resident",
        UnskilledResident => "unskilled resident",
        Qualified => "qualified",
        HighlyQualified => "highly qualified",
    }
);

categorical!(EmploymentDuration {
    Unemployed => "unemployed",
    LessThanOneYear => "<1y",
    OneToFourYears => "1-4y",
    FourToSevenYears => "4-7y",
    SevenYearsOrMore => ">=7y",
});

categorical!(Housing {
    Own => "own",
    Rent => "rent",
    ForFree => "for free",
});

categorical!(Property {
    RealEstate => "real estate",
    BuildingSocietyOrLifeInsurance => "building society / life insurance",
    CarOrOther => "car or other",
    UnknownOrNone => "unk. / no property",
});

categorical!(CheckingAccount {
    NoAccount => "no checking account",
    Negative => "< 0 DM",
    BelowTwoHundred => "0 <= ... < 200 DM",
    TwoHundredOrMore => ">= 200 DM",
});

categorical!(Savings {
    UnknownOrNone => "0 or unk.",
    BelowHundred => "<100 DM",
    HundredToFiveHundred => "100-500 DM",
    FiveHundredToThousand => "500-1000 DM",
    AboveThousand => ">1000 DM",
});

categorical!(Guarantors {
    None => "none",
    Guarantor => "guarantor",
    CoApplicant => "co-applicant",
});

categorical!(InstallmentPlans {
    None => "none",
    Stores => "stores",
    Bank => "bank",
});

categorical!(Purpose {
    NewCar => "new car",
    UsedCar => "used car",
    DomesticAppliances => "domestic appliances",
    Business => "business",
    RadioTelevision => "radio/television",
    Education => "education",
    FurnitureEquipment => "furniture/equipment",
    Repairs => "repairs",
    Retraining => "retraining",
    Others => "others",
});

/// A fully populated credit application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantRecord {
    pub sex: Sex,
    pub marrital_status: MaritalStatus,
    pub age: u32,
    pub n_of_liables: u32,
    pub job: Job,
    pub foreign_worker: u8,
    pub present_employee_since: EmploymentDuration,
    pub telephone: u8,
    pub housing: Housing,
    pub present_residence_since: u32,
    pub property: Property,
    pub checking_account: CheckingAccount,
    pub savings: Savings,
    pub credit_amount: u32,
    pub duration: u32,
    pub credit_history: u32,
    pub guarantors: Guarantors,
    pub other_installment_plans: InstallmentPlans,
    pub credits_at_bank: u32,
    pub purpose: Purpose,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    #[serde(rename = "0")]
    pub bad_payer: ClassMetrics,
    #[serde(rename = "1")]
    pub good_payer: ClassMetrics,
    pub accuracy: f64,
    #[serde(rename = "macro avg")]
    pub macro_avg: ClassMetrics,
    #[serde(rename = "weighted avg")]
    pub weighted_avg: ClassMetrics,
}

/// Raw counts, rows = actual class, columns = predicted class, order `[0, 1]`.
pub type ConfusionMatrix = [[u64; 2]; 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub classification_report: ClassificationReport,
    pub confusion_matrix: ConfusionMatrix,
    /// Seconds spent fitting the estimator.
    pub training_time: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelPrediction {
    Label(PayerLabel),
    Failed { error: String },
}

pub type PredictionResponse = BTreeMap<ModelId, ModelPrediction>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPlotResponse {
    pub summary_plot: String,
    pub shap_importance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallResponse {
    pub waterfall_plot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallAllResponse {
    pub waterfall_plots: BTreeMap<ModelId, Option<String>>,
}
