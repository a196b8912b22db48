use serde::{Deserialize, Serialize};

pub const FEATURE_COUNT: usize = 12;

/// Feature order used at training time. `ClinicalRecord::to_features` must
/// agree with this index-for-index.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "age",
    "anaemia",
    "creatinine_phosphokinase",
    "diabetes",
    "ejection_fraction",
    "high_blood_pressure",
    "platelets",
    "serum_creatinine",
    "serum_sodium",
    "sex",
    "smoking",
    "time",
];

/// One patient record as entered through the form or decoded from a
/// delimited line. Flag fields (anaemia, diabetes, high_blood_pressure,
/// sex, smoking) are carried as numbers and coerced to {0,1} during
/// feature assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    pub age: f64,
    pub anaemia: f64,
    pub creatinine_phosphokinase: f64,
    pub diabetes: f64,
    pub ejection_fraction: f64,
    pub high_blood_pressure: f64,
    pub platelets: f64,
    pub serum_creatinine: f64,
    pub serum_sodium: f64,
    pub sex: f64,
    pub smoking: f64,
    pub time: f64,
}

impl ClinicalRecord {
    pub fn to_features(&self) -> [f64; FEATURE_COUNT] {
        [
            self.age,
            as_flag(self.anaemia),
            self.creatinine_phosphokinase,
            as_flag(self.diabetes),
            self.ejection_fraction,
            as_flag(self.high_blood_pressure),
            self.platelets,
            self.serum_creatinine,
            self.serum_sodium,
            as_flag(self.sex),
            as_flag(self.smoking),
            self.time,
        ]
    }

    pub fn from_features(values: [f64; FEATURE_COUNT]) -> Self {
        ClinicalRecord {
            age: values[0],
            anaemia: values[1],
            creatinine_phosphokinase: values[2],
            diabetes: values[3],
            ejection_fraction: values[4],
            high_blood_pressure: values[5],
            platelets: values[6],
            serum_creatinine: values[7],
            serum_sodium: values[8],
            sex: values[9],
            smoking: values[10],
            time: values[11],
        }
    }
}

fn as_flag(value: f64) -> f64 {
    if value != 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Binary outcome of one prediction. The classifier is trained on the
/// death-event column (1 = death), so the raw probability is the
/// probability of death: probability at or above the decision threshold
/// maps to `DidNotSurvive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    Survived,
    DidNotSurvive,
}

impl PredictionOutcome {
    pub fn from_death_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            PredictionOutcome::DidNotSurvive
        } else {
            PredictionOutcome::Survived
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PredictionOutcome::Survived => "Survived",
            PredictionOutcome::DidNotSurvive => "Did not survive",
        }
    }

    /// Gauge encoding used on the metrics endpoint.
    pub fn gauge_value(&self) -> u64 {
        match self {
            PredictionOutcome::Survived => 0,
            PredictionOutcome::DidNotSurvive => 1,
        }
    }
}
