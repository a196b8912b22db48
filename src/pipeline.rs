use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::model::{GbdtModel, ModelError};
use crate::telemetry::TelemetryStore;
use crate::types::{ClinicalRecord, PredictionOutcome, FEATURE_COUNT};

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Out-of-range input, reported with the user-visible message and
    /// counted in telemetry. The classifier is never invoked.
    #[error("{0}")]
    Validation(String),
    /// Malformed delimited input that could not be decoded into a record.
    #[error("{0}")]
    Decode(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub outcome: PredictionOutcome,
    pub label: &'static str,
    /// Probability of the death event as reported by the classifier.
    pub probability: f64,
}

/// The inference request pipeline: validation, feature assembly, model
/// inference, metrics update, response formatting. Stateless per request
/// apart from the telemetry side effect; the model handle is shared
/// read-only for the process lifetime.
pub struct InferencePipeline {
    model: Arc<GbdtModel>,
    telemetry: Arc<TelemetryStore>,
    decision_threshold: f64,
}

impl InferencePipeline {
    pub fn new(
        model: Arc<GbdtModel>,
        telemetry: Arc<TelemetryStore>,
        decision_threshold: f64,
    ) -> Self {
        InferencePipeline {
            model,
            telemetry,
            decision_threshold,
        }
    }

    pub fn run(&self, record: &ClinicalRecord) -> Result<Prediction, PipelineError> {
        self.telemetry.record_request();

        if let Err(message) = validate(record) {
            self.telemetry.record_validation_failure();
            warn!("rejected input: {message}");
            return Err(PipelineError::Validation(message));
        }

        let features = record.to_features();
        let probability = self.model.predict_probability(&features)?;
        let outcome =
            PredictionOutcome::from_death_probability(probability, self.decision_threshold);
        self.telemetry.record_outcome(outcome);
        info!("prediction: {} (p_death={probability:.3})", outcome.label());

        Ok(Prediction {
            outcome,
            label: outcome.label(),
            probability,
        })
    }

    /// Decodes one comma-separated record and runs the pipeline on it. A
    /// non-numeric token or a wrong field count surfaces as a decode
    /// error, never as a label.
    pub fn run_delimited(&self, input: &str) -> Result<Prediction, PipelineError> {
        let record = match decode_delimited(input) {
            Ok(record) => record,
            Err(error) => {
                self.telemetry.record_request();
                self.telemetry.record_decode_failure();
                warn!("rejected input: {error}");
                return Err(error);
            }
        };
        self.run(&record)
    }
}

fn validate(record: &ClinicalRecord) -> Result<(), String> {
    if !(record.age > 0.0 && record.age < 120.0) {
        return Err("Age must be between 1 and 120.".to_string());
    }
    if !(record.ejection_fraction > 0.0 && record.ejection_fraction <= 100.0) {
        return Err("Ejection Fraction must be between 1 and 100.".to_string());
    }
    if !(record.serum_creatinine > 0.0 && record.serum_creatinine < 20.0) {
        return Err("Serum Creatinine should be realistic (typically below 20).".to_string());
    }
    Ok(())
}

fn decode_delimited(input: &str) -> Result<ClinicalRecord, PipelineError> {
    let mut values = Vec::with_capacity(FEATURE_COUNT);
    for token in input.trim().split(',') {
        let token = token.trim();
        let value = token.parse::<f64>().map_err(|_| {
            PipelineError::Decode(format!("'{token}' is not a number"))
        })?;
        values.push(value);
    }

    let values: [f64; FEATURE_COUNT] = match values.try_into() {
        Ok(values) => values,
        Err(values) => {
            return Err(PipelineError::Decode(format!(
                "expected {FEATURE_COUNT} comma-separated values, got {}",
                values.len()
            )))
        }
    };

    Ok(ClinicalRecord::from_features(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLED_ARTIFACT: &str = include_str!("../models/survival_model.json");

    const REFERENCE_LINE: &str = "60,0,582,0,38,1,263358,1.1,136,1,0,130";

    fn pipeline() -> (InferencePipeline, Arc<TelemetryStore>) {
        let model = Arc::new(GbdtModel::from_json(BUNDLED_ARTIFACT).unwrap());
        let telemetry = Arc::new(TelemetryStore::new());
        (
            InferencePipeline::new(model, Arc::clone(&telemetry), 0.5),
            telemetry,
        )
    }

    fn reference_record() -> ClinicalRecord {
        ClinicalRecord::from_features([
            60.0, 0.0, 582.0, 0.0, 38.0, 1.0, 263358.0, 1.1, 136.0, 1.0, 0.0, 130.0,
        ])
    }

    #[test]
    fn reference_record_survives() {
        let (pipeline, _) = pipeline();
        let prediction = pipeline.run(&reference_record()).unwrap();
        assert_eq!(prediction.outcome, PredictionOutcome::Survived);
        assert_eq!(prediction.label, "Survived");
        assert!(prediction.probability < 0.5);
    }

    #[test]
    fn repeated_runs_return_the_same_label() {
        let (pipeline, _) = pipeline();
        let first = pipeline.run(&reference_record()).unwrap();
        for _ in 0..5 {
            let next = pipeline.run(&reference_record()).unwrap();
            assert_eq!(first.label, next.label);
            assert_eq!(first.probability, next.probability);
        }
    }

    #[test]
    fn out_of_range_age_never_reaches_the_classifier() {
        let (pipeline, telemetry) = pipeline();
        let mut record = reference_record();
        record.age = 0.0;
        let error = pipeline.run(&record).unwrap_err();
        assert!(matches!(error, PipelineError::Validation(_)));
        assert_eq!(error.to_string(), "Age must be between 1 and 120.");

        record.age = 120.0;
        assert!(pipeline.run(&record).is_err());

        let stats = telemetry.snapshot();
        assert_eq!(stats.validation_failures, 2);
        assert_eq!(stats.survived + stats.did_not_survive, 0);
    }

    #[test]
    fn out_of_range_ejection_fraction_is_rejected() {
        let (pipeline, _) = pipeline();
        let mut record = reference_record();
        record.ejection_fraction = 0.0;
        assert!(matches!(
            pipeline.run(&record),
            Err(PipelineError::Validation(_))
        ));
        record.ejection_fraction = 101.0;
        assert!(matches!(
            pipeline.run(&record),
            Err(PipelineError::Validation(_))
        ));
        record.ejection_fraction = 100.0;
        assert!(pipeline.run(&record).is_ok());
    }

    #[test]
    fn unrealistic_serum_creatinine_is_rejected() {
        let (pipeline, _) = pipeline();
        let mut record = reference_record();
        record.serum_creatinine = 25.0;
        let error = pipeline.run(&record).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Serum Creatinine should be realistic (typically below 20)."
        );
    }

    #[test]
    fn delimited_line_runs_the_same_pipeline() {
        let (pipeline, _) = pipeline();
        let prediction = pipeline.run_delimited(REFERENCE_LINE).unwrap();
        assert_eq!(prediction.label, "Survived");
    }

    #[test]
    fn non_numeric_token_is_a_decode_error() {
        let (pipeline, telemetry) = pipeline();
        let error = pipeline
            .run_delimited("60,0,abc,0,38,1,263358,1.1,136,1,0,130")
            .unwrap_err();
        assert!(matches!(error, PipelineError::Decode(_)));
        assert_eq!(telemetry.snapshot().decode_failures, 1);
    }

    #[test]
    fn wrong_field_count_is_a_decode_error() {
        let (pipeline, _) = pipeline();
        let error = pipeline.run_delimited("60,0,582").unwrap_err();
        assert!(error.to_string().contains("expected 12"));
    }

    #[test]
    fn every_invocation_counts_one_request() {
        let (pipeline, telemetry) = pipeline();
        let mut invalid = reference_record();
        invalid.age = -5.0;

        pipeline.run(&reference_record()).unwrap();
        pipeline.run(&invalid).unwrap_err();
        pipeline.run_delimited(REFERENCE_LINE).unwrap();
        pipeline.run_delimited("not,numbers").unwrap_err();

        assert_eq!(telemetry.snapshot().requests, 4);
    }

    #[test]
    fn threshold_is_honored() {
        let model = Arc::new(GbdtModel::from_json(BUNDLED_ARTIFACT).unwrap());
        let telemetry = Arc::new(TelemetryStore::new());
        // Threshold below the reference probability flips the outcome.
        let strict = InferencePipeline::new(model, telemetry, 0.05);
        let prediction = strict.run(&reference_record()).unwrap();
        assert_eq!(prediction.outcome, PredictionOutcome::DidNotSurvive);
    }
}
