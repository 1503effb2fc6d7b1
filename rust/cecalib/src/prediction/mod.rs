pub mod http;

use crate::errors::PredictionError;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;

pub use http::HttpPredictor;

/// Fragmentation code sent to tagged models.
pub const HCD_CODE: u8 = 2;
pub const OTHER_FRAGMENTATION_CODE: u8 = 1;

/// Tagged (isobaric label) models need trimmed sequences and a
/// fragmentation code.
pub fn is_tagged_model(model: &str) -> bool {
    model.contains("TMT")
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub sequences: Vec<String>,
    pub charges: Vec<u8>,
    /// Normalized collision energies (instrument value / 100).
    pub collision_energies: Vec<f32>,
    pub fragmentation: Option<Vec<u8>>,
    pub models: Vec<String>,
}

impl PredictionRequest {
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Rows `start..end` of the request, for the same models.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self {
            sequences: self.sequences[start..end].to_vec(),
            charges: self.charges[start..end].to_vec(),
            collision_energies: self.collision_energies[start..end].to_vec(),
            fragmentation: self.fragmentation.as_ref().map(|x| x[start..end].to_vec()),
            models: self.models.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelOutput {
    Intensities(Vec<Vec<f32>>),
    Scalars(Vec<f32>),
}

impl ModelOutput {
    pub fn len(&self) -> usize {
        match self {
            Self::Intensities(x) => x.len(),
            Self::Scalars(x) => x.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn extend(&mut self, other: ModelOutput) -> Result<(), PredictionError> {
        match (self, other) {
            (Self::Intensities(a), Self::Intensities(b)) => a.extend(b),
            (Self::Scalars(a), Self::Scalars(b)) => a.extend(b),
            _ => {
                return Err(PredictionError::MalformedResponse(
                    "model output changed kind between batches".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Per model predictions, in request row order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    pub outputs: HashMap<String, ModelOutput>,
}

impl Predictions {
    pub fn insert(&mut self, model: &str, output: ModelOutput) {
        self.outputs.insert(model.to_string(), output);
    }

    /// Appends the rows of a later batch.
    pub fn extend(&mut self, other: Predictions) -> Result<(), PredictionError> {
        for (model, output) in other.outputs {
            match self.outputs.get_mut(&model) {
                Some(existing) => existing.extend(output)?,
                None => {
                    self.outputs.insert(model, output);
                }
            }
        }
        Ok(())
    }

    pub fn intensities(&self, model: &str) -> Result<&[Vec<f32>], PredictionError> {
        match self.outputs.get(model) {
            Some(ModelOutput::Intensities(x)) => Ok(x),
            Some(ModelOutput::Scalars(_)) => Err(PredictionError::MalformedResponse(format!(
                "model {} returned scalars, expected intensities",
                model
            ))),
            None => Err(PredictionError::MissingModelOutput(model.to_string())),
        }
    }

    pub fn scalars(&self, model: &str) -> Result<&[f32], PredictionError> {
        match self.outputs.get(model) {
            Some(ModelOutput::Scalars(x)) => Ok(x),
            Some(ModelOutput::Intensities(_)) => Err(PredictionError::MalformedResponse(format!(
                "model {} returned intensities, expected scalars",
                model
            ))),
            None => Err(PredictionError::MissingModelOutput(model.to_string())),
        }
    }

    /// Checks that every requested model returned one value per row.
    pub fn check_complete(&self, models: &[String], rows: usize) -> Result<(), PredictionError> {
        for model in models {
            let output = self
                .outputs
                .get(model)
                .ok_or_else(|| PredictionError::MissingModelOutput(model.clone()))?;
            if output.len() != rows {
                return Err(PredictionError::UnexpectedOutputLength {
                    model: model.clone(),
                    expected: rows,
                    other: output.len(),
                });
            }
        }
        Ok(())
    }
}

/// Anything that turns peptide inputs into model predictions.
pub trait Predictor {
    fn predict(&self, request: &PredictionRequest) -> Result<Predictions, PredictionError>;
}
