use super::{
    ModelOutput,
    PredictionRequest,
    Predictions,
    Predictor,
};
use crate::config::PredictionServerConfig;
use crate::errors::PredictionError;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{
    debug,
    info,
};

#[derive(Debug, Serialize)]
struct InputTensor<T: Serialize> {
    name: &'static str,
    shape: [usize; 2],
    datatype: &'static str,
    data: T,
}

#[derive(Debug, Deserialize)]
struct OutputTensor {
    name: String,
    shape: Vec<usize>,
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct InferResponse {
    outputs: Vec<OutputTensor>,
}

/// Client for a KServe v2 style inference server, one request per model
/// and batch.
pub struct HttpPredictor {
    client: reqwest::blocking::Client,
    base_url: String,
    batch_size: usize,
}

impl HttpPredictor {
    pub fn new(config: &PredictionServerConfig) -> Result<Self, PredictionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PredictionError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1),
        })
    }

    fn infer_url(&self, model: &str) -> String {
        format!("{}/v2/models/{}/infer", self.base_url, model)
    }

    fn predict_batch(
        &self,
        model: &str,
        request: &PredictionRequest,
    ) -> Result<ModelOutput, PredictionError> {
        let url = self.infer_url(model);
        let body = build_infer_request(request)?;
        debug!("POST {} with {} rows", url, request.len());
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| PredictionError::Transport(format!("{}: {}", url, e)))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| PredictionError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(PredictionError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_infer_response(&text)
    }
}

impl Predictor for HttpPredictor {
    fn predict(&self, request: &PredictionRequest) -> Result<Predictions, PredictionError> {
        let mut out = Predictions::default();
        for model in request.models.iter() {
            info!("Requesting {} predictions from {}", request.len(), model);
            let mut start = 0;
            while start < request.len() {
                let end = (start + self.batch_size).min(request.len());
                let output = self.predict_batch(model, &request.slice(start, end))?;
                let mut batch = Predictions::default();
                batch.insert(model, output);
                out.extend(batch)?;
                start = end;
            }
        }
        out.check_complete(&request.models, request.len())?;
        Ok(out)
    }
}

fn input_tensor<T: Serialize>(
    name: &'static str,
    rows: usize,
    datatype: &'static str,
    data: T,
) -> Result<Value, PredictionError> {
    serde_json::to_value(InputTensor {
        name,
        shape: [rows, 1],
        datatype,
        data,
    })
    .map_err(|e| PredictionError::InvalidRequest(format!("{}: {}", name, e)))
}

fn build_infer_request(request: &PredictionRequest) -> Result<Value, PredictionError> {
    let n = request.len();
    let mut inputs = vec![
        input_tensor("peptide_sequences", n, "BYTES", &request.sequences)?,
        input_tensor("precursor_charges", n, "INT32", &request.charges)?,
        input_tensor("collision_energies", n, "FP32", &request.collision_energies)?,
    ];
    if let Some(frag) = request.fragmentation.as_ref() {
        inputs.push(input_tensor("fragmentation_types", n, "FP32", frag)?);
    }
    Ok(serde_json::json!({ "inputs": inputs }))
}

fn as_f32(values: &[Value]) -> Result<Vec<f32>, PredictionError> {
    values
        .iter()
        .map(|x| {
            x.as_f64().map(|v| v as f32).ok_or_else(|| {
                PredictionError::MalformedResponse(format!("non numeric value {}", x))
            })
        })
        .collect()
}

/// Picks the prediction tensor out of an inference response. A tensor
/// named `intensities` wins, otherwise the first 2-d tensor is read as
/// intensities and anything else as one scalar per row.
fn parse_infer_response(body: &str) -> Result<ModelOutput, PredictionError> {
    let response: InferResponse = serde_json::from_str(body)
        .map_err(|e| PredictionError::MalformedResponse(e.to_string()))?;

    let tensor = response
        .outputs
        .iter()
        .find(|x| x.name == "intensities")
        .or_else(|| {
            response
                .outputs
                .iter()
                .find(|x| x.shape.len() == 2 && x.shape[1] > 1)
        })
        .or_else(|| response.outputs.first())
        .ok_or_else(|| PredictionError::MalformedResponse("response has no outputs".into()))?;

    let values = as_f32(&tensor.data)?;
    match tensor.shape.as_slice() {
        [rows, cols] if *cols > 1 => {
            if rows * cols != values.len() {
                return Err(PredictionError::MalformedResponse(format!(
                    "tensor {} has shape {:?} but {} values",
                    tensor.name,
                    tensor.shape,
                    values.len()
                )));
            }
            Ok(ModelOutput::Intensities(
                values.chunks(*cols).map(|x| x.to_vec()).collect(),
            ))
        }
        _ => Ok(ModelOutput::Scalars(values)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PredictionRequest {
        PredictionRequest {
            sequences: vec!["PEPTIDEK".into(), "PEPTIDER".into()],
            charges: vec![2, 3],
            collision_energies: vec![0.3, 0.25],
            fragmentation: None,
            models: vec!["Prosit_2019_intensity".into()],
        }
    }

    #[test]
    fn test_build_request() {
        let body = build_infer_request(&request()).unwrap();
        let inputs = body["inputs"].as_array().unwrap();
        assert_eq!(inputs.len(), 3);
        assert_eq!(inputs[0]["name"], "peptide_sequences");
        assert_eq!(inputs[0]["data"][1], "PEPTIDER");
        assert_eq!(inputs[1]["data"][1], 3);

        let mut tagged = request();
        tagged.fragmentation = Some(vec![2, 1]);
        let body = build_infer_request(&tagged).unwrap();
        assert_eq!(body["inputs"].as_array().unwrap().len(), 4);
        assert_eq!(body["inputs"][3]["name"], "fragmentation_types");
    }

    #[test]
    fn test_unencodable_input_is_an_error() {
        let mut data = std::collections::HashMap::new();
        data.insert((1u8, 2u8), 3u8);
        assert!(matches!(
            input_tensor("bad", 1, "INT32", &data),
            Err(PredictionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_intensities() {
        let body = r#"{"outputs": [
            {"name": "annotation", "shape": [2, 3], "datatype": "BYTES", "data": ["y1+1", "y1+2", "y1+3", "y1+1", "y1+2", "y1+3"]},
            {"name": "intensities", "shape": [2, 3], "datatype": "FP32", "data": [1.0, 0.5, 0.0, 0.2, 0.0, 1.0]}
        ]}"#;
        let out = parse_infer_response(body).unwrap();
        assert_eq!(
            out,
            ModelOutput::Intensities(vec![vec![1.0, 0.5, 0.0], vec![0.2, 0.0, 1.0]])
        );
    }

    #[test]
    fn test_parse_scalars() {
        let body = r#"{"outputs": [{"name": "irt", "shape": [2, 1], "datatype": "FP32", "data": [12.5, -3.0]}]}"#;
        assert_eq!(
            parse_infer_response(body).unwrap(),
            ModelOutput::Scalars(vec![12.5, -3.0])
        );
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_infer_response("{}"),
            Err(PredictionError::MalformedResponse(_))
        ));
        let body = r#"{"outputs": [{"name": "intensities", "shape": [2, 3], "data": [1.0]}]}"#;
        assert!(matches!(
            parse_infer_response(body),
            Err(PredictionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_unreachable_server() {
        let predictor = HttpPredictor::new(&PredictionServerConfig {
            url: "http://127.0.0.1:9/".into(),
            timeout_seconds: 2,
            batch_size: 1,
        })
        .unwrap();
        assert_eq!(
            predictor.infer_url("m"),
            "http://127.0.0.1:9/v2/models/m/infer"
        );
        assert!(matches!(
            predictor.predict(&request()),
            Err(PredictionError::Transport(_))
        ));
    }
}
