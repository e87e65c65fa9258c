use crate::emotion::{ClassifyError, EmotionLabel, Result, ScoringModel};
use serde::Deserialize;
use std::path::Path;

/// Persisted classifier artifact: a dense feed-forward network plus the
/// label-encoder class order its output indices refer to.
#[derive(Debug, Deserialize)]
pub(crate) struct ModelArtifact {
    pub input_dim: usize,
    /// Label-encoder classes in output-index order, as three-letter codes.
    pub labels: Vec<String>,
    pub layers: Vec<LayerSpec>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LayerSpec {
    /// Row-major weight matrix, one row per output unit.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    pub activation: Activation,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Activation {
    Relu,
    Linear,
    Softmax,
}

#[derive(Debug)]
struct DenseLayer {
    weights: Vec<f32>,
    rows: usize,
    cols: usize,
    bias: Vec<f32>,
    activation: Activation,
}

impl DenseLayer {
    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.rows);
        for r in 0..self.rows {
            let row = &self.weights[r * self.cols..(r + 1) * self.cols];
            let mut acc = f64::from(self.bias[r]);
            for (w, x) in row.iter().zip(input.iter()) {
                acc += f64::from(*w) * f64::from(*x);
            }
            out.push(acc as f32);
        }
        match self.activation {
            Activation::Relu => {
                for v in out.iter_mut() {
                    *v = v.max(0.0);
                }
            }
            Activation::Softmax => softmax(&mut out),
            Activation::Linear => {}
        }
        out
    }
}

fn softmax(values: &mut [f32]) {
    let max = values.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let mut total = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        total += *v;
    }
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
}

/// Feed-forward scoring function deserialized from a JSON artifact.
#[derive(Debug)]
pub struct MlpScoringModel {
    input_dim: usize,
    layers: Vec<DenseLayer>,
}

impl MlpScoringModel {
    /// Reads and validates an artifact, returning the model together with
    /// the decoded label-encoder order.
    pub fn load(path: &Path) -> Result<(Self, Vec<EmotionLabel>)> {
        let raw = std::fs::read(path).map_err(|e| {
            ClassifyError::Artifact(format!("{}: {e}", path.display()))
        })?;
        let artifact: ModelArtifact = serde_json::from_slice(&raw)
            .map_err(|e| ClassifyError::Artifact(e.to_string()))?;
        Self::from_artifact(artifact)
    }

    pub(crate) fn from_artifact(
        artifact: ModelArtifact,
    ) -> Result<(Self, Vec<EmotionLabel>)> {
        if artifact.layers.is_empty() {
            return Err(ClassifyError::Artifact("artifact has no layers".to_owned()));
        }

        let labels = artifact
            .labels
            .iter()
            .map(|code| {
                EmotionLabel::from_code(code).ok_or_else(|| {
                    ClassifyError::Artifact(format!("unknown label code {code:?}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut layers = Vec::with_capacity(artifact.layers.len());
        let mut expected_cols = artifact.input_dim;
        for (i, spec) in artifact.layers.into_iter().enumerate() {
            let rows = spec.weights.len();
            if rows == 0 || rows != spec.bias.len() {
                return Err(ClassifyError::Artifact(format!(
                    "layer {i}: {rows} weight rows vs {} bias entries",
                    spec.bias.len()
                )));
            }
            let cols = spec.weights[0].len();
            if cols != expected_cols {
                return Err(ClassifyError::Artifact(format!(
                    "layer {i}: expected {expected_cols} inputs, weights have {cols}"
                )));
            }
            let mut flat = Vec::with_capacity(rows * cols);
            for (r, row) in spec.weights.iter().enumerate() {
                if row.len() != cols {
                    return Err(ClassifyError::Artifact(format!(
                        "layer {i}: ragged weight row {r}"
                    )));
                }
                flat.extend_from_slice(row);
            }
            layers.push(DenseLayer {
                weights: flat,
                rows,
                cols,
                bias: spec.bias,
                activation: spec.activation,
            });
            expected_cols = rows;
        }

        if expected_cols != labels.len() {
            return Err(ClassifyError::Artifact(format!(
                "final layer emits {expected_cols} scores for {} labels",
                labels.len()
            )));
        }

        Ok((
            Self {
                input_dim: artifact.input_dim,
                layers,
            },
            labels,
        ))
    }
}

impl ScoringModel for MlpScoringModel {
    fn score(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.input_dim {
            return Err(ClassifyError::InputArity {
                expected: self.input_dim,
                got: features.len(),
            });
        }
        let mut current = features.to_vec();
        for layer in &self.layers {
            current = layer.forward(&current);
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact_json(value: serde_json::Value) -> ModelArtifact {
        serde_json::from_value(value).unwrap()
    }

    fn codes() -> Vec<&'static str> {
        vec!["ANG", "DIS", "FEA", "HAP", "NEU", "SAD", "SUR"]
    }

    /// 3-input artifact whose single softmax layer copies input 0 into the
    /// Fear logit and input 1 into the Sadness logit.
    fn small_artifact() -> ModelArtifact {
        let mut weights = vec![vec![0.0f32; 3]; 7];
        weights[2][0] = 1.0; // FEA
        weights[5][1] = 1.0; // SAD
        artifact_json(serde_json::json!({
            "input_dim": 3,
            "labels": codes(),
            "layers": [{
                "weights": weights,
                "bias": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                "activation": "softmax",
            }],
        }))
    }

    #[test]
    fn forward_produces_distribution() {
        let (model, labels) = MlpScoringModel::from_artifact(small_artifact()).unwrap();
        assert_eq!(labels.len(), 7);
        let out = model.score(&[5.0, 1.0, 0.0]).unwrap();
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        // Fear logit dominates.
        let argmax = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(labels[argmax], EmotionLabel::Fear);
    }

    #[test]
    fn input_arity_is_checked() {
        let (model, _) = MlpScoringModel::from_artifact(small_artifact()).unwrap();
        assert!(matches!(
            model.score(&[1.0]),
            Err(ClassifyError::InputArity { expected: 3, got: 1 })
        ));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let artifact = artifact_json(serde_json::json!({
            "input_dim": 4,
            "labels": codes(),
            "layers": [{
                "weights": [[0.0, 0.0, 0.0]],
                "bias": [0.0],
                "activation": "linear",
            }],
        }));
        assert!(matches!(
            MlpScoringModel::from_artifact(artifact),
            Err(ClassifyError::Artifact(_))
        ));
    }

    #[test]
    fn unknown_label_code_is_rejected() {
        let artifact = artifact_json(serde_json::json!({
            "input_dim": 1,
            "labels": ["ANG", "DIS", "FEA", "HAP", "NEU", "SAD", "WAT"],
            "layers": [{
                "weights": [[1.0], [1.0], [1.0], [1.0], [1.0], [1.0], [1.0]],
                "bias": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                "activation": "softmax",
            }],
        }));
        let err = MlpScoringModel::from_artifact(artifact).unwrap_err();
        assert!(err.to_string().contains("WAT"));
    }

    #[test]
    fn relu_layers_chain() {
        let artifact = artifact_json(serde_json::json!({
            "input_dim": 2,
            "labels": codes(),
            "layers": [
                {
                    "weights": [[1.0, -1.0], [0.5, 0.5]],
                    "bias": [0.0, 0.0],
                    "activation": "relu",
                },
                {
                    "weights": [
                        [1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.0, 0.0],
                        [0.0, 0.0], [0.0, 0.0], [0.0, 0.0]
                    ],
                    "bias": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                    "activation": "softmax",
                },
            ],
        }));
        let (model, _) = MlpScoringModel::from_artifact(artifact).unwrap();
        let out = model.score(&[1.0, 2.0]).unwrap();
        assert_eq!(out.len(), 7);
        let sum: f32 = out.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}
