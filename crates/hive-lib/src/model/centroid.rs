//! Nearest-centroid model over colour histograms

use super::features::euclidean_distance;
use super::LabelScores;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trained model: one mean histogram per label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidModel {
    pub version: String,
    pub labels: Vec<String>,
    pub centroids: Vec<Vec<f32>>,
    /// Softmax temperature applied to negative distances
    pub temperature: f32,
    pub trained_on: usize,
    pub created_at: i64,
}

impl CentroidModel {
    /// Average the feature vectors of each label. Returns `None` when there is
    /// nothing to learn from or the vectors disagree in length.
    pub fn fit(
        version: impl Into<String>,
        examples: &[(String, Vec<f32>)],
        temperature: f32,
    ) -> Option<Self> {
        let dim = examples.first()?.1.len();
        if dim == 0 || examples.iter().any(|(_, f)| f.len() != dim) {
            return None;
        }

        let mut sums: BTreeMap<&str, (Vec<f32>, usize)> = BTreeMap::new();
        for (label, features) in examples {
            let entry = sums
                .entry(label.as_str())
                .or_insert_with(|| (vec![0.0; dim], 0));
            for (acc, v) in entry.0.iter_mut().zip(features) {
                *acc += v;
            }
            entry.1 += 1;
        }

        let (labels, centroids): (Vec<String>, Vec<Vec<f32>>) = sums
            .into_iter()
            .map(|(label, (sum, count))| {
                let centroid: Vec<f32> = sum.into_iter().map(|v| v / count as f32).collect();
                (label.to_string(), centroid)
            })
            .unzip();

        Some(Self {
            version: version.into(),
            labels,
            centroids,
            temperature,
            trained_on: examples.len(),
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Probability per label from a softmax over negative centroid distances
    pub fn scores(&self, features: &[f32]) -> LabelScores {
        let temperature = self.temperature.max(f32::EPSILON);
        let logits: Vec<f32> = self
            .centroids
            .iter()
            .map(|c| -euclidean_distance(c, features) / temperature)
            .collect();

        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f32 = exps.iter().sum();

        self.labels
            .iter()
            .cloned()
            .zip(exps.into_iter().map(|e| e / total))
            .collect()
    }
}
