use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::types::{FEATURE_COUNT, FEATURE_NAMES};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact not found at {0}")]
    NotFound(PathBuf),
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model artifact is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Node {
    Leaf {
        leaf: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Walks from the root to a leaf. A well-formed tree reaches a leaf in
    /// at most `nodes.len()` steps; a cyclic node graph exhausts the bound
    /// and yields `None`.
    fn evaluate(&self, features: &[f64; FEATURE_COUNT]) -> Option<f64> {
        let mut index = 0usize;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index)? {
                Node::Leaf { leaf } => return Some(*leaf),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
        None
    }
}

/// Gradient-boosted tree ensemble deserialized from a JSON artifact.
/// Margins from every tree are summed onto `base_score` and squashed with
/// the logistic sigmoid; the result is the probability of the death event.
#[derive(Debug, Deserialize)]
pub struct GbdtModel {
    #[serde(default)]
    base_score: f64,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    trees: Vec<Tree>,
}

impl GbdtModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.is_file() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ModelError> {
        let model: GbdtModel = serde_json::from_str(data)?;
        model.validate()?;
        Ok(model)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Stateless, deterministic inference: equal inputs always produce
    /// equal probabilities.
    pub fn predict_probability(
        &self,
        features: &[f64; FEATURE_COUNT],
    ) -> Result<f64, ModelError> {
        let mut margin = self.base_score;
        for (tree_index, tree) in self.trees.iter().enumerate() {
            let leaf = tree.evaluate(features).ok_or_else(|| {
                ModelError::Malformed(format!("tree {tree_index} walk did not reach a leaf"))
            })?;
            margin += leaf;
        }
        Ok(sigmoid(margin))
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Malformed("ensemble has no trees".to_string()));
        }

        if let Some(names) = &self.feature_names {
            if names != &FEATURE_NAMES {
                return Err(ModelError::Malformed(
                    "artifact feature order does not match the serving feature order"
                        .to_string(),
                ));
            }
        }

        for (tree_index, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::Malformed(format!("tree {tree_index} is empty")));
            }
            for node in &tree.nodes {
                if let Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } = node
                {
                    if *feature >= FEATURE_COUNT {
                        return Err(ModelError::Malformed(format!(
                            "tree {tree_index} splits on unknown feature index {feature}"
                        )));
                    }
                    if *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                        return Err(ModelError::Malformed(format!(
                            "tree {tree_index} has a child index out of range"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn sigmoid(value: f64) -> f64 {
    1.0 / (1.0 + (-value).exp())
}
