//! Flattens a neighbor mapping into a parallel-array edge list.
//!
//! The mapping goes from a focal identifier to its neighbors, optionally
//! paired with one weight per neighbor. The output holds one row per
//! (focal, neighbor) pair, in focal order and then neighbor order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum EdgeError {
    #[error("Weight '{value}' for focal '{focal}' is not numeric.")]
    NonNumericWeight { focal: String, value: String },
    #[error("Focal '{focal}' has {neighbors} neighbors but {weights} weights.")]
    WeightCountMismatch {
        focal: String,
        neighbors: usize,
        weights: usize,
    },
    #[error("Focal '{0}' has weights but no neighbor list.")]
    UnknownFocal(String),
}

/// A weight as it arrives from a loosely typed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightValue {
    Number(f64),
    Text(String),
}

impl From<f64> for WeightValue {
    fn from(value: f64) -> Self {
        WeightValue::Number(value)
    }
}

impl From<&str> for WeightValue {
    fn from(value: &str) -> Self {
        WeightValue::Text(value.to_string())
    }
}

impl WeightValue {
    fn to_number(&self) -> Option<f64> {
        match self {
            WeightValue::Number(value) => Some(*value),
            WeightValue::Text(text) => text.trim().parse::<f64>().ok(),
        }
    }
}

/// Parallel arrays describing a weighted directed graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeList<K> {
    pub focal: Vec<K>,
    pub neighbor: Vec<K>,
    pub weight: Vec<f64>,
}

impl<K> EdgeList<K> {
    pub fn len(&self) -> usize {
        self.focal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.focal.is_empty()
    }
}

/// Converts `focal -> [neighbors]` (and optionally `focal -> [weights]`) into an edge list.
///
/// Missing weights default to 1. A focal with no neighbors is kept as a self
/// loop of weight 0 so that it still appears in the graph. Text weights are
/// parsed as numbers.
pub fn neighbors_to_edges<K>(
    neighbors: &BTreeMap<K, Vec<K>>,
    weights: Option<&BTreeMap<K, Vec<WeightValue>>>,
) -> Result<EdgeList<K>, EdgeError>
where
    K: Ord + Clone + ToString,
{
    if let Some(weights) = weights {
        if let Some(stray) = weights.keys().find(|k| !neighbors.contains_key(*k)) {
            return Err(EdgeError::UnknownFocal(stray.to_string()));
        }
    }

    let total: usize = neighbors.values().map(|n| n.len().max(1)).sum();
    let mut edges = EdgeList {
        focal: Vec::with_capacity(total),
        neighbor: Vec::with_capacity(total),
        weight: Vec::with_capacity(total),
    };

    for (focal, list) in neighbors {
        if list.is_empty() {
            edges.focal.push(focal.clone());
            edges.neighbor.push(focal.clone());
            edges.weight.push(0.0);
            continue;
        }

        let focal_weights = weights.and_then(|w| w.get(focal));
        if let Some(focal_weights) = focal_weights {
            if focal_weights.len() != list.len() {
                return Err(EdgeError::WeightCountMismatch {
                    focal: focal.to_string(),
                    neighbors: list.len(),
                    weights: focal_weights.len(),
                });
            }
        }

        for (position, neighbor) in list.iter().enumerate() {
            let weight = match focal_weights {
                Some(values) => {
                    let raw = &values[position];
                    raw.to_number().ok_or_else(|| EdgeError::NonNumericWeight {
                        focal: focal.to_string(),
                        value: match raw {
                            WeightValue::Number(n) => n.to_string(),
                            WeightValue::Text(t) => t.clone(),
                        },
                    })?
                }
                None => 1.0,
            };
            edges.focal.push(focal.clone());
            edges.neighbor.push(neighbor.clone());
            edges.weight.push(weight);
        }
    }

    log::debug!(
        "Converted {} focal units into {} edges",
        neighbors.len(),
        edges.len()
    );
    Ok(edges)
}
