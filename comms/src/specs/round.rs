use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named scalar metrics travelling with a round's response.
pub type Metrics = BTreeMap<String, f32>;

/// The name and shape of one tensor of a parameter vector, in the model's declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl TensorSpec {
    /// Returns the amount of scalars of this tensor.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A value of the open round configuration map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// The open configuration sent by the coordinator with every `fit` and `evaluate` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundConfig(BTreeMap<String, ConfigValue>);

impl RoundConfig {
    /// Key that, when holding a positive integer, overrides the client's epochs for one `fit`.
    pub const EPOCHS_OVERRIDE: &'static str = "epochs_override";

    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, returning the configuration for chaining.
    pub fn with(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    /// Returns the value for `key` when it's a positive integer.
    pub fn positive_int(&self, key: &str) -> Option<usize> {
        match self.0.get(key)? {
            ConfigValue::Int(n) if *n > 0 => usize::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Returns the `epochs_override` value, if any.
    pub fn epochs_override(&self) -> Option<usize> {
        self.positive_int(Self::EPOCHS_OVERRIDE)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Instructions for a `fit` round, the parameters follow in a `Params` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitIns {
    pub config: RoundConfig,
    pub layout: Vec<TensorSpec>,
}

/// Instructions for an `evaluate` round, the parameters follow in a `Params` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateIns {
    pub config: RoundConfig,
    pub layout: Vec<TensorSpec>,
}

/// Response to a `fit` round, the updated parameters follow in a `Params` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRes {
    pub num_examples: usize,
    pub metrics: Metrics,
    pub layout: Vec<TensorSpec>,
}

/// Response to an `evaluate` round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateRes {
    pub loss: f32,
    pub num_examples: usize,
    pub metrics: Metrics,
}

/// Response to a parameters request, the parameters follow in a `Params` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsRes {
    pub layout: Vec<TensorSpec>,
}
