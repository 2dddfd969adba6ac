use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Hyper-parameter names shared by every model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParamName {
    Alpha,
    InitMean,
    InitStdDev,
    Lr,
    NEpochs,
    NFactors,
    NNeighbors,
    RandomState,
    Reg,
    Similarity,
    UseFeature,
}

impl ParamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamName::Alpha => "alpha",
            ParamName::InitMean => "init_mean",
            ParamName::InitStdDev => "init_std",
            ParamName::Lr => "lr",
            ParamName::NEpochs => "n_epochs",
            ParamName::NFactors => "n_factors",
            ParamName::NNeighbors => "n_neighbors",
            ParamName::RandomState => "random_state",
            ParamName::Reg => "reg",
            ParamName::Similarity => "similarity",
            ParamName::UseFeature => "use_feature",
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Int(i64),
    Float(f32),
    Bool(bool),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v as f32)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

/// Hyper-parameter assignment. Ordered so that iteration and logging are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params(BTreeMap<ParamName, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: ParamName, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name, value.into());
        self
    }

    pub fn insert(&mut self, name: ParamName, value: impl Into<ParamValue>) {
        self.0.insert(name, value.into());
    }

    pub fn get(&self, name: ParamName) -> Option<&ParamValue> {
        self.0.get(&name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamName, &ParamValue)> {
        self.0.iter()
    }

    pub fn get_int(&self, name: ParamName, default: usize) -> usize {
        match self.0.get(&name) {
            None => default,
            Some(ParamValue::Int(v)) if *v >= 0 => *v as usize,
            Some(other) => {
                warn!(param = %name, value = %other, default, "expected a non-negative integer");
                default
            }
        }
    }

    pub fn get_seed(&self, name: ParamName, default: u64) -> u64 {
        match self.0.get(&name) {
            None => default,
            Some(ParamValue::Int(v)) => *v as u64,
            Some(other) => {
                warn!(param = %name, value = %other, default, "expected an integer seed");
                default
            }
        }
    }

    /// Integers are accepted and widened.
    pub fn get_float(&self, name: ParamName, default: f32) -> f32 {
        match self.0.get(&name) {
            None => default,
            Some(ParamValue::Float(v)) => *v,
            Some(ParamValue::Int(v)) => *v as f32,
            Some(other) => {
                warn!(param = %name, value = %other, default, "expected a float");
                default
            }
        }
    }

    pub fn get_bool(&self, name: ParamName, default: bool) -> bool {
        match self.0.get(&name) {
            None => default,
            Some(ParamValue::Bool(v)) => *v,
            Some(other) => {
                warn!(param = %name, value = %other, default, "expected a bool");
                default
            }
        }
    }

    pub fn get_str(&self, name: ParamName, default: &str) -> String {
        match self.0.get(&name) {
            None => default.to_string(),
            Some(ParamValue::Str(v)) => v.clone(),
            Some(other) => {
                warn!(param = %name, value = %other, default, "expected a string");
                default.to_string()
            }
        }
    }

    /// Copy of `self` with every entry of `other` applied on top.
    pub fn overwrite(&self, other: &Params) -> Params {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            merged.0.insert(*name, value.clone());
        }
        merged
    }
}

impl FromIterator<(ParamName, ParamValue)> for Params {
    fn from_iter<I: IntoIterator<Item = (ParamName, ParamValue)>>(iter: I) -> Self {
        Params(iter.into_iter().collect())
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        f.write_str("}")
    }
}

/// Candidate values per hyper-parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamsGrid(BTreeMap<ParamName, Vec<ParamValue>>);

impl ParamsGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: Into<ParamValue>>(mut self, name: ParamName, values: Vec<V>) -> Self {
        self.0
            .insert(name, values.into_iter().map(Into::into).collect());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamName, &Vec<ParamValue>)> {
        self.0.iter()
    }

    /// Size of the Cartesian product. An empty grid has exactly one (empty) combination.
    pub fn num_combinations(&self) -> usize {
        self.0.values().map(Vec::len).product()
    }
}
