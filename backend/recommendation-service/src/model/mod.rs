//! Model-family agnostic pieces: hyper-parameters, the estimator traits,
//! checkpoint selection, hyper-parameter search and the persisted envelope.

pub mod params;
pub mod search;
pub mod snapshot;

use crate::base::RandomGenerator;
use crate::error::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io::Cursor;

pub use params::{ParamName, ParamValue, Params, ParamsGrid};
pub use search::{grid_search_cv, random_search_cv, ParamsSearchResult};
pub use snapshot::SnapshotManager;

/// Bumped whenever a persisted record layout changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

pub trait Model {
    /// Replaces the hyper-parameters and reseeds the model's generator.
    fn set_params(&mut self, params: Params);
    fn params(&self) -> &Params;
    fn params_grid(&self) -> ParamsGrid;
    /// Drops trained weights and indices.
    fn clear(&mut self);
    /// True while there are no trained weights to predict with.
    fn invalid(&self) -> bool;
}

/// Evaluation result with a task-specific total order.
pub trait ModelScore: Clone + Debug + Send {
    fn better_than(&self, other: &Self) -> bool;
    fn is_nan(&self) -> bool;
}

pub trait Estimator: Model + Clone {
    type DataSet;
    type Score: ModelScore;
    type Config;

    fn fit(
        &mut self,
        train_set: &Self::DataSet,
        validate_set: &Self::DataSet,
        config: &Self::Config,
    ) -> Result<Self::Score>;
}

/// Hyper-parameters plus the generator seeded from `random_state`.
#[derive(Debug, Clone)]
pub struct BaseModel {
    pub params: Params,
    pub rng: RandomGenerator,
}

impl BaseModel {
    pub fn new(params: Params) -> Self {
        let seed = params.get_seed(ParamName::RandomState, 0);
        Self {
            params,
            rng: RandomGenerator::new(seed),
        }
    }
}

impl Default for BaseModel {
    fn default() -> Self {
        Self::new(Params::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EnvelopeHeader {
    version: u32,
    family: String,
}

/// Serializes `record` behind a `{version, family}` header.
pub fn encode_record<T: Serialize>(family: &str, record: &T) -> Result<Vec<u8>> {
    let header = EnvelopeHeader {
        version: MODEL_FORMAT_VERSION,
        family: family.to_string(),
    };
    let mut buf = bincode::serialize(&header)?;
    bincode::serialize_into(&mut buf, record)?;
    Ok(buf)
}

/// Reads the family name without decoding the record.
pub fn peek_family(buf: &[u8]) -> Result<String> {
    let header: EnvelopeHeader = bincode::deserialize(buf)?;
    check_version(&header)?;
    Ok(header.family)
}

pub fn decode_record<T: DeserializeOwned>(family: &str, buf: &[u8]) -> Result<T> {
    let mut reader = Cursor::new(buf);
    let header: EnvelopeHeader = bincode::deserialize_from(&mut reader)?;
    check_version(&header)?;
    if header.family != family {
        return Err(AppError::Serialization(format!(
            "expected a {} model, found {}",
            family, header.family
        )));
    }
    Ok(bincode::deserialize_from(&mut reader)?)
}

fn check_version(header: &EnvelopeHeader) -> Result<()> {
    if header.version != MODEL_FORMAT_VERSION {
        return Err(AppError::Serialization(format!(
            "unsupported model format version {} (expected {})",
            header.version, MODEL_FORMAT_VERSION
        )));
    }
    Ok(())
}
