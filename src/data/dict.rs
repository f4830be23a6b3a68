use std::fmt;
use std::path::Path;
use std::str::FromStr;

use ndarray::{ArrayD, Dimension, RemoveAxis};
use serde::{Deserialize, Serialize};

use super::shared::DatasetCore;
use super::dataset::{Dataset, DatasetBase, DatasetOps};
use super::descriptor::{DescriptorTable, Descriptors, Selector};
use super::temporal::TemporalDataset;
use crate::error::{DatasetError, Result};
use crate::io::FileFormat;

// ---------------------------------------------------------------------------
// DatasetDict – the persisted shape
// ---------------------------------------------------------------------------

/// Everything needed to rebuild a dataset. This is what the persistence
/// gateway reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDict {
    pub measurements: ArrayD<f64>,
    pub descriptors: Descriptors,
    pub obs_descriptors: DescriptorTable,
    pub channel_descriptors: DescriptorTable,
    /// Present for temporal datasets only.
    #[serde(default)]
    pub time_descriptors: Option<DescriptorTable>,
    /// Concrete type name, see [`DatasetKind`].
    #[serde(rename = "type")]
    pub kind: String,
}

impl DatasetDict {
    pub(crate) fn from_core<D: Dimension + RemoveAxis>(
        core: &DatasetCore<D>,
        time_descriptors: Option<DescriptorTable>,
        kind: DatasetKind,
    ) -> Self {
        Self {
            measurements: core.measurements.clone().into_dyn(),
            descriptors: (*core.descriptors).clone(),
            obs_descriptors: (*core.obs_descriptors).clone(),
            channel_descriptors: (*core.channel_descriptors).clone(),
            time_descriptors,
            kind: kind.as_str().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// DatasetKind – the closed set of `type` tags
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    DatasetBase,
    Dataset,
    TemporalDataset,
}

impl DatasetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::DatasetBase => "DatasetBase",
            DatasetKind::Dataset => "Dataset",
            DatasetKind::TemporalDataset => "TemporalDataset",
        }
    }
}

impl FromStr for DatasetKind {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DatasetBase" => Ok(DatasetKind::DatasetBase),
            "Dataset" => Ok(DatasetKind::Dataset),
            "TemporalDataset" => Ok(DatasetKind::TemporalDataset),
            other => Err(DatasetError::UnknownType(other.to_string())),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AnyDataset – a reconstructed dataset of any kind
// ---------------------------------------------------------------------------

/// One of the concrete dataset types, as returned by [`dataset_from_dict`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnyDataset {
    Base(DatasetBase),
    Dataset(Dataset),
    Temporal(TemporalDataset),
}

impl AnyDataset {
    pub fn kind(&self) -> DatasetKind {
        match self {
            AnyDataset::Base(_) => DatasetKind::DatasetBase,
            AnyDataset::Dataset(_) => DatasetKind::Dataset,
            AnyDataset::Temporal(_) => DatasetKind::TemporalDataset,
        }
    }

    pub fn n_obs(&self) -> usize {
        match self {
            AnyDataset::Base(ds) => ds.n_obs(),
            AnyDataset::Dataset(ds) => ds.n_obs(),
            AnyDataset::Temporal(ds) => ds.n_obs(),
        }
    }

    pub fn n_channel(&self) -> usize {
        match self {
            AnyDataset::Base(ds) => ds.n_channel(),
            AnyDataset::Dataset(ds) => ds.n_channel(),
            AnyDataset::Temporal(ds) => ds.n_channel(),
        }
    }

    pub fn into_dataset(self) -> Option<Dataset> {
        match self {
            AnyDataset::Dataset(ds) => Some(ds),
            _ => None,
        }
    }

    pub fn into_temporal(self) -> Option<TemporalDataset> {
        match self {
            AnyDataset::Temporal(ds) => Some(ds),
            _ => None,
        }
    }

    /// Load whatever kind of dataset `path` holds.
    pub fn load(path: impl AsRef<Path>, format: Option<FileFormat>) -> Result<Self> {
        crate::io::load_dataset(path, format)
    }
}

impl DatasetOps for AnyDataset {
    fn split_obs(&self, by: &str) -> Result<Vec<Self>> {
        Ok(match self {
            AnyDataset::Base(ds) => ds.split_obs(by)?.into_iter().map(Self::Base).collect(),
            AnyDataset::Dataset(ds) => ds.split_obs(by)?.into_iter().map(Self::Dataset).collect(),
            AnyDataset::Temporal(ds) => ds.split_obs(by)?.into_iter().map(Self::Temporal).collect(),
        })
    }

    fn split_channel(&self, by: &str) -> Result<Vec<Self>> {
        Ok(match self {
            AnyDataset::Base(ds) => ds.split_channel(by)?.into_iter().map(Self::Base).collect(),
            AnyDataset::Dataset(ds) => {
                ds.split_channel(by)?.into_iter().map(Self::Dataset).collect()
            }
            AnyDataset::Temporal(ds) => {
                ds.split_channel(by)?.into_iter().map(Self::Temporal).collect()
            }
        })
    }

    fn subset_obs(&self, by: &str, selector: impl Into<Selector>) -> Result<Self> {
        Ok(match self {
            AnyDataset::Base(ds) => Self::Base(ds.subset_obs(by, selector)?),
            AnyDataset::Dataset(ds) => Self::Dataset(ds.subset_obs(by, selector)?),
            AnyDataset::Temporal(ds) => Self::Temporal(ds.subset_obs(by, selector)?),
        })
    }

    fn subset_channel(&self, by: &str, selector: impl Into<Selector>) -> Result<Self> {
        Ok(match self {
            AnyDataset::Base(ds) => Self::Base(ds.subset_channel(by, selector)?),
            AnyDataset::Dataset(ds) => Self::Dataset(ds.subset_channel(by, selector)?),
            AnyDataset::Temporal(ds) => Self::Temporal(ds.subset_channel(by, selector)?),
        })
    }

    fn to_dict(&self) -> DatasetDict {
        match self {
            AnyDataset::Base(ds) => ds.to_dict(),
            AnyDataset::Dataset(ds) => ds.to_dict(),
            AnyDataset::Temporal(ds) => ds.to_dict(),
        }
    }
}

impl fmt::Display for AnyDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyDataset::Base(ds) => fmt::Display::fmt(ds, f),
            AnyDataset::Dataset(ds) => fmt::Display::fmt(ds, f),
            AnyDataset::Temporal(ds) => fmt::Display::fmt(ds, f),
        }
    }
}

impl From<DatasetBase> for AnyDataset {
    fn from(ds: DatasetBase) -> Self {
        AnyDataset::Base(ds)
    }
}

impl From<Dataset> for AnyDataset {
    fn from(ds: Dataset) -> Self {
        AnyDataset::Dataset(ds)
    }
}

impl From<TemporalDataset> for AnyDataset {
    fn from(ds: TemporalDataset) -> Self {
        AnyDataset::Temporal(ds)
    }
}

/// Rebuild a dataset from its dictionary form, dispatching on the `type` tag.
pub fn dataset_from_dict(dict: DatasetDict) -> Result<AnyDataset> {
    let kind: DatasetKind = dict.kind.parse()?;
    let DatasetDict {
        measurements,
        descriptors,
        obs_descriptors,
        channel_descriptors,
        time_descriptors,
        ..
    } = dict;
    Ok(match kind {
        DatasetKind::DatasetBase => AnyDataset::Base(DatasetBase::new(
            measurements,
            Some(descriptors),
            Some(obs_descriptors),
            Some(channel_descriptors),
        )?),
        DatasetKind::Dataset => AnyDataset::Dataset(Dataset::new(
            measurements,
            Some(descriptors),
            Some(obs_descriptors),
            Some(channel_descriptors),
        )?),
        DatasetKind::TemporalDataset => AnyDataset::Temporal(TemporalDataset::new(
            measurements,
            Some(descriptors),
            Some(obs_descriptors),
            Some(channel_descriptors),
            time_descriptors,
        )?),
    })
}
