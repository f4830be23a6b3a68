use std::fmt;
use std::sync::Arc;

use ndarray::{Array, Axis, Dimension, RemoveAxis, Slice};

use super::descriptor::{
    format_descriptor, unique_values, DescriptorTable, DescriptorValue, Descriptors,
};
use crate::error::{DatasetError, Result};

pub(crate) const OBS: &str = "obs_descriptors";
pub(crate) const CHANNEL: &str = "channel_descriptors";
pub(crate) const TIME: &str = "time_descriptors";

// ---------------------------------------------------------------------------
// DatasetCore – measurements plus descriptor tables, shared by every variant
// ---------------------------------------------------------------------------

/// Measurements with dataset-, obs- and channel-level descriptors.
///
/// Axis 0 is always observations and axis 1 channels. Descriptor tables sit
/// behind `Arc` so derived datasets share the tables of untouched axes;
/// writes go through `Arc::make_mut` and never leak into siblings.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DatasetCore<D: Dimension> {
    pub(crate) measurements: Array<f64, D>,
    pub(crate) descriptors: Arc<Descriptors>,
    pub(crate) obs_descriptors: Arc<DescriptorTable>,
    pub(crate) channel_descriptors: Arc<DescriptorTable>,
}

impl<D: Dimension + RemoveAxis> DatasetCore<D> {
    /// Validate descriptor lengths against the measurement shape.
    pub(crate) fn new(
        measurements: Array<f64, D>,
        descriptors: Option<Descriptors>,
        obs_descriptors: Option<DescriptorTable>,
        channel_descriptors: Option<DescriptorTable>,
    ) -> Result<Self> {
        let obs_descriptors = obs_descriptors.unwrap_or_default();
        let channel_descriptors = channel_descriptors.unwrap_or_default();
        let shape = measurements.shape();
        obs_descriptors.check_length(OBS, shape[0])?;
        channel_descriptors.check_length(CHANNEL, shape[1])?;
        Ok(Self {
            measurements,
            descriptors: Arc::new(descriptors.unwrap_or_default()),
            obs_descriptors: Arc::new(obs_descriptors),
            channel_descriptors: Arc::new(channel_descriptors),
        })
    }

    pub fn n_obs(&self) -> usize {
        self.measurements.len_of(Axis(0))
    }

    pub fn n_channel(&self) -> usize {
        self.measurements.len_of(Axis(1))
    }

    /// Keep the observations at `indices`; channel tables are shared.
    pub(crate) fn take_obs(&self, indices: &[usize]) -> Self {
        Self {
            measurements: self.measurements.select(Axis(0), indices),
            descriptors: Arc::clone(&self.descriptors),
            obs_descriptors: Arc::new(self.obs_descriptors.subset(indices)),
            channel_descriptors: Arc::clone(&self.channel_descriptors),
        }
    }

    /// Keep the channels at `indices`; obs tables are shared.
    pub(crate) fn take_channel(&self, indices: &[usize]) -> Self {
        Self {
            measurements: self.measurements.select(Axis(1), indices),
            descriptors: Arc::clone(&self.descriptors),
            obs_descriptors: Arc::clone(&self.obs_descriptors),
            channel_descriptors: Arc::new(self.channel_descriptors.subset(indices)),
        }
    }

    /// Record `value` under `key` in the dataset-level descriptors.
    pub(crate) fn set_descriptor(&mut self, key: &str, value: DescriptorValue) {
        Arc::make_mut(&mut self.descriptors).insert(key.to_string(), value);
    }

    /// Group observation indices by the distinct values of `obs_descriptors[by]`.
    pub(crate) fn obs_groups(&self, by: &str) -> Result<Vec<(DescriptorValue, Vec<usize>)>> {
        Ok(group_indices(self.obs_descriptors.require(OBS, by)?))
    }

    pub(crate) fn channel_groups(
        &self,
        by: &str,
    ) -> Result<Vec<(DescriptorValue, Vec<usize>)>> {
        Ok(group_indices(self.channel_descriptors.require(CHANNEL, by)?))
    }

    /// Stable ascending reorder of observations by `obs_descriptors[by]`.
    pub(crate) fn sort_obs_by(&mut self, by: &str) -> Result<()> {
        let keys = self.obs_descriptors.require(OBS, by)?;
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
        self.measurements = self.measurements.select(Axis(0), &order);
        self.obs_descriptors = Arc::new(self.obs_descriptors.subset(&order));
        Ok(())
    }

    /// Header, leading observations and the three descriptor tables.
    pub(crate) fn fmt_summary(&self, kind: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.n_obs().min(PREVIEW_ROWS);
        let preview = self
            .measurements
            .slice_axis(Axis(0), Slice::from(0..head));
        writeln!(f, "rusty_rsa::{kind}")?;
        writeln!(f, "measurements = \n{preview}")?;
        if head < self.n_obs() {
            writeln!(f, "...")?;
        }
        writeln!(f)?;
        writeln!(f, "descriptors: ")?;
        for (key, value) in self.descriptors.iter() {
            writeln!(f, "{key} = {value}")?;
        }
        writeln!(f)?;
        writeln!(f, "obs_descriptors: \n{}\n", format_descriptor(&self.obs_descriptors))?;
        writeln!(f, "channel_descriptors: \n{}", format_descriptor(&self.channel_descriptors))
    }
}

const PREVIEW_ROWS: usize = 5;

/// Pair each distinct value (first-occurrence order) with the positions holding it.
pub(crate) fn group_indices(values: &[DescriptorValue]) -> Vec<(DescriptorValue, Vec<usize>)> {
    unique_values(values)
        .into_iter()
        .map(|v| {
            let idx = values
                .iter()
                .enumerate()
                .filter(|(_, x)| **x == v)
                .map(|(i, _)| i)
                .collect();
            (v, idx)
        })
        .collect()
}

/// Convert a run-time rank mismatch into `DatasetError::Dimension`.
pub(crate) fn into_rank<D: Dimension, E: Dimension>(
    measurements: Array<f64, D>,
    layout: &'static str,
) -> Result<Array<f64, E>> {
    let found = measurements.ndim();
    measurements
        .into_dimensionality::<E>()
        .map_err(|_| DatasetError::Dimension {
            expected: E::NDIM.unwrap_or(found),
            found,
            layout,
        })
}
