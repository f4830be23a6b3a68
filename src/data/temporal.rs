use std::fmt;
use std::iter;
use std::sync::Arc;

use log::{debug, warn};
use ndarray::{Array, Array2, Array3, Axis, Dimension, Ix3};

use super::shared::{group_indices, into_rank, DatasetCore, CHANNEL, OBS, TIME};
use super::dataset::{Dataset, DatasetOps};
use super::descriptor::{
    column, format_bin, format_descriptor, membership_index, unique_values, DescriptorTable,
    DescriptorValue, Descriptors, Selector,
};
use super::dict::{DatasetDict, DatasetKind};
use crate::error::{DatasetError, Result};

/// Key of the time coordinate every temporal dataset carries.
pub const TIME_KEY: &str = "time";

/// Key under which `bin_time` records each bin's members.
pub const BINS_KEY: &str = "bins";

const LAYOUT_3D: &str = "n_obs x n_channel x n_time";

// ---------------------------------------------------------------------------
// TemporalDataset – observations x channels x time
// ---------------------------------------------------------------------------

/// A 3D dataset with an additional time axis and its descriptor table.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalDataset {
    core: DatasetCore<Ix3>,
    time_descriptors: Arc<DescriptorTable>,
}

impl TemporalDataset {
    /// Build and validate a temporal dataset.
    ///
    /// `time_descriptors` must hold a `time` coordinate. When no table is
    /// given one is created as `0..n_time`; when a table lacks `time` the same
    /// default is filled in and a warning is logged.
    pub fn new<D: Dimension>(
        measurements: Array<f64, D>,
        descriptors: Option<Descriptors>,
        obs_descriptors: Option<DescriptorTable>,
        channel_descriptors: Option<DescriptorTable>,
        time_descriptors: Option<DescriptorTable>,
    ) -> Result<Self> {
        let measurements = into_rank(measurements, LAYOUT_3D)?;
        let core = DatasetCore::new(
            measurements,
            descriptors,
            obs_descriptors,
            channel_descriptors,
        )?;
        Self::with_time(core, time_descriptors)
    }

    fn with_time(core: DatasetCore<Ix3>, time_descriptors: Option<DescriptorTable>) -> Result<Self> {
        let n_time = core.measurements.len_of(Axis(2));
        let default_time = || column((0..n_time).map(|t| t as i64));
        let time_descriptors = match time_descriptors {
            None => DescriptorTable::new().with_column(TIME_KEY, default_time()),
            Some(mut table) => {
                if !table.contains(TIME_KEY) {
                    warn!("no '{TIME_KEY}' in time_descriptors; '{TIME_KEY}' set to 0..{n_time}");
                    table.insert(TIME_KEY, default_time());
                }
                table
            }
        };
        time_descriptors.check_length(TIME, n_time)?;
        Ok(Self {
            core,
            time_descriptors: Arc::new(time_descriptors),
        })
    }

    pub fn n_obs(&self) -> usize {
        self.core.n_obs()
    }

    pub fn n_channel(&self) -> usize {
        self.core.n_channel()
    }

    pub fn n_time(&self) -> usize {
        self.core.measurements.len_of(Axis(2))
    }

    pub fn measurements(&self) -> &Array3<f64> {
        &self.core.measurements
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.core.descriptors
    }

    pub fn obs_descriptors(&self) -> &DescriptorTable {
        &self.core.obs_descriptors
    }

    pub fn channel_descriptors(&self) -> &DescriptorTable {
        &self.core.channel_descriptors
    }

    pub fn time_descriptors(&self) -> &DescriptorTable {
        &self.time_descriptors
    }

    fn derived(&self, core: DatasetCore<Ix3>) -> Self {
        Self {
            core,
            time_descriptors: Arc::clone(&self.time_descriptors),
        }
    }

    /// Keep the time samples at `indices`.
    fn take_time(&self, indices: &[usize]) -> Self {
        let core = DatasetCore {
            measurements: self.core.measurements.select(Axis(2), indices),
            descriptors: Arc::clone(&self.core.descriptors),
            obs_descriptors: Arc::clone(&self.core.obs_descriptors),
            channel_descriptors: Arc::clone(&self.core.channel_descriptors),
        };
        Self {
            core,
            time_descriptors: Arc::new(self.time_descriptors.subset(indices)),
        }
    }

    /// Stable ascending sort of the observations by `obs_descriptors[by]`.
    pub fn sort_by(&mut self, by: &str) -> Result<()> {
        self.core.sort_obs_by(by)
    }

    /// One dataset per distinct value of `time_descriptors[by]`, in order of
    /// first occurrence.
    pub fn split_time(&self, by: &str) -> Result<Vec<Self>> {
        let groups = group_indices(self.time_descriptors.require(TIME, by)?);
        debug!("split_time by '{by}' into {} datasets", groups.len());
        Ok(groups.iter().map(|(_, idx)| self.take_time(idx)).collect())
    }

    /// Time samples whose `by` value lies in the closed range `[t_from, t_to]`.
    pub fn subset_time(
        &self,
        by: &str,
        t_from: impl Into<DescriptorValue>,
        t_to: impl Into<DescriptorValue>,
    ) -> Result<Self> {
        let (t_from, t_to) = (t_from.into(), t_to.into());
        let values = self.time_descriptors.require(TIME, by)?;
        let selected: Vec<DescriptorValue> = unique_values(values)
            .into_iter()
            .filter(|t| *t >= t_from && *t <= t_to)
            .collect();
        let idx = membership_index(values, &Selector::AnyOf(selected));
        Ok(self.take_time(&idx))
    }

    /// Average the measurements within caller-defined groups of time points.
    ///
    /// Output sample `i` is the mean over every input sample whose `by` value
    /// is listed in `bins[i]`, and its `by` coordinate is the mean of those
    /// values. A textual summary of each bin is stored under `bins`. Other
    /// time descriptors survive only where each bin holds a single value.
    pub fn bin_time(&self, by: &str, bins: &[Vec<DescriptorValue>]) -> Result<Self> {
        let time = self.time_descriptors.require(TIME, by)?;
        let (n_obs, n_channel, _) = self.core.measurements.dim();
        let mut binned = Array3::<f64>::zeros((n_obs, n_channel, bins.len()));
        let mut members = Vec::with_capacity(bins.len());
        let mut coordinates = Vec::with_capacity(bins.len());

        for (i, bin) in bins.iter().enumerate() {
            let idx = membership_index(time, &Selector::AnyOf(bin.clone()));
            let mean = self
                .core
                .measurements
                .select(Axis(2), &idx)
                .mean_axis(Axis(2))
                .ok_or(DatasetError::EmptyBin { index: i })?;
            binned.index_axis_mut(Axis(2), i).assign(&mean);

            let total = idx
                .iter()
                .map(|&t| numeric(by, &time[t]))
                .sum::<Result<f64>>()?;
            coordinates.push(DescriptorValue::Float(total / idx.len() as f64));
            members.push(idx);
        }

        let mut table = DescriptorTable::new();
        for (name, values) in self.time_descriptors.iter() {
            if name == by {
                continue;
            }
            match collapse_per_bin(values, &members) {
                Some(collapsed) => {
                    table.insert(name.clone(), collapsed);
                }
                None => warn!("bin_time: dropping time descriptor '{name}', it varies within a bin"),
            }
        }
        table.insert(by, coordinates);
        table.insert(
            BINS_KEY,
            bins.iter()
                .map(|bin| DescriptorValue::String(format_bin(bin)))
                .collect(),
        );
        debug!("bin_time by '{by}': {} samples into {} bins", self.n_time(), bins.len());

        let core = DatasetCore {
            measurements: binned,
            descriptors: Arc::clone(&self.core.descriptors),
            obs_descriptors: Arc::clone(&self.core.obs_descriptors),
            channel_descriptors: Arc::clone(&self.core.channel_descriptors),
        };
        Self::with_time(core, Some(table))
    }

    /// Fold the time axis into the observation axis.
    ///
    /// Rows are time-major: the block for each time sample holds all
    /// observations in order. Samples are visited grouped by the distinct
    /// values of `time_descriptors[by]` in order of first occurrence. Every
    /// time descriptor becomes an obs descriptor repeated across its block.
    pub fn convert_to_dataset(&self, by: &str) -> Result<Dataset> {
        let time = self.time_descriptors.require(TIME, by)?;
        if let Some(name) = self
            .time_descriptors
            .names()
            .find(|name| self.core.obs_descriptors.contains(name))
        {
            return Err(DatasetError::DescriptorConflict { name: name.clone() });
        }

        let order: Vec<usize> = group_indices(time)
            .into_iter()
            .flat_map(|(_, idx)| idx)
            .collect();
        let n_obs = self.n_obs();
        let source = &self.core.measurements;
        let measurements = Array2::from_shape_fn(
            (n_obs * order.len(), self.n_channel()),
            |(row, channel)| source[[row % n_obs, channel, order[row / n_obs]]],
        );

        let mut obs_descriptors = DescriptorTable::new();
        for (name, values) in self.core.obs_descriptors.iter() {
            let stacked = iter::repeat(values.iter())
                .take(order.len())
                .flatten()
                .cloned()
                .collect();
            obs_descriptors.insert(name.clone(), stacked);
        }
        for (name, values) in self.time_descriptors.iter() {
            let broadcast = order
                .iter()
                .flat_map(|&t| iter::repeat(values[t].clone()).take(n_obs))
                .collect();
            obs_descriptors.insert(name.clone(), broadcast);
        }
        debug!(
            "convert_to_dataset by '{by}': {} x {} -> {} rows",
            n_obs,
            order.len(),
            measurements.nrows()
        );

        Ok(Dataset::from_core(DatasetCore {
            measurements,
            descriptors: Arc::clone(&self.core.descriptors),
            obs_descriptors: Arc::new(obs_descriptors),
            channel_descriptors: Arc::clone(&self.core.channel_descriptors),
        }))
    }
}

fn numeric(by: &str, value: &DescriptorValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| DatasetError::NonNumericDescriptor {
        table: TIME,
        name: by.to_string(),
        value: value.to_string(),
    })
}

/// One value per bin, or `None` if some bin mixes different values.
fn collapse_per_bin(values: &[DescriptorValue], members: &[Vec<usize>]) -> Option<Vec<DescriptorValue>> {
    members
        .iter()
        .map(|idx| {
            let first = &values[*idx.first()?];
            idx.iter().all(|&t| values[t] == *first).then(|| first.clone())
        })
        .collect()
}

impl DatasetOps for TemporalDataset {
    fn split_obs(&self, by: &str) -> Result<Vec<Self>> {
        let groups = self.core.obs_groups(by)?;
        debug!("split_obs by '{by}' into {} temporal datasets", groups.len());
        Ok(groups
            .iter()
            .map(|(_, idx)| self.derived(self.core.take_obs(idx)))
            .collect())
    }

    fn split_channel(&self, by: &str) -> Result<Vec<Self>> {
        let groups = self.core.channel_groups(by)?;
        debug!("split_channel by '{by}' into {} temporal datasets", groups.len());
        Ok(groups
            .into_iter()
            .map(|(value, idx)| {
                let mut core = self.core.take_channel(&idx);
                core.set_descriptor(by, value);
                self.derived(core)
            })
            .collect())
    }

    fn subset_obs(&self, by: &str, selector: impl Into<Selector>) -> Result<Self> {
        let values = self.core.obs_descriptors.require(OBS, by)?;
        let idx = membership_index(values, &selector.into());
        Ok(self.derived(self.core.take_obs(&idx)))
    }

    fn subset_channel(&self, by: &str, selector: impl Into<Selector>) -> Result<Self> {
        let values = self.core.channel_descriptors.require(CHANNEL, by)?;
        let idx = membership_index(values, &selector.into());
        Ok(self.derived(self.core.take_channel(&idx)))
    }

    fn to_dict(&self) -> DatasetDict {
        DatasetDict::from_core(
            &self.core,
            Some((*self.time_descriptors).clone()),
            DatasetKind::TemporalDataset,
        )
    }
}

impl fmt::Display for TemporalDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.fmt_summary(DatasetKind::TemporalDataset.as_str(), f)?;
        writeln!(f, "time_descriptors: \n{}", format_descriptor(&self.time_descriptors))
    }
}
