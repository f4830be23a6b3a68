use std::fmt;
use std::path::Path;

use log::debug;
use ndarray::{Array, Array2, Dimension, Ix2};

use super::shared::{into_rank, DatasetCore, CHANNEL, OBS};
use super::descriptor::{membership_index, DescriptorTable, Descriptors, Selector};
use super::dict::{DatasetDict, DatasetKind};
use crate::error::{DatasetError, Result};
use crate::io::{write_dict, FileFormat};

pub(crate) const LAYOUT_2D: &str = "n_obs x n_channel";

// ---------------------------------------------------------------------------
// Shared capability interface
// ---------------------------------------------------------------------------

/// Operations every dataset variant offers along the obs and channel axes.
pub trait DatasetOps: Sized {
    /// Split into one dataset per distinct value of `obs_descriptors[by]`,
    /// in order of first occurrence.
    fn split_obs(&self, by: &str) -> Result<Vec<Self>>;

    /// Split by `channel_descriptors[by]`; each part records its value under
    /// `by` in the dataset-level descriptors.
    fn split_channel(&self, by: &str) -> Result<Vec<Self>>;

    /// Observations whose `by` descriptor matches `selector`.
    fn subset_obs(&self, by: &str, selector: impl Into<Selector>) -> Result<Self>;

    /// Channels whose `by` descriptor matches `selector`.
    fn subset_channel(&self, by: &str, selector: impl Into<Selector>) -> Result<Self>;

    /// Plain representation used for persistence.
    fn to_dict(&self) -> DatasetDict;

    fn save(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        write_dict(path.as_ref(), &self.to_dict(), format)
    }
}

// ---------------------------------------------------------------------------
// DatasetBase – holds data, offers no axis operations
// ---------------------------------------------------------------------------

/// Measurements and descriptors without any split/subset capability.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetBase {
    core: DatasetCore<Ix2>,
}

impl DatasetBase {
    pub fn new<D: Dimension>(
        measurements: Array<f64, D>,
        descriptors: Option<Descriptors>,
        obs_descriptors: Option<DescriptorTable>,
        channel_descriptors: Option<DescriptorTable>,
    ) -> Result<Self> {
        let measurements = into_rank(measurements, LAYOUT_2D)?;
        let core = DatasetCore::new(
            measurements,
            descriptors,
            obs_descriptors,
            channel_descriptors,
        )?;
        Ok(Self { core })
    }

    pub fn n_obs(&self) -> usize {
        self.core.n_obs()
    }

    pub fn n_channel(&self) -> usize {
        self.core.n_channel()
    }

    pub fn measurements(&self) -> &Array2<f64> {
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

    fn unsupported<T>(operation: &'static str) -> Result<T> {
        Err(DatasetError::NotImplemented {
            operation,
            kind: DatasetKind::DatasetBase.as_str(),
        })
    }
}

impl DatasetOps for DatasetBase {
    fn split_obs(&self, _by: &str) -> Result<Vec<Self>> {
        Self::unsupported("split_obs")
    }

    fn split_channel(&self, _by: &str) -> Result<Vec<Self>> {
        Self::unsupported("split_channel")
    }

    fn subset_obs(&self, _by: &str, _selector: impl Into<Selector>) -> Result<Self> {
        Self::unsupported("subset_obs")
    }

    fn subset_channel(&self, _by: &str, _selector: impl Into<Selector>) -> Result<Self> {
        Self::unsupported("subset_channel")
    }

    fn to_dict(&self) -> DatasetDict {
        DatasetDict::from_core(&self.core, None, DatasetKind::DatasetBase)
    }
}

impl fmt::Display for DatasetBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.fmt_summary(DatasetKind::DatasetBase.as_str(), f)
    }
}

// ---------------------------------------------------------------------------
// Dataset – observations x channels
// ---------------------------------------------------------------------------

/// A 2D dataset: one row per observation, one column per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    core: DatasetCore<Ix2>,
}

impl Dataset {
    /// Build and validate a dataset.
    ///
    /// Fails with [`DatasetError::Dimension`] unless `measurements` is 2D and
    /// with [`DatasetError::DescriptorLength`] when a descriptor column does
    /// not match its axis. Missing tables become empty ones.
    pub fn new<D: Dimension>(
        measurements: Array<f64, D>,
        descriptors: Option<Descriptors>,
        obs_descriptors: Option<DescriptorTable>,
        channel_descriptors: Option<DescriptorTable>,
    ) -> Result<Self> {
        let measurements = into_rank(measurements, LAYOUT_2D)?;
        let core = DatasetCore::new(
            measurements,
            descriptors,
            obs_descriptors,
            channel_descriptors,
        )?;
        Ok(Self { core })
    }

    pub(crate) fn from_core(core: DatasetCore<Ix2>) -> Self {
        Self { core }
    }

    pub fn n_obs(&self) -> usize {
        self.core.n_obs()
    }

    pub fn n_channel(&self) -> usize {
        self.core.n_channel()
    }

    pub fn measurements(&self) -> &Array2<f64> {
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

    /// Stable ascending sort of the observations by `obs_descriptors[by]`.
    pub fn sort_by(&mut self, by: &str) -> Result<()> {
        self.core.sort_obs_by(by)
    }
}

impl DatasetOps for Dataset {
    fn split_obs(&self, by: &str) -> Result<Vec<Self>> {
        let groups = self.core.obs_groups(by)?;
        debug!("split_obs by '{by}' into {} datasets", groups.len());
        Ok(groups
            .iter()
            .map(|(_, idx)| Self::from_core(self.core.take_obs(idx)))
            .collect())
    }

    fn split_channel(&self, by: &str) -> Result<Vec<Self>> {
        let groups = self.core.channel_groups(by)?;
        debug!("split_channel by '{by}' into {} datasets", groups.len());
        Ok(groups
            .into_iter()
            .map(|(value, idx)| {
                let mut core = self.core.take_channel(&idx);
                core.set_descriptor(by, value);
                Self::from_core(core)
            })
            .collect())
    }

    fn subset_obs(&self, by: &str, selector: impl Into<Selector>) -> Result<Self> {
        let values = self.core.obs_descriptors.require(OBS, by)?;
        let idx = membership_index(values, &selector.into());
        Ok(Self::from_core(self.core.take_obs(&idx)))
    }

    fn subset_channel(&self, by: &str, selector: impl Into<Selector>) -> Result<Self> {
        let values = self.core.channel_descriptors.require(CHANNEL, by)?;
        let idx = membership_index(values, &selector.into());
        Ok(Self::from_core(self.core.take_channel(&idx)))
    }

    fn to_dict(&self) -> DatasetDict {
        DatasetDict::from_core(&self.core, None, DatasetKind::Dataset)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.fmt_summary(DatasetKind::Dataset.as_str(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::descriptor::{column, DescriptorValue};
    use ndarray::{array, Array3};

    fn sample() -> Dataset {
        let measurements = array![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 9.0],
            [10.0, 11.0, 12.0],
        ];
        let obs = DescriptorTable::new()
            .with_column("cond", column(["b", "a", "b", "c"]))
            .with_column("rank", column([3, 1, 2, 1]));
        let channel = DescriptorTable::new()
            .with_column("roi", column(["v1", "v2", "v1"]))
            .with_column("id", column([0, 1, 2]));
        let mut descriptors = Descriptors::new();
        descriptors.insert("subject".into(), "s01".into());
        Dataset::new(measurements, Some(descriptors), Some(obs), Some(channel)).unwrap()
    }

    #[test]
    fn rejects_three_dimensional_measurements() {
        let err = Dataset::new(Array3::<f64>::zeros((2, 2, 2)), None, None, None).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Dimension {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn rejects_obs_descriptor_of_wrong_length() {
        let obs = DescriptorTable::new().with_column("cond", column(["a", "b", "c"]));
        let err = Dataset::new(Array2::<f64>::zeros((2, 4)), None, Some(obs), None).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::DescriptorLength {
                table: "obs_descriptors",
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn rejects_channel_descriptor_of_wrong_length() {
        let channel = DescriptorTable::new().with_column("roi", column(["v1"]));
        let err = Dataset::new(Array2::<f64>::zeros((2, 4)), None, None, Some(channel));
        assert!(matches!(err, Err(DatasetError::DescriptorLength { .. })));
    }

    #[test]
    fn missing_tables_become_empty() {
        let ds = Dataset::new(Array2::<f64>::zeros((3, 2)), None, None, None).unwrap();
        assert_eq!((ds.n_obs(), ds.n_channel()), (3, 2));
        assert!(ds.descriptors().is_empty());
        assert!(ds.obs_descriptors().is_empty());
        assert!(ds.channel_descriptors().is_empty());
    }

    #[test]
    fn split_obs_follows_first_occurrence_order() {
        let parts = sample().split_obs("cond").unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].measurements(), &array![[1.0, 2.0, 3.0], [7.0, 8.0, 9.0]]);
        assert_eq!(parts[1].measurements(), &array![[4.0, 5.0, 6.0]]);
        assert_eq!(parts[2].measurements(), &array![[10.0, 11.0, 12.0]]);
        assert_eq!(parts[0].obs_descriptors().get("rank").unwrap(), column([3, 2]).as_slice());
        for part in &parts {
            assert_eq!(part.n_channel(), 3);
            assert_eq!(part.descriptors().get("subject"), Some(&DescriptorValue::from("s01")));
        }
    }

    #[test]
    fn split_obs_unknown_descriptor_fails() {
        let err = sample().split_obs("missing").unwrap_err();
        assert!(matches!(err, DatasetError::UnknownDescriptor { table: "obs_descriptors", .. }));
    }

    #[test]
    fn split_channel_records_value_without_leaking() {
        let ds = sample();
        let parts = ds.split_channel("roi").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].measurements().column(1), array![3.0, 6.0, 9.0, 12.0]);
        assert_eq!(parts[0].descriptors().get("roi"), Some(&DescriptorValue::from("v1")));
        assert_eq!(parts[1].descriptors().get("roi"), Some(&DescriptorValue::from("v2")));
        assert!(!ds.descriptors().contains_key("roi"));
        assert_eq!(parts[1].obs_descriptors(), ds.obs_descriptors());
    }

    #[test]
    fn subset_obs_supports_membership() {
        let ds = sample();
        let single = ds.subset_obs("cond", "b").unwrap();
        assert_eq!(single.n_obs(), 2);
        let many = ds.subset_obs("cond", column(["a", "c"])).unwrap();
        assert_eq!(many.measurements(), &array![[4.0, 5.0, 6.0], [10.0, 11.0, 12.0]]);
        let none = ds.subset_obs("cond", "zzz").unwrap();
        assert_eq!(none.n_obs(), 0);
        assert_eq!(none.n_channel(), 3);
    }

    #[test]
    fn subset_obs_is_idempotent() {
        let once = sample().subset_obs("rank", 1).unwrap();
        let twice = once.subset_obs("rank", 1).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn subset_channel_matches_numbers_across_types() {
        let sub = sample()
            .subset_channel("id", vec![DescriptorValue::Float(0.0), DescriptorValue::Float(2.0)])
            .unwrap();
        assert_eq!(sub.n_channel(), 2);
        assert_eq!(sub.channel_descriptors().get("roi").unwrap(), column(["v1", "v1"]).as_slice());
    }

    #[test]
    fn signed_zero_descriptors_fall_in_one_group() {
        let obs = DescriptorTable::new().with_column("t", column([0.0, -0.0, 1.0]));
        let ds = Dataset::new(array![[1.0], [2.0], [3.0]], None, Some(obs), None).unwrap();
        assert_eq!(ds.split_obs("t").unwrap().len(), 2);
        assert_eq!(ds.subset_obs("t", 0.0).unwrap().measurements(), &array![[1.0], [2.0]]);
    }

    #[test]
    fn sort_by_is_stable_and_permutes_rows() {
        let mut ds = sample();
        ds.sort_by("rank").unwrap();
        assert_eq!(ds.obs_descriptors().get("rank").unwrap(), column([1, 1, 2, 3]).as_slice());
        // equal ranks keep their original relative order
        assert_eq!(ds.obs_descriptors().get("cond").unwrap(), column(["a", "c", "b", "b"]).as_slice());
        assert_eq!(ds.measurements().row(0), array![4.0, 5.0, 6.0]);
        assert_eq!(ds.measurements().row(3), array![1.0, 2.0, 3.0]);
    }

    #[test]
    fn sort_by_does_not_touch_split_siblings() {
        let ds = sample();
        let mut parts = ds.split_channel("roi").unwrap();
        parts[0].sort_by("rank").unwrap();
        assert_eq!(parts[1].obs_descriptors().get("rank").unwrap(), column([3, 1, 2, 1]).as_slice());
    }

    #[test]
    fn base_dataset_has_no_axis_operations() {
        let base = DatasetBase::new(Array2::<f64>::zeros((2, 2)), None, None, None).unwrap();
        let err = base.split_obs("x").unwrap_err();
        assert!(matches!(err, DatasetError::NotImplemented { operation: "split_obs", .. }));
        assert!(base.subset_channel("x", 1).is_err());
    }

    #[test]
    fn to_dict_tags_the_concrete_type() {
        let dict = sample().to_dict();
        assert_eq!(dict.kind, "Dataset");
        assert_eq!(dict.measurements.shape(), &[4, 3]);
        assert!(dict.time_descriptors.is_none());
    }

    #[test]
    fn display_lists_descriptor_tables() {
        let text = sample().to_string();
        assert!(text.starts_with("rusty_rsa::Dataset"));
        assert!(text.contains("cond = [b, a, b, c]"));
        assert!(text.contains("subject = s01"));
    }
}
