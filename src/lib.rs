//! Datasets for representational similarity analysis.
//!
//! Measurements are stored as observations × channels (× time) arrays
//! together with descriptor tables for every axis. Datasets can be split,
//! subset, sorted, binned in time, flattened and persisted.

pub mod data;
pub mod error;
pub mod io;

pub use data::dataset::{Dataset, DatasetBase, DatasetOps};
pub use data::descriptor::{
    column, format_descriptor, membership_index, unique_values, DescriptorTable,
    DescriptorValue, Descriptors, Selector,
};
pub use data::dict::{dataset_from_dict, AnyDataset, DatasetDict, DatasetKind};
pub use data::tabular::load_table;
pub use data::temporal::TemporalDataset;
pub use error::{DatasetError, Result};
pub use io::{load_dataset, DictStore, FileFormat};
