//! Data layer: descriptor tables, dataset variants and their transformations.
//!
//! Architecture:
//! ```text
//!  raw arrays / .parquet / .json / .csv
//!        │
//!        ▼
//!   ┌────────────┐
//!   │  tabular   │  observation table → Dataset
//!   └────────────┘
//!        │
//!        ▼
//!   ┌──────────────────────────────────┐
//!   │ DatasetBase │ Dataset │ Temporal │  DatasetCore + descriptor tables
//!   └──────────────────────────────────┘
//!        │  split / subset / sort / bin / convert
//!        ▼
//!   ┌────────────┐
//!   │    dict    │  DatasetDict ⇄ AnyDataset, handed to crate::io
//!   └────────────┘
//! ```

pub mod dataset;
pub mod descriptor;
pub mod dict;
pub(crate) mod shared;
pub mod tabular;
pub mod temporal;
