//! Persistence gateway: reads and writes [`DatasetDict`] values.
//!
//! The dataset types only produce and consume the dictionary shape; how it
//! lands on disk is decided here by a [`FileFormat`].

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use log::info;

use crate::data::descriptor::DescriptorValue;
use crate::data::dict::{dataset_from_dict, AnyDataset, DatasetDict};
use crate::data::shared::{CHANNEL, OBS, TIME};
use crate::error::{DatasetError, Result};

// ---------------------------------------------------------------------------
// Store backends
// ---------------------------------------------------------------------------

/// A backend able to persist the dictionary form of a dataset.
pub trait DictStore {
    fn write(&self, path: &Path, dict: &DatasetDict) -> Result<()>;
    fn read(&self, path: &Path) -> Result<DatasetDict>;
}

/// Human-readable JSON. Floats round-trip bit for bit; NaN and infinity are
/// refused before the file is created.
pub struct JsonStore;

impl DictStore for JsonStore {
    fn write(&self, path: &Path, dict: &DatasetDict) -> Result<()> {
        if let Some(field) = non_finite_field(dict) {
            return Err(DatasetError::NonFinite {
                format: FileFormat::Json.as_str(),
                field,
            });
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, dict)?;
        writer.flush()?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<DatasetDict> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// First part of `dict` holding a NaN or infinite float.
fn non_finite_field(dict: &DatasetDict) -> Option<&'static str> {
    fn non_finite(value: &DescriptorValue) -> bool {
        match value {
            DescriptorValue::Float(f) => !f.is_finite(),
            DescriptorValue::List(items) => items.iter().any(non_finite),
            _ => false,
        }
    }

    if dict.measurements.iter().any(|v| !v.is_finite()) {
        return Some("measurements");
    }
    if dict.descriptors.values().any(non_finite) {
        return Some("descriptors");
    }
    let tables = [
        (OBS, Some(&dict.obs_descriptors)),
        (CHANNEL, Some(&dict.channel_descriptors)),
        (TIME, dict.time_descriptors.as_ref()),
    ];
    tables
        .into_iter()
        .filter_map(|(name, table)| Some((name, table?)))
        .find(|(_, table)| table.iter().any(|(_, values)| values.iter().any(non_finite)))
        .map(|(name, _)| name)
}

/// Compact binary encoding.
pub struct BincodeStore;

impl DictStore for BincodeStore {
    fn write(&self, path: &Path, dict: &DatasetDict) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, dict)?;
        writer.flush()?;
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<DatasetDict> {
        let reader = BufReader::new(File::open(path)?);
        Ok(bincode::deserialize_from(reader)?)
    }
}

// ---------------------------------------------------------------------------
// FileFormat – format identifiers and suffix inference
// ---------------------------------------------------------------------------

/// Format identifiers understood by [`load_dataset`] and `save`.
///
/// `Hdf5` and `Pickle` keep the identifiers and file suffixes of the
/// Python toolchain; both are written with [`BincodeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Bincode,
    Hdf5,
    Pickle,
}

impl FileFormat {
    /// Infer the format from the file name.
    ///
    /// * `.pkl`                      – [`FileFormat::Pickle`]
    /// * `.h5` or a name ending `hdf5` – [`FileFormat::Hdf5`]
    /// * `.json`                     – [`FileFormat::Json`]
    /// * `.bin` / `.bincode`          – [`FileFormat::Bincode`]
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if name.ends_with(".pkl") {
            return Ok(FileFormat::Pickle);
        }
        if name.ends_with(".h5") || name.ends_with("hdf5") {
            return Ok(FileFormat::Hdf5);
        }
        let ext = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        match ext {
            "json" => Ok(FileFormat::Json),
            "bin" | "bincode" => Ok(FileFormat::Bincode),
            _ => Err(DatasetError::UnknownFormat(path.display().to_string())),
        }
    }

    pub fn store(self) -> &'static dyn DictStore {
        match self {
            FileFormat::Json => &JsonStore,
            FileFormat::Bincode | FileFormat::Hdf5 | FileFormat::Pickle => &BincodeStore,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileFormat::Json => "json",
            FileFormat::Bincode => "bincode",
            FileFormat::Hdf5 => "hdf5",
            FileFormat::Pickle => "pkl",
        }
    }
}

impl FromStr for FileFormat {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(FileFormat::Json),
            "bincode" | "bin" => Ok(FileFormat::Bincode),
            "hdf5" => Ok(FileFormat::Hdf5),
            "pkl" => Ok(FileFormat::Pickle),
            other => Err(DatasetError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

pub fn write_dict(path: &Path, dict: &DatasetDict, format: FileFormat) -> Result<()> {
    info!("saving {} as {format} to {}", dict.kind, path.display());
    format.store().write(path, dict)
}

pub fn read_dict(path: &Path, format: FileFormat) -> Result<DatasetDict> {
    let dict = format.store().read(path)?;
    info!("read {} ({format}) from {}", dict.kind, path.display());
    Ok(dict)
}

/// Load a dataset of any kind. Without an explicit `format` it is inferred
/// from the file extension.
pub fn load_dataset(path: impl AsRef<Path>, format: Option<FileFormat>) -> Result<AnyDataset> {
    let path = path.as_ref();
    let format = match format {
        Some(format) => format,
        None => FileFormat::from_path(path)?,
    };
    dataset_from_dict(read_dict(path, format)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_format_from_suffix() {
        assert_eq!(FileFormat::from_path(Path::new("a/b.json")).unwrap(), FileFormat::Json);
        assert_eq!(FileFormat::from_path(Path::new("run.BIN")).unwrap(), FileFormat::Bincode);
        assert_eq!(
            FileFormat::from_path(Path::new("x.bincode")).unwrap(),
            FileFormat::Bincode
        );
    }

    #[test]
    fn infers_python_toolchain_suffixes() {
        assert_eq!(FileFormat::from_path(Path::new("rdm/data.pkl")).unwrap(), FileFormat::Pickle);
        assert_eq!(FileFormat::from_path(Path::new("data.h5")).unwrap(), FileFormat::Hdf5);
        assert_eq!(FileFormat::from_path(Path::new("data.hdf5")).unwrap(), FileFormat::Hdf5);
        assert_eq!(FileFormat::from_path(Path::new("sub01_hdf5")).unwrap(), FileFormat::Hdf5);
    }

    #[test]
    fn unknown_suffix_is_an_error() {
        let err = FileFormat::from_path(Path::new("data.mat")).unwrap_err();
        assert!(matches!(err, DatasetError::UnknownFormat(_)));
        assert!(FileFormat::from_path(Path::new("no_extension")).is_err());
        assert!(FileFormat::from_path(Path::new("data.h5.txt")).is_err());
    }

    #[test]
    fn parses_format_identifiers() {
        assert_eq!("json".parse::<FileFormat>().unwrap(), FileFormat::Json);
        assert_eq!("Bincode".parse::<FileFormat>().unwrap(), FileFormat::Bincode);
        assert_eq!("hdf5".parse::<FileFormat>().unwrap(), FileFormat::Hdf5);
        assert_eq!("pkl".parse::<FileFormat>().unwrap(), FileFormat::Pickle);
        assert!(matches!(
            "mat".parse::<FileFormat>(),
            Err(DatasetError::UnknownFormat(f)) if f == "mat"
        ));
    }

    #[test]
    fn identifiers_display_as_parsed() {
        for format in [FileFormat::Json, FileFormat::Bincode, FileFormat::Hdf5, FileFormat::Pickle] {
            assert_eq!(format.to_string().parse::<FileFormat>().unwrap(), format);
        }
    }
}
