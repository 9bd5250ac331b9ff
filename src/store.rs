use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::calibration::CalibrationSet;
use crate::Result;

/// Persistent storage for calibration records, one record per key
pub trait CalibrationStore {
    /// Fetch the record stored under `key`, `None` if nothing was ever saved
    ///
    /// # Errors
    /// Returns an error if the record exists but cannot be read or decoded.
    fn load<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>>;

    /// # Errors
    /// Returns an error if the record cannot be written.
    fn save<T: Serialize>(&mut self, key: &str, record: &T) -> Result<()>;
}

impl<S: CalibrationStore + ?Sized> CalibrationStore for &mut S {
    fn load<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        (**self).load(key)
    }

    fn save<T: Serialize>(&mut self, key: &str, record: &T) -> Result<()> {
        (**self).save(key, record)
    }
}

/// Load the record under `key`, substituting factory points if it is missing or corrupt
pub fn load_or_factory<S: CalibrationStore + ?Sized>(store: &mut S, key: &str) -> CalibrationSet {
    match store.load::<CalibrationSet>(key) {
        Ok(Some(set)) if set.is_finite() => {
            info!("loaded calibration {key}");
            set
        }
        Ok(Some(_)) => {
            warn!("stored calibration {key} holds non-finite values, using factory points");
            CalibrationSet::FACTORY
        }
        Ok(None) => {
            info!("no stored calibration {key}, using factory points");
            CalibrationSet::FACTORY
        }
        Err(e) => {
            warn!("failed to load calibration {key}, using factory points: {e}");
            CalibrationSet::FACTORY
        }
    }
}

/// Stores each record as `<key>.toml` inside a directory
#[derive(Clone, Debug)]
pub struct TomlFileStore {
    directory: PathBuf,
}

impl TomlFileStore {
    /// The directory is created on the first save
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(format!("invalid store key {key:?}").into());
        }
        Ok(self.directory.join(format!("{key}.toml")))
    }
}

impl CalibrationStore for TomlFileStore {
    fn load<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let record: T = toml::from_str(&contents)?;
        Ok(Some(record))
    }

    fn save<T: Serialize>(&mut self, key: &str, record: &T) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.directory)?;
        fs::write(path, toml::to_string(record)?)?;
        Ok(())
    }
}

/// Keeps records in memory as encoded TOML, so decoding behaves as it does on disk
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text under `key`, bypassing encoding
    pub fn insert_raw(&mut self, key: &str, contents: impl Into<String>) {
        self.records.insert(key.to_owned(), contents.into());
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }
}

impl CalibrationStore for MemoryStore {
    fn load<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        self.records
            .get(key)
            .map(|contents| toml::from_str::<T>(contents).map_err(Into::into))
            .transpose()
    }

    fn save<T: Serialize>(&mut self, key: &str, record: &T) -> Result<()> {
        self.records.insert(key.to_owned(), toml::to_string(record)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::{load_or_factory, CalibrationStore, MemoryStore, TomlFileStore};
    use crate::calibration::{CalibrationPoint, CalibrationSet};

    fn calibrated() -> CalibrationSet {
        CalibrationSet {
            acid: CalibrationPoint::new(4.01, 2011.5),
            neutral: CalibrationPoint::new(6.86, 1488.25),
            base: CalibrationPoint::new(9.18, 1002.0),
        }
    }

    #[test]
    fn records_round_trip_through_files() {
        let tmp_dir = TempDir::new("store").unwrap();
        let mut store = TomlFileStore::new(tmp_dir.path().join("calibration"));

        assert_eq!(store.load::<CalibrationSet>("ph_probe").unwrap(), None);
        store.save("ph_probe", &calibrated()).unwrap();

        assert!(tmp_dir.path().join("calibration/ph_probe.toml").exists());
        assert_eq!(
            store.load::<CalibrationSet>("ph_probe").unwrap(),
            Some(calibrated())
        );
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        let tmp_dir = TempDir::new("store").unwrap();
        let mut store = TomlFileStore::new(tmp_dir.path());

        assert!(store.save("../outside", &calibrated()).is_err());
        assert!(store.load::<CalibrationSet>("").is_err());
    }

    #[test]
    fn missing_records_fall_back_to_factory_points() {
        let mut store = MemoryStore::new();
        assert_eq!(load_or_factory(&mut store, "ph_probe"), CalibrationSet::FACTORY);
    }

    #[test]
    fn corrupt_records_fall_back_to_factory_points() {
        let mut store = MemoryStore::new();
        store.insert_raw("ph_probe", "acid = \"not a point\"");

        assert!(store.load::<CalibrationSet>("ph_probe").is_err());
        assert_eq!(load_or_factory(&mut store, "ph_probe"), CalibrationSet::FACTORY);
    }

    #[test]
    fn non_finite_records_fall_back_to_factory_points() {
        let mut store = MemoryStore::new();
        let mut set = calibrated();
        set.neutral.signal = f64::NAN;
        store.save("ph_probe", &set).unwrap();

        assert_eq!(load_or_factory(&mut store, "ph_probe"), CalibrationSet::FACTORY);
    }

    #[test]
    fn stored_records_are_loaded() {
        let mut store = MemoryStore::new();
        store.save("ph_probe", &calibrated()).unwrap();

        assert!(store.raw("ph_probe").unwrap().contains("[neutral]"));
        assert_eq!(load_or_factory(&mut store, "ph_probe"), calibrated());
    }
}
