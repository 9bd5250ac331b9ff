use std::fs::File;
use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::reading::Reading;
use crate::Result;

/// Destination for published readings
pub trait Publisher {
    /// # Errors
    /// Returns an error if the reading could not be delivered.
    fn publish(&mut self, reading: &Reading) -> Result<()>;
}

/// Collects readings, mostly useful in tests
impl Publisher for Vec<Reading> {
    fn publish(&mut self, reading: &Reading) -> Result<()> {
        self.push(reading.clone());
        Ok(())
    }
}

impl<P: Publisher + ?Sized> Publisher for &mut P {
    fn publish(&mut self, reading: &Reading) -> Result<()> {
        (**self).publish(reading)
    }
}

/// Emits every reading as a `tracing` event
#[derive(Clone, Copy, Debug, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&mut self, reading: &Reading) -> Result<()> {
        match &reading.calibration {
            Some(set) => info!(
                tick = reading.tick,
                signal = reading.signal,
                value = reading.value,
                acid = ?set.acid,
                neutral = ?set.neutral,
                base = ?set.base,
                "reading"
            ),
            None => info!(
                tick = reading.tick,
                signal = reading.signal,
                value = reading.value,
                "reading"
            ),
        }
        Ok(())
    }
}

/// Flat row layout, the csv writer cannot serialise nested structs
#[derive(Serialize)]
struct Row {
    tick: u64,
    signal: f64,
    value: f64,
    acid_reference: Option<f64>,
    acid_signal: Option<f64>,
    neutral_reference: Option<f64>,
    neutral_signal: Option<f64>,
    base_reference: Option<f64>,
    base_signal: Option<f64>,
}

impl From<&Reading> for Row {
    fn from(reading: &Reading) -> Self {
        let set = reading.calibration.as_ref();
        Self {
            tick: reading.tick,
            signal: reading.signal,
            value: reading.value,
            acid_reference: set.map(|s| s.acid.reference),
            acid_signal: set.map(|s| s.acid.signal),
            neutral_reference: set.map(|s| s.neutral.reference),
            neutral_signal: set.map(|s| s.neutral.signal),
            base_reference: set.map(|s| s.base.reference),
            base_signal: set.map(|s| s.base.signal),
        }
    }
}

/// Appends every reading as a row of a csv file, with a header row first
pub struct CsvPublisher<W: io::Write> {
    writer: csv::Writer<W>,
}

impl<W: io::Write> CsvPublisher<W> {
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(true)
                .from_writer(writer),
        }
    }

    /// Flush and hand back the underlying writer
    ///
    /// # Errors
    /// Returns an error if buffered rows cannot be flushed.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| e.into_error().into())
    }
}

impl CsvPublisher<File> {
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: io::Write> Publisher for CsvPublisher<W> {
    fn publish(&mut self, reading: &Reading) -> Result<()> {
        self.writer.serialize(Row::from(reading))?;
        self.writer.flush()?;
        Ok(())
    }
}
