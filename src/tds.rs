//! Total dissolved solids from a conductivity probe
//!
//! The probe voltage maps to raw electrical conductivity (µS/cm) through a fixed cubic. The probe
//! constant `k` scales that curve and is the only calibrated quantity. Conductivity is compensated
//! to 25 °C before being converted to ppm.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CalibrationError;
use crate::polyfit::Polynomial;
use crate::reading::Reading;
use crate::sensor::SignalSource;
use crate::store::CalibrationStore;
use crate::telemetry::Publisher;
use crate::Result;

/// Ratio of dissolved solids, in ppm, to compensated conductivity
pub const TDS_FACTOR: f64 = 0.5;
/// Fractional conductivity change per degree away from 25 °C
pub const TEMPERATURE_COEFFICIENT: f64 = 0.02;
/// Concentration of the usual calibration buffer in ppm
pub const DEFAULT_BUFFER_PPM: f64 = 707.0;

/// Open window of buffer conductivity accepted during calibration, in µS/cm
const BUFFER_EC_WINDOW: (f64, f64) = (0.0, 2000.0);
/// Open window of accepted probe constants
const K_VALUE_WINDOW: (f64, f64) = (0.25, 4.0);

#[must_use]
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) / 1.8
}

/// Conductivity referred to 25 °C
#[must_use]
pub fn compensate(conductivity: f64, celsius: f64) -> f64 {
    conductivity / temperature_factor(celsius)
}

fn temperature_factor(celsius: f64) -> f64 {
    TEMPERATURE_COEFFICIENT.mul_add(celsius - 25.0, 1.0)
}

/// Raw conductivity in µS/cm of an uncalibrated probe
#[must_use]
pub fn conductivity_curve() -> Polynomial<f64> {
    Polynomial::new(vec![0.0, 857.39, -255.86, 133.42])
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TdsProbe {
    /// Probe constant
    k_value: f64,
    #[serde(skip, default = "conductivity_curve")]
    curve: Polynomial<f64>,
}

impl Default for TdsProbe {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl TdsProbe {
    #[must_use]
    pub fn new(k_value: f64) -> Self {
        Self {
            k_value,
            curve: conductivity_curve(),
        }
    }

    #[must_use]
    pub const fn k_value(&self) -> f64 {
        self.k_value
    }

    /// Conductivity at 25 °C in µS/cm
    #[must_use]
    pub fn conductivity(&self, volts: f64, celsius: f64) -> f64 {
        compensate(self.curve.evaluate(volts) * self.k_value, celsius)
    }

    /// Dissolved solids in ppm
    #[must_use]
    pub fn tds(&self, volts: f64, celsius: f64) -> f64 {
        self.conductivity(volts, celsius) * TDS_FACTOR
    }

    /// Derive the probe constant from a reading taken in a buffer of `buffer_ppm`
    ///
    /// On success the probe reads exactly `buffer_ppm` at the same voltage and temperature.
    /// Returns the new constant.
    ///
    /// # Errors
    /// Returns [`CalibrationError::OutOfRange`] if the buffer conductivity or the derived constant
    /// falls outside its accepted window, in which case the constant is unchanged.
    pub fn calibrate(
        &mut self,
        volts: f64,
        celsius: f64,
        buffer_ppm: f64,
    ) -> std::result::Result<f64, CalibrationError> {
        let buffer_conductivity = buffer_ppm / TDS_FACTOR * temperature_factor(celsius);
        let raw = self.curve.evaluate(volts);
        let k_value = buffer_conductivity / raw;

        let inside = |value: f64, (low, high): (f64, f64)| value > low && value < high;
        if !inside(buffer_conductivity, BUFFER_EC_WINDOW) {
            warn!("buffer conductivity {buffer_conductivity:.1} is out of range");
            return Err(CalibrationError::OutOfRange(format!(
                "buffer conductivity {buffer_conductivity:.1} µS/cm"
            )));
        }
        if !inside(k_value, K_VALUE_WINDOW) {
            warn!("probe constant {k_value:.3} is out of range");
            return Err(CalibrationError::OutOfRange(format!(
                "probe constant {k_value:.3}"
            )));
        }

        info!("probe constant set to {k_value:.3}");
        self.k_value = k_value;
        Ok(k_value)
    }

    /// A stored constant of zero or NaN was never calibrated
    fn is_calibrated(&self) -> bool {
        self.k_value.is_normal()
    }
}

/// Anything that can report the water temperature in °C
pub trait TemperatureSource {
    /// # Errors
    /// Returns an error if no value could be read.
    fn read_temperature(&mut self) -> Result<f64>;
}

impl<F: FnMut() -> Result<f64>> TemperatureSource for F {
    fn read_temperature(&mut self) -> Result<f64> {
        self()
    }
}

/// Adapts a thermometer reporting °F
#[derive(Clone, Debug, Default)]
pub struct Fahrenheit<T>(pub T);

impl<T: TemperatureSource> TemperatureSource for Fahrenheit<T> {
    fn read_temperature(&mut self) -> Result<f64> {
        self.0.read_temperature().map(fahrenheit_to_celsius)
    }
}

/// A conductivity sensor publishing dissolved solids in ppm
///
/// Only the k-value is persisted, under the store key given at construction.
pub struct TdsSensor<S, T, St, P> {
    store_key: String,
    source: S,
    temperature: T,
    store: St,
    publisher: P,
    probe: TdsProbe,
    ticks: u64,
}

impl<S, T, St, P> TdsSensor<S, T, St, P>
where
    S: SignalSource,
    T: TemperatureSource,
    St: CalibrationStore,
    P: Publisher,
{
    /// Load the stored k-value, falling back to the uncalibrated default
    #[must_use]
    pub fn new(
        store_key: impl Into<String>,
        source: S,
        temperature: T,
        mut store: St,
        publisher: P,
    ) -> Self {
        let store_key = store_key.into();
        info!("setting up conductivity sensor {store_key}");

        let probe = match store.load::<TdsProbe>(&store_key) {
            Ok(Some(probe)) if probe.is_calibrated() => {
                info!("loaded k-value {:.3}", probe.k_value());
                probe
            }
            Ok(_) => {
                info!("no k-value stored under {store_key}, using default");
                TdsProbe::default()
            }
            Err(e) => {
                warn!("could not read k-value {store_key}, using default: {e}");
                TdsProbe::default()
            }
        };

        Self {
            store_key,
            source,
            temperature,
            store,
            publisher,
            probe,
            ticks: 0,
        }
    }

    #[must_use]
    pub const fn probe(&self) -> &TdsProbe {
        &self.probe
    }

    #[must_use]
    pub const fn publisher(&self) -> &P {
        &self.publisher
    }

    #[must_use]
    pub const fn store(&self) -> &St {
        &self.store
    }

    /// Sensor voltage and water temperature in °C
    fn sample(&mut self) -> Result<(f64, f64)> {
        let volts = self
            .source
            .read_signal()
            .map_err(|e| CalibrationError::Signal(e.to_string()))?;
        let celsius = self
            .temperature
            .read_temperature()
            .map_err(|e| CalibrationError::Signal(e.to_string()))?;
        if !volts.is_finite() || !celsius.is_finite() {
            return Err(CalibrationError::Signal(format!(
                "non-finite sample {volts} V at {celsius} °C"
            ))
            .into());
        }
        Ok((volts, celsius))
    }

    /// Take and publish one reading in ppm
    ///
    /// # Errors
    /// Returns an error if either input cannot be read or the reading cannot be published.
    pub fn tick(&mut self) -> Result<Reading> {
        let tick = self.ticks;
        self.ticks += 1;

        let (volts, celsius) = self.sample()?;
        let value = self.probe.tds(volts, celsius);
        debug!("{volts:.3} V at {celsius:.1} °C | {value:.0} ppm");

        let reading = Reading {
            tick,
            signal: volts * 1000.0,
            value,
            calibration: None,
        };
        self.publisher.publish(&reading)?;
        Ok(reading)
    }

    /// Derive the k-value in a buffer of `buffer_ppm` and save it
    ///
    /// # Errors
    /// Returns an error if either input cannot be read, the constant is rejected or it cannot be
    /// saved. A rejected constant is neither applied nor saved.
    pub fn calibrate(&mut self, buffer_ppm: f64) -> Result<f64> {
        let (volts, celsius) = self.sample()?;
        let k_value = self.probe.calibrate(volts, celsius, buffer_ppm)?;
        self.store.save(&self.store_key, &self.probe)?;
        Ok(k_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn fahrenheit_is_converted() {
        approx::assert_relative_eq!(fahrenheit_to_celsius(212.0), 100.0, max_relative = 1e-12);
        approx::assert_abs_diff_eq!(fahrenheit_to_celsius(32.0), 0.0);
        approx::assert_relative_eq!(fahrenheit_to_celsius(77.0), 25.0, max_relative = 1e-12);
    }

    #[test]
    fn conductivity_follows_the_cubic_at_25_degrees() {
        let probe = TdsProbe::default();
        let volts: f64 = 1.5;
        let expected = 133.42 * volts.powi(3) - 255.86 * volts.powi(2) + 857.39 * volts;

        approx::assert_relative_eq!(
            probe.conductivity(volts, 25.0),
            expected,
            max_relative = 1e-12
        );
        approx::assert_relative_eq!(
            probe.tds(volts, 25.0),
            expected * TDS_FACTOR,
            max_relative = 1e-12
        );
    }

    #[test]
    fn warm_water_reads_lower_after_compensation() {
        let probe = TdsProbe::new(1.2);
        let warm = probe.conductivity(1.0, 35.0);
        let reference = probe.conductivity(1.0, 25.0);

        approx::assert_relative_eq!(warm, reference / 1.2, max_relative = 1e-12);
    }

    #[test]
    fn calibration_reproduces_the_buffer() {
        let mut probe = TdsProbe::default();

        let k_value = probe.calibrate(1.5, 22.0, DEFAULT_BUFFER_PPM).unwrap();

        approx::assert_relative_eq!(probe.k_value(), k_value);
        approx::assert_relative_eq!(
            probe.tds(1.5, 22.0),
            DEFAULT_BUFFER_PPM,
            max_relative = 1e-12
        );
    }

    #[test]
    fn implausible_constants_are_rejected() {
        let mut probe = TdsProbe::new(1.1);

        assert!(matches!(
            probe.calibrate(0.1, 25.0, DEFAULT_BUFFER_PPM),
            Err(CalibrationError::OutOfRange(_))
        ));
        assert!(matches!(
            probe.calibrate(1.5, 25.0, 1500.0),
            Err(CalibrationError::OutOfRange(_))
        ));
        approx::assert_relative_eq!(probe.k_value(), 1.1);
    }

    #[test]
    fn probe_constant_round_trips_through_toml() {
        let probe = TdsProbe::new(1.37);
        let encoded = toml::to_string(&probe).unwrap();
        let decoded: TdsProbe = toml::from_str(&encoded).unwrap();

        assert_eq!(decoded, probe);
    }

    fn tds_sensor(
        volts: f64,
        celsius: f64,
        store: MemoryStore,
    ) -> TdsSensor<impl SignalSource, impl TemperatureSource, MemoryStore, Vec<Reading>> {
        TdsSensor::new(
            "tds_meter",
            move || -> Result<f64> { Ok(volts) },
            move || -> Result<f64> { Ok(celsius) },
            store,
            Vec::<Reading>::new(),
        )
    }

    #[test]
    fn fahrenheit_thermometers_are_converted() {
        let mut thermometer = Fahrenheit(|| -> Result<f64> { Ok(77.0) });

        approx::assert_relative_eq!(
            thermometer.read_temperature().unwrap(),
            25.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn ticks_publish_dissolved_solids() {
        let mut sensor = tds_sensor(1.5, 25.0, MemoryStore::new());

        let reading = sensor.tick().unwrap();

        assert_eq!(reading.tick, 0);
        approx::assert_relative_eq!(reading.signal, 1500.0);
        approx::assert_relative_eq!(
            reading.value,
            TdsProbe::default().tds(1.5, 25.0),
            max_relative = 1e-12
        );
        assert_eq!(reading.calibration, None);
        assert_eq!(sensor.publisher().len(), 1);
    }

    #[test]
    fn calibration_is_saved_only_when_accepted() {
        let mut sensor = tds_sensor(0.1, 25.0, MemoryStore::new());
        assert!(sensor.calibrate(DEFAULT_BUFFER_PPM).is_err());
        assert!(sensor.store().raw("tds_meter").is_none());

        let mut sensor = tds_sensor(1.5, 22.0, MemoryStore::new());
        let k_value = sensor.calibrate(DEFAULT_BUFFER_PPM).unwrap();

        approx::assert_relative_eq!(sensor.probe().k_value(), k_value);
        assert!(sensor.store().raw("tds_meter").is_some());
        approx::assert_relative_eq!(
            sensor.tick().unwrap().value,
            DEFAULT_BUFFER_PPM,
            max_relative = 1e-12
        );
    }

    #[test]
    fn uncalibrated_stored_constants_fall_back_to_default() {
        let mut store = MemoryStore::new();
        store.insert_raw("tds_meter", "k_value = 0.0\n");
        assert_eq!(tds_sensor(1.5, 25.0, store).probe(), &TdsProbe::default());

        let mut store = MemoryStore::new();
        store.insert_raw("tds_meter", "k_value = nan\n");
        assert_eq!(tds_sensor(1.5, 25.0, store).probe(), &TdsProbe::default());

        let mut store = MemoryStore::new();
        store.insert_raw("tds_meter", "k_value = \"high\"\n");
        assert_eq!(tds_sensor(1.5, 25.0, store).probe(), &TdsProbe::default());
    }
}
