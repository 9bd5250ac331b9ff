use std::cell::Cell;
use std::rc::Rc;
use std::thread;

use tracing::{debug, info, warn};

use crate::calibration::{
    identify_buffer, Calibration, CalibrationPoint, CalibrationSet, CalibrationSlot,
};
use crate::config::Config;
use crate::error::CalibrationError;
use crate::reading::{Evaluator, Reading};
use crate::store::{load_or_factory, CalibrationStore};
use crate::telemetry::Publisher;
use crate::Result;

/// Reference voltage of the default analogue front end
pub const DEFAULT_REFERENCE_VOLTAGE: f64 = 3.3;
/// Number of steps of the default analogue to digital converter
pub const DEFAULT_ADC_RANGE: f64 = 1024.0;
/// Suffix of the store key holding the working set of captured points
pub const CAPTURED_KEY_SUFFIX: &str = "_captured";

/// Anything that can report the probe output in volts
pub trait SignalSource {
    /// # Errors
    /// Returns an error if no value could be read.
    fn read_signal(&mut self) -> Result<f64>;
}

impl<F: FnMut() -> Result<f64>> SignalSource for F {
    fn read_signal(&mut self) -> Result<f64> {
        self()
    }
}

/// A signal whose value can be changed from elsewhere, as when simulating a probe
#[derive(Clone, Debug, Default)]
pub struct SharedSignal(Rc<Cell<f64>>);

impl SharedSignal {
    #[must_use]
    pub fn new(volts: f64) -> Self {
        Self(Rc::new(Cell::new(volts)))
    }

    pub fn set(&self, volts: f64) {
        self.0.set(volts);
    }
}

impl SignalSource for SharedSignal {
    fn read_signal(&mut self) -> Result<f64> {
        Ok(self.0.get())
    }
}

/// Converts raw analogue to digital converter counts into volts
pub struct AdcSignal<F> {
    read_counts: F,
    reference_voltage: f64,
    range: f64,
}

impl<F: FnMut() -> Result<u32>> AdcSignal<F> {
    #[must_use]
    pub fn new(read_counts: F) -> Self {
        Self {
            read_counts,
            reference_voltage: DEFAULT_REFERENCE_VOLTAGE,
            range: DEFAULT_ADC_RANGE,
        }
    }

    #[must_use]
    pub fn with_reference(mut self, reference_voltage: f64, range: f64) -> Self {
        self.reference_voltage = reference_voltage;
        self.range = range;
        self
    }
}

impl<F: FnMut() -> Result<u32>> SignalSource for AdcSignal<F> {
    fn read_signal(&mut self) -> Result<f64> {
        let counts = (self.read_counts)()?;
        Ok(f64::from(counts) / self.range * self.reference_voltage)
    }
}

/// A pH probe: samples a signal, maps it through the calibration curve and publishes the result
///
/// Calibration commands and ticks both take `&mut self`, so a refit always completes before the
/// next reading is taken.
pub struct PhSensor<S, St, P> {
    config: Config,
    source: S,
    store: St,
    publisher: P,
    /// Points the current curve was fitted from
    accepted: CalibrationSet,
    /// Every point captured so far, which may not form a usable set yet
    captured: CalibrationSet,
    calibration: Calibration,
    evaluator: Evaluator,
    ticks: u64,
}

impl<S: SignalSource, St: CalibrationStore, P: Publisher> PhSensor<S, St, P> {
    /// Load stored calibration points and fit the initial curve
    ///
    /// The curve is fitted from the last accepted set. Missing, corrupt or degenerate accepted
    /// points are replaced by the factory points. Captured points that were never accepted are
    /// restored as the working set so calibration can resume where it stopped.
    ///
    /// # Errors
    /// Returns an error if `config` is inconsistent.
    pub fn new(config: Config, source: S, mut store: St, publisher: P) -> Result<Self> {
        config.validate()?;
        info!("setting up probe {}", config.store_key);

        let stored = load_or_factory(&mut store, &config.store_key);
        let (accepted, calibration) =
            match Calibration::new(&stored, config.fit_mode, config.elimination()) {
                Ok(calibration) => (stored, calibration),
                Err(e) => {
                    warn!("stored calibration rejected, using factory points: {e}");
                    let factory = CalibrationSet::FACTORY;
                    let calibration =
                        Calibration::new(&factory, config.fit_mode, config.elimination())?;
                    (factory, calibration)
                }
            };

        let key = captured_key(&config.store_key);
        let captured = match store.load::<CalibrationSet>(&key) {
            Ok(Some(set)) if set.is_finite() => set,
            Ok(_) => accepted,
            Err(e) => {
                warn!("could not read {key}, starting from accepted points: {e}");
                accepted
            }
        };

        Ok(Self {
            evaluator: Evaluator::new(config.bounds),
            config,
            source,
            store,
            publisher,
            accepted,
            captured,
            calibration,
            ticks: 0,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Points the current curve was fitted from
    #[must_use]
    pub const fn points(&self) -> &CalibrationSet {
        &self.accepted
    }

    /// Working set of captured points, equal to [`PhSensor::points`] unless a capture was rejected
    #[must_use]
    pub const fn captured(&self) -> &CalibrationSet {
        &self.captured
    }

    #[must_use]
    pub const fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    #[must_use]
    pub const fn publisher(&self) -> &P {
        &self.publisher
    }

    #[must_use]
    pub const fn store(&self) -> &St {
        &self.store
    }

    /// Current signal in mV
    fn read_millivolts(&mut self) -> Result<f64> {
        let volts = self
            .source
            .read_signal()
            .map_err(|e| CalibrationError::Signal(e.to_string()))?;
        let signal = volts * self.config.signal_scale;
        if !signal.is_finite() {
            return Err(CalibrationError::Signal(format!("non-finite signal {signal}")).into());
        }
        Ok(signal)
    }

    /// Take and publish one reading
    ///
    /// # Errors
    /// Returns an error if the signal cannot be read or the reading cannot be published.
    pub fn tick(&mut self) -> Result<Reading> {
        let tick = self.ticks;
        self.ticks += 1;

        let signal = self.read_millivolts()?;
        let value = self
            .evaluator
            .evaluate(self.calibration.polynomial(), signal);
        debug!("{signal:.2} mV | {value:.2} pH");

        let reading = Reading {
            tick,
            signal,
            value,
            calibration: self.config.publish_calibration.then_some(self.accepted),
        };
        self.publisher.publish(&reading)?;
        Ok(reading)
    }

    /// Poll at the configured interval, `count` times or forever
    ///
    /// A failed tick is logged and the next one is attempted as usual.
    pub fn run(&mut self, count: Option<u64>) {
        let mut remaining = count;
        loop {
            if remaining == Some(0) {
                break;
            }
            if let Err(e) = self.tick() {
                warn!("skipping reading: {e}");
            }
            remaining = remaining.map(|n| n - 1);
            if remaining != Some(0) {
                thread::sleep(self.config.poll_interval());
            }
        }
    }

    /// Store the current signal as the calibration point for `slot` and refit
    ///
    /// The captured point is persisted even when the resulting set is rejected. In that case the
    /// previous curve and its accepted points stay in use, across restarts too.
    ///
    /// # Errors
    /// Returns an error if the signal cannot be read, the points cannot be saved or the new set
    /// is degenerate.
    pub fn calibrate(&mut self, slot: CalibrationSlot, reference: f64) -> Result<()> {
        let signal = self.read_millivolts()?;
        self.capture(slot, CalibrationPoint::new(reference, signal))
    }

    /// # Errors
    /// See [`PhSensor::calibrate`].
    pub fn calibrate_acid(&mut self, reference: f64) -> Result<()> {
        self.calibrate(CalibrationSlot::Acid, reference)
    }

    /// # Errors
    /// See [`PhSensor::calibrate`].
    pub fn calibrate_neutral(&mut self, reference: f64) -> Result<()> {
        self.calibrate(CalibrationSlot::Neutral, reference)
    }

    /// # Errors
    /// See [`PhSensor::calibrate`].
    pub fn calibrate_base(&mut self, reference: f64) -> Result<()> {
        self.calibrate(CalibrationSlot::Base, reference)
    }

    /// Calibrate whichever buffer the current signal falls in
    ///
    /// # Errors
    /// Returns [`CalibrationError::UnrecognisedBuffer`] if the signal sits in no known buffer
    /// window, otherwise as [`PhSensor::calibrate`].
    pub fn calibrate_detected(&mut self, reference: f64) -> Result<CalibrationSlot> {
        let signal = self.read_millivolts()?;
        let slot = identify_buffer(signal).ok_or(CalibrationError::UnrecognisedBuffer { signal })?;
        self.capture(slot, CalibrationPoint::new(reference, signal))?;
        Ok(slot)
    }

    /// Forget every captured point and return to the factory curve
    ///
    /// # Errors
    /// Returns an error if the factory points cannot be saved.
    pub fn reset_calibration(&mut self) -> Result<()> {
        info!("resetting calibration {}", self.config.store_key);
        self.captured = CalibrationSet::FACTORY;
        let key = captured_key(&self.config.store_key);
        self.store.save(&key, &self.captured)?;
        self.calibration.refit(&self.captured)?;
        self.accept()
    }

    fn capture(&mut self, slot: CalibrationSlot, point: CalibrationPoint) -> Result<()> {
        info!(
            "calibrating {slot} at pH {:.2} with {:.2} mV",
            point.reference, point.signal
        );
        self.captured.set(slot, point);
        let key = captured_key(&self.config.store_key);
        self.store.save(&key, &self.captured)?;
        self.calibration.refit(&self.captured)?;
        self.accept()
    }

    /// Promote the working set to the accepted set once the curve was refitted from it
    fn accept(&mut self) -> Result<()> {
        self.accepted = self.captured;
        self.store.save(&self.config.store_key, &self.accepted)
    }
}

fn captured_key(store_key: &str) -> String {
    format!("{store_key}{CAPTURED_KEY_SUFFIX}")
}
