//! Estimates for quantities the device cannot report, smoothed across polls.

use crate::config::Estimation;
use crate::dialect::Telemetry;

/// Values persisted between poll cycles. Each resets to zero as soon as the
/// condition that produced it no longer holds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CarryOver {
    pub output_power: f64,
    pub charge_offset: f64,
}

impl CarryOver {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// AC output power, estimated from total DC system power when the device
    /// reads exactly zero with the load on.
    pub fn output_power(
        &mut self,
        telemetry: &Telemetry,
        dc_power: Option<f64>,
        estimation: &Estimation,
    ) -> Option<f64> {
        match (telemetry.load_on, telemetry.ac_out_power, dc_power) {
            (Some(true), Some(reported), Some(dc)) if reported == 0.0 => {
                let estimate = clamped_estimate(dc, self.output_power, estimation);
                self.output_power = estimate;
                Some(estimate)
            }
            (_, reported, _) => {
                self.output_power = 0.0;
                reported
            }
        }
    }

    /// Battery charging current in amps. With inference enabled and the
    /// charger active, derived from DC system power instead of the device's
    /// own reading.
    pub fn charge_current(
        &mut self,
        telemetry: &Telemetry,
        dc_power: Option<f64>,
        estimation: &Estimation,
    ) -> f64 {
        match dc_power {
            Some(dc) if estimation.infer_charge_current && telemetry.charging_on => {
                let implied = (dc - estimation.baseline_power).max(0.0);
                let smoothed = if self.charge_offset == 0.0 {
                    implied
                } else {
                    (implied + self.charge_offset) / 2.0
                };
                self.charge_offset = smoothed;

                match telemetry.battery_voltage {
                    Some(v) if v > 0.0 => smoothed / v,
                    _ => 0.0,
                }
            }
            _ => {
                self.charge_offset = 0.0;
                telemetry.battery_charging_current.unwrap_or(0.0)
            }
        }
    }
}

/// `clamp(dc + carry + baseline, floor, ceiling) - baseline`
pub fn clamped_estimate(dc_power: f64, carry: f64, estimation: &Estimation) -> f64 {
    (dc_power + carry + estimation.baseline_power).clamp(estimation.floor, estimation.ceiling)
        - estimation.baseline_power
}
