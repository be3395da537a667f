use crate::prelude::*;
use crate::command::Mode;
use crate::dialect::{ChargerPriority, OutputSourcePriority};

/// Validates a requested mode write.
///
/// # Arguments
/// * `value` - The raw value written to the mode path
///
/// # Returns
/// * `Ok(Mode)` for 1 (charger only), 2 (inverter only), 3 (on) or 4 (off)
/// * `Err` with a descriptive message for anything else
pub fn mode(value: &BusValue) -> Result<Mode> {
    let raw = small_int(value, "mode")?;
    Mode::try_from(raw).map_err(|_| anyhow!("mode {} is not one of 1, 2, 3, 4", raw))
}

/// Validates a charger priority write (0 utility first .. 3 solar only).
pub fn charger_priority(value: &BusValue) -> Result<ChargerPriority> {
    let raw = small_int(value, "charger priority")?;
    ChargerPriority::try_from(raw)
        .map_err(|_| anyhow!("charger priority {} is not one of 0, 1, 2, 3", raw))
}

/// Validates an output source priority write (0 utility, 1 solar, 2 SBU).
pub fn output_source_priority(value: &BusValue) -> Result<OutputSourcePriority> {
    let raw = small_int(value, "output source priority")?;
    OutputSourcePriority::try_from(raw)
        .map_err(|_| anyhow!("output source priority {} is not one of 0, 1, 2", raw))
}

/// Validates an AC input current limit write. Any finite, non-negative amperage
/// passes here; snapping it to what the device supports is the dialect's job.
pub fn current_limit(value: &BusValue) -> Result<f64> {
    match value.as_f64() {
        Some(amps) if amps.is_finite() && amps >= 0.0 => Ok(amps),
        _ => bail!("current limit {} is not a non-negative number", value),
    }
}

/// Picks the largest supported setting not above the requested current.
///
/// # Examples
/// ```
/// use mppsolar_bridge::coordinator::commands::validation::snap_current;
/// assert_eq!(snap_current(25.0, &[2, 10, 20, 30]).unwrap(), 20);
/// assert!(snap_current(1.0, &[2, 10, 20, 30]).is_err());
/// ```
pub fn snap_current(requested: f64, supported: &[u16]) -> Result<u16> {
    supported
        .iter()
        .copied()
        .filter(|amps| f64::from(*amps) <= requested)
        .max()
        .ok_or_else(|| {
            anyhow!(
                "current limit {}A is below the smallest supported setting ({:?})",
                requested,
                supported
            )
        })
}

fn small_int(value: &BusValue, what: &str) -> Result<u8> {
    value
        .as_i64()
        .and_then(|i| u8::try_from(i).ok())
        .ok_or_else(|| anyhow!("{} {} is not a small integer", what, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes() {
        assert_eq!(mode(&BusValue::Int(1)).unwrap(), Mode::ChargerOnly);
        assert_eq!(mode(&BusValue::Float(4.0)).unwrap(), Mode::Off);
        assert!(mode(&BusValue::Int(0)).is_err());
        assert!(mode(&BusValue::Int(-3)).is_err());
        assert!(mode(&BusValue::Float(2.5)).is_err());
    }

    #[test]
    fn priorities() {
        assert_eq!(
            charger_priority(&BusValue::Int(3)).unwrap(),
            ChargerPriority::SolarOnly
        );
        assert!(charger_priority(&BusValue::Int(4)).is_err());
        assert_eq!(
            output_source_priority(&BusValue::Int(2)).unwrap(),
            OutputSourcePriority::Sbu
        );
        assert!(output_source_priority(&BusValue::Int(3)).is_err());
    }

    #[test]
    fn current_limits() {
        assert_eq!(current_limit(&BusValue::Float(12.5)).unwrap(), 12.5);
        assert!(current_limit(&BusValue::Float(-1.0)).is_err());
        assert!(current_limit(&BusValue::Text("lots".into())).is_err());
    }

    #[test]
    fn snapping() {
        let supported = [2, 10, 20, 30, 40, 50, 60];
        assert_eq!(snap_current(60.0, &supported).unwrap(), 60);
        assert_eq!(snap_current(100.0, &supported).unwrap(), 60);
        assert_eq!(snap_current(9.9, &supported).unwrap(), 2);
        assert!(snap_current(0.0, &supported).is_err());
    }
}
