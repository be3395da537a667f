use crate::prelude::*;
use crate::dialect::AlarmSource;
use crate::state::Alarm;

use std::collections::BTreeMap;

/// Map warning/fault flags to alarm levels. A flag missing from the reading
/// counts as a warning, never as OK. Alarms fed by several flags take the
/// worst level.
pub fn map(sources: &[AlarmSource], warnings: &Reading) -> BTreeMap<Alarm, AlarmLevel> {
    let mut r: BTreeMap<Alarm, AlarmLevel> =
        Alarm::all().iter().map(|a| (*a, AlarmLevel::Ok)).collect();

    for source in sources {
        let level = match warnings.flag(source.key) {
            Some(true) => source.level,
            Some(false) => AlarmLevel::Ok,
            None => {
                debug!("{} missing from warnings", source.key);
                AlarmLevel::Warning
            }
        };

        let entry = r.entry(source.alarm).or_default();
        *entry = (*entry).max(level);
    }

    r
}
