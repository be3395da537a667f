use crate::prelude::*;
use crate::coordinator::commands::validation;
use crate::dialect::{ChargerPriority, OutputSourcePriority};

// ControlPath {{{
/// The writable paths the bridge accepts from the bus.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ControlPath {
    Mode,
    ChargerPriority,
    OutputSourcePriority,
    AcInCurrentLimit,
    Reset,
}

impl ControlPath {
    pub fn all() -> &'static [ControlPath] {
        use ControlPath::*;
        &[Mode, ChargerPriority, OutputSourcePriority, AcInCurrentLimit, Reset]
    }

    pub fn as_str(&self) -> &'static str {
        use ControlPath::*;
        match self {
            Mode => "/Mode",
            ChargerPriority => "/Settings/ChargerPriority",
            OutputSourcePriority => "/Settings/OutputSourcePriority",
            AcInCurrentLimit => "/Ac/In/1/CurrentLimit",
            Reset => "/Settings/Reset",
        }
    }
}

impl std::str::FromStr for ControlPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlPath::all()
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| anyhow!("not a writable path: {}", s))
    }
}

impl std::fmt::Display for ControlPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
} // }}}

// Mode {{{
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Mode {
    ChargerOnly = 1,
    InverterOnly = 2,
    On = 3,
    Off = 4,
}

impl Mode {
    /// The priority pair a requested mode is realised with.
    pub fn priorities(&self) -> (ChargerPriority, OutputSourcePriority) {
        use Mode::*;
        match self {
            ChargerOnly => (ChargerPriority::UtilityFirst, OutputSourcePriority::UtilityFirst),
            InverterOnly => (ChargerPriority::SolarOnly, OutputSourcePriority::Sbu),
            On => (ChargerPriority::UtilityFirst, OutputSourcePriority::Sbu),
            Off => (ChargerPriority::SolarOnly, OutputSourcePriority::UtilityFirst),
        }
    }
} // }}}

// BusWrite {{{
/// An externally-initiated write to one of our paths.
#[derive(Clone, Debug, PartialEq)]
pub struct BusWrite {
    pub path: String,
    pub value: BusValue,
} // }}}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    SetMode(Mode),
    SetChargerPriority(ChargerPriority),
    SetOutputSourcePriority(OutputSourcePriority),
    SetCurrentLimit(f64),
    Reset,
}

impl Command {
    /// Parse a write on a known control path. Errors mean the value is outside
    /// the path's domain; the caller decides what to do with the write itself.
    pub fn from_write(path: ControlPath, value: &BusValue) -> Result<Command> {
        use Command::*;

        let r = match path {
            ControlPath::Mode => SetMode(validation::mode(value)?),
            ControlPath::ChargerPriority => {
                SetChargerPriority(validation::charger_priority(value)?)
            }
            ControlPath::OutputSourcePriority => {
                SetOutputSourcePriority(validation::output_source_priority(value)?)
            }
            ControlPath::AcInCurrentLimit => SetCurrentLimit(validation::current_limit(value)?),
            ControlPath::Reset => Reset,
        };

        Ok(r)
    }
}
