pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;
pub use std::str::FromStr;
pub use tokio::sync::{broadcast, watch};

pub use crate::channels::Channels;
pub use crate::command::{Command, ControlPath};
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::coordinator;
pub use crate::dialect::{self, Device, Dialect, DialectKind, DialectOps};
pub use crate::mqtt;
pub use crate::options::Options;
pub use crate::protocol::{self, Protocol, Reading, Value};
pub use crate::state::{self, AlarmLevel, BusValue, OperatingState, Snapshot};
pub use crate::{file_error, file_error_with_source};
