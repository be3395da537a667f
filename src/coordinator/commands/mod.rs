pub mod read_status;
pub mod set_current_limit;
pub mod set_mode;
pub mod set_priority;
pub mod validation;
