pub mod stage;
pub mod status;
pub mod validate;

pub use stage::{StageOptions, run_stage};
pub use status::{StatusOptions, run_status};
pub use validate::run_validate;
