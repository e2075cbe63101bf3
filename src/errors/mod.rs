mod ops_error;

pub use ops_error::{OpsError, OpsErrorKind};
