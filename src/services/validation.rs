use crate::constants::monitor::{MAX_INTERVAL_SECS, MIN_INTERVAL_SECS};
use std::time::Duration;
use crate::errors::OpsError;
use crate::stores::PrincipalId;

/// Argument checks shared by the command handlers. Every failure is an
/// `InvalidParams` error carrying the command's usage line as hint.
#[derive(Clone, Default)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_arg_count(
        &self,
        args: &[String],
        min: usize,
        max: usize,
        usage: &str,
    ) -> Result<(), OpsError> {
        if args.len() < min || args.len() > max {
            return Err(OpsError::invalid_params(format!("Usage: {}", usage)));
        }
        Ok(())
    }

    pub fn ensure_chat_id(&self, raw: &str) -> Result<PrincipalId, OpsError> {
        raw.trim()
            .parse::<PrincipalId>()
            .map_err(|_| OpsError::invalid_params("Invalid chat_id. Provide a number."))
    }

    pub fn ensure_absolute_path(&self, raw: &str, label: &str) -> Result<String, OpsError> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('/') {
            return Err(OpsError::invalid_params(format!(
                "Please use an absolute path for the {} (starting with /).",
                label
            )));
        }
        if trimmed.contains('\0') {
            return Err(OpsError::invalid_params(format!(
                "The {} must not contain null bytes.",
                label
            )));
        }
        Ok(trimmed.to_string())
    }

    /// A single path component: no separators, not `.` or `..`.
    pub fn ensure_file_name(&self, raw: &str, label: &str) -> Result<String, OpsError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains('/')
            || trimmed.contains('\0')
        {
            return Err(OpsError::invalid_params(format!(
                "{} must be a plain file name.",
                label
            )));
        }
        Ok(trimmed.to_string())
    }

    pub fn ensure_positive_int(&self, raw: &str, label: &str) -> Result<u32, OpsError> {
        let value = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| OpsError::invalid_params(format!("{} must be a number.", label)))?;
        if value <= 0 {
            return Err(OpsError::invalid_params(format!(
                "{} must be a positive number.",
                label
            )));
        }
        u32::try_from(value)
            .map_err(|_| OpsError::invalid_params(format!("{} is too large.", label)))
    }

    pub fn ensure_interval(&self, raw: &str) -> Result<f64, OpsError> {
        let value = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| OpsError::invalid_params("Interval must be a number."))?;
        self.ensure_interval_secs(value)
    }

    pub fn ensure_interval_secs(&self, value: f64) -> Result<f64, OpsError> {
        if !value.is_finite() || value < MIN_INTERVAL_SECS {
            return Err(OpsError::invalid_params(format!(
                "Interval must be at least {} second.",
                MIN_INTERVAL_SECS
            )));
        }
        if value > MAX_INTERVAL_SECS || Duration::try_from_secs_f64(value).is_err() {
            return Err(OpsError::invalid_params(format!(
                "Interval must be at most {} seconds.",
                MAX_INTERVAL_SECS
            )));
        }
        Ok(value)
    }

    pub fn ensure_identifier(&self, raw: &str, label: &str) -> Result<String, OpsError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OpsError::invalid_params(format!(
                "{} must be a non-empty string.",
                label
            )));
        }
        if trimmed.contains('\0') {
            return Err(OpsError::invalid_params(format!(
                "{} must not contain null bytes.",
                label
            )));
        }
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn arg_count_reports_usage() {
        let v = Validation::new();
        let err = v
            .ensure_arg_count(&args(&[]), 1, 2, "/tail <path> [n]")
            .expect_err("too few");
        assert_eq!(err.message, "Usage: /tail <path> [n]");
        assert!(v.ensure_arg_count(&args(&["/a", "5"]), 1, 2, "").is_ok());
    }

    #[test]
    fn absolute_paths_only() {
        let v = Validation::new();
        assert!(v.ensure_absolute_path("var/log/app.log", "log file").is_err());
        assert_eq!(
            v.ensure_absolute_path(" /var/log/app.log ", "log file").expect("ok"),
            "/var/log/app.log"
        );
    }

    #[test]
    fn file_names_reject_traversal() {
        let v = Validation::new();
        for bad in ["..", "../etc/passwd", "a/b", ""] {
            assert!(v.ensure_file_name(bad, "Backup name").is_err(), "{}", bad);
        }
        assert!(v.ensure_file_name("site_20240101.tar.gz", "Backup name").is_ok());
    }

    #[test]
    fn positive_ints_and_intervals() {
        let v = Validation::new();
        assert_eq!(v.ensure_positive_int("25", "Line count").expect("ok"), 25);
        assert!(v.ensure_positive_int("0", "Line count").is_err());
        assert!(v.ensure_positive_int("abc", "Line count").is_err());
        assert_eq!(v.ensure_interval("1.0").expect("ok"), 1.0);
        assert!(v.ensure_interval("0.5").is_err());
        assert!(v.ensure_interval("NaN").is_err());
    }

    #[test]
    fn intervals_beyond_a_day_are_rejected() {
        let v = Validation::new();
        assert_eq!(v.ensure_interval_secs(86_400.0).expect("one day"), 86_400.0);
        let err = v.ensure_interval_secs(1e20).expect_err("too large");
        assert_eq!(err.message, "Interval must be at most 86400 seconds.");
        assert!(v.ensure_interval("inf").is_err());
        assert!(v.ensure_interval("86400.5").is_err());
    }
}
