//! Writer and evaluator options, loadable from YAML or JSON.
//!
//! ```yaml
//! writer:
//!   length_prefix_preallocation: 2
//!   delimited_containers: false
//! evaluator:
//!   step_limit: 50000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{err_help, err_msg, IonResult};

/// Largest supported number of bytes reserved for a deferred container length.
pub const MAX_LENGTH_PREFIX_PREALLOCATION: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterOptions {
    /// Bytes reserved for a length prefix when a container is opened. Zero forces a patch point
    /// for every non-empty container that cannot be compacted.
    pub length_prefix_preallocation: u8,
    pub delimited_containers: bool,
    /// When false, symbols already in the symbol table are written as SIDs.
    pub inline_symbol_text: bool,
    pub write_ivm: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            length_prefix_preallocation: 1,
            delimited_containers: false,
            inline_symbol_text: true,
            write_ivm: true,
        }
    }
}

impl WriterOptions {
    pub fn validate(&self) -> IonResult<()> {
        if self.length_prefix_preallocation > MAX_LENGTH_PREFIX_PREALLOCATION {
            return Err(err_help!(
                Config,
                format!(
                    "length_prefix_preallocation must be between 0 and {}, found {}",
                    MAX_LENGTH_PREFIX_PREALLOCATION, self.length_prefix_preallocation
                ),
                "use 1 for small documents and 2 or 3 for large containers"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluatorOptions {
    /// Expansion steps allowed between two calls to `init_expansion`.
    pub step_limit: usize,
    pub initial_frame_capacity: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            step_limit: 1_000_000,
            initial_frame_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub writer: WriterOptions,
    pub evaluator: EvaluatorOptions,
}

impl Options {
    /// Loads options from a `.yaml`/`.yml` or `.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> IonResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(err_help!(
                Config,
                format!("unsupported configuration file '{}'", path.display()),
                "use a .yaml, .yml or .json file"
            )),
        }
    }

    pub fn from_yaml_str(content: &str) -> IonResult<Self> {
        let options: Self =
            serde_yaml::from_str(content).map_err(|e| err_msg!(Config, "invalid YAML options: {}", e))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_str(content: &str) -> IonResult<Self> {
        let options: Self =
            serde_json::from_str(content).map_err(|e| err_msg!(Config, "invalid JSON options: {}", e))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> IonResult<()> {
        self.writer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorType;

    #[test]
    fn missing_sections_take_defaults() {
        let options = Options::from_yaml_str("evaluator:\n  step_limit: 10\n").unwrap();
        assert_eq!(options.evaluator.step_limit, 10);
        assert_eq!(options.evaluator.initial_frame_capacity, 32);
        assert_eq!(options.writer, WriterOptions::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Options::from_json_str(r#"{"writer": {"prealloc": 2}}"#).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);
    }

    #[test]
    fn preallocation_is_range_checked() {
        let err = Options::from_yaml_str("writer:\n  length_prefix_preallocation: 9\n").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);
        assert!(Options::from_yaml_str("writer:\n  length_prefix_preallocation: 0\n").is_ok());
    }
}
