//! Engine options
//!
//! ```
//! use tlb_stack::TlbOptions;
//!
//! let options = TlbOptions::from_json(r#"{ "max_tlb_depth": 4 }"#).unwrap();
//! assert_eq!(options.max_tlb_depth, 4);
//! assert_eq!(options.max_data_length, 1023);
//! ```

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum number of data bits in one cell.
pub const MAX_DATA_LENGTH: u32 = 1023;

/// Options controlling schema exploration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlbOptions {
    /// Recursion budget: how many composite labels may be entered from the root
    pub max_tlb_depth: u32,
    /// Upper bound on the data bits of one cell
    pub max_data_length: u32,
}

impl Default for TlbOptions {
    fn default() -> Self {
        Self {
            max_tlb_depth: 10,
            max_data_length: MAX_DATA_LENGTH,
        }
    }
}

impl TlbOptions {
    /// Options with the given recursion budget and default limits
    pub fn with_depth(max_tlb_depth: u32) -> Self {
        Self {
            max_tlb_depth,
            ..Self::default()
        }
    }

    /// Parse options from JSON, filling omitted fields with defaults
    pub fn from_json(source: &str) -> Result<Self> {
        let options: TlbOptions = serde_json::from_str(source)
            .map_err(|e| Error::InvalidOptions(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Reject options the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_tlb_depth == 0 {
            return Err(Error::InvalidOptions(
                "max_tlb_depth must be positive".to_string(),
            ));
        }
        if self.max_data_length > MAX_DATA_LENGTH {
            return Err(Error::InvalidOptions(format!(
                "max_data_length must not exceed {}, got {}",
                MAX_DATA_LENGTH, self.max_data_length
            )));
        }
        Ok(())
    }
}
