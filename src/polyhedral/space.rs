//! Polyhedral spaces define the dimensions of iteration domains.
//!
//! A space describes the structure of an iteration domain or map:
//! - Input dimensions (for maps)
//! - Output dimensions
//! - Parameter dimensions (symbolic constants)

use serde::{Serialize, Deserialize};
use std::fmt;

/// A polyhedral space describes the dimensionality and structure.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Space {
    /// Number of set/output dimensions
    pub n_dim: usize,
    /// Number of parameter dimensions
    pub n_param: usize,
    /// Number of input dimensions (for maps only)
    pub n_in: usize,
    /// Names of dimensions (optional)
    pub dim_names: Vec<String>,
    /// Names of parameters (optional)
    pub param_names: Vec<String>,
}

impl Space {
    /// Create a new set space with parameters.
    pub fn set_with_params(n_dim: usize, n_param: usize) -> Self {
        Self { n_dim, n_param, ..Self::default() }
    }

    /// Create a new map space with parameters.
    pub fn map_with_params(n_in: usize, n_out: usize, n_param: usize) -> Self {
        Self { n_dim: n_out, n_param, n_in, ..Self::default() }
    }

    /// Check if this is a map space (has input dimensions).
    pub fn is_map(&self) -> bool {
        self.n_in > 0
    }

    /// Set dimension names.
    pub fn with_dim_names(mut self, names: Vec<String>) -> Self {
        self.dim_names = names;
        self
    }

    /// Set parameter names.
    pub fn with_param_names(mut self, names: Vec<String>) -> Self {
        self.param_names = names;
        self
    }

    /// Get all dimension names with defaults.
    pub fn all_dim_names(&self) -> Vec<String> {
        (0..self.n_dim)
            .map(|i| self.dim_names.get(i).cloned().unwrap_or_else(|| format!("i{}", i)))
            .collect()
    }

    /// Get all parameter names with defaults.
    pub fn all_param_names(&self) -> Vec<String> {
        (0..self.n_param)
            .map(|i| self.param_names.get(i).cloned().unwrap_or_else(|| format!("p{}", i)))
            .collect()
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_map() {
            write!(f, "[{}] -> [{}]", self.n_in, self.n_dim)?;
        } else {
            write!(f, "[{}]", self.n_dim)?;
        }
        if self.n_param > 0 {
            write!(f, " : {} params", self.n_param)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let space = Space::set_with_params(2, 1).with_dim_names(vec!["i".to_string()]);
        assert_eq!(space.all_dim_names(), vec!["i".to_string(), "i1".to_string()]);
        assert_eq!(space.all_param_names(), vec!["p0".to_string()]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Space::map_with_params(2, 3, 1).to_string(), "[2] -> [3] : 1 params");
        assert_eq!(Space::set_with_params(2, 0).to_string(), "[2]");
    }
}
