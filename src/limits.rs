//! Limits and constraints for document conversion
//!
//! Both the generic tree and NewsML input can nest blocks arbitrarily
//! deep. The converters are recursive, so attacker-controlled nesting is
//! a resource-exhaustion risk; this module turns it into a bounded,
//! reportable error.

use crate::error::{Error, Result};

/// Global limits configuration
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum block/object nesting depth
    pub max_nesting_depth: usize,

    /// Maximum input size in bytes for an XML document
    pub max_xml_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
        }
    }
}

impl Limits {
    /// Create a new Limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create strict limits (more restrictive)
    pub fn strict() -> Self {
        Self {
            max_nesting_depth: 16,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
        }
    }

    /// Check if XML size is within limits
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        if size > self.max_xml_size {
            Err(Error::LimitExceeded(format!(
                "XML size {} bytes exceeds maximum {} bytes",
                size, self.max_xml_size
            )))
        } else {
            Ok(())
        }
    }
}

/// Recursion depth counter threaded through the recursive converters.
///
/// `descend` yields a child counter or fails once the configured maximum
/// is reached; the parent counter is unaffected.
#[derive(Debug, Clone, Copy)]
pub struct Depth {
    level: usize,
    max: usize,
}

impl Depth {
    /// Start a depth counter with the given maximum
    pub fn new(max: usize) -> Self {
        Self { level: 0, max }
    }

    /// Start a depth counter from a Limits value
    pub fn from_limits(limits: &Limits) -> Self {
        Self::new(limits.max_nesting_depth)
    }

    /// Current nesting level
    pub fn level(&self) -> usize {
        self.level
    }

    /// Enter a nested block, failing when the limit is hit
    pub fn descend(&self) -> Result<Depth> {
        if self.level >= self.max {
            return Err(Error::LimitExceeded(format!(
                "nesting depth {} exceeds maximum {}",
                self.level + 1,
                self.max
            )));
        }
        Ok(Depth {
            level: self.level + 1,
            max: self.max,
        })
    }
}

impl Default for Depth {
    fn default() -> Self {
        Self::from_limits(&Limits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.max_nesting_depth, 64);
        assert!(limits.check_xml_size(1024).is_ok());
        assert!(limits.check_xml_size(200 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_strict_limits() {
        let limits = Limits::strict();
        assert!(limits.max_nesting_depth < Limits::default().max_nesting_depth);
    }

    #[test]
    fn test_depth_descend() {
        let depth = Depth::new(2);
        let d1 = depth.descend().unwrap();
        let d2 = d1.descend().unwrap();
        assert_eq!(d2.level(), 2);
        assert!(d2.descend().is_err());
        // Sibling descent from the parent is unaffected.
        assert!(d1.descend().is_ok());
    }
}
