//! Engine configuration and resource limits.
//!
//! [`EngineConfig`] bundles every tunable of the dispatch engine. It is plain data
//! with serde support so embedders can keep it in a JSON file next to the rest of
//! their settings and load it with [`EngineConfig::from_json`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exception::{ExcType, RunError};

/// Smallest specialization bound the signature dispatcher accepts.
pub const MIN_SPECIALIZED_ARITY: usize = 14;

/// What happens when a byte sequence is implicitly rendered with `str()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BytesWarningPolicy {
    /// The check is disabled (interpreter started without `-b`).
    #[default]
    Off,
    /// The warning is produced but discarded by the filter.
    Ignore,
    /// The warning is recorded in the runtime's warning log.
    Default,
    /// The warning is raised as a `BytesWarning` exception.
    Error,
}

/// Limits enforced while building sequences and large integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum length of a byte sequence, in bytes.
    pub max_sequence_len: usize,
    /// Maximum size of an integer produced by `**` or `<<`, in bits.
    pub max_int_bits: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_sequence_len: 1 << 31,
            max_int_bits: 1 << 24,
        }
    }
}

impl ResourceLimits {
    /// Creates limits with no practical bound.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_sequence_len: usize::MAX,
            max_int_bits: u64::MAX,
        }
    }

    pub(crate) fn check_sequence_len(&self, len: usize) -> Result<(), ResourceError> {
        if len > self.max_sequence_len {
            Err(ResourceError::Sequence {
                limit: self.max_sequence_len,
                requested: len,
            })
        } else {
            Ok(())
        }
    }

    pub(crate) fn check_int_bits(&self, bits: u64) -> Result<(), ResourceError> {
        if bits > self.max_int_bits {
            Err(ResourceError::Integer {
                limit: self.max_int_bits,
                requested: bits,
            })
        } else {
            Ok(())
        }
    }
}

/// A resource limit was exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    Sequence { limit: usize, requested: usize },
    Integer { limit: u64, requested: u64 },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence { limit, requested } => {
                write!(f, "sequence of {requested} bytes exceeds limit of {limit}")
            }
            Self::Integer { limit, requested } => {
                write!(f, "integer of {requested} bits exceeds limit of {limit}")
            }
        }
    }
}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        ExcType::memory_error(err)
    }
}

/// Tunables of one [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Functions with at most this many required positional parameters bind on the
    /// specialized path.
    pub max_positional: usize,
    /// Functions with at most this many defaulted parameters bind on the specialized path.
    pub max_keyword: usize,
    /// Entries kept in the conversion-site cache before it is flushed.
    pub conversion_cache_capacity: usize,
    /// Entries kept in the per-call-site overload cache before it is flushed.
    pub call_site_cache_capacity: usize,
    pub bytes_warning: BytesWarningPolicy,
    pub limits: ResourceLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_positional: MIN_SPECIALIZED_ARITY,
            max_keyword: MIN_SPECIALIZED_ARITY,
            conversion_cache_capacity: 4096,
            call_site_cache_capacity: 1024,
            bytes_warning: BytesWarningPolicy::Off,
            limits: ResourceLimits::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    ///
    /// Specialization bounds below [`MIN_SPECIALIZED_ARITY`] are raised to it.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    #[must_use]
    pub fn with_bytes_warning(mut self, policy: BytesWarningPolicy) -> Self {
        self.bytes_warning = policy;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub(crate) fn normalized(mut self) -> Self {
        self.max_positional = self.max_positional.max(MIN_SPECIALIZED_ARITY);
        self.max_keyword = self.max_keyword.max(MIN_SPECIALIZED_ARITY);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults_and_floor() {
        let config = EngineConfig::from_json(r#"{"max_positional": 3, "bytes_warning": "error"}"#).unwrap();
        assert_eq!(config.max_positional, MIN_SPECIALIZED_ARITY);
        assert_eq!(config.max_keyword, MIN_SPECIALIZED_ARITY);
        assert_eq!(config.bytes_warning, BytesWarningPolicy::Error);
        assert_eq!(config.limits, ResourceLimits::default());
    }

    #[test]
    fn limits_report_memory_error() {
        let limits = ResourceLimits {
            max_sequence_len: 4,
            max_int_bits: 8,
        };
        assert!(limits.check_sequence_len(4).is_ok());
        let err: RunError = limits.check_sequence_len(5).unwrap_err().into();
        assert_eq!(err.exc_type(), Some(ExcType::MemoryError));
        assert!(limits.check_int_bits(9).is_err());
    }
}
