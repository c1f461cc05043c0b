//! Warning emission and the `BytesWarning` filter.

use serde::{Deserialize, Serialize};

use crate::{
    config::BytesWarningPolicy,
    exception::{ExcType, RunResult},
    runtime::Runtime,
};

/// A warning the filter let through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub category: ExcType,
    pub message: String,
}

impl Runtime {
    /// `warnings.warn(message, category)` under the configured filter action.
    ///
    /// The `bytes_warning` policy doubles as the filter for every category: `error`
    /// raises the warning, `ignore` drops it, anything else records it.
    pub fn warn(&mut self, category: ExcType, message: &str) -> RunResult<()> {
        if !category.is_subclass_of(ExcType::Warning) {
            return Err(ExcType::type_error(format!(
                "category must be a Warning subclass, not '{category}'"
            )));
        }
        match self.config.bytes_warning {
            BytesWarningPolicy::Error => Err(ExcType::warning_as_error(category, message)),
            BytesWarningPolicy::Ignore => Ok(()),
            BytesWarningPolicy::Off | BytesWarningPolicy::Default => {
                self.record_warning(category, message);
                Ok(())
            }
        }
    }

    /// Emits `BytesWarning` for an implicit bytes-to-str conversion, if enabled.
    pub(crate) fn check_bytes_warning(&mut self, message: &'static str) -> RunResult<()> {
        match self.config.bytes_warning {
            BytesWarningPolicy::Off | BytesWarningPolicy::Ignore => Ok(()),
            BytesWarningPolicy::Default => {
                self.record_warning(ExcType::BytesWarning, message);
                Ok(())
            }
            BytesWarningPolicy::Error => Err(ExcType::warning_as_error(ExcType::BytesWarning, message)),
        }
    }

    fn record_warning(&mut self, category: ExcType, message: &str) {
        let name: &'static str = category.into();
        self.tracer.on_warning(name, message);
        self.warnings.push(WarningRecord {
            category,
            message: message.to_owned(),
        });
    }

    /// Warnings recorded so far.
    #[must_use]
    pub fn warnings(&self) -> &[WarningRecord] {
        &self.warnings
    }

    /// Removes and returns the recorded warnings.
    pub fn take_warnings(&mut self) -> Vec<WarningRecord> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;

    #[test]
    fn policy_controls_bytes_warning() {
        let mut rt = Runtime::new(EngineConfig::default());
        rt.check_bytes_warning("str() on a bytes instance").unwrap();
        assert!(rt.warnings().is_empty());

        let mut rt = Runtime::new(EngineConfig::default().with_bytes_warning(BytesWarningPolicy::Default));
        rt.check_bytes_warning("str() on a bytes instance").unwrap();
        assert_eq!(rt.take_warnings().len(), 1);
        assert!(rt.warnings().is_empty());

        let mut rt = Runtime::new(EngineConfig::default().with_bytes_warning(BytesWarningPolicy::Error));
        let err = rt.check_bytes_warning("str() on a bytes instance").unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::BytesWarning));
    }

    #[test]
    fn warn_rejects_non_warning_categories() {
        let mut rt = Runtime::new(EngineConfig::default());
        assert!(rt.warn(ExcType::ValueError, "x").is_err());
        rt.warn(ExcType::BytesWarning, "y").unwrap();
        assert_eq!(rt.warnings()[0].message, "y");
    }
}
