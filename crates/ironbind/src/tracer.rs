//! Dispatch tracing infrastructure.
//!
//! The [`DispatchTracer`] trait defines hook points at the decisions the engine makes
//! while resolving a call: which conversion a site resolved to, which overload won,
//! which binding path a Python function took, which hook ran.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Discards everything (default) |
//! | [`LogTracer`] | Forwards events to the `tracing` ecosystem |
//! | [`RecordingTracer`] | Keeps every event for later inspection |
//!
//! ```ignore
//! let recorder = RecordingTracer::new();
//! let mut rt = Runtime::with_tracer(EngineConfig::default(), recorder.clone());
//! // ... dispatch ...
//! assert!(recorder.events().iter().any(|e| matches!(e, TraceEvent::OverloadSelected { .. })));
//! ```

use std::{cell::RefCell, fmt, rc::Rc};

/// Which binding path a Python call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPath {
    /// The `(P, K)` fast path for a plain `def f(p.., kw=d..)` signature.
    Specialized { positional: usize, keyword: usize },
    /// The full algorithm (`*args`, `**kwargs`, keyword-only, out-of-range arity).
    General,
}

impl fmt::Display for BindPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Specialized { positional, keyword } => write!(f, "specialized({positional},{keyword})"),
            Self::General => f.write_str("general"),
        }
    }
}

/// Trace event emitted during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A conversion site was resolved, either from the cache or freshly.
    Conversion { from: String, to: String, kind: String, cached: bool },
    /// The overload selector picked a candidate.
    OverloadSelected { group: String, signature: String, from_cache: bool },
    /// A Python function bound its arguments.
    Bind { function: String, path: BindPath },
    /// A Python-level hook was invoked on an object.
    Hook { hook: &'static str, type_name: String },
    /// A warning was emitted.
    Warning { category: &'static str, message: String },
    /// A binary operator was handled by an operand's method; `reflected` is true
    /// when the right operand's reflected method produced the result.
    Operator { op: &'static str, type_name: String, reflected: bool },
}

/// Observer of dispatch decisions.
///
/// All methods default to no-ops, so implementations only override what they need.
pub trait DispatchTracer: fmt::Debug {
    fn on_conversion(&mut self, _from: &str, _to: &str, _kind: &str, _cached: bool) {}

    fn on_overload_selected(&mut self, _group: &str, _signature: &str, _from_cache: bool) {}

    fn on_bind(&mut self, _function: &str, _path: BindPath) {}

    fn on_hook(&mut self, _hook: &'static str, _type_name: &str) {}

    fn on_warning(&mut self, _category: &'static str, _message: &str) {}

    fn on_operator(&mut self, _op: &'static str, _type_name: &str, _reflected: bool) {}
}

/// Tracer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl DispatchTracer for NoopTracer {}

/// Tracer that forwards events to `tracing` spans and events.
///
/// Conversions and hooks are logged at `trace` level, selection and binding at `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl DispatchTracer for LogTracer {
    fn on_conversion(&mut self, from: &str, to: &str, kind: &str, cached: bool) {
        tracing::trace!(from, to, kind, cached, "conversion site");
    }

    fn on_overload_selected(&mut self, group: &str, signature: &str, from_cache: bool) {
        tracing::debug!(group, signature, from_cache, "overload selected");
    }

    fn on_bind(&mut self, function: &str, path: BindPath) {
        tracing::debug!(function, path = %path, "arguments bound");
    }

    fn on_hook(&mut self, hook: &'static str, type_name: &str) {
        tracing::trace!(hook, type_name, "hook invoked");
    }

    fn on_warning(&mut self, category: &'static str, message: &str) {
        tracing::warn!(category, message, "warning emitted");
    }

    fn on_operator(&mut self, op: &'static str, type_name: &str, reflected: bool) {
        tracing::trace!(op, type_name, reflected, "operator handled");
    }
}

/// Tracer that records every event.
///
/// Cloning shares the underlying log, so a test can keep one handle while the
/// runtime owns the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Rc<RefCell<Vec<TraceEvent>>>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn push(&self, event: TraceEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl DispatchTracer for RecordingTracer {
    fn on_conversion(&mut self, from: &str, to: &str, kind: &str, cached: bool) {
        self.push(TraceEvent::Conversion {
            from: from.to_owned(),
            to: to.to_owned(),
            kind: kind.to_owned(),
            cached,
        });
    }

    fn on_overload_selected(&mut self, group: &str, signature: &str, from_cache: bool) {
        self.push(TraceEvent::OverloadSelected {
            group: group.to_owned(),
            signature: signature.to_owned(),
            from_cache,
        });
    }

    fn on_bind(&mut self, function: &str, path: BindPath) {
        self.push(TraceEvent::Bind {
            function: function.to_owned(),
            path,
        });
    }

    fn on_hook(&mut self, hook: &'static str, type_name: &str) {
        self.push(TraceEvent::Hook {
            hook,
            type_name: type_name.to_owned(),
        });
    }

    fn on_warning(&mut self, category: &'static str, message: &str) {
        self.push(TraceEvent::Warning {
            category,
            message: message.to_owned(),
        });
    }

    fn on_operator(&mut self, op: &'static str, type_name: &str, reflected: bool) {
        self.push(TraceEvent::Operator {
            op,
            type_name: type_name.to_owned(),
            reflected,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_handles_share_log() {
        let recorder = RecordingTracer::new();
        let mut owned: Box<dyn DispatchTracer> = Box::new(recorder.clone());
        owned.on_bind("f", BindPath::Specialized { positional: 1, keyword: 2 });
        owned.on_hook("__index__", "myint");
        assert_eq!(
            recorder.events(),
            vec![
                TraceEvent::Bind {
                    function: "f".to_owned(),
                    path: BindPath::Specialized { positional: 1, keyword: 2 },
                },
                TraceEvent::Hook {
                    hook: "__index__",
                    type_name: "myint".to_owned(),
                },
            ]
        );
        recorder.clear();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn bind_path_display() {
        assert_eq!(BindPath::General.to_string(), "general");
        assert_eq!(
            BindPath::Specialized { positional: 3, keyword: 14 }.to_string(),
            "specialized(3,14)"
        );
    }
}
