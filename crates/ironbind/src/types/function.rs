//! Callable heap objects.

use std::{fmt, rc::Rc};

use crate::{exception::RunResult, runtime::Runtime, signature::Signature, value::Value};

/// Body of a Python function or managed method.
///
/// Receives the bound argument slots, laid out as the owning [`Signature`] (or
/// overload candidate) describes.
pub type NativeFn = Rc<dyn Fn(&mut Runtime, Vec<Value>) -> RunResult<Value>>;

/// A Python-level function: a signature, its evaluated defaults and a native body.
#[derive(Clone)]
pub struct PyFunction {
    pub name: String,
    pub signature: Signature,
    /// Evaluated defaults, laid out `[arg_defaults..][kwarg_defaults..]`.
    pub defaults: Vec<Value>,
    pub body: NativeFn,
}

impl fmt::Debug for PyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PyFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("defaults", &self.defaults.len())
            .finish_non_exhaustive()
    }
}

/// A function bound to its receiver, e.g. `obj.method`.
#[derive(Debug, Clone, Copy)]
pub struct BoundMethod {
    pub receiver: Value,
    pub func: Value,
}

/// A builtin method of a builtin object, e.g. `ba.extend`.
#[derive(Debug, Clone)]
pub struct BuiltinMethod {
    pub receiver: Value,
    pub name: String,
}
