//! Call-site dispatch and numeric coercion for a Python runtime hosted on a
//! managed object model.
//!
//! A [`Runtime`] owns every object the engine touches. Managed classes, enums
//! and overload groups are declared through [`types::ClassBuilder`] and
//! [`OverloadSet`]; Python functions carry a [`Signature`]. Every call goes
//! through [`Runtime::dispatch_call`], which binds arguments, selects the
//! best overload and applies the implicit conversions it requires.
//!
//! ```
//! use ironbind::{EngineConfig, Runtime, Value, types::Type};
//!
//! let mut rt = Runtime::new(EngineConfig::default());
//! let zeros = rt.call(Value::Type(Type::Bytes), vec![Value::Int(3)])?;
//! assert_eq!(rt.byte_data(zeros), Some(&[0u8, 0, 0][..]));
//!
//! let err = rt.call(Value::Type(Type::Bytes), vec![Value::Int(-1)]).unwrap_err();
//! assert_eq!(err.message(), Some("negative count"));
//! # Ok::<(), ironbind::RunError>(())
//! ```
mod heap;

mod args;
mod builtins;
mod coerce;
mod config;
mod construct;
mod exception;
mod format;
mod hooks;
mod methods;
mod ops;
mod overload;
pub mod pickle;
mod repr;
mod runtime;
mod signature;
pub mod tracer;
pub mod types;
mod value;
mod warnings;

pub use crate::{
    args::{ArgValues, KwargsValues},
    coerce::{CoerceError, Scalar, big_to_f64, coerce, float_to_bigint, widening_chain},
    config::{BytesWarningPolicy, EngineConfig, MIN_SPECIALIZED_ARITY, ResourceError, ResourceLimits},
    exception::{ExcType, RunError, RunResult, SimpleException},
    format::float_repr,
    heap::{Heap, HeapData, HeapId},
    hooks::LengthHintPolicy,
    ops::{BinaryOp, CompareOp, Comparison},
    overload::{
        Candidate, OverloadSet, Param, ParamType,
        conversion::{ConversionContext, ConversionKind, HookKind},
    },
    runtime::Runtime,
    signature::{Signature, SignatureBuilder},
    tracer::{BindPath, DispatchTracer, LogTracer, NoopTracer, RecordingTracer, TraceEvent},
    value::Value,
    warnings::WarningRecord,
};
