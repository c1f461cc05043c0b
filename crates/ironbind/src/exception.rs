use std::{
    borrow::Cow,
    fmt::{self, Display},
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Python exception types raised by the dispatch engine.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `ValueError` -> "ValueError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Root of every exception raised here.
    BaseException,
    /// primary exception class - matches any non-exit exception in isinstance checks.
    Exception,

    // --- ArithmeticError hierarchy ---
    ArithmeticError,
    OverflowError,
    ZeroDivisionError,

    // --- LookupError hierarchy ---
    LookupError,
    IndexError,
    KeyError,

    // --- TypeError hierarchy ---
    TypeError,
    /// Overload resolution reached two equally good candidates.
    AmbiguousMatchError,

    // --- ValueError hierarchy ---
    ValueError,
    UnicodeEncodeError,
    UnicodeDecodeError,

    AttributeError,
    BufferError,
    MemoryError,
    StopIteration,
    RuntimeError,
    NotImplementedError,

    // --- Warning hierarchy ---
    Warning,
    /// Raised instead of recorded when the bytes-warning filter is set to `error`.
    BytesWarning,
}

impl ExcType {
    /// Checks if this exception type is a subclass of another exception type.
    ///
    /// Returns true if `self` would be caught by `except handler_type:`.
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        if self == handler_type {
            return true;
        }
        match handler_type {
            Self::BaseException => true,
            Self::Exception => self != Self::BaseException,
            Self::ArithmeticError => matches!(self, Self::OverflowError | Self::ZeroDivisionError),
            Self::LookupError => matches!(self, Self::IndexError | Self::KeyError),
            Self::TypeError => self == Self::AmbiguousMatchError,
            Self::ValueError => matches!(self, Self::UnicodeEncodeError | Self::UnicodeDecodeError),
            Self::RuntimeError => self == Self::NotImplementedError,
            Self::Warning => self == Self::BytesWarning,
            _ => false,
        }
    }

    #[must_use]
    pub(crate) fn type_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::TypeError, msg).into()
    }

    #[must_use]
    pub(crate) fn value_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::ValueError, msg).into()
    }

    #[must_use]
    pub(crate) fn overflow_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::OverflowError, msg).into()
    }

    /// Matches CPython's format: `'{type}' object cannot be interpreted as an integer`
    #[must_use]
    pub(crate) fn type_error_not_integer(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object cannot be interpreted as an integer"))
    }

    #[must_use]
    pub(crate) fn type_error_not_iterable(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object is not iterable"))
    }

    #[must_use]
    pub(crate) fn type_error_not_callable(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object is not callable"))
    }

    #[must_use]
    pub(crate) fn type_error_unhashable(type_name: &str) -> RunError {
        Self::type_error(format!("unhashable type: '{type_name}'"))
    }

    /// A conversion hook returned an object of the wrong kind.
    ///
    /// Formats as `__{hook}__ returned non-{expected} (type {type})`.
    #[must_use]
    pub(crate) fn type_error_hook_result(hook: &str, expected: &str, type_name: &str) -> RunError {
        Self::type_error(format!("{hook} returned non-{expected} (type {type_name})"))
    }

    #[must_use]
    pub(crate) fn type_error_bool_result(type_name: &str) -> RunError {
        Self::type_error(format!("__bool__ should return bool, returned {type_name}"))
    }

    #[must_use]
    pub(crate) fn type_error_length_hint(type_name: &str) -> RunError {
        Self::type_error(format!("__length_hint__ must be an integer, not {type_name}"))
    }

    #[must_use]
    pub(crate) fn type_error_int_conversion(type_name: &str) -> RunError {
        Self::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{type_name}'"
        ))
    }

    #[must_use]
    pub(crate) fn type_error_float_conversion(type_name: &str) -> RunError {
        Self::type_error(format!("must be real number, not {type_name}"))
    }

    #[must_use]
    pub(crate) fn type_error_complex_conversion(type_name: &str) -> RunError {
        Self::type_error(format!(
            "complex() first argument must be a string or a number, not '{type_name}'"
        ))
    }

    /// Index-sized conversion failed; names the type whose hook produced the value.
    #[must_use]
    pub(crate) fn overflow_index_sized(type_name: &str) -> RunError {
        Self::overflow_error(format!("cannot fit '{type_name}' into an index-sized integer"))
    }

    /// Matches the managed runtime's overflow message for a fixed-width primitive.
    #[must_use]
    pub(crate) fn overflow_primitive(managed_name: &str) -> RunError {
        let article = if managed_name.starts_with(['I', 'U', 'S']) && !managed_name.starts_with("Si") {
            if managed_name.starts_with('U') { "a" } else { "an" }
        } else {
            "a"
        };
        Self::overflow_error(format!(
            "Value was either too large or too small for {article} {managed_name}."
        ))
    }

    #[must_use]
    pub(crate) fn value_error_nan_to_integer() -> RunError {
        Self::value_error("cannot convert float NaN to integer")
    }

    #[must_use]
    pub(crate) fn overflow_infinity_to_integer() -> RunError {
        Self::overflow_error("cannot convert float infinity to integer")
    }

    #[must_use]
    pub(crate) fn value_error_negative_count() -> RunError {
        Self::value_error("negative count")
    }

    /// Element range error raised while building a sequence from an iterable.
    #[must_use]
    pub(crate) fn value_error_bytes_range() -> RunError {
        Self::value_error("bytes must be in range(0, 256)")
    }

    /// Element range error raised when storing a single byte.
    #[must_use]
    pub(crate) fn value_error_byte_range() -> RunError {
        Self::value_error("byte must be in range(0, 256)")
    }

    #[must_use]
    pub(crate) fn type_error_encoding_without_string() -> RunError {
        Self::type_error("encoding without a string argument")
    }

    #[must_use]
    pub(crate) fn type_error_errors_without_string() -> RunError {
        Self::type_error("errors without a string argument")
    }

    #[must_use]
    pub(crate) fn type_error_string_without_encoding() -> RunError {
        Self::type_error("string argument without an encoding")
    }

    /// Matches CPython's format: `{func}() argument '{arg}' must be str, not {type}`
    #[must_use]
    pub(crate) fn type_error_str_argument(func: &str, arg: &str, type_name: &str) -> RunError {
        let shown = if type_name == "NoneType" { "None" } else { type_name };
        Self::type_error(format!("{func}() argument '{arg}' must be str, not {shown}"))
    }

    #[must_use]
    pub(crate) fn lookup_error_unknown_encoding(encoding: &str) -> RunError {
        SimpleException::new_msg(Self::LookupError, format!("unknown encoding: {encoding}")).into()
    }

    #[must_use]
    pub(crate) fn lookup_error_unknown_error_handler(name: &str) -> RunError {
        SimpleException::new_msg(Self::LookupError, format!("unknown error handler name '{name}'")).into()
    }

    #[must_use]
    pub(crate) fn unicode_encode_error(codec: &str, ch: char, position: usize, reason: &str) -> RunError {
        let code = u32::from(ch);
        let escaped = if code <= 0xff {
            format!("\\x{code:02x}")
        } else if code <= 0xffff {
            format!("\\u{code:04x}")
        } else {
            format!("\\U{code:08x}")
        };
        SimpleException::new_msg(
            Self::UnicodeEncodeError,
            format!("'{codec}' codec can't encode character '{escaped}' in position {position}: {reason}"),
        )
        .into()
    }

    #[must_use]
    pub(crate) fn unicode_decode_error(codec: &str, byte: u8, position: usize, reason: &str) -> RunError {
        SimpleException::new_msg(
            Self::UnicodeDecodeError,
            format!("'{codec}' codec can't decode byte 0x{byte:02x} in position {position}: {reason}"),
        )
        .into()
    }

    /// Resize of a mutable byte sequence while a buffer view is exported.
    #[must_use]
    pub(crate) fn buffer_error_resize() -> RunError {
        SimpleException::new_msg(Self::BufferError, "Existing exports of data: object cannot be re-sized").into()
    }

    #[must_use]
    pub(crate) fn value_error_released_view() -> RunError {
        Self::value_error("operation forbidden on released memoryview object")
    }

    /// Matches CPython's format: `attempt to assign bytes of size {n} to extended slice of size {m}`
    #[must_use]
    pub(crate) fn value_error_extended_slice(given: usize, slice_len: usize) -> RunError {
        Self::value_error(format!(
            "attempt to assign bytes of size {given} to extended slice of size {slice_len}"
        ))
    }

    #[must_use]
    pub(crate) fn value_error_subsection_not_found() -> RunError {
        Self::value_error("subsection not found")
    }

    #[must_use]
    pub(crate) fn value_error_empty_separator() -> RunError {
        Self::value_error("empty separator")
    }

    #[must_use]
    pub(crate) fn value_error_translation_table() -> RunError {
        Self::value_error("translation table must be 256 characters long")
    }

    #[must_use]
    pub(crate) fn value_error_not_in_bytearray() -> RunError {
        Self::value_error("value not found in bytearray")
    }

    #[must_use]
    pub(crate) fn value_error_slice_step_zero() -> RunError {
        Self::value_error("slice step cannot be zero")
    }

    #[must_use]
    pub(crate) fn index_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::IndexError, msg).into()
    }

    #[must_use]
    pub(crate) fn index_error_pop_empty(type_name: &str) -> RunError {
        Self::index_error(format!("pop from empty {type_name}"))
    }

    #[must_use]
    pub(crate) fn index_error_out_of_range(type_name: &str) -> RunError {
        if type_name == "bytes" {
            Self::index_error("index out of range")
        } else {
            Self::index_error(format!("{type_name} index out of range"))
        }
    }

    /// Matches CPython's format: `{type} indices must be integers or slices, not {index_type}`
    #[must_use]
    pub(crate) fn type_error_indices(type_name: &str, index_type: &str) -> RunError {
        Self::type_error(format!("{type_name} indices must be integers or slices, not {index_type}"))
    }

    /// Uses CPython's format: `unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'`
    ///
    /// Concatenating a byte sequence with a non-buffer uses the `can't concat` form.
    #[must_use]
    pub(crate) fn binary_type_error(op: &str, lhs_type: &str, rhs_type: &str) -> RunError {
        let message = if (op == "+" || op == "+=") && (lhs_type == "bytes" || lhs_type == "bytearray") {
            format!("can't concat {rhs_type} to {lhs_type}")
        } else if (op == "+" || op == "+=") && (lhs_type == "str" || lhs_type == "list" || lhs_type == "tuple") {
            format!("can only concatenate {lhs_type} (not \"{rhs_type}\") to {lhs_type}")
        } else {
            format!("unsupported operand type(s) for {op}: '{lhs_type}' and '{rhs_type}'")
        };
        Self::type_error(message)
    }

    /// Uses CPython's format: `'{op}' not supported between instances of '{lhs}' and '{rhs}'`
    #[must_use]
    pub(crate) fn compare_type_error(op: &str, lhs_type: &str, rhs_type: &str) -> RunError {
        Self::type_error(format!(
            "'{op}' not supported between instances of '{lhs_type}' and '{rhs_type}'"
        ))
    }

    #[must_use]
    pub(crate) fn type_error_sequence_repeat(type_name: &str) -> RunError {
        Self::type_error(format!("can't multiply sequence by non-int of type '{type_name}'"))
    }

    #[must_use]
    pub(crate) fn zero_division(msg: &'static str) -> RunError {
        SimpleException::new_msg(Self::ZeroDivisionError, msg).into()
    }

    #[must_use]
    pub(crate) fn value_error_negative_shift_count() -> RunError {
        Self::value_error("negative shift count")
    }

    /// Matches CPython's format: `{name}() takes exactly one argument ({actual} given)`
    /// for one argument and `{name} expected {expected} arguments, got {actual}` otherwise.
    #[must_use]
    pub(crate) fn type_error_arg_count(name: &str, expected: usize, actual: usize) -> RunError {
        if expected == 1 {
            Self::type_error(format!("{name}() takes exactly one argument ({actual} given)"))
        } else {
            Self::type_error(format!("{name} expected {expected} arguments, got {actual}"))
        }
    }

    #[must_use]
    pub(crate) fn type_error_no_args(name: &str, actual: usize) -> RunError {
        Self::type_error(format!("{name}() takes no arguments ({actual} given)"))
    }

    #[must_use]
    pub(crate) fn type_error_at_least(name: &str, min: usize, actual: usize) -> RunError {
        Self::type_error(format!("{name} expected at least {min} argument, got {actual}"))
    }

    #[must_use]
    pub(crate) fn type_error_at_most(name: &str, max: usize, actual: usize) -> RunError {
        Self::type_error(format!("{name} expected at most {max} arguments, got {actual}"))
    }

    #[must_use]
    pub(crate) fn type_error_no_kwargs(name: &str) -> RunError {
        Self::type_error(format!("{name}() takes no keyword arguments"))
    }

    /// No overload accepted an argument: `expected {param}, got {arg}`.
    #[must_use]
    pub(crate) fn type_error_expected_got(expected: &str, got: &str) -> RunError {
        Self::type_error(format!("expected {expected}, got {got}"))
    }

    #[must_use]
    pub(crate) fn ambiguous_match(signatures: &[String]) -> RunError {
        SimpleException::new_msg(
            Self::AmbiguousMatchError,
            format!("Multiple targets could match: {}", signatures.join(", ")),
        )
        .into()
    }

    /// Managed method arity error.
    ///
    /// `exactly`, `at most` and `at least` follow the managed binder's phrasing:
    /// `M200() takes exactly 1 argument (2 given)`.
    #[must_use]
    pub(crate) fn type_error_managed_arity(name: &str, bound: ArityBound, expected: usize, given: usize) -> RunError {
        if expected == 0 && bound != ArityBound::AtLeast {
            return Self::type_error(format!("{name}() takes no arguments ({given} given)"));
        }
        let noun = if expected == 1 { "argument" } else { "arguments" };
        let word = match bound {
            ArityBound::Exactly => "exactly",
            ArityBound::AtMost => "at most",
            ArityBound::AtLeast => "at least",
        };
        Self::type_error(format!("{name}() takes {word} {expected} {noun} ({given} given)"))
    }

    #[must_use]
    pub(crate) fn type_error_managed_name_and_position(name: &str, param: &str, position: usize) -> RunError {
        Self::type_error(format!(
            "Argument for {name}() given by name ('{param}') and position ({position})"
        ))
    }

    /// Matches CPython's format: `{name}() got an unexpected keyword argument '{key}'`
    #[must_use]
    pub(crate) fn type_error_unexpected_keyword(name: &str, key: &str) -> RunError {
        Self::type_error(format!("{name}() got an unexpected keyword argument '{key}'"))
    }

    /// Matches CPython's format: `{name}() got multiple values for argument '{param}'`
    #[must_use]
    pub(crate) fn type_error_duplicate_arg(name: &str, param: &str) -> RunError {
        Self::type_error(format!("{name}() got multiple values for argument '{param}'"))
    }

    #[must_use]
    pub(crate) fn type_error_positional_only(name: &str, param: &str) -> RunError {
        Self::type_error(format!(
            "{name}() got some positional-only arguments passed as keyword arguments: '{param}'"
        ))
    }

    /// Matches CPython's format: `{name}() missing 2 required positional arguments: 'a' and 'b'`
    #[must_use]
    pub(crate) fn type_error_missing_positional(name: &str, missing: &[&str]) -> RunError {
        let names = format_param_names(missing);
        if missing.len() == 1 {
            Self::type_error(format!("{name}() missing 1 required positional argument: {names}"))
        } else {
            Self::type_error(format!(
                "{name}() missing {} required positional arguments: {names}",
                missing.len()
            ))
        }
    }

    #[must_use]
    pub(crate) fn type_error_missing_kwonly(name: &str, missing: &[&str]) -> RunError {
        let names = format_param_names(missing);
        if missing.len() == 1 {
            Self::type_error(format!("{name}() missing 1 required keyword-only argument: {names}"))
        } else {
            Self::type_error(format!(
                "{name}() missing {} required keyword-only arguments: {names}",
                missing.len()
            ))
        }
    }

    /// Matches CPython's format, including the `from {min} to {max}` form when defaults exist.
    #[must_use]
    pub(crate) fn type_error_too_many_positional(name: &str, min: usize, max: usize, actual: usize) -> RunError {
        let takes = if min == max {
            let noun = if max == 1 { "argument" } else { "arguments" };
            format!("{max} positional {noun}")
        } else {
            format!("from {min} to {max} positional arguments")
        };
        let verb = if actual == 1 { "was" } else { "were" };
        Self::type_error(format!("{name}() takes {takes} but {actual} {verb} given"))
    }

    #[must_use]
    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> RunError {
        SimpleException::new_msg(
            Self::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
        .into()
    }

    #[must_use]
    pub(crate) fn type_error_not_iterator(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object is not an iterator"))
    }

    /// Matches CPython's format: `cannot convert '{type}' object to {target}`
    #[must_use]
    pub(crate) fn type_error_cannot_convert(type_name: &str, target: &str) -> RunError {
        Self::type_error(format!("cannot convert '{type_name}' object to {target}"))
    }

    #[must_use]
    pub(crate) fn type_error_memoryview_source(type_name: &str) -> RunError {
        Self::type_error(format!(
            "memoryview: a bytes-like object is required, not '{type_name}'"
        ))
    }

    #[must_use]
    pub(crate) fn type_error_bytes_like(type_name: &str) -> RunError {
        Self::type_error(format!("a bytes-like object is required, not '{type_name}'"))
    }

    #[must_use]
    pub(crate) fn type_error_read_only() -> RunError {
        Self::type_error("cannot modify read-only memory")
    }

    #[must_use]
    pub(crate) fn type_error_no_instances(type_name: &str) -> RunError {
        Self::type_error(format!("cannot create '{type_name}' instances"))
    }

    #[must_use]
    pub(crate) fn type_error_object_no_args(type_name: &str) -> RunError {
        Self::type_error(format!("{type_name}() takes no arguments"))
    }

    #[must_use]
    pub(crate) fn type_error_hook_str(hook: &str, type_name: &str) -> RunError {
        Self::type_error(format!("{hook} returned non-string (type {type_name})"))
    }

    #[must_use]
    pub(crate) fn type_error_slice_assign() -> RunError {
        Self::type_error("can assign only bytes, buffers, or iterables of ints in range(0, 256)")
    }

    #[must_use]
    pub(crate) fn value_error_negative_length_hint() -> RunError {
        Self::value_error("__length_hint__() should return >= 0")
    }

    #[must_use]
    pub(crate) fn value_error_generator_running() -> RunError {
        Self::value_error("generator already executing")
    }

    #[must_use]
    pub(crate) fn value_error_int_literal(base: u32, repr: &str) -> RunError {
        Self::value_error(format!("invalid literal for int() with base {base}: {repr}"))
    }

    #[must_use]
    pub(crate) fn value_error_float_literal(repr: &str) -> RunError {
        Self::value_error(format!("could not convert string to float: {repr}"))
    }

    #[must_use]
    pub(crate) fn value_error_hex_separator() -> RunError {
        Self::value_error("sep must be length 1.")
    }

    #[must_use]
    pub(crate) fn overflow_int_to_float() -> RunError {
        Self::overflow_error("int too large to convert to float")
    }

    #[must_use]
    pub(crate) fn overflow_int_true_division() -> RunError {
        Self::overflow_error("integer division result too large for a float")
    }

    #[must_use]
    pub(crate) fn type_error_unpicklable(type_name: &str) -> RunError {
        Self::type_error(format!("cannot pickle '{type_name}' object"))
    }

    #[must_use]
    pub(crate) fn value_error_pickle_data(detail: impl Display) -> RunError {
        Self::value_error(format!("invalid pickle data: {detail}"))
    }

    /// Raised instead of recording a warning when the filter action is `error`.
    #[must_use]
    pub(crate) fn warning_as_error(category: Self, message: &str) -> RunError {
        SimpleException::new_msg(category, message).into()
    }

    #[must_use]
    pub(crate) fn type_error_needle(type_name: &str) -> RunError {
        Self::type_error(format!("argument should be integer or bytes-like object, not '{type_name}'"))
    }

    /// `startswith`/`endswith` with something other than bytes or a tuple of bytes.
    #[must_use]
    pub(crate) fn type_error_affix(method: &str, type_name: &str) -> RunError {
        Self::type_error(format!("{method} first arg must be bytes or a tuple of bytes, not {type_name}"))
    }

    #[must_use]
    pub(crate) fn type_error_no_len(type_name: &str) -> RunError {
        Self::type_error(format!("object of type '{type_name}' has no len()"))
    }

    #[must_use]
    pub(crate) fn value_error_negative_len() -> RunError {
        Self::value_error("__len__() should return >= 0")
    }

    #[must_use]
    pub(crate) fn index_error_pop_range() -> RunError {
        Self::index_error("pop index out of range")
    }

    #[must_use]
    pub(crate) fn type_error_not_subscriptable(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object is not subscriptable"))
    }

    #[must_use]
    pub(crate) fn type_error_item_assignment(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object does not support item assignment"))
    }

    #[must_use]
    pub(crate) fn type_error_item_deletion(type_name: &str) -> RunError {
        Self::type_error(format!("'{type_name}' object doesn't support item deletion"))
    }

    #[must_use]
    pub(crate) fn type_error_cannot_extend(type_name: &str) -> RunError {
        Self::type_error(format!("can't extend bytearray with {type_name}"))
    }

    #[must_use]
    pub(crate) fn key_error(key: &str) -> RunError {
        SimpleException::new_msg(Self::KeyError, key).into()
    }

    #[must_use]
    pub(crate) fn stop_iteration() -> RunError {
        SimpleException::new(Self::StopIteration, None).into()
    }

    #[must_use]
    pub(crate) fn memory_error(msg: impl Display) -> RunError {
        SimpleException::new_msg(Self::MemoryError, msg).into()
    }
}

/// Which bound a managed arity message reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArityBound {
    Exactly,
    AtMost,
    AtLeast,
}

/// Formats parameter names CPython-style: `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`.
fn format_param_names(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [one] => format!("'{one}'"),
        [first, second] => format!("'{first}' and '{second}'"),
        [init @ .., last] => {
            let mut out = String::new();
            for name in init {
                out.push('\'');
                out.push_str(name);
                out.push_str("', ");
            }
            out.push_str("and '");
            out.push_str(last);
            out.push('\'');
            out
        }
    }
}

/// Simple lightweight representation of a raised exception.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimpleException {
    exc_type: ExcType,
    arg: Option<String>,
}

impl SimpleException {
    /// Creates a new exception with the given type and optional argument message.
    #[must_use]
    pub fn new(exc_type: ExcType, arg: Option<String>) -> Self {
        Self { exc_type, arg }
    }

    /// Creates a new exception with the given type and argument message.
    #[must_use]
    pub fn new_msg(exc_type: ExcType, arg: impl Display) -> Self {
        Self {
            exc_type,
            arg: Some(arg.to_string()),
        }
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    #[must_use]
    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}: {arg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

/// Error produced by any engine operation.
///
/// - `Internal`: a bug in the engine (static message), never a Python-level error
/// - `Exc`: a Python exception that propagates unchanged to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RunError {
    Internal(Cow<'static, str>),
    Exc(Box<SimpleException>),
}

impl RunError {
    /// Returns the exception type, or `None` for internal errors.
    #[must_use]
    pub fn exc_type(&self) -> Option<ExcType> {
        match self {
            Self::Exc(exc) => Some(exc.exc_type()),
            Self::Internal(_) => None,
        }
    }

    /// Returns the exception message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Exc(exc) => exc.arg(),
            Self::Internal(msg) => Some(msg),
        }
    }

    /// True if this error would be caught by `except exc_type:`.
    #[must_use]
    pub fn matches(&self, exc_type: ExcType) -> bool {
        self.exc_type().is_some_and(|t| t.is_subclass_of(exc_type))
    }

    pub(crate) fn internal(msg: &'static str) -> Self {
        Self::Internal(Cow::Borrowed(msg))
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Exc(exc) => exc.fmt(f),
        }
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy() {
        assert!(ExcType::AmbiguousMatchError.is_subclass_of(ExcType::TypeError));
        assert!(ExcType::OverflowError.is_subclass_of(ExcType::ArithmeticError));
        assert!(ExcType::BytesWarning.is_subclass_of(ExcType::Warning));
        assert!(!ExcType::TypeError.is_subclass_of(ExcType::ValueError));
        assert!(ExcType::BufferError.is_subclass_of(ExcType::Exception));
    }

    #[test]
    fn param_names() {
        assert_eq!(format_param_names(&["a"]), "'a'");
        assert_eq!(format_param_names(&["a", "b"]), "'a' and 'b'");
        assert_eq!(format_param_names(&["a", "b", "c"]), "'a', 'b', and 'c'");
    }

    #[test]
    fn managed_overflow_articles() {
        let msg = |name| ExcType::overflow_primitive(name).message().map(str::to_owned);
        assert_eq!(
            msg("Int32").as_deref(),
            Some("Value was either too large or too small for an Int32.")
        );
        assert_eq!(
            msg("UInt16").as_deref(),
            Some("Value was either too large or too small for a UInt16.")
        );
        assert_eq!(
            msg("Byte").as_deref(),
            Some("Value was either too large or too small for a Byte.")
        );
        assert_eq!(
            msg("SByte").as_deref(),
            Some("Value was either too large or too small for an SByte.")
        );
        assert_eq!(
            msg("Single").as_deref(),
            Some("Value was either too large or too small for a Single.")
        );
    }

    #[test]
    fn managed_arity() {
        let err = ExcType::type_error_managed_arity("M200", ArityBound::Exactly, 1, 2);
        assert_eq!(err.message(), Some("M200() takes exactly 1 argument (2 given)"));
        let err = ExcType::type_error_managed_arity("M100", ArityBound::Exactly, 0, 1);
        assert_eq!(err.message(), Some("M100() takes no arguments (1 given)"));
        let err = ExcType::type_error_managed_arity("M202", ArityBound::AtLeast, 0, 2);
        assert_eq!(err.message(), Some("M202() takes at least 0 arguments (2 given)"));
    }
}
