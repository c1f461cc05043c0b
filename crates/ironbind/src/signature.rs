//! Function signature representation and argument binding.
//!
//! This module handles Python function signatures including all parameter types:
//! positional-only, positional-or-keyword, *args, keyword-only, and **kwargs.
//! It also handles default values and the argument binding algorithm.
//!
//! Binding has two paths with identical semantics. Plain `def f(p.., kw=d..)`
//! signatures whose required (`P`) and defaulted (`K`) parameter counts lie within
//! the configured specialization bounds bind into a fixed-size slot array; every
//! other signature, and plain ones outside the bounds, use the general algorithm.

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    args::ArgValues,
    config::EngineConfig,
    exception::{ExcType, RunError, RunResult},
    heap::{Heap, HeapData},
    tracer::BindPath,
    value::Value,
};

/// Represents a Python function signature with all parameter types.
///
/// A complete Python signature can include:
/// - Positional-only parameters (before `/`)
/// - Positional-or-keyword parameters (regular parameters)
/// - Variable positional parameter (`*args`)
/// - Keyword-only parameters (after `*` or `*args`)
/// - Variable keyword parameter (`**kwargs`)
///
/// # Default Values
///
/// Default values are tracked by count per parameter group. The `*_defaults_count` fields
/// indicate how many parameters (from the end of each group) have defaults. For example,
/// if `args = [a, b, c]` and `arg_defaults_count = 2`, then `b` and `c` have defaults.
///
/// The default values themselves live on the function object, laid out
/// `[pos_defaults][arg_defaults][kwarg_defaults]`.
///
/// # Slot Layout
///
/// Bound arguments are returned in this order:
/// ```text
/// [pos_args][args][*args_slot?][kwargs][**kwargs_slot?]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    /// Positional-only parameters, e.g. `a, b` in `def f(a, b, /): ...`
    pos_args: Vec<String>,
    /// Number of positional-only parameters with defaults (from the end).
    pos_defaults_count: usize,
    /// Positional-or-keyword parameters, e.g. `a, b` in `def f(a, b): ...`
    args: Vec<String>,
    /// Number of positional-or-keyword parameters with defaults (from the end).
    arg_defaults_count: usize,
    /// Variable positional parameter name, e.g. `args` in `def f(*args): ...`
    var_args: Option<String>,
    /// Keyword-only parameters, e.g. `c` in `def f(*, c): ...`
    kwargs: Vec<String>,
    /// Index into the keyword-only section of the defaults for each keyword-only
    /// parameter, or `None` if it is required.
    kwarg_default_map: Vec<Option<usize>>,
    /// Variable keyword parameter name, e.g. `kwargs` in `def f(**kwargs): ...`
    var_kwargs: Option<String>,
    bind_mode: BindMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum BindMode {
    /// Only positional-or-keyword parameters, some of which may have defaults.
    ///
    /// Eligible for the specialized path when the arity is within bounds.
    #[default]
    Plain,
    /// Anything with `/`, `*args`, keyword-only parameters or `**kwargs`.
    Complex,
}

/// Builder for [`Signature`].
#[derive(Debug, Default)]
pub struct SignatureBuilder {
    sig: Signature,
}

impl SignatureBuilder {
    /// Adds a positional-only parameter; `has_default` marks it optional.
    #[must_use]
    pub fn pos_only(mut self, name: impl Into<String>, has_default: bool) -> Self {
        self.sig.pos_args.push(name.into());
        if has_default {
            self.sig.pos_defaults_count += 1;
        }
        self
    }

    /// Adds a required positional-or-keyword parameter.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.sig.args.push(name.into());
        self
    }

    /// Adds a positional-or-keyword parameter with a default.
    #[must_use]
    pub fn arg_with_default(mut self, name: impl Into<String>) -> Self {
        self.sig.args.push(name.into());
        self.sig.arg_defaults_count += 1;
        self
    }

    #[must_use]
    pub fn var_args(mut self, name: impl Into<String>) -> Self {
        self.sig.var_args = Some(name.into());
        self
    }

    /// Adds a keyword-only parameter; `has_default` marks it optional.
    #[must_use]
    pub fn kwonly(mut self, name: impl Into<String>, has_default: bool) -> Self {
        let slot = if has_default {
            Some(self.sig.kwarg_default_map.iter().flatten().count())
        } else {
            None
        };
        self.sig.kwargs.push(name.into());
        self.sig.kwarg_default_map.push(slot);
        self
    }

    #[must_use]
    pub fn var_kwargs(mut self, name: impl Into<String>) -> Self {
        self.sig.var_kwargs = Some(name.into());
        self
    }

    #[must_use]
    pub fn build(mut self) -> Signature {
        let sig = &mut self.sig;
        sig.bind_mode = if sig.pos_args.is_empty()
            && sig.var_args.is_none()
            && sig.kwargs.is_empty()
            && sig.var_kwargs.is_none()
        {
            BindMode::Plain
        } else {
            BindMode::Complex
        };
        self.sig
    }
}

impl Signature {
    #[must_use]
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    /// `def f(p1..pP, kw1=d1..kwK=dK)` with the given parameter names.
    #[must_use]
    pub fn plain<S: Into<String>>(
        positional: impl IntoIterator<Item = S>,
        keyword: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut builder = Self::builder();
        for name in positional {
            builder = builder.arg(name);
        }
        for name in keyword {
            builder = builder.arg_with_default(name);
        }
        builder.build()
    }

    /// Binds arguments to parameters according to Python's calling conventions.
    ///
    /// Returns the bound slots (see the type docs for the layout) and which path
    /// bound them.
    ///
    /// # Errors
    /// Returns a `TypeError` if:
    /// - Too few or too many positional arguments
    /// - Missing required keyword-only arguments
    /// - Unexpected keyword argument
    /// - Positional-only parameter passed as keyword
    /// - Same argument passed both positionally and by keyword
    pub fn bind(
        &self,
        args: ArgValues,
        defaults: &[Value],
        heap: &mut Heap,
        config: &EngineConfig,
        func_name: &str,
    ) -> RunResult<(Vec<Value>, BindPath)> {
        if self.bind_mode == BindMode::Plain {
            let positional = self.required_positional_count();
            let keyword = self.arg_defaults_count;
            if positional <= config.max_positional && keyword <= config.max_keyword {
                let slots = self.bind_specialized(args, defaults, func_name)?;
                return Ok((slots, BindPath::Specialized { positional, keyword }));
            }
        }
        let slots = self.bind_general(args, defaults, heap, func_name)?;
        Ok((slots, BindPath::General))
    }

    /// Binds a plain signature into a fixed-size slot array.
    ///
    /// Positionals fill slots in order, each keyword names exactly one slot, and the
    /// remaining defaulted slots take their defaults.
    fn bind_specialized(&self, args: ArgValues, defaults: &[Value], func_name: &str) -> RunResult<Vec<Value>> {
        let param_count = self.args.len();
        let required = self.required_positional_count();

        // Pure positional calls with every slot supplied need no bookkeeping.
        if let ArgValues::Empty | ArgValues::One(_) | ArgValues::Two(..) = args
            && args.count() == param_count
        {
            let (pos, _) = args.into_parts();
            return Ok(pos.collect());
        }

        let (pos, kwargs) = args.into_parts();
        if pos.len() > param_count {
            return Err(ExcType::type_error_too_many_positional(
                func_name,
                required,
                param_count,
                pos.len(),
            ));
        }

        let mut slots: SmallVec<[Option<Value>; 28]> = SmallVec::from_elem(None, param_count);
        for (slot, value) in slots.iter_mut().zip(pos) {
            *slot = Some(value);
        }

        for (key, value) in kwargs {
            let Some(index) = self.args.iter().position(|name| *name == key) else {
                return Err(ExcType::type_error_unexpected_keyword(func_name, &key));
            };
            if slots[index].is_some() {
                return Err(ExcType::type_error_duplicate_arg(func_name, &self.args[index]));
            }
            slots[index] = Some(value);
        }

        let mut missing: Vec<&str> = Vec::new();
        let mut bound = Vec::with_capacity(param_count);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(value) => bound.push(value),
                None if index >= required => bound.push(defaults[index - required]),
                None => {
                    missing.push(&self.args[index]);
                    bound.push(Value::None);
                }
            }
        }
        if !missing.is_empty() {
            return Err(ExcType::type_error_missing_positional(func_name, &missing));
        }
        Ok(bound)
    }

    /// The full binding algorithm:
    /// 1. Bind positional args to pos_args, then args (in order)
    /// 2. Collect excess positional args into *args tuple
    /// 3. Bind keyword args to args and kwargs (not pos_args - positional-only)
    /// 4. Collect excess keyword args into **kwargs dict
    /// 5. Apply defaults for missing parameters, then report what is still missing
    fn bind_general(
        &self,
        args: ArgValues,
        defaults: &[Value],
        heap: &mut Heap,
        func_name: &str,
    ) -> RunResult<Vec<Value>> {
        let (mut pos_iter, keyword_args) = args.into_parts();

        let pos_param_count = self.pos_args.len();
        let total_positional_params = pos_param_count + self.args.len();
        let var_args_offset = usize::from(self.var_args.is_some());

        let positional_count = pos_iter.len();
        if self.var_args.is_none() && positional_count > total_positional_params {
            return Err(ExcType::type_error_too_many_positional(
                func_name,
                self.required_positional_count(),
                total_positional_params,
                positional_count,
            ));
        }

        // Layout: [pos_args][args][*args?][kwargs][**kwargs?]
        let mut slots: Vec<Option<Value>> = vec![None; self.total_slots()];
        // Tracks named parameters only, indexed [pos_args][args][kwargs].
        let mut bound = vec![false; self.param_count()];

        for (i, slot) in slots.iter_mut().enumerate().take(total_positional_params) {
            if let Some(val) = pos_iter.next() {
                *slot = Some(val);
                bound[i] = true;
            }
        }

        let excess_positional: Vec<Value> = pos_iter.collect();
        if self.var_args.is_some() {
            let tuple = heap.allocate(HeapData::Tuple(excess_positional));
            slots[total_positional_params] = Some(Value::Ref(tuple));
        }

        let mut excess_kwargs: IndexMap<String, Value> = IndexMap::new();
        for (key, value) in keyword_args {
            if self.pos_args.iter().any(|p| *p == key) && self.var_kwargs.is_none() {
                return Err(ExcType::type_error_positional_only(func_name, &key));
            }

            if let Some(i) = self.args.iter().position(|p| *p == key) {
                let idx = pos_param_count + i;
                if bound[idx] {
                    return Err(ExcType::type_error_duplicate_arg(func_name, &key));
                }
                slots[idx] = Some(value);
                bound[idx] = true;
                continue;
            }

            if let Some(i) = self.kwargs.iter().position(|p| *p == key) {
                let idx = total_positional_params + i;
                if bound[idx] {
                    return Err(ExcType::type_error_duplicate_arg(func_name, &key));
                }
                slots[total_positional_params + var_args_offset + i] = Some(value);
                bound[idx] = true;
                continue;
            }

            if self.var_kwargs.is_some() {
                excess_kwargs.insert(key, value);
            } else {
                return Err(ExcType::type_error_unexpected_keyword(func_name, &key));
            }
        }

        // Defaults layout: [pos_defaults...][arg_defaults...][kwarg_defaults...]
        let mut default_idx = 0;
        let first_optional = pos_param_count - self.pos_defaults_count;
        for i in first_optional..pos_param_count {
            if !bound[i] {
                slots[i] = Some(defaults[default_idx + (i - first_optional)]);
                bound[i] = true;
            }
        }
        default_idx += self.pos_defaults_count;

        let first_optional = self.args.len() - self.arg_defaults_count;
        for i in first_optional..self.args.len() {
            let idx = pos_param_count + i;
            if !bound[idx] {
                slots[idx] = Some(defaults[default_idx + (i - first_optional)]);
                bound[idx] = true;
            }
        }
        default_idx += self.arg_defaults_count;

        for (i, default_slot) in self.kwarg_default_map.iter().enumerate() {
            let idx = total_positional_params + i;
            if let Some(slot_idx) = default_slot
                && !bound[idx]
            {
                slots[total_positional_params + var_args_offset + i] = Some(defaults[default_idx + slot_idx]);
                bound[idx] = true;
            }
        }

        let missing_positional: Vec<&str> = self
            .pos_args
            .iter()
            .chain(&self.args)
            .enumerate()
            .filter(|(i, _)| !bound[*i])
            .map(|(_, name)| name.as_str())
            .collect();
        if !missing_positional.is_empty() {
            return Err(ExcType::type_error_missing_positional(func_name, &missing_positional));
        }

        let missing_kwonly: Vec<&str> = self
            .kwargs
            .iter()
            .enumerate()
            .filter(|(i, _)| !bound[total_positional_params + i])
            .map(|(_, name)| name.as_str())
            .collect();
        if !missing_kwonly.is_empty() {
            return Err(ExcType::type_error_missing_kwonly(func_name, &missing_kwonly));
        }

        if self.var_kwargs.is_some() {
            let dict = heap.allocate(HeapData::Dict(excess_kwargs));
            if let Some(last) = slots.last_mut() {
                *last = Some(Value::Ref(dict));
            }
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| RunError::internal("unbound parameter slot")))
            .collect()
    }

    /// Total number of named parameters (excluding *args/**kwargs slots).
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.pos_args.len() + self.args.len() + self.kwargs.len()
    }

    /// Total number of slots produced by [`Signature::bind`].
    #[must_use]
    pub fn total_slots(&self) -> usize {
        self.param_count() + usize::from(self.var_args.is_some()) + usize::from(self.var_kwargs.is_some())
    }

    /// Number of default values the function object must supply.
    #[must_use]
    pub fn total_defaults_count(&self) -> usize {
        self.pos_defaults_count + self.arg_defaults_count + self.kwarg_default_map.iter().flatten().count()
    }

    /// Minimum number of positional arguments: `def f(a, b, c=1)` requires 2.
    #[must_use]
    pub fn required_positional_count(&self) -> usize {
        self.pos_args.len() + self.args.len() - self.pos_defaults_count - self.arg_defaults_count
    }

    /// Parameter names in slot order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.pos_args
            .iter()
            .chain(&self.args)
            .chain(&self.var_args)
            .chain(&self.kwargs)
            .chain(&self.var_kwargs)
            .map(String::as_str)
    }

    #[must_use]
    pub fn is_plain(&self) -> bool {
        self.bind_mode == BindMode::Plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(sig: &Signature, args: ArgValues, defaults: &[Value]) -> RunResult<(Vec<Value>, BindPath)> {
        let mut heap = Heap::new();
        sig.bind(args, defaults, &mut heap, &EngineConfig::default(), "f")
    }

    fn ints(values: &[Value]) -> Vec<i64> {
        values.iter().map(|v| v.as_small_int().unwrap_or(-1)).collect()
    }

    #[test]
    fn specialized_fills_defaults() {
        let sig = Signature::plain(["a", "b"], ["c", "d"]);
        let defaults = [Value::Int(30), Value::Int(40)];
        let (slots, path) = bind(
            &sig,
            ArgValues::new(vec![Value::Int(1), Value::Int(2)], vec![("d".to_owned(), Value::Int(4))]),
            &defaults,
        )
        .unwrap();
        assert_eq!(ints(&slots), vec![1, 2, 30, 4]);
        assert_eq!(path, BindPath::Specialized { positional: 2, keyword: 2 });
    }

    #[test]
    fn specialized_errors() {
        let sig = Signature::plain(["a"], ["b"]);
        let defaults = [Value::Int(0)];
        let err = bind(
            &sig,
            ArgValues::new(vec![Value::Int(1)], vec![("a".to_owned(), Value::Int(2))]),
            &defaults,
        )
        .unwrap_err();
        assert_eq!(err.message(), Some("f() got multiple values for argument 'a'"));

        let err = bind(&sig, ArgValues::new(vec![], vec![("z".to_owned(), Value::None)]), &defaults).unwrap_err();
        assert_eq!(err.message(), Some("f() got an unexpected keyword argument 'z'"));

        let err = bind(&sig, ArgValues::Empty, &defaults).unwrap_err();
        assert_eq!(err.message(), Some("f() missing 1 required positional argument: 'a'"));

        let err = bind(
            &sig,
            ArgValues::positional(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            &defaults,
        )
        .unwrap_err();
        assert_eq!(
            err.message(),
            Some("f() takes from 1 to 2 positional arguments but 3 were given")
        );
    }

    #[test]
    fn out_of_bounds_arity_uses_general_path() {
        let names: Vec<String> = (0..15).map(|i| format!("p{i}")).collect();
        let sig = Signature::plain(names, Vec::new());
        let args: Vec<Value> = (0..15).map(Value::Int).collect();
        let (slots, path) = bind(&sig, ArgValues::positional(args), &[]).unwrap();
        assert_eq!(path, BindPath::General);
        assert_eq!(slots.len(), 15);
    }

    #[test]
    fn general_collects_varargs_and_kwargs() {
        let sig = Signature::builder()
            .arg("a")
            .var_args("rest")
            .kwonly("k", true)
            .var_kwargs("extra")
            .build();
        let mut heap = Heap::new();
        let (slots, path) = sig
            .bind(
                ArgValues::new(
                    vec![Value::Int(1), Value::Int(2), Value::Int(3)],
                    vec![("x".to_owned(), Value::Int(9))],
                ),
                &[Value::Int(7)],
                &mut heap,
                &EngineConfig::default(),
                "g",
            )
            .unwrap();
        assert_eq!(path, BindPath::General);
        assert_eq!(slots.len(), 4);
        assert!(matches!(slots[0], Value::Int(1)));
        let Value::Ref(rest) = slots[1] else { panic!("expected tuple") };
        assert!(matches!(heap.get(rest), HeapData::Tuple(items) if items.len() == 2));
        assert!(matches!(slots[2], Value::Int(7)));
        let Value::Ref(extra) = slots[3] else { panic!("expected dict") };
        assert!(matches!(heap.get(extra), HeapData::Dict(d) if d.contains_key("x")));
    }

    #[test]
    fn general_rejects_positional_only_keyword() {
        let sig = Signature::builder().pos_only("a", false).build();
        let mut heap = Heap::new();
        let err = sig
            .bind(
                ArgValues::new(vec![], vec![("a".to_owned(), Value::Int(1))]),
                &[],
                &mut heap,
                &EngineConfig::default(),
                "h",
            )
            .unwrap_err();
        assert_eq!(
            err.message(),
            Some("h() got some positional-only arguments passed as keyword arguments: 'a'")
        );
    }

    #[test]
    fn missing_kwonly() {
        let sig = Signature::builder().kwonly("x", false).kwonly("y", false).build();
        let mut heap = Heap::new();
        let err = sig
            .bind(ArgValues::Empty, &[], &mut heap, &EngineConfig::default(), "k")
            .unwrap_err();
        assert_eq!(
            err.message(),
            Some("k() missing 2 required keyword-only arguments: 'x' and 'y'")
        );
    }
}
