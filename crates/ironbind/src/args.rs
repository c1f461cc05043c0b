use std::vec::IntoIter;

use crate::{
    exception::{ExcType, RunResult},
    value::Value,
};

/// Arguments of a call.
///
/// Uses specific variants for common cases (0-2 arguments).
/// Most calls the engine routes have at most two positional arguments and no
/// keywords, so these variants avoid allocating for the vast majority of calls.
#[derive(Debug, Clone)]
pub enum ArgValues {
    Empty,
    One(Value),
    Two(Value, Value),
    Kwargs(KwargsValues),
    ArgsKargs { args: Vec<Value>, kwargs: KwargsValues },
}

/// Keyword arguments of a call, in call-site order.
#[derive(Debug, Clone, Default)]
pub enum KwargsValues {
    #[default]
    Empty,
    Inline(Vec<(String, Value)>),
}

impl KwargsValues {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Inline(kvs) => kvs.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value of a keyword, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::Inline(kvs) => kvs.iter().find(|(k, _)| k == name).map(|(_, v)| *v),
        }
    }

    /// Keyword names in call-site order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let inline = match self {
            Self::Empty => None,
            Self::Inline(kvs) => Some(kvs.iter().map(|(k, _)| k.as_str())),
        };
        inline.into_iter().flatten()
    }
}

impl IntoIterator for KwargsValues {
    type Item = (String, Value);
    type IntoIter = IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::Empty => Vec::new().into_iter(),
            Self::Inline(kvs) => kvs.into_iter(),
        }
    }
}

impl ArgValues {
    /// Builds arguments from positional values and keyword pairs, choosing the
    /// smallest variant that fits.
    #[must_use]
    pub fn new(args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Self {
        if kwargs.is_empty() {
            return Self::positional(args);
        }
        let kwargs = KwargsValues::Inline(kwargs);
        if args.is_empty() {
            Self::Kwargs(kwargs)
        } else {
            Self::ArgsKargs { args, kwargs }
        }
    }

    #[must_use]
    pub fn positional(args: Vec<Value>) -> Self {
        match args.len() {
            0 => Self::Empty,
            1 | 2 => {
                let mut iter = args.into_iter();
                match (iter.next(), iter.next()) {
                    (Some(a), Some(b)) => Self::Two(a, b),
                    (Some(a), None) => Self::One(a),
                    _ => Self::Empty,
                }
            }
            _ => Self::ArgsKargs {
                args,
                kwargs: KwargsValues::Empty,
            },
        }
    }

    /// Total number of arguments, positional and keyword.
    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::One(_) => 1,
            Self::Two(..) => 2,
            Self::Kwargs(kwargs) => kwargs.len(),
            Self::ArgsKargs { args, kwargs } => args.len() + kwargs.len(),
        }
    }

    #[must_use]
    pub fn positional_count(&self) -> usize {
        match self {
            Self::Empty | Self::Kwargs(_) => 0,
            Self::One(_) => 1,
            Self::Two(..) => 2,
            Self::ArgsKargs { args, .. } => args.len(),
        }
    }

    #[must_use]
    pub fn has_kwargs(&self) -> bool {
        match self {
            Self::Kwargs(kwargs) | Self::ArgsKargs { kwargs, .. } => !kwargs.is_empty(),
            _ => false,
        }
    }

    /// Splits into a positional iterator and the keyword arguments.
    #[must_use]
    pub fn into_parts(self) -> (IntoIter<Value>, KwargsValues) {
        match self {
            Self::Empty => (Vec::new().into_iter(), KwargsValues::Empty),
            Self::One(a) => (vec![a].into_iter(), KwargsValues::Empty),
            Self::Two(a, b) => (vec![a, b].into_iter(), KwargsValues::Empty),
            Self::Kwargs(kwargs) => (Vec::new().into_iter(), kwargs),
            Self::ArgsKargs { args, kwargs } => (args.into_iter(), kwargs),
        }
    }

    /// Inserts a receiver before the positional arguments.
    #[must_use]
    pub fn prepend(self, first: Value) -> Self {
        let (pos, kwargs) = self.into_parts();
        let mut args = Vec::with_capacity(pos.len() + 1);
        args.push(first);
        args.extend(pos);
        match kwargs {
            KwargsValues::Empty => Self::positional(args),
            kwargs => Self::ArgsKargs { args, kwargs },
        }
    }

    /// Checks that zero arguments were passed.
    pub fn check_zero_args(self, name: &str) -> RunResult<()> {
        match self {
            Self::Empty => Ok(()),
            other => Err(ExcType::type_error_no_args(name, other.count())),
        }
    }

    /// Checks that exactly one positional argument was passed, returning it.
    pub fn get_one_arg(self, name: &str) -> RunResult<Value> {
        match self {
            Self::One(a) => Ok(a),
            other => Err(ExcType::type_error_arg_count(name, 1, other.count())),
        }
    }

    /// Checks that exactly two positional arguments were passed, returning them as a tuple.
    pub fn get_two_args(self, name: &str) -> RunResult<(Value, Value)> {
        match self {
            Self::Two(a1, a2) => Ok((a1, a2)),
            other => Err(ExcType::type_error_arg_count(name, 2, other.count())),
        }
    }

    /// Checks that zero or one argument was passed, returning the optional value.
    pub fn get_zero_one_arg(self, name: &str) -> RunResult<Option<Value>> {
        match self {
            Self::Empty => Ok(None),
            Self::One(a) => Ok(Some(a)),
            other => Err(ExcType::type_error_at_most(name, 1, other.count())),
        }
    }

    /// Checks that one or two arguments were passed, returning them as a tuple.
    pub fn get_one_two_args(self, name: &str) -> RunResult<(Value, Option<Value>)> {
        match self {
            Self::One(a) => Ok((a, None)),
            Self::Two(a1, a2) => Ok((a1, Some(a2))),
            other => {
                let count = other.count();
                if count == 0 {
                    Err(ExcType::type_error_at_least(name, 1, count))
                } else {
                    Err(ExcType::type_error_at_most(name, 2, count))
                }
            }
        }
    }

    /// Collects between `min` and `max` positional arguments; keywords are rejected.
    pub fn get_positional_range(self, name: &str, min: usize, max: usize) -> RunResult<Vec<Value>> {
        if self.has_kwargs() {
            return Err(ExcType::type_error_no_kwargs(name));
        }
        let (pos, _) = self.into_parts();
        let args: Vec<Value> = pos.collect();
        if args.len() < min {
            Err(ExcType::type_error_at_least(name, min, args.len()))
        } else if args.len() > max {
            Err(ExcType::type_error_at_most(name, max, args.len()))
        } else {
            Ok(args)
        }
    }

    /// Binds arguments to a fixed list of positional-or-keyword parameter names.
    ///
    /// Used by builtins such as `bytes(source, encoding, errors)` and
    /// `decode(encoding, errors)`. Unbound parameters are `None`.
    pub fn bind_names(self, func: &str, names: &[&str]) -> RunResult<Vec<Option<Value>>> {
        let (pos, kwargs) = self.into_parts();
        if pos.len() > names.len() {
            return Err(ExcType::type_error_at_most(func, names.len(), pos.len() + kwargs.len()));
        }
        let mut slots: Vec<Option<Value>> = vec![None; names.len()];
        for (slot, value) in slots.iter_mut().zip(pos) {
            *slot = Some(value);
        }
        for (key, value) in kwargs {
            let Some(index) = names.iter().position(|n| *n == key) else {
                return Err(ExcType::type_error_unexpected_keyword(func, &key));
            };
            if slots[index].is_some() {
                return Err(ExcType::type_error_duplicate_arg(func, names[index]));
            }
            slots[index] = Some(value);
        }
        Ok(slots)
    }
}

impl From<Vec<Value>> for ArgValues {
    fn from(args: Vec<Value>) -> Self {
        Self::positional(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_picks_smallest_variant() {
        assert!(matches!(ArgValues::positional(vec![]), ArgValues::Empty));
        assert!(matches!(ArgValues::positional(vec![Value::Int(1)]), ArgValues::One(_)));
        assert!(matches!(
            ArgValues::positional(vec![Value::Int(1), Value::Int(2)]),
            ArgValues::Two(..)
        ));
        let three = ArgValues::positional(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(three.count(), 3);
        assert!(!three.has_kwargs());
    }

    #[test]
    fn prepend_keeps_keywords() {
        let args = ArgValues::new(vec![Value::Int(2)], vec![("k".to_owned(), Value::None)]);
        let args = args.prepend(Value::Int(1));
        assert_eq!(args.positional_count(), 2);
        assert!(args.has_kwargs());
    }

    #[test]
    fn bind_names_reports_duplicates() {
        let args = ArgValues::new(vec![Value::Int(1)], vec![("source".to_owned(), Value::Int(2))]);
        let err = args.bind_names("bytes", &["source", "encoding"]).unwrap_err();
        assert_eq!(err.message(), Some("bytes() got multiple values for argument 'source'"));

        let args = ArgValues::new(vec![], vec![("encoding".to_owned(), Value::None)]);
        let slots = args.bind_names("bytes", &["source", "encoding"]).unwrap();
        assert!(slots[0].is_none());
        assert!(slots[1].is_some());
    }
}
