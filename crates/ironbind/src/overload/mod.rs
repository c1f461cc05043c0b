//! Managed overload groups and the selector that picks one candidate per call.
//!
//! A group is declared by the host as an [`OverloadSet`]: a name plus candidates with
//! typed formal parameters. [`conversion`] classifies how an argument of a runtime
//! type reaches a parameter type; [`resolver`] scores every candidate, breaks ties
//! and applies the winner's conversions.

pub mod conversion;
pub mod resolver;

use std::{fmt, rc::Rc};

use crate::{
    exception::RunResult,
    runtime::Runtime,
    types::{ClassId, EnumId, Primitive, Type, function::NativeFn},
    value::Value,
};

/// The declared type of a managed parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// The object root; value types box into it.
    Object,
    Primitive(Primitive),
    Enum(EnumId),
    /// Arbitrary-precision managed integer; Python `int` maps to it without loss.
    BigInteger,
    Class(ClassId),
    /// `Nullable<T>` over a value type.
    Nullable(Box<Self>),
    /// `T[]`.
    Array(Box<Self>),
    /// The `n`th generic type parameter of the candidate.
    Generic(u8),
    /// A Python builtin type such as `bytes` or `list`.
    Builtin(Type),
}

impl ParamType {
    /// `Byte[]`.
    #[must_use]
    pub fn byte_array() -> Self {
        Self::Array(Box::new(Self::Primitive(Primitive::Byte)))
    }

    #[must_use]
    pub fn nullable(inner: Self) -> Self {
        Self::Nullable(Box::new(inner))
    }

    #[must_use]
    pub fn array(elem: Self) -> Self {
        Self::Array(Box::new(elem))
    }

    /// True if `None` is a valid value of the type without a nullable wrapper.
    pub(crate) fn is_reference(&self, runtime: &Runtime) -> bool {
        match self {
            Self::Object | Self::Array(_) | Self::Nullable(_) | Self::Generic(_) => true,
            Self::Primitive(p) => *p == Primitive::String,
            Self::Enum(_) | Self::BigInteger => false,
            Self::Class(id) => !runtime.types.class(*id).is_value_type(),
            Self::Builtin(t) => !t.is_builtin_value_type(),
        }
    }

    fn contains_generic(&self) -> bool {
        match self {
            Self::Generic(_) => true,
            Self::Nullable(inner) | Self::Array(inner) => inner.contains_generic(),
            _ => false,
        }
    }
}

/// A formal parameter of a candidate.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    /// Value used when the call omits the argument.
    pub default: Option<Value>,
}

impl Param {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default),
        }
    }
}

/// One overload of a managed method.
#[derive(Clone)]
pub struct Candidate {
    pub name: String,
    pub params: Vec<Param>,
    /// Element type of a trailing `params T[]` parameter.
    pub variadic: Option<ParamType>,
    /// Number of generic type parameters.
    pub generic_arity: u8,
    pub declaring: Option<ClassId>,
    pub body: NativeFn,
}

impl Candidate {
    /// Creates a candidate; the body receives the converted arguments in parameter
    /// order, with a variadic tail packed into one managed array. The name is taken
    /// from the group the candidate is added to.
    pub fn new(params: Vec<Param>, body: impl Fn(&mut Runtime, Vec<Value>) -> RunResult<Value> + 'static) -> Self {
        Self {
            name: String::new(),
            params,
            variadic: None,
            generic_arity: 0,
            declaring: None,
            body: Rc::new(body),
        }
    }

    #[must_use]
    pub fn variadic(mut self, elem: ParamType) -> Self {
        self.variadic = Some(elem);
        self
    }

    #[must_use]
    pub fn generic(mut self, arity: u8) -> Self {
        self.generic_arity = arity;
        self
    }

    #[must_use]
    pub fn declared_by(mut self, class: ClassId) -> Self {
        self.declaring = Some(class);
        self
    }

    #[must_use]
    pub fn required_count(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    pub(crate) fn is_generic(&self) -> bool {
        self.generic_arity > 0
            || self.params.iter().any(|p| p.ty.contains_generic())
            || self.variadic.as_ref().is_some_and(ParamType::contains_generic)
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .field("generic_arity", &self.generic_arity)
            .finish_non_exhaustive()
    }
}

/// A managed method group: every overload sharing one name.
#[derive(Debug, Clone)]
pub struct OverloadSet {
    pub name: String,
    pub candidates: Vec<Rc<Candidate>>,
}

impl OverloadSet {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            candidates: Vec::new(),
        }
    }

    /// Adds a candidate, renaming it to the group's name.
    #[must_use]
    pub fn with(mut self, mut candidate: Candidate) -> Self {
        candidate.name.clone_from(&self.name);
        self.candidates.push(Rc::new(candidate));
        self
    }
}
