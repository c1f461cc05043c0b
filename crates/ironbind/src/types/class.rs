//! Declared classes: Python classes and the managed host's classes, interfaces and
//! value types.
//!
//! Classes are registered once through a [`ClassBuilder`]. Registration computes the
//! method resolution order and indexes every implicit conversion operator by
//! `(from, to)` so the overload selector answers "is there an `op_Implicit` from A to
//! B" with a map read instead of walking declarations on every call.

use std::{fmt, rc::Rc};

use ahash::AHashMap;
use indexmap::IndexMap;

use super::{primitive::PrimitiveRegistry, r#type::Type};
use crate::{exception::RunResult, overload::ParamType, runtime::Runtime, value::Value};

/// Identifier of a declared class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ClassId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// A class defined in Python code.
    Python,
    /// A managed reference type.
    Managed,
    /// A managed interface.
    Interface,
    /// A managed value type (struct); never accepts `None`, boxes to `object`.
    ValueType,
}

/// Conversion body of an implicit operator.
pub type ImplicitFn = Rc<dyn Fn(&mut Runtime, Value) -> RunResult<Value>>;

/// An `op_Implicit` declared on a class.
#[derive(Clone)]
pub struct ImplicitOp {
    pub from: Type,
    pub to: ParamType,
    pub convert: ImplicitFn,
    pub declaring: ClassId,
}

impl fmt::Debug for ImplicitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplicitOp")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("declaring", &self.declaring)
            .finish_non_exhaustive()
    }
}

/// Location of an implicit operator in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImplicitRef {
    pub class: ClassId,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub kind: ClassKind,
    pub bases: Vec<ClassId>,
    /// Builtin type this class derives from (`class myint(int)`), inherited from bases.
    pub builtin_base: Option<Type>,
    /// Methods and hooks by name; values are callables.
    pub methods: IndexMap<String, Value>,
    pub implicit_ops: Vec<ImplicitOp>,
    /// Method resolution order, starting with the class itself.
    mro: Vec<ClassId>,
}

impl ClassDef {
    #[must_use]
    pub fn mro(&self) -> &[ClassId] {
        &self.mro
    }

    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.kind == ClassKind::ValueType
    }

    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.kind != ClassKind::Python
    }
}

enum PendingImplicit {
    /// Declared on the class, converting the class to `to`.
    To(ParamType, ImplicitFn),
    /// Declared on the class, converting `from` to the class.
    From(Type, ImplicitFn),
}

/// Declarative description of a class to register.
pub struct ClassBuilder {
    name: String,
    kind: ClassKind,
    bases: Vec<ClassId>,
    builtin_base: Option<Type>,
    methods: IndexMap<String, Value>,
    implicit: Vec<PendingImplicit>,
}

impl ClassBuilder {
    fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            bases: Vec::new(),
            builtin_base: None,
            methods: IndexMap::new(),
            implicit: Vec::new(),
        }
    }

    #[must_use]
    pub fn python(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Python)
    }

    #[must_use]
    pub fn managed(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Managed)
    }

    #[must_use]
    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Interface)
    }

    #[must_use]
    pub fn value_type(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::ValueType)
    }

    #[must_use]
    pub fn base(mut self, base: ClassId) -> Self {
        self.bases.push(base);
        self
    }

    /// Derives from a builtin type such as `int`, `bytes` or `bytearray`.
    #[must_use]
    pub fn builtin_base(mut self, base: Type) -> Self {
        self.builtin_base = Some(base);
        self
    }

    #[must_use]
    pub fn method(mut self, name: impl Into<String>, func: Value) -> Self {
        self.methods.insert(name.into(), func);
        self
    }

    /// Declares `op_Implicit(self) -> to`.
    #[must_use]
    pub fn implicit_to(
        mut self,
        to: ParamType,
        convert: impl Fn(&mut Runtime, Value) -> RunResult<Value> + 'static,
    ) -> Self {
        self.implicit.push(PendingImplicit::To(to, Rc::new(convert)));
        self
    }

    /// Declares `op_Implicit(from) -> self`.
    #[must_use]
    pub fn implicit_from(
        mut self,
        from: Type,
        convert: impl Fn(&mut Runtime, Value) -> RunResult<Value> + 'static,
    ) -> Self {
        self.implicit.push(PendingImplicit::From(from, Rc::new(convert)));
        self
    }
}

/// An instance of a declared class.
///
/// `base` holds the builtin payload of subclasses of builtins: the int of a
/// `myint`, the `bytes` object of a bytes subclass, the `bytearray` of a bytearray
/// subclass.
#[derive(Debug, Clone)]
pub struct Instance {
    pub class: ClassId,
    pub attrs: AHashMap<String, Value>,
    pub base: Option<Value>,
}

impl Instance {
    #[must_use]
    pub fn new(class: ClassId, base: Option<Value>) -> Self {
        Self {
            class,
            attrs: AHashMap::new(),
            base,
        }
    }
}

/// Every declared class, enum and primitive, plus the implicit-operator index.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    classes: Vec<ClassDef>,
    pub primitives: PrimitiveRegistry,
    implicit_index: AHashMap<(Type, ParamType), ImplicitRef>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, builder: ClassBuilder) -> ClassId {
        let id = ClassId(u32::try_from(self.classes.len()).unwrap_or(u32::MAX));

        let mut mro = vec![id];
        for base in &builder.bases {
            for ancestor in self.class(*base).mro() {
                if !mro.contains(ancestor) {
                    mro.push(*ancestor);
                }
            }
        }
        let builtin_base = builder.builtin_base.or_else(|| {
            builder
                .bases
                .iter()
                .find_map(|base| self.class(*base).builtin_base)
        });

        let implicit_ops: Vec<ImplicitOp> = builder
            .implicit
            .into_iter()
            .map(|pending| match pending {
                PendingImplicit::To(to, convert) => ImplicitOp {
                    from: Type::Class(id),
                    to,
                    convert,
                    declaring: id,
                },
                PendingImplicit::From(from, convert) => ImplicitOp {
                    from,
                    to: ParamType::Class(id),
                    convert,
                    declaring: id,
                },
            })
            .collect();
        for (index, op) in implicit_ops.iter().enumerate() {
            self.implicit_index
                .entry((op.from, op.to.clone()))
                .or_insert(ImplicitRef { class: id, index });
        }

        self.classes.push(ClassDef {
            name: builder.name,
            kind: builder.kind,
            bases: builder.bases,
            builtin_base,
            methods: builder.methods,
            implicit_ops,
            mro,
        });
        id
    }

    #[must_use]
    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.0 as usize]
    }

    /// Finds a class by name; a later registration shadows an earlier one.
    #[must_use]
    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .rposition(|c| c.name == name)
            .and_then(|index| u32::try_from(index).ok())
            .map(ClassId)
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassDef {
        &mut self.classes[id.0 as usize]
    }

    /// Finds a method on the class or its ancestors.
    #[must_use]
    pub fn lookup_method(&self, id: ClassId, name: &str) -> Option<Value> {
        self.class(id)
            .mro()
            .iter()
            .find_map(|c| self.class(*c).methods.get(name).copied())
    }

    /// Inheritance distance from `sub` to `sup`, or `None` if unrelated.
    #[must_use]
    pub fn class_distance(&self, sub: ClassId, sup: ClassId) -> Option<u32> {
        self.class(sub)
            .mro()
            .iter()
            .position(|c| *c == sup)
            .and_then(|d| u32::try_from(d).ok())
    }

    /// Inheritance distance between two runtime types, including builtin subclassing
    /// (`bool` of `int`, `myint` of `int`) and the object root.
    #[must_use]
    pub fn type_distance(&self, sub: Type, sup: Type) -> Option<u32> {
        if sub == sup {
            return Some(0);
        }
        match (sub, sup) {
            (_, Type::Object) => Some(self.depth_to_object(sub)),
            (Type::Bool, Type::Int) => Some(1),
            (Type::Class(a), Type::Class(b)) => self.class_distance(a, b),
            (Type::Class(a), builtin) => {
                let class = self.class(a);
                let base = class.builtin_base?;
                let own = u32::try_from(class.mro().len()).unwrap_or(u32::MAX);
                self.type_distance(base, builtin).map(|d| d + own)
            }
            _ => None,
        }
    }

    fn depth_to_object(&self, t: Type) -> u32 {
        match t {
            Type::Object => 0,
            Type::Bool => 2,
            Type::Class(id) => {
                let class = self.class(id);
                let own = u32::try_from(class.mro().len()).unwrap_or(u32::MAX);
                own + class.builtin_base.map_or(0, |b| self.depth_to_object(b))
            }
            _ => 1,
        }
    }

    /// Finds an implicit operator converting `from` to `to`.
    ///
    /// Operators declared on an ancestor of `from` apply to derived classes as well.
    #[must_use]
    pub fn find_implicit(&self, from: Type, to: &ParamType) -> Option<ImplicitRef> {
        if let Some(found) = self.implicit_index.get(&(from, to.clone())) {
            return Some(*found);
        }
        if let Type::Class(id) = from {
            for ancestor in self.class(id).mro().iter().skip(1) {
                if let Some(found) = self.implicit_index.get(&(Type::Class(*ancestor), to.clone())) {
                    return Some(*found);
                }
            }
        }
        None
    }

    #[must_use]
    pub fn implicit(&self, r: ImplicitRef) -> &ImplicitOp {
        &self.class(r.class).implicit_ops[r.index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mro_and_distance() {
        let mut reg = TypeRegistry::new();
        let i = reg.define(ClassBuilder::interface("I"));
        let base = reg.define(ClassBuilder::managed("Base"));
        let derived = reg.define(ClassBuilder::managed("Derived").base(base).base(i));
        assert_eq!(reg.class(derived).mro(), &[derived, base, i]);
        assert_eq!(reg.class_distance(derived, base), Some(1));
        assert_eq!(reg.class_distance(derived, i), Some(2));
        assert_eq!(reg.class_distance(base, derived), None);
        assert_eq!(
            reg.type_distance(Type::Class(derived), Type::Class(base)),
            Some(1)
        );
        assert!(reg.type_distance(Type::Class(derived), Type::Object).is_some());
    }

    #[test]
    fn builtin_base_is_inherited() {
        let mut reg = TypeRegistry::new();
        let myint = reg.define(ClassBuilder::python("myint").builtin_base(Type::Int));
        let sub = reg.define(ClassBuilder::python("sub").base(myint));
        assert_eq!(reg.class(sub).builtin_base, Some(Type::Int));
        assert_eq!(reg.type_distance(Type::Class(sub), Type::Int), Some(2));
        assert_eq!(reg.type_distance(Type::Bool, Type::Int), Some(1));
        assert!(reg.type_distance(Type::Int, Type::Class(myint)).is_none());
    }

    #[test]
    fn implicit_index_covers_both_sides_and_ancestors() {
        let mut reg = TypeRegistry::new();
        let target = reg.define(ClassBuilder::value_type("Target").implicit_from(Type::Int, |_, v| Ok(v)));
        let base = reg.define(
            ClassBuilder::managed("Base").implicit_to(ParamType::Class(target), |_, v| Ok(v)),
        );
        let derived = reg.define(ClassBuilder::managed("Derived").base(base));

        let from_int = reg.find_implicit(Type::Int, &ParamType::Class(target)).unwrap();
        assert_eq!(from_int.class, target);
        let inherited = reg
            .find_implicit(Type::Class(derived), &ParamType::Class(target))
            .unwrap();
        assert_eq!(inherited.class, base);
        assert_eq!(reg.implicit(inherited).from, Type::Class(base));
        assert!(reg.find_implicit(Type::Str, &ParamType::Class(target)).is_none());
    }
}
