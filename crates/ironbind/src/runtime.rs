//! The dispatch runtime: object arena, type registry, caches and the call entry point.
//!
//! Everything the engine does goes through a [`Runtime`]. It owns the heap, the
//! managed host's type registry, the conversion and call-site caches, the warning
//! log and the tracer. Behavior is split over several modules that each add an
//! `impl Runtime` block:
//!
//! | Module | Adds |
//! |--------|------|
//! | `hooks` | `__index__`/`__int__`/`__float__`/... resolution |
//! | `construct` | `bytes(...)`/`bytearray(...)` construction |
//! | `builtins` | calls on builtin and managed type objects |
//! | `overload` | conversion classification and overload selection |
//! | `methods` | builtin method surface and item access |
//! | `ops` | arithmetic, comparison and equality |
//! | `repr` | `repr()`/`str()` |
//! | `warnings` | the warning log and filter |

use std::cell::RefCell;

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    args::ArgValues,
    config::EngineConfig,
    exception::{ExcType, RunError, RunResult},
    heap::{Heap, HeapData, HeapId},
    overload::{OverloadSet, ParamType, conversion::ConversionCache, resolver::CallSiteCache},
    signature::Signature,
    tracer::{DispatchTracer, NoopTracer},
    types::{
        ByteArray, Bytes, ClassBuilder, ClassId, Complex, EnumId, Instance, LongInt, ManagedArray, MemoryView,
        PrimValue, Primitive, PyIter, Slice, Type, TypeRegistry, TypedArray,
        function::{BuiltinMethod, PyFunction},
        iter::GeneratorFn,
    },
    value::Value,
    warnings::WarningRecord,
};

/// A single-threaded dispatch engine instance.
///
/// Not `Sync`: hooks and method bodies receive `&mut Runtime` and may re-enter it,
/// but only one call chain uses a runtime at a time.
#[derive(Debug)]
pub struct Runtime {
    pub(crate) heap: Heap,
    pub(crate) types: TypeRegistry,
    pub(crate) config: EngineConfig,
    pub(crate) tracer: Box<dyn DispatchTracer>,
    pub(crate) conversions: ConversionCache,
    pub(crate) call_sites: CallSiteCache,
    pub(crate) warnings: Vec<WarningRecord>,
    /// The builtin `iter` function, as it appears in `__reduce__` results.
    builtin_iter: Value,
}

impl Runtime {
    /// Creates a runtime that discards trace events.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_tracer(config, NoopTracer)
    }

    /// Creates a runtime reporting dispatch decisions to `tracer`.
    ///
    /// Specialization bounds below the minimum are raised to it.
    #[must_use]
    pub fn with_tracer(config: EngineConfig, tracer: impl DispatchTracer + 'static) -> Self {
        let mut heap = Heap::new();
        let iter_fn = heap.allocate(HeapData::BuiltinMethod(BuiltinMethod {
            receiver: Value::None,
            name: "iter".to_owned(),
        }));
        Self {
            heap,
            types: TypeRegistry::new(),
            config: config.normalized(),
            tracer: Box::new(tracer),
            conversions: ConversionCache::default(),
            call_sites: CallSiteCache::default(),
            warnings: Vec::new(),
            builtin_iter: Value::Ref(iter_fn),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The builtin `iter` callable.
    #[must_use]
    pub fn builtin_iter(&self) -> Value {
        self.builtin_iter
    }

    // --- type queries ---

    /// Runtime type of a value.
    #[must_use]
    pub fn type_of(&self, v: Value) -> Type {
        match v {
            Value::None => Type::NoneType,
            Value::NotImplemented => Type::NotImplementedType,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Prim(PrimValue::Enum(id, _)) => Type::Enum(id),
            Value::Prim(p) => p.primitive().map_or(Type::Object, Type::of_primitive),
            Value::Type(_) => Type::Type,
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(_) => Type::Str,
                HeapData::LongInt(_) => Type::Int,
                HeapData::Complex(_) => Type::Complex,
                HeapData::Bytes(_) => Type::Bytes,
                HeapData::ByteArray(_) => Type::Bytearray,
                HeapData::MemoryView(_) => Type::MemoryView,
                HeapData::Array(_) => Type::Array,
                HeapData::ManagedArray(_) => Type::ManagedArray,
                HeapData::Tuple(_) => Type::Tuple,
                HeapData::List(_) => Type::List,
                HeapData::Dict(_) => Type::Dict,
                HeapData::Iter(it) => it.py_type(),
                HeapData::Function(_) => Type::Function,
                HeapData::BoundMethod(_) => Type::Method,
                HeapData::BuiltinMethod(_) => Type::BuiltinMethod,
                HeapData::MethodGroup(_) => Type::MethodGroup,
                HeapData::Instance(inst) => Type::Class(inst.class),
                HeapData::Slice(_) => Type::Slice,
            },
        }
    }

    /// Python name of a type.
    #[must_use]
    pub fn name_of_type(&self, t: Type) -> String {
        match t {
            Type::Class(id) => self.types.class(id).name.clone(),
            Type::Enum(id) => self.types.primitives.enum_def(id).name.clone(),
            other => other.builtin_name().unwrap_or("object").to_owned(),
        }
    }

    /// Python name of a value's type, as used in error messages.
    #[must_use]
    pub fn type_name(&self, v: Value) -> String {
        self.name_of_type(self.type_of(v))
    }

    /// Display name of a managed parameter type, e.g. `Array[Byte]` or `Nullable[Int64]`.
    #[must_use]
    pub fn param_type_name(&self, t: &ParamType) -> String {
        match t {
            ParamType::Object => "object".to_owned(),
            ParamType::Primitive(p) => p.python_name().to_owned(),
            ParamType::Enum(id) => self.types.primitives.enum_def(*id).name.clone(),
            ParamType::BigInteger => "BigInteger".to_owned(),
            ParamType::Class(id) => self.types.class(*id).name.clone(),
            ParamType::Nullable(inner) => format!("Nullable[{}]", self.managed_elem_name(inner)),
            ParamType::Array(elem) => format!("Array[{}]", self.managed_elem_name(elem)),
            ParamType::Generic(0) => "T".to_owned(),
            ParamType::Generic(n) => format!("T{n}"),
            ParamType::Builtin(t) => self.name_of_type(*t),
        }
    }

    /// Type arguments are shown with managed names: `Array[Int32]`, not `Array[int]`.
    pub(crate) fn managed_elem_name(&self, t: &ParamType) -> String {
        match t {
            ParamType::Primitive(p) => p.managed_name().to_owned(),
            other => self.param_type_name(other),
        }
    }

    /// True if `v`'s type is `t` or a subclass of it.
    #[must_use]
    pub fn isinstance(&self, v: Value, t: Type) -> bool {
        self.types.type_distance(self.type_of(v), t).is_some()
    }

    // --- allocation ---

    pub(crate) fn alloc(&mut self, data: HeapData) -> Value {
        Value::Ref(self.heap.allocate(data))
    }

    pub fn new_str(&mut self, s: impl Into<String>) -> Value {
        self.alloc(HeapData::Str(s.into()))
    }

    /// A Python int; demotes to an immediate when it fits.
    pub fn new_int(&mut self, v: BigInt) -> Value {
        LongInt::new(v).into_value(&mut self.heap)
    }

    pub fn new_bytes(&mut self, data: Vec<u8>) -> Value {
        self.alloc(HeapData::Bytes(Bytes::new(data)))
    }

    pub fn new_bytearray(&mut self, data: Vec<u8>) -> Value {
        self.alloc(HeapData::ByteArray(ByteArray::new(data)))
    }

    pub fn new_tuple(&mut self, items: Vec<Value>) -> Value {
        self.alloc(HeapData::Tuple(items))
    }

    pub fn new_list(&mut self, items: Vec<Value>) -> Value {
        self.alloc(HeapData::List(items))
    }

    pub fn new_dict(&mut self, items: IndexMap<String, Value>) -> Value {
        self.alloc(HeapData::Dict(items))
    }

    pub fn new_complex(&mut self, re: f64, im: f64) -> Value {
        self.alloc(HeapData::Complex(Complex::new(re, im)))
    }

    pub fn new_slice(&mut self, start: Value, stop: Value, step: Value) -> Value {
        self.alloc(HeapData::Slice(Slice::new(start, stop, step)))
    }

    /// `array.array(typecode, items)`.
    pub fn new_array(&mut self, typecode: char, items: &[Value]) -> RunResult<Value> {
        let mut array = TypedArray::new(typecode)?;
        for item in items {
            if array.is_float() {
                let f = self.to_float(*item)?;
                array.push_float(f)?;
            } else {
                let n = self.to_index(*item)?;
                array.push_int(&n)?;
            }
        }
        Ok(self.alloc(HeapData::Array(array)))
    }

    /// A managed array; every item is converted to the element type.
    pub fn new_managed_array(&mut self, elem: ParamType, items: &[Value]) -> RunResult<Value> {
        let mut converted = Vec::with_capacity(items.len());
        for item in items {
            converted.push(self.convert(*item, &elem)?);
        }
        Ok(self.alloc(HeapData::ManagedArray(ManagedArray::new(elem, converted))))
    }

    /// A Python function with a native body.
    ///
    /// `defaults` holds one value per defaulted parameter, laid out as
    /// [`Signature`] documents.
    pub fn new_function(
        &mut self,
        name: impl Into<String>,
        signature: Signature,
        defaults: Vec<Value>,
        body: impl Fn(&mut Self, Vec<Value>) -> RunResult<Value> + 'static,
    ) -> RunResult<Value> {
        if defaults.len() != signature.total_defaults_count() {
            return Err(RunError::internal("default count does not match signature"));
        }
        Ok(self.alloc(HeapData::Function(PyFunction {
            name: name.into(),
            signature,
            defaults,
            body: std::rc::Rc::new(body),
        })))
    }

    /// A generator whose body is called once per `next()`; returning `None` finishes it.
    pub fn new_generator(
        &mut self,
        name: impl Into<String>,
        step: impl FnMut(&mut Self) -> RunResult<Option<Value>> + 'static,
    ) -> Value {
        let step: GeneratorFn = std::rc::Rc::new(RefCell::new(step));
        self.alloc(HeapData::Iter(PyIter::Generator {
            name: name.into(),
            step,
            finished: false,
        }))
    }

    /// A bare instance of a declared class; `__init__` is not run.
    pub fn new_instance(&mut self, class: ClassId) -> Value {
        self.alloc(HeapData::Instance(Instance::new(class, None)))
    }

    pub(crate) fn new_instance_with_base(&mut self, class: ClassId, base: Value) -> Value {
        self.alloc(HeapData::Instance(Instance::new(class, Some(base))))
    }

    /// `memoryview(source)`. A view over a `bytearray` holds an export on it.
    pub fn new_memoryview(&mut self, source: Value) -> RunResult<Value> {
        let target = self.unwrap_base(source);
        let Value::Ref(id) = target else {
            return Err(ExcType::type_error_memoryview_source(&self.type_name(source)));
        };
        let view = match self.heap.get(id) {
            HeapData::Bytes(b) => MemoryView::new(id, b.len(), 1, 'B', true),
            HeapData::ByteArray(b) => MemoryView::new(id, b.len(), 1, 'B', false),
            HeapData::Array(arr) => MemoryView::new(id, arr.len(), arr.itemsize(), arr.typecode(), false),
            HeapData::MemoryView(view) => {
                view.check_live()?;
                view.subview(0, 1, view.len)
            }
            _ => return Err(ExcType::type_error_memoryview_source(&self.type_name(source))),
        };
        if let HeapData::ByteArray(b) = self.heap.get_mut(view.source) {
            b.add_export();
        }
        Ok(self.alloc(HeapData::MemoryView(view)))
    }

    // --- registration ---

    /// Registers a class. Conversion and selection caches are flushed, since new
    /// implicit operators and hooks change what converts to what.
    pub fn define_class(&mut self, builder: ClassBuilder) -> ClassId {
        let id = self.types.define(builder);
        self.flush_caches();
        id
    }

    /// Adds or replaces a method on a declared class.
    pub fn add_method(&mut self, class: ClassId, name: impl Into<String>, func: Value) {
        self.types.class_mut(class).methods.insert(name.into(), func);
        self.flush_caches();
    }

    /// Declares a managed enum over an integer primitive.
    pub fn define_enum<'a>(
        &mut self,
        name: impl Into<String>,
        underlying: Primitive,
        members: impl IntoIterator<Item = (&'a str, i64)>,
    ) -> EnumId {
        self.types
            .primitives
            .define_enum(name, underlying, members.into_iter().map(|(k, v)| (k.to_owned(), v)))
    }

    /// The value of a declared enum member.
    #[must_use]
    pub fn enum_member(&self, id: EnumId, name: &str) -> Option<Value> {
        self.types
            .primitives
            .enum_def(id)
            .members
            .get(name)
            .map(|v| Value::Prim(PrimValue::Enum(id, *v)))
    }

    /// Allocates a managed method group; calling it runs the overload selector.
    pub fn define_overloads(&mut self, set: OverloadSet) -> Value {
        self.alloc(HeapData::MethodGroup(set))
    }

    fn flush_caches(&mut self) {
        self.conversions.clear();
        self.call_sites.clear();
    }

    // --- data access ---

    #[must_use]
    pub fn as_str(&self, v: Value) -> Option<&str> {
        match v {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Integer value of a Python int or bool (not of typed primitives or hooks).
    #[must_use]
    pub fn as_bigint(&self, v: Value) -> Option<BigInt> {
        match v {
            Value::Int(i) => Some(i.into()),
            Value::Bool(b) => Some(u8::from(b).into()),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::LongInt(li) => Some(li.inner().clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Contents of a `bytes` or `bytearray`, including subclass instances.
    #[must_use]
    pub fn byte_data(&self, v: Value) -> Option<&[u8]> {
        let Value::Ref(id) = self.unwrap_base(v) else {
            return None;
        };
        match self.heap.get(id) {
            HeapData::Bytes(b) => Some(b.as_slice()),
            HeapData::ByteArray(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Copies the bytes of anything exposing the buffer protocol: byte sequences,
    /// memoryviews (strides honored), typed arrays and managed `Byte[]`.
    ///
    /// Returns `None` for objects without a buffer.
    pub fn buffer_data(&self, v: Value) -> RunResult<Option<Vec<u8>>> {
        if let Some(data) = self.byte_data(v) {
            return Ok(Some(data.to_vec()));
        }
        let Value::Ref(id) = self.unwrap_base(v) else {
            return Ok(None);
        };
        Ok(match self.heap.get(id) {
            HeapData::MemoryView(view) => {
                view.check_live()?;
                Some(view.gather(self.raw_bytes(view.source).unwrap_or_default()))
            }
            HeapData::Array(arr) => Some(arr.as_bytes().to_vec()),
            HeapData::ManagedArray(arr) => arr.byte_buffer(),
            _ => None,
        })
    }

    /// Raw storage of an object a memoryview can point at.
    pub(crate) fn raw_bytes(&self, id: HeapId) -> Option<&[u8]> {
        match self.heap.get(id) {
            HeapData::Bytes(b) => Some(b.as_slice()),
            HeapData::ByteArray(b) => Some(b.as_slice()),
            HeapData::Array(arr) => Some(arr.as_bytes()),
            _ => None,
        }
    }

    pub(crate) fn bytearray_mut(&mut self, id: HeapId) -> RunResult<&mut ByteArray> {
        match self.heap.get_mut(id) {
            HeapData::ByteArray(b) => Ok(b),
            _ => Err(RunError::internal("expected a bytearray")),
        }
    }

    pub(crate) fn raw_bytes_mut(&mut self, id: HeapId) -> Option<&mut [u8]> {
        match self.heap.get_mut(id) {
            HeapData::ByteArray(b) => Some(b.as_mut_slice()),
            HeapData::Array(arr) => Some(arr.as_mut_bytes()),
            _ => None,
        }
    }

    /// Item `index` of a memoryview.
    pub(crate) fn memoryview_item(&mut self, view_id: HeapId, index: usize) -> RunResult<Value> {
        let HeapData::MemoryView(view) = self.heap.get(view_id) else {
            return Err(RunError::internal("memoryview item on non-view"));
        };
        view.check_live()?;
        let format = view.format;
        let range = view.item_range(index);
        let raw = range
            .and_then(|r| self.raw_bytes(view.source).and_then(|raw| raw.get(r)))
            .map(<[u8]>::to_vec);
        let Some(raw) = raw else {
            return Err(ExcType::index_error_out_of_range("memoryview"));
        };
        let item = crate::types::buffer::decode_item(format, &raw);
        Ok(self.array_item_value(item))
    }

    /// Items of a tuple or list.
    #[must_use]
    pub fn sequence_items(&self, v: Value) -> Option<&[Value]> {
        let Value::Ref(id) = self.unwrap_base(v) else {
            return None;
        };
        match self.heap.get(id) {
            HeapData::Tuple(items) | HeapData::List(items) => Some(items),
            _ => None,
        }
    }

    /// The builtin payload of an instance of a builtin subclass, if any.
    #[must_use]
    pub fn instance_base(&self, v: Value) -> Option<Value> {
        match v {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Instance(inst) => inst.base,
                _ => None,
            },
            _ => None,
        }
    }

    /// Follows builtin payloads down to a non-instance value.
    #[must_use]
    pub fn unwrap_base(&self, v: Value) -> Value {
        let mut current = v;
        while let Some(base) = self.instance_base(current) {
            current = base;
        }
        current
    }

    // --- calls ---

    /// Calls `callee` with positional arguments, or with an [`ArgValues`].
    pub fn call(&mut self, callee: Value, args: impl Into<ArgValues>) -> RunResult<Value> {
        self.dispatch_call(callee, args.into())
    }

    /// Entry point for every call the engine routes.
    ///
    /// Python functions bind through their [`Signature`]; managed method groups go
    /// through the overload selector; type objects construct; instances use `__call__`.
    pub fn dispatch_call(&mut self, callee: Value, args: ArgValues) -> RunResult<Value> {
        let id = match callee {
            Value::Type(t) => return self.call_type(t, args),
            Value::Ref(id) => id,
            other => return Err(ExcType::type_error_not_callable(&self.type_name(other))),
        };
        match self.heap.get(id) {
            HeapData::Function(func) => {
                let func = func.clone();
                let (slots, path) = func
                    .signature
                    .bind(args, &func.defaults, &mut self.heap, &self.config, &func.name)?;
                self.tracer.on_bind(&func.name, path);
                (func.body)(self, slots)
            }
            HeapData::BoundMethod(method) => {
                let method = *method;
                if let Value::Ref(func_id) = method.func
                    && matches!(self.heap.get(func_id), HeapData::MethodGroup(_))
                {
                    return self.resolve_and_invoke(func_id, Some(method.receiver), args);
                }
                self.dispatch_call(method.func, args.prepend(method.receiver))
            }
            HeapData::BuiltinMethod(method) => {
                let receiver = method.receiver;
                let name = method.name.clone();
                if receiver.is_none() && name == "iter" {
                    let source = args.get_one_arg("iter")?;
                    return self.iter(source);
                }
                self.call_builtin_method(receiver, &name, args)
            }
            HeapData::MethodGroup(_) => self.resolve_and_invoke(id, None, args),
            HeapData::Instance(_) => match self.call_hook(callee, "__call__", args)? {
                Some(result) => Ok(result),
                None => Err(ExcType::type_error_not_callable(&self.type_name(callee))),
            },
            _ => Err(ExcType::type_error_not_callable(&self.type_name(callee))),
        }
    }

    // --- attributes and hooks ---

    /// `getattr(obj, name)`.
    ///
    /// Instance attributes come first, then class methods (bound to the instance),
    /// then the builtin methods of the object or of its builtin payload.
    pub fn getattr(&mut self, obj: Value, name: &str) -> RunResult<Value> {
        match obj {
            Value::Ref(id) => {
                if let HeapData::Instance(inst) = self.heap.get(id) {
                    if let Some(v) = inst.attrs.get(name) {
                        return Ok(*v);
                    }
                    if let Some(func) = self.types.lookup_method(inst.class, name) {
                        return Ok(self.bind_method(obj, func));
                    }
                }
            }
            Value::Type(Type::Class(id)) => {
                if let Some(func) = self.types.lookup_method(id, name) {
                    return Ok(func);
                }
            }
            Value::Type(Type::Enum(id)) => {
                if let Some(member) = self.enum_member(id, name) {
                    return Ok(member);
                }
            }
            _ => {}
        }
        let target = self.unwrap_base(obj);
        if self.has_builtin_method(self.type_of(target), name) {
            return Ok(self.alloc(HeapData::BuiltinMethod(BuiltinMethod {
                receiver: obj,
                name: name.to_owned(),
            })));
        }
        Err(ExcType::attribute_error(&self.type_name(obj), name))
    }

    /// Sets an instance attribute.
    pub fn setattr(&mut self, obj: Value, name: &str, value: Value) -> RunResult<()> {
        if let Value::Ref(id) = obj
            && let HeapData::Instance(inst) = self.heap.get_mut(id)
        {
            inst.attrs.insert(name.to_owned(), value);
            return Ok(());
        }
        Err(ExcType::attribute_error(&self.type_name(obj), name))
    }

    fn bind_method(&mut self, receiver: Value, func: Value) -> Value {
        self.alloc(HeapData::BoundMethod(crate::types::function::BoundMethod { receiver, func }))
    }

    /// `obj.name(*args)` without materializing the bound method.
    pub fn call_method(&mut self, obj: Value, name: &str, args: ArgValues) -> RunResult<Value> {
        if let Value::Ref(id) = obj
            && let HeapData::Instance(inst) = self.heap.get(id)
        {
            if let Some(attr) = inst.attrs.get(name).copied() {
                return self.dispatch_call(attr, args);
            }
            if let Some(func) = self.types.lookup_method(inst.class, name) {
                return self.call_with_receiver(func, obj, args);
            }
        }
        let target = self.unwrap_base(obj);
        if self.has_builtin_method(self.type_of(target), name) {
            return self.call_builtin_method(obj, name, args);
        }
        Err(ExcType::attribute_error(&self.type_name(obj), name))
    }

    fn call_with_receiver(&mut self, func: Value, receiver: Value, args: ArgValues) -> RunResult<Value> {
        if let Value::Ref(func_id) = func
            && matches!(self.heap.get(func_id), HeapData::MethodGroup(_))
        {
            return self.resolve_and_invoke(func_id, Some(receiver), args);
        }
        self.dispatch_call(func, args.prepend(receiver))
    }

    /// Finds a hook on the object's class. Instance attributes are never hooks.
    #[must_use]
    pub fn lookup_hook(&self, obj: Value, hook: &str) -> Option<Value> {
        let Value::Ref(id) = obj else {
            return None;
        };
        match self.heap.get(id) {
            HeapData::Instance(inst) => self.types.lookup_method(inst.class, hook),
            _ => None,
        }
    }

    /// Invokes a hook if the object's class defines it; `Ok(None)` when it does not.
    pub fn call_hook(&mut self, obj: Value, hook: &'static str, args: ArgValues) -> RunResult<Option<Value>> {
        let Some(func) = self.lookup_hook(obj, hook) else {
            return Ok(None);
        };
        let type_name = self.type_name(obj);
        self.tracer.on_hook(hook, &type_name);
        self.call_with_receiver(func, obj, args).map(Some)
    }
}
