//! Arithmetic, comparison and equality.
//!
//! A binary operator is resolved by a small state machine over its operands:
//! `TryLeft` asks the left operand, `TryRight` asks the right operand's reflected
//! method, `Failed` raises. An operand answers through, in order, a Python hook
//! (`__add__`), a managed operator group (`op_Addition`), or the builtin
//! implementation of its payload. `NotImplemented` from a hook and a group without
//! an applicable overload both decline.
//!
//! A right operand whose type is a proper subclass of the left operand's type and
//! overrides the reflected method is asked first.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::{
    args::ArgValues,
    coerce::{big_to_f64, float_to_bigint},
    exception::{ExcType, RunError, RunResult},
    heap::{HeapData, HeapId},
    runtime::Runtime,
    types::{Complex, Decimal, LongInt, PrimValue, Type},
    value::Value,
};

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::TrueDiv => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
        }
    }

    fn inplace_symbol(self) -> &'static str {
        match self {
            Self::Add => "+=",
            Self::Sub => "-=",
            Self::Mul => "*=",
            Self::TrueDiv => "/=",
            Self::FloorDiv => "//=",
            Self::Mod => "%=",
            Self::Pow => "**=",
            Self::LShift => "<<=",
            Self::RShift => ">>=",
            Self::And => "&=",
            Self::Or => "|=",
            Self::Xor => "^=",
        }
    }

    fn dunder(self) -> &'static str {
        match self {
            Self::Add => "__add__",
            Self::Sub => "__sub__",
            Self::Mul => "__mul__",
            Self::TrueDiv => "__truediv__",
            Self::FloorDiv => "__floordiv__",
            Self::Mod => "__mod__",
            Self::Pow => "__pow__",
            Self::LShift => "__lshift__",
            Self::RShift => "__rshift__",
            Self::And => "__and__",
            Self::Or => "__or__",
            Self::Xor => "__xor__",
        }
    }

    fn reflected(self) -> &'static str {
        match self {
            Self::Add => "__radd__",
            Self::Sub => "__rsub__",
            Self::Mul => "__rmul__",
            Self::TrueDiv => "__rtruediv__",
            Self::FloorDiv => "__rfloordiv__",
            Self::Mod => "__rmod__",
            Self::Pow => "__rpow__",
            Self::LShift => "__rlshift__",
            Self::RShift => "__rrshift__",
            Self::And => "__rand__",
            Self::Or => "__ror__",
            Self::Xor => "__rxor__",
        }
    }

    fn inplace(self) -> &'static str {
        match self {
            Self::Add => "__iadd__",
            Self::Sub => "__isub__",
            Self::Mul => "__imul__",
            Self::TrueDiv => "__itruediv__",
            Self::FloorDiv => "__ifloordiv__",
            Self::Mod => "__imod__",
            Self::Pow => "__ipow__",
            Self::LShift => "__ilshift__",
            Self::RShift => "__irshift__",
            Self::And => "__iand__",
            Self::Or => "__ior__",
            Self::Xor => "__ixor__",
        }
    }

    /// Name of the managed operator method, where the managed host has one.
    fn managed(self) -> Option<&'static str> {
        Some(match self {
            Self::Add => "op_Addition",
            Self::Sub => "op_Subtraction",
            Self::Mul => "op_Multiply",
            Self::TrueDiv => "op_Division",
            Self::Mod => "op_Modulus",
            Self::LShift => "op_LeftShift",
            Self::RShift => "op_RightShift",
            Self::And => "op_BitwiseAnd",
            Self::Or => "op_BitwiseOr",
            Self::Xor => "op_ExclusiveOr",
            Self::FloorDiv | Self::Pow => return None,
        })
    }
}

/// Rich comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn dunder(self) -> &'static str {
        match self {
            Self::Eq => "__eq__",
            Self::Ne => "__ne__",
            Self::Lt => "__lt__",
            Self::Le => "__le__",
            Self::Gt => "__gt__",
            Self::Ge => "__ge__",
        }
    }

    /// The operator with its operands swapped: `a < b` is `b > a`.
    #[must_use]
    pub fn swapped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
        }
    }

    /// Whether the operator holds for a three-way result. Nothing holds for
    /// unordered operands except `!=`.
    #[must_use]
    pub fn holds(self, c: Comparison) -> bool {
        match (self, c) {
            (Self::Ne, Comparison::Unordered) => true,
            (_, Comparison::Unordered) => false,
            (Self::Eq, c) => c == Comparison::Equal,
            (Self::Ne, c) => c != Comparison::Equal,
            (Self::Lt, c) => c == Comparison::Less,
            (Self::Le, c) => c != Comparison::Greater,
            (Self::Gt, c) => c == Comparison::Greater,
            (Self::Ge, c) => c != Comparison::Less,
        }
    }
}

/// Three-way comparison result; `Unordered` when a NaN is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Less,
    Equal,
    Greater,
    Unordered,
}

impl Comparison {
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            Self::Less => Self::Greater,
            Self::Greater => Self::Less,
            other => other,
        }
    }
}

impl From<Ordering> for Comparison {
    fn from(o: Ordering) -> Self {
        match o {
            Ordering::Less => Self::Less,
            Ordering::Equal => Self::Equal,
            Ordering::Greater => Self::Greater,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchState {
    TryLeft,
    TryRight,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// The numeric payload of an operand.
#[derive(Debug, Clone)]
enum Num {
    Int(BigInt),
    Float(f64),
    Complex(Complex),
    Decimal(Decimal),
}

impl Num {
    fn to_f64(&self) -> f64 {
        match self {
            Self::Int(i) => big_to_f64(i),
            Self::Float(f) => *f,
            Self::Complex(c) => c.re,
            Self::Decimal(d) => d.to_f64(),
        }
    }

    fn to_complex(&self) -> Complex {
        match self {
            Self::Complex(c) => *c,
            other => Complex::new(other.to_f64(), 0.0),
        }
    }
}

/// Copied contents of a builtin sequence operand.
enum SeqData {
    Bytes { data: Vec<u8>, mutable: bool },
    Str(String),
    Items { items: Vec<Value>, tuple: bool },
}

impl SeqData {
    fn len(&self) -> usize {
        match self {
            Self::Bytes { data, .. } => data.len(),
            Self::Str(s) => s.len(),
            Self::Items { items, .. } => items.len(),
        }
    }
}

impl Runtime {
    /// `a <op> b`.
    pub fn binary_op(&mut self, op: BinaryOp, a: Value, b: Value) -> RunResult<Value> {
        self.binary_dispatch(op, a, b, op.symbol())
    }

    /// `a <op>= b`: the in-place hook, the in-place builtin behavior of `bytearray`
    /// and `list`, then the plain operator.
    pub fn inplace_op(&mut self, op: BinaryOp, a: Value, b: Value) -> RunResult<Value> {
        if let Some(result) = self.call_hook(a, op.inplace(), ArgValues::One(b))?
            && !matches!(result, Value::NotImplemented)
        {
            return Ok(result);
        }
        if let Value::Ref(id) = self.unwrap_base(a) {
            let is_bytearray = matches!(self.heap.get(id), HeapData::ByteArray(_));
            let is_list = matches!(self.heap.get(id), HeapData::List(_));
            let updated = match op {
                BinaryOp::Add if is_bytearray => self.bytearray_iadd(id, a, b)?,
                BinaryOp::Mul if is_bytearray => self.bytearray_imul(id, b)?,
                BinaryOp::Add if is_list => {
                    let items = self.collect_iter(b)?;
                    if let HeapData::List(list) = self.heap.get_mut(id) {
                        list.extend(items);
                    }
                    true
                }
                _ => false,
            };
            if updated {
                return Ok(a);
            }
        }
        self.binary_dispatch(op, a, b, op.inplace_symbol())
    }

    fn binary_dispatch(&mut self, op: BinaryOp, a: Value, b: Value, symbol: &'static str) -> RunResult<Value> {
        let right_first = self.reflected_first(a, b, op.reflected());
        let same_type = self.type_of(a) == self.type_of(b);
        let mut native_tried = false;
        let (mut left_done, mut right_done) = (false, false);
        let mut state = if right_first {
            DispatchState::TryRight
        } else {
            DispatchState::TryLeft
        };
        loop {
            state = match state {
                DispatchState::TryLeft => {
                    left_done = true;
                    if let Some(result) = self.try_operand(op, a, b, Side::Left, &mut native_tried)? {
                        return Ok(result);
                    }
                    if right_done || same_type {
                        DispatchState::Failed
                    } else {
                        DispatchState::TryRight
                    }
                }
                DispatchState::TryRight => {
                    right_done = true;
                    if let Some(result) = self.try_operand(op, a, b, Side::Right, &mut native_tried)? {
                        return Ok(result);
                    }
                    if left_done {
                        DispatchState::Failed
                    } else {
                        DispatchState::TryLeft
                    }
                }
                DispatchState::Failed => return Err(self.binary_failure(op, a, b, symbol)),
            };
        }
    }

    /// Asks one operand to compute `a <op> b`; `Ok(None)` when it declines.
    ///
    /// The builtin implementation is shared by both operands, so it runs at most once.
    fn try_operand(
        &mut self,
        op: BinaryOp,
        a: Value,
        b: Value,
        side: Side,
        native_tried: &mut bool,
    ) -> RunResult<Option<Value>> {
        let (receiver, other, hook) = match side {
            Side::Left => (a, b, op.dunder()),
            Side::Right => (b, a, op.reflected()),
        };
        let reflected = side == Side::Right;
        if let Some(result) = self.call_hook(receiver, hook, ArgValues::One(other))? {
            if matches!(result, Value::NotImplemented) {
                return Ok(None);
            }
            let type_name = self.type_name(receiver);
            self.tracer.on_operator(op.symbol(), &type_name, reflected);
            return Ok(Some(result));
        }
        if let Some(group) = self.managed_operator(receiver, op)
            && let Some(result) = self.select_overload(group, &[a, b])?
        {
            let type_name = self.type_name(receiver);
            self.tracer.on_operator(op.symbol(), &type_name, reflected);
            return Ok(Some(result));
        }
        if *native_tried {
            return Ok(None);
        }
        *native_tried = true;
        self.native_binary(op, a, b)
    }

    /// The `op_*` overload group of a managed class operand.
    fn managed_operator(&self, receiver: Value, op: BinaryOp) -> Option<HeapId> {
        let name = op.managed()?;
        let Type::Class(class) = self.type_of(receiver) else {
            return None;
        };
        if !self.types.class(class).is_managed() {
            return None;
        }
        let Value::Ref(group) = self.types.lookup_method(class, name)? else {
            return None;
        };
        matches!(self.heap.get(group), HeapData::MethodGroup(_)).then_some(group)
    }

    /// True when `b`'s type is a proper subclass of `a`'s and overrides `reflected`.
    fn reflected_first(&self, a: Value, b: Value, reflected: &str) -> bool {
        let (ta, tb) = (self.type_of(a), self.type_of(b));
        if ta == tb || !matches!(tb, Type::Class(_)) {
            return false;
        }
        if !self.types.type_distance(tb, ta).is_some_and(|d| d > 0) {
            return false;
        }
        match self.lookup_hook(b, reflected) {
            Some(method) => !self.lookup_hook(a, reflected).is_some_and(|m| m.is(&method)),
            None => false,
        }
    }

    fn binary_failure(&self, op: BinaryOp, a: Value, b: Value, symbol: &str) -> RunError {
        if op == BinaryOp::Mul {
            if self.sequence_kind(a) {
                return ExcType::type_error_sequence_repeat(&self.type_name(b));
            }
            if self.sequence_kind(b) {
                return ExcType::type_error_sequence_repeat(&self.type_name(a));
            }
        }
        ExcType::binary_type_error(symbol, &self.type_name(a), &self.type_name(b))
    }

    fn sequence_kind(&self, v: Value) -> bool {
        match self.unwrap_base(v) {
            Value::Ref(id) => matches!(
                self.heap.get(id),
                HeapData::Bytes(_) | HeapData::ByteArray(_) | HeapData::Str(_) | HeapData::Tuple(_) | HeapData::List(_)
            ),
            _ => false,
        }
    }

    // --- builtin arithmetic ---

    fn native_binary(&mut self, op: BinaryOp, a: Value, b: Value) -> RunResult<Option<Value>> {
        if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
            match op {
                BinaryOp::And => return Ok(Some(Value::Bool(x & y))),
                BinaryOp::Or => return Ok(Some(Value::Bool(x | y))),
                BinaryOp::Xor => return Ok(Some(Value::Bool(x ^ y))),
                _ => {}
            }
        }
        if let (Some(x), Some(y)) = (self.numeric(a), self.numeric(b)) {
            return self.numeric_arith(op, x, y);
        }
        match op {
            BinaryOp::Add => self.concat(a, b),
            BinaryOp::Mul => match self.repeat(a, b)? {
                Some(result) => Ok(Some(result)),
                None => self.repeat(b, a),
            },
            _ => Ok(None),
        }
    }

    /// Numeric payload: Python numbers, typed managed primitives and builtin
    /// subclass instances.
    fn numeric(&self, v: Value) -> Option<Num> {
        match v {
            Value::Float(f) => Some(Num::Float(f)),
            Value::Prim(PrimValue::Single(f)) => Some(Num::Float(f64::from(f))),
            Value::Prim(PrimValue::Decimal(d)) => Some(Num::Decimal(d)),
            Value::Prim(p) => p.integer().map(Num::Int),
            other => {
                let base = self.unwrap_base(other);
                if let Some(i) = self.as_bigint(base) {
                    return Some(Num::Int(i));
                }
                match base {
                    Value::Float(f) => Some(Num::Float(f)),
                    Value::Ref(id) => match self.heap.get(id) {
                        HeapData::Complex(c) => Some(Num::Complex(*c)),
                        _ => None,
                    },
                    _ => None,
                }
            }
        }
    }

    fn numeric_arith(&mut self, op: BinaryOp, x: Num, y: Num) -> RunResult<Option<Value>> {
        match (x, y) {
            (Num::Int(x), Num::Int(y)) => self.int_arith(op, &x, &y),
            (Num::Decimal(x), Num::Decimal(y)) => decimal_arith(op, x, y),
            (Num::Decimal(x), Num::Int(y)) => match Decimal::from_bigint(&y) {
                Some(y) => decimal_arith(op, x, y),
                None => Err(ExcType::overflow_primitive("Decimal")),
            },
            (Num::Int(x), Num::Decimal(y)) => match Decimal::from_bigint(&x) {
                Some(x) => decimal_arith(op, x, y),
                None => Err(ExcType::overflow_primitive("Decimal")),
            },
            (Num::Decimal(_), _) | (_, Num::Decimal(_)) => Ok(None),
            (x, y) if matches!(x, Num::Complex(_)) || matches!(y, Num::Complex(_)) => {
                self.complex_arith(op, x.to_complex(), y.to_complex())
            }
            (x, y) => self.float_arith(op, x.to_f64(), y.to_f64()),
        }
    }

    fn int_arith(&mut self, op: BinaryOp, x: &BigInt, y: &BigInt) -> RunResult<Option<Value>> {
        let result = match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => {
                self.config.limits.check_int_bits(x.bits().saturating_add(y.bits()))?;
                x * y
            }
            BinaryOp::TrueDiv => {
                if y.is_zero() {
                    return Err(ExcType::zero_division("division by zero"));
                }
                return int_true_div(x, y).map(|f| Some(Value::Float(f)));
            }
            BinaryOp::FloorDiv => {
                if y.is_zero() {
                    return Err(ExcType::zero_division("integer division or modulo by zero"));
                }
                x.div_floor(y)
            }
            BinaryOp::Mod => {
                if y.is_zero() {
                    return Err(ExcType::zero_division("integer modulo by zero"));
                }
                x.mod_floor(y)
            }
            BinaryOp::Pow => return self.int_pow(x, y).map(Some),
            BinaryOp::LShift => {
                let n = shift_count(y)?;
                let bits = n
                    .and_then(|n| LongInt::estimate_lshift_bits(x.bits(), u64::try_from(n).ok()?))
                    .unwrap_or(u64::MAX);
                if x.is_zero() {
                    BigInt::zero()
                } else {
                    self.config.limits.check_int_bits(bits)?;
                    let n = n.ok_or_else(|| ExcType::overflow_error("too many digits in integer"))?;
                    x << n
                }
            }
            BinaryOp::RShift => match shift_count(y)? {
                Some(n) => x >> n,
                None if x.is_negative() => BigInt::from(-1),
                None => BigInt::zero(),
            },
            BinaryOp::And => x & y,
            BinaryOp::Or => x | y,
            BinaryOp::Xor => x ^ y,
        };
        Ok(Some(self.new_int(result)))
    }

    fn int_pow(&mut self, base: &BigInt, exp: &BigInt) -> RunResult<Value> {
        if exp.is_negative() {
            return float_pow(big_to_f64(base), big_to_f64(exp)).map(|r| self.float_or_complex(r));
        }
        if exp.is_zero() {
            return Ok(Value::Int(1));
        }
        if base.is_zero() {
            return Ok(Value::Int(0));
        }
        if base.magnitude().is_one() {
            let negative = base.is_negative() && exp.is_odd();
            return Ok(Value::Int(if negative { -1 } else { 1 }));
        }
        let exp = exp.to_u64();
        let bits = exp
            .and_then(|e| LongInt::estimate_pow_bits(base.bits(), e))
            .unwrap_or(u64::MAX);
        self.config.limits.check_int_bits(bits)?;
        let exp = exp
            .and_then(|e| u32::try_from(e).ok())
            .ok_or_else(|| ExcType::memory_error("exponent too large"))?;
        Ok(self.new_int(base.pow(exp)))
    }

    fn float_arith(&mut self, op: BinaryOp, x: f64, y: f64) -> RunResult<Option<Value>> {
        let result = match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::TrueDiv => {
                if y == 0.0 {
                    return Err(ExcType::zero_division("float division by zero"));
                }
                x / y
            }
            BinaryOp::FloorDiv => {
                if y == 0.0 {
                    return Err(ExcType::zero_division("float floor division by zero"));
                }
                float_divmod(x, y).0
            }
            BinaryOp::Mod => {
                if y == 0.0 {
                    return Err(ExcType::zero_division("float modulo by zero"));
                }
                float_divmod(x, y).1
            }
            BinaryOp::Pow => return float_pow(x, y).map(|r| Some(self.float_or_complex(r))),
            BinaryOp::LShift | BinaryOp::RShift | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => return Ok(None),
        };
        Ok(Some(Value::Float(result)))
    }

    fn float_or_complex(&mut self, r: Result<f64, Complex>) -> Value {
        match r {
            Ok(f) => Value::Float(f),
            Err(c) => self.new_complex(c.re, c.im),
        }
    }

    fn complex_arith(&mut self, op: BinaryOp, x: Complex, y: Complex) -> RunResult<Option<Value>> {
        let result = match op {
            BinaryOp::Add => x.add(y),
            BinaryOp::Sub => x.sub(y),
            BinaryOp::Mul => x.mul(y),
            BinaryOp::TrueDiv => x
                .div(y)
                .ok_or_else(|| ExcType::zero_division("complex division by zero"))?,
            _ => return Ok(None),
        };
        Ok(Some(self.new_complex(result.re, result.im)))
    }

    // --- builtin sequences ---

    fn sequence_data(&self, v: Value) -> Option<SeqData> {
        let Value::Ref(id) = self.unwrap_base(v) else {
            return None;
        };
        Some(match self.heap.get(id) {
            HeapData::Bytes(b) => SeqData::Bytes {
                data: b.as_slice().to_vec(),
                mutable: false,
            },
            HeapData::ByteArray(b) => SeqData::Bytes {
                data: b.as_slice().to_vec(),
                mutable: true,
            },
            HeapData::Str(s) => SeqData::Str(s.clone()),
            HeapData::Tuple(items) => SeqData::Items {
                items: items.clone(),
                tuple: true,
            },
            HeapData::List(items) => SeqData::Items {
                items: items.clone(),
                tuple: false,
            },
            _ => return None,
        })
    }

    fn new_sequence(&mut self, seq: SeqData) -> Value {
        match seq {
            SeqData::Bytes { data, mutable: false } => self.new_bytes(data),
            SeqData::Bytes { data, mutable: true } => self.new_bytearray(data),
            SeqData::Str(s) => self.new_str(s),
            SeqData::Items { items, tuple: true } => self.new_tuple(items),
            SeqData::Items { items, tuple: false } => self.new_list(items),
        }
    }

    /// `a + b` for builtin sequences. Byte sequences accept any buffer on the right
    /// and keep the left operand's variant.
    fn concat(&mut self, a: Value, b: Value) -> RunResult<Option<Value>> {
        let Some(left) = self.sequence_data(a) else {
            return Ok(None);
        };
        let joined = match left {
            SeqData::Bytes { mut data, mutable } => {
                let Some(right) = self.buffer_data(b)? else {
                    return Ok(None);
                };
                data.extend(right);
                SeqData::Bytes { data, mutable }
            }
            SeqData::Str(mut s) => match self.sequence_data(b) {
                Some(SeqData::Str(right)) => {
                    s.push_str(&right);
                    SeqData::Str(s)
                }
                _ => return Ok(None),
            },
            SeqData::Items { mut items, tuple } => match self.sequence_data(b) {
                Some(SeqData::Items { items: right, tuple: right_tuple }) if right_tuple == tuple => {
                    items.extend(right);
                    SeqData::Items { items, tuple }
                }
                _ => return Ok(None),
            },
        };
        self.config.limits.check_sequence_len(joined.len())?;
        Ok(Some(self.new_sequence(joined)))
    }

    /// `seq * count`; `Ok(None)` unless `seq` is a builtin sequence and `count` an integer.
    fn repeat(&mut self, seq: Value, count: Value) -> RunResult<Option<Value>> {
        if !self.sequence_kind(seq) || !self.has_index(count) {
            return Ok(None);
        }
        let n = usize::try_from(self.index_sized(count)?).unwrap_or(0);
        if n == 1 && matches!(self.type_of(seq), Type::Bytes | Type::Str | Type::Tuple) {
            return Ok(Some(seq));
        }
        let Some(data) = self.sequence_data(seq) else {
            return Ok(None);
        };
        let total = data
            .len()
            .checked_mul(n)
            .ok_or_else(|| ExcType::memory_error("repeated sequence is too long"))?;
        self.config.limits.check_sequence_len(total)?;
        let repeated = match data {
            SeqData::Bytes { data, mutable } => SeqData::Bytes {
                data: data.repeat(n),
                mutable,
            },
            SeqData::Str(s) => SeqData::Str(s.repeat(n)),
            SeqData::Items { items, tuple } => SeqData::Items {
                items: items.repeat(n),
                tuple,
            },
        };
        Ok(Some(self.new_sequence(repeated)))
    }

    /// `bytearray += buffer`. The right side is copied first, so `a += a` doubles.
    fn bytearray_iadd(&mut self, id: HeapId, a: Value, b: Value) -> RunResult<bool> {
        let Some(data) = self.buffer_data(b)? else {
            return Err(ExcType::binary_type_error("+=", &self.type_name(a), &self.type_name(b)));
        };
        if data.is_empty() {
            return Ok(true);
        }
        let current = self.byte_data(Value::Ref(id)).map_or(0, <[u8]>::len);
        self.config.limits.check_sequence_len(current.saturating_add(data.len()))?;
        self.bytearray_mut(id)?.resizable()?.extend(data);
        Ok(true)
    }

    /// `bytearray *= n`. A repeat that keeps the size never counts as a resize.
    fn bytearray_imul(&mut self, id: HeapId, count: Value) -> RunResult<bool> {
        if !self.has_index(count) {
            return Ok(false);
        }
        let n = usize::try_from(self.index_sized(count)?).unwrap_or(0);
        let current = self.byte_data(Value::Ref(id)).map(<[u8]>::to_vec).unwrap_or_default();
        let total = current
            .len()
            .checked_mul(n)
            .ok_or_else(|| ExcType::memory_error("repeated sequence is too long"))?;
        if total == current.len() {
            return Ok(true);
        }
        self.config.limits.check_sequence_len(total)?;
        *self.bytearray_mut(id)?.resizable()? = current.repeat(n);
        Ok(true)
    }

    // --- comparison ---

    /// Three-way comparison of `a` and `b`.
    ///
    /// Builtin values compare directly; objects with rich comparison hooks are asked
    /// `<`, then `==`, then `>`. Values that compare but none of those hold are
    /// `Unordered`.
    pub fn compare(&mut self, a: Value, b: Value) -> RunResult<Comparison> {
        if !self.has_rich_hooks(a)
            && !self.has_rich_hooks(b)
            && let Some(c) = self.native_compare(a, b)?
        {
            return Ok(c);
        }
        if self.compare_op(CompareOp::Lt, a, b)? {
            return Ok(Comparison::Less);
        }
        if self.equality(a, b)? {
            return Ok(Comparison::Equal);
        }
        if self.compare_op(CompareOp::Gt, a, b)? {
            return Ok(Comparison::Greater);
        }
        Ok(Comparison::Unordered)
    }

    /// `a <op> b` as a boolean.
    ///
    /// Ordering tries `a.__lt__(b)`, then the reflected `b.__gt__(a)`, then the
    /// builtin ordering; when none applies it raises `TypeError`.
    pub fn compare_op(&mut self, op: CompareOp, a: Value, b: Value) -> RunResult<bool> {
        match op {
            CompareOp::Eq => return self.equality(a, b),
            CompareOp::Ne => {
                if let Some(result) = self.rich_hook(CompareOp::Ne, a, b)? {
                    return self.to_bool(result);
                }
                return self.equality(a, b).map(|eq| !eq);
            }
            _ => {}
        }
        if let Some(result) = self.rich_hook(op, a, b)? {
            return self.to_bool(result);
        }
        match self.native_compare(a, b)? {
            Some(c) => Ok(op.holds(c)),
            None => Err(ExcType::compare_type_error(
                op.symbol(),
                &self.type_name(a),
                &self.type_name(b),
            )),
        }
    }

    /// `a == b`. Never raises for mismatched types; errors raised by `__eq__`
    /// hooks propagate.
    pub fn equality(&mut self, a: Value, b: Value) -> RunResult<bool> {
        if let Some(result) = self.rich_hook(CompareOp::Eq, a, b)? {
            return self.to_bool(result);
        }
        self.native_equality(a, b)
    }

    fn has_rich_hooks(&self, v: Value) -> bool {
        ["__lt__", "__le__", "__gt__", "__ge__", "__eq__"]
            .iter()
            .any(|hook| self.lookup_hook(v, hook).is_some())
    }

    /// Runs the rich comparison hooks; `Ok(None)` when both decline.
    ///
    /// Unlike arithmetic, the reflected hook is tried even when both operands have
    /// the same type.
    fn rich_hook(&mut self, op: CompareOp, a: Value, b: Value) -> RunResult<Option<Value>> {
        let swapped = op.swapped();
        let order = if self.reflected_first(a, b, swapped.dunder()) {
            [(b, a, swapped.dunder()), (a, b, op.dunder())]
        } else {
            [(a, b, op.dunder()), (b, a, swapped.dunder())]
        };
        for (receiver, other, hook) in order {
            if let Some(result) = self.call_hook(receiver, hook, ArgValues::One(other))?
                && !matches!(result, Value::NotImplemented)
            {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    fn native_compare(&mut self, a: Value, b: Value) -> RunResult<Option<Comparison>> {
        if let (Some(x), Some(y)) = (self.numeric(a), self.numeric(b)) {
            return Ok(compare_numbers(&x, &y));
        }
        if let (Value::Prim(PrimValue::Char(x)), Value::Prim(PrimValue::Char(y))) = (a, b) {
            return Ok(Some(x.cmp(&y).into()));
        }
        let (a, b) = (self.unwrap_base(a), self.unwrap_base(b));
        if let (Some(x), Some(y)) = (self.byte_data(a), self.byte_data(b)) {
            return Ok(Some(x.cmp(y).into()));
        }
        if let (Some(x), Some(y)) = (self.as_str(a), self.as_str(b)) {
            return Ok(Some(x.cmp(y).into()));
        }
        if let (Value::Ref(x), Value::Ref(y)) = (a, b) {
            let pair = match (self.heap.get(x), self.heap.get(y)) {
                (HeapData::Tuple(p), HeapData::Tuple(q)) | (HeapData::List(p), HeapData::List(q)) => {
                    Some((p.clone(), q.clone()))
                }
                _ => None,
            };
            if let Some((p, q)) = pair {
                return self.compare_items(&p, &q).map(Some);
            }
        }
        Ok(None)
    }

    /// Lexicographic order: the first unequal pair decides, then the length.
    fn compare_items(&mut self, p: &[Value], q: &[Value]) -> RunResult<Comparison> {
        for (x, y) in p.iter().zip(q) {
            if x.is(y) || self.equality(*x, *y)? {
                continue;
            }
            return self.compare(*x, *y);
        }
        Ok(p.len().cmp(&q.len()).into())
    }

    fn native_equality(&mut self, a: Value, b: Value) -> RunResult<bool> {
        if a.is_none() || b.is_none() {
            return Ok(a.is_none() && b.is_none());
        }
        if let (Some(x), Some(y)) = (self.numeric(a), self.numeric(b)) {
            return Ok(numbers_equal(&x, &y));
        }
        if let Some(result) = self.char_equality(a, b) {
            return Ok(result);
        }
        let (la, lb) = (self.unwrap_base(a), self.unwrap_base(b));
        if let (Some(x), Some(y)) = (self.byte_data(la), self.byte_data(lb)) {
            return Ok(x == y);
        }
        self.bytes_comparison_warning(la, lb)?;
        if let (Some(x), Some(y)) = (self.as_str(la), self.as_str(lb)) {
            return Ok(x == y);
        }
        if let (Value::Ref(x), Value::Ref(y)) = (la, lb) {
            match (self.heap.get(x), self.heap.get(y)) {
                (HeapData::Tuple(p), HeapData::Tuple(q)) | (HeapData::List(p), HeapData::List(q)) => {
                    if p.len() != q.len() {
                        return Ok(false);
                    }
                    let (p, q) = (p.clone(), q.clone());
                    for (x, y) in p.into_iter().zip(q) {
                        if !x.is(&y) && !self.equality(x, y)? {
                            return Ok(false);
                        }
                    }
                    return Ok(true);
                }
                (HeapData::Dict(p), HeapData::Dict(q)) => {
                    if p.len() != q.len() {
                        return Ok(false);
                    }
                    let pairs: Vec<(Value, Option<Value>)> = p.iter().map(|(k, v)| (*v, q.get(k).copied())).collect();
                    for (x, y) in pairs {
                        let Some(y) = y else {
                            return Ok(false);
                        };
                        if !x.is(&y) && !self.equality(x, y)? {
                            return Ok(false);
                        }
                    }
                    return Ok(true);
                }
                _ => {}
            }
        }
        Ok(a.is(&b))
    }

    /// A managed `Char` equals another `Char` or a one-character string.
    fn char_equality(&self, a: Value, b: Value) -> Option<bool> {
        let (c, other) = match (a, b) {
            (Value::Prim(PrimValue::Char(c)), other) | (other, Value::Prim(PrimValue::Char(c))) => (c, other),
            _ => return None,
        };
        match other {
            Value::Prim(PrimValue::Char(d)) => Some(c == d),
            other => {
                let s = self.as_str(self.unwrap_base(other))?;
                let mut units = s.encode_utf16();
                Some(units.next() == Some(c) && units.next().is_none())
            }
        }
    }

    fn bytes_comparison_warning(&mut self, a: Value, b: Value) -> RunResult<()> {
        let (a_bytes, b_bytes) = (self.byte_data(a).is_some(), self.byte_data(b).is_some());
        if a_bytes == b_bytes {
            return Ok(());
        }
        let other = if a_bytes { b } else { a };
        if self.as_str(other).is_some() {
            self.check_bytes_warning("Comparison between bytes and string")
        } else if self.as_bigint(other).is_some() {
            self.check_bytes_warning("Comparison between bytes and int")
        } else {
            Ok(())
        }
    }
}

fn decimal_arith(op: BinaryOp, x: Decimal, y: Decimal) -> RunResult<Option<Value>> {
    let result = match op {
        BinaryOp::Add => x.checked_add(y),
        BinaryOp::Sub => x.checked_sub(y),
        BinaryOp::Mul => x.checked_mul(y),
        _ => return Ok(None),
    };
    result
        .map(|d| Some(Value::Prim(PrimValue::Decimal(d))))
        .ok_or_else(|| ExcType::overflow_primitive("Decimal"))
}

/// `x / y` for integers, correctly rounded. `y` is nonzero.
///
/// Operands of at most 53 bits divide as floats. Larger ones are scaled so the
/// integer quotient carries two or three bits below the float's precision, then
/// rounded half to even with the remainder as a sticky bit.
fn int_true_div(x: &BigInt, y: &BigInt) -> RunResult<f64> {
    const MANT_DIG: i64 = 53;
    const MIN_EXP: i64 = -1021;
    const MAX_EXP: i64 = 1024;

    if x.bits() <= 53 && y.bits() <= 53 {
        return Ok(big_to_f64(x) / big_to_f64(y));
    }
    let negative = x.is_negative() != y.is_negative();
    let (a, b) = (x.magnitude(), y.magnitude());
    let bit_len = |v: &num_bigint::BigUint| i64::try_from(v.bits()).unwrap_or(i64::MAX);
    let diff = bit_len(a) - bit_len(b);
    if diff > MAX_EXP {
        return Err(ExcType::overflow_int_true_division());
    }
    if diff < MIN_EXP - MANT_DIG - 1 {
        return Ok(if negative { -0.0 } else { 0.0 });
    }
    let shift = diff.max(MIN_EXP) - MANT_DIG - 2;
    let amount = usize::try_from(shift.unsigned_abs()).unwrap_or(usize::MAX);
    let (num, den) = if shift <= 0 { (a << amount, b.clone()) } else { (a.clone(), b << amount) };
    let (quotient, remainder) = num.div_rem(&den);
    let extra = (bit_len(&quotient).max(MIN_EXP - shift) - MANT_DIG).clamp(1, 63);
    let quotient = quotient
        .to_u64()
        .ok_or_else(|| RunError::internal("scaled quotient exceeds 64 bits"))?;
    let mask = 1u64 << (extra - 1);
    let mut low = quotient | u64::from(!remainder.is_zero());
    if low & mask != 0 && low & (3 * mask - 1) != 0 {
        low += mask;
    }
    let rounded = low & !(2 * mask - 1);
    let magnitude = scale_by_power_of_two(rounded as f64, shift);
    if magnitude.is_infinite() {
        return Err(ExcType::overflow_int_true_division());
    }
    Ok(if negative { -magnitude } else { magnitude })
}

/// `m * 2^e` in exact steps, so subnormal results are not rounded twice.
fn scale_by_power_of_two(mut m: f64, mut e: i64) -> f64 {
    let step = 2f64.powi(1000);
    while e > 1000 {
        m *= step;
        e -= 1000;
    }
    while e < -1000 {
        m /= step;
        e += 1000;
    }
    m * 2f64.powi(i32::try_from(e).unwrap_or(0))
}

/// Shift amount, `None` when it does not fit a `usize`.
fn shift_count(y: &BigInt) -> RunResult<Option<usize>> {
    if y.is_negative() {
        return Err(ExcType::value_error_negative_shift_count());
    }
    Ok(y.to_usize())
}

/// `x ** y` for floats; a negative base with a fractional exponent gives a complex.
fn float_pow(x: f64, y: f64) -> RunResult<Result<f64, Complex>> {
    if x == 0.0 && y < 0.0 {
        return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
    }
    if x < 0.0 && y.is_finite() && y.fract() != 0.0 {
        return Ok(Err(Complex::real_pow(x, y)));
    }
    Ok(Ok(x.powf(y)))
}

/// Floor division and modulo with the sign of the divisor.
fn float_divmod(x: f64, y: f64) -> (f64, f64) {
    let mut rem = x % y;
    let mut div = (x - rem) / y;
    if rem == 0.0 {
        rem = 0.0_f64.copysign(y);
    } else if (y < 0.0) != (rem < 0.0) {
        rem += y;
        div -= 1.0;
    }
    let floor = if div == 0.0 {
        0.0_f64.copysign(x / y)
    } else {
        let f = div.floor();
        if div - f > 0.5 { f + 1.0 } else { f }
    };
    (floor, rem)
}

fn float_cmp(x: f64, y: f64) -> Comparison {
    x.partial_cmp(&y).map_or(Comparison::Unordered, Comparison::from)
}

/// Exact comparison of an integer with a float.
fn int_float_cmp(i: &BigInt, f: f64) -> Comparison {
    if f.is_nan() {
        return Comparison::Unordered;
    }
    if f.is_infinite() {
        return if f > 0.0 { Comparison::Less } else { Comparison::Greater };
    }
    let floor = f.floor();
    let Ok(whole) = float_to_bigint(floor) else {
        return Comparison::Unordered;
    };
    match i.cmp(&whole) {
        Ordering::Equal if f > floor => Comparison::Less,
        other => other.into(),
    }
}

fn decimal_int_cmp(d: Decimal, i: &BigInt) -> Comparison {
    match Decimal::from_bigint(i) {
        Some(other) => d.cmp(&other).into(),
        None if i.is_negative() => Comparison::Greater,
        None => Comparison::Less,
    }
}

fn compare_numbers(x: &Num, y: &Num) -> Option<Comparison> {
    Some(match (x, y) {
        (Num::Complex(_), _) | (_, Num::Complex(_)) => return None,
        (Num::Int(a), Num::Int(b)) => a.cmp(b).into(),
        (Num::Int(i), Num::Float(f)) => int_float_cmp(i, *f),
        (Num::Float(f), Num::Int(i)) => int_float_cmp(i, *f).reverse(),
        (Num::Decimal(a), Num::Decimal(b)) => a.cmp(b).into(),
        (Num::Decimal(d), Num::Int(i)) => decimal_int_cmp(*d, i),
        (Num::Int(i), Num::Decimal(d)) => decimal_int_cmp(*d, i).reverse(),
        (a, b) => float_cmp(a.to_f64(), b.to_f64()),
    })
}

fn numbers_equal(x: &Num, y: &Num) -> bool {
    if matches!(x, Num::Complex(_)) || matches!(y, Num::Complex(_)) {
        return x.to_complex() == y.to_complex();
    }
    compare_numbers(x, y) == Some(Comparison::Equal)
}
