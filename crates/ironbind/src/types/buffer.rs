//! Objects exposing the buffer protocol besides `bytes`/`bytearray`.
//!
//! - [`MemoryView`]: a strided view over another object's bytes. Views over a
//!   `bytearray` hold one export on it until released.
//! - [`TypedArray`]: `array.array` with a numeric typecode, stored little endian.
//! - [`ManagedArray`]: a managed-runtime array such as `Array[Byte]`.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    exception::{ExcType, RunResult},
    heap::HeapId,
    overload::ParamType,
    types::{PrimValue, Primitive},
    value::Value,
};

/// A `memoryview` over the bytes of `source`.
///
/// Positions are in items of `itemsize` bytes: item `i` of the view is item
/// `start + i * step` of the source.
#[derive(Debug, Clone)]
pub struct MemoryView {
    /// The object owning the memory: a `bytes`, `bytearray` or `array`.
    pub source: HeapId,
    pub start: usize,
    pub step: isize,
    pub len: usize,
    pub itemsize: usize,
    pub format: char,
    pub readonly: bool,
    released: bool,
}

impl MemoryView {
    #[must_use]
    pub fn new(source: HeapId, item_count: usize, itemsize: usize, format: char, readonly: bool) -> Self {
        Self {
            source,
            start: 0,
            step: 1,
            len: item_count,
            itemsize,
            format,
            readonly,
            released: false,
        }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Marks the view released; returns true the first time only.
    pub(crate) fn release(&mut self) -> bool {
        !std::mem::replace(&mut self.released, true)
    }

    pub fn check_live(&self) -> RunResult<()> {
        if self.released {
            Err(ExcType::value_error_released_view())
        } else {
            Ok(())
        }
    }

    /// Number of bytes the view covers.
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.len * self.itemsize
    }

    /// Source item index of view item `i`.
    fn source_item(&self, i: usize) -> Option<usize> {
        let offset = isize::try_from(i).ok()?.checked_mul(self.step)?;
        self.start.checked_add_signed(offset)
    }

    /// Byte range of view item `i` within the source bytes.
    #[must_use]
    pub fn item_range(&self, i: usize) -> Option<std::ops::Range<usize>> {
        let first = self.source_item(i)? * self.itemsize;
        Some(first..first + self.itemsize)
    }

    /// Copies the viewed bytes out of the source's raw bytes, honoring the stride.
    ///
    /// Items beyond the current end of the source (it may have been written to
    /// through another path) are skipped.
    #[must_use]
    pub fn gather(&self, raw: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.nbytes());
        for i in 0..self.len {
            if let Some(range) = self.item_range(i)
                && let Some(item) = raw.get(range)
            {
                out.extend_from_slice(item);
            }
        }
        out
    }

    /// A sub-view selecting `count` items starting at view item `first`, every `step` items.
    #[must_use]
    pub fn subview(&self, first: usize, step: isize, count: usize) -> Self {
        let start = self.source_item(first).unwrap_or(self.start);
        Self {
            source: self.source,
            start,
            step: self.step * step,
            len: count,
            itemsize: self.itemsize,
            format: self.format,
            readonly: self.readonly,
            released: false,
        }
    }
}

/// Decoded element of a typed array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrayItem {
    Int(i128),
    Float(f64),
}

/// `array.array(typecode, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedArray {
    typecode: char,
    data: Vec<u8>,
}

impl TypedArray {
    pub fn new(typecode: char) -> RunResult<Self> {
        if Self::itemsize_of(typecode).is_none() {
            return Err(ExcType::value_error(
                "bad typecode (must be b, B, h, H, i, I, l, L, q, Q, f or d)",
            ));
        }
        Ok(Self {
            typecode,
            data: Vec::new(),
        })
    }

    fn itemsize_of(typecode: char) -> Option<usize> {
        Some(match typecode {
            'b' | 'B' => 1,
            'h' | 'H' => 2,
            'i' | 'I' | 'l' | 'L' | 'f' => 4,
            'q' | 'Q' | 'd' => 8,
            _ => return None,
        })
    }

    #[must_use]
    pub fn typecode(&self) -> char {
        self.typecode
    }

    #[must_use]
    pub fn itemsize(&self) -> usize {
        Self::itemsize_of(self.typecode).unwrap_or(1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.itemsize()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw little-endian storage.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self.typecode, 'f' | 'd')
    }

    /// Appends an integer, checking it against the typecode's range.
    pub fn push_int(&mut self, value: &BigInt) -> RunResult<()> {
        let typecode = self.typecode;
        let out_of_range = || {
            let side = if value.sign() == num_bigint::Sign::Minus {
                "less than minimum"
            } else {
                "greater than maximum"
            };
            ExcType::overflow_error(format!("array item of typecode '{typecode}' is {side}"))
        };
        match self.typecode {
            'b' => self.data.push(value.to_i8().ok_or_else(out_of_range)?.to_le_bytes()[0]),
            'B' => self.data.push(value.to_u8().ok_or_else(out_of_range)?),
            'h' => self
                .data
                .extend_from_slice(&value.to_i16().ok_or_else(out_of_range)?.to_le_bytes()),
            'H' => self
                .data
                .extend_from_slice(&value.to_u16().ok_or_else(out_of_range)?.to_le_bytes()),
            'i' | 'l' => self
                .data
                .extend_from_slice(&value.to_i32().ok_or_else(out_of_range)?.to_le_bytes()),
            'I' | 'L' => self
                .data
                .extend_from_slice(&value.to_u32().ok_or_else(out_of_range)?.to_le_bytes()),
            'q' => self
                .data
                .extend_from_slice(&value.to_i64().ok_or_else(out_of_range)?.to_le_bytes()),
            'Q' => self
                .data
                .extend_from_slice(&value.to_u64().ok_or_else(out_of_range)?.to_le_bytes()),
            _ => return self.push_float(value.to_f64().unwrap_or(f64::INFINITY)),
        }
        Ok(())
    }

    #[expect(clippy::cast_possible_truncation, reason = "typecode 'f' stores single precision")]
    pub fn push_float(&mut self, value: f64) -> RunResult<()> {
        match self.typecode {
            'f' => self.data.extend_from_slice(&(value as f32).to_le_bytes()),
            'd' => self.data.extend_from_slice(&value.to_le_bytes()),
            _ => return Err(ExcType::type_error("integer argument expected, got float")),
        }
        Ok(())
    }

    /// Decodes item `i`.
    #[must_use]
    pub fn item(&self, i: usize) -> Option<ArrayItem> {
        let size = self.itemsize();
        let raw = self.data.get(i * size..(i + 1) * size)?;
        Some(decode_item(self.typecode, raw))
    }
}

/// Decodes one little-endian item of `typecode`.
#[must_use]
pub fn decode_item(typecode: char, raw: &[u8]) -> ArrayItem {
    let mut buf = [0u8; 8];
    let n = raw.len().min(8);
    buf[..n].copy_from_slice(&raw[..n]);
    match typecode {
        'b' => ArrayItem::Int(i128::from(i8::from_le_bytes([buf[0]]))),
        'h' => ArrayItem::Int(i128::from(i16::from_le_bytes([buf[0], buf[1]]))),
        'H' => ArrayItem::Int(i128::from(u16::from_le_bytes([buf[0], buf[1]]))),
        'i' | 'l' => ArrayItem::Int(i128::from(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))),
        'I' | 'L' => ArrayItem::Int(i128::from(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))),
        'q' => ArrayItem::Int(i128::from(i64::from_le_bytes(buf))),
        'Q' => ArrayItem::Int(i128::from(u64::from_le_bytes(buf))),
        'f' => ArrayItem::Float(f64::from(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))),
        'd' => ArrayItem::Float(f64::from_le_bytes(buf)),
        _ => ArrayItem::Int(i128::from(buf[0])),
    }
}

/// A managed-runtime array, e.g. the `Byte[]` a `bytes` argument is copied into.
#[derive(Debug, Clone)]
pub struct ManagedArray {
    pub elem: ParamType,
    pub items: Vec<Value>,
}

impl ManagedArray {
    #[must_use]
    pub fn new(elem: ParamType, items: Vec<Value>) -> Self {
        Self { elem, items }
    }

    /// Builds a `Byte[]` from raw bytes.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            elem: ParamType::Primitive(Primitive::Byte),
            items: data.iter().map(|b| Value::Prim(PrimValue::Byte(*b))).collect(),
        }
    }

    /// Raw bytes of a `Byte[]`; `None` for other element types.
    #[must_use]
    pub fn byte_buffer(&self) -> Option<Vec<u8>> {
        if self.elem != ParamType::Primitive(Primitive::Byte) {
            return None;
        }
        self.items
            .iter()
            .map(|v| match v {
                Value::Prim(PrimValue::Byte(b)) => Some(*b),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{Heap, HeapData};

    #[test]
    fn typed_array_storage() {
        let mut arr = TypedArray::new('H').unwrap();
        arr.push_int(&BigInt::from(0x0102)).unwrap();
        arr.push_int(&BigInt::from(65535)).unwrap();
        assert_eq!(arr.as_bytes(), &[0x02, 0x01, 0xff, 0xff]);
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.item(1), Some(ArrayItem::Int(65535)));
        let err = arr.push_int(&BigInt::from(-1)).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::OverflowError));
        assert!(TypedArray::new('z').is_err());

        let mut floats = TypedArray::new('d').unwrap();
        floats.push_float(1.5).unwrap();
        assert_eq!(floats.item(0), Some(ArrayItem::Float(1.5)));
    }

    #[test]
    fn strided_views() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapData::Str(String::new()));
        let view = MemoryView::new(id, 6, 1, 'B', false);
        let raw = b"abcdef";
        assert_eq!(view.gather(raw), b"abcdef");
        let every_other = view.subview(1, 2, 3);
        assert_eq!(every_other.gather(raw), b"bdf");
        let reversed = view.subview(5, -1, 6);
        assert_eq!(reversed.gather(raw), b"fedcba");
        let nested = every_other.subview(2, -1, 2);
        assert_eq!(nested.gather(raw), b"fd");
    }

    #[test]
    fn release_is_idempotent() {
        let mut heap = Heap::new();
        let id = heap.allocate(HeapData::Str(String::new()));
        let mut view = MemoryView::new(id, 0, 1, 'B', true);
        assert!(view.release());
        assert!(!view.release());
        assert!(view.check_live().is_err());
    }

    #[test]
    fn byte_arrays() {
        let arr = ManagedArray::from_bytes(b"\x01\x02");
        assert_eq!(arr.byte_buffer(), Some(vec![1, 2]));
        let ints = ManagedArray::new(ParamType::Primitive(Primitive::Int32), vec![Value::Int(1)]);
        assert!(ints.byte_buffer().is_none());
    }
}
