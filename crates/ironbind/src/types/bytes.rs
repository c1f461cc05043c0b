//! Byte sequences: immutable `bytes` and mutable `bytearray`.
//!
//! The storage types here are plain data. Search and transformation helpers are
//! free functions over `&[u8]` so both variants (and buffer views) share them; the
//! Python-facing method surface lives in [`crate::methods`].

use std::fmt::Write;

use crate::exception::{ExcType, RunResult};

/// Python bytes value stored on the heap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Bytes(Vec<u8>);

impl Bytes {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

/// Python bytearray value stored on the heap.
///
/// `exports` counts live buffer views. While it is non-zero any operation that
/// would resize the storage fails; same-length writes stay allowed and are visible
/// through the views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteArray {
    data: Vec<u8>,
    exports: usize,
}

impl ByteArray {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, exports: 0 }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for same-length writes; never resizes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn exports(&self) -> usize {
        self.exports
    }

    pub(crate) fn add_export(&mut self) {
        self.exports += 1;
    }

    pub(crate) fn release_export(&mut self) {
        self.exports = self.exports.saturating_sub(1);
    }

    /// Fails with `BufferError` while views are exported.
    pub fn check_resizable(&self) -> RunResult<()> {
        if self.exports > 0 {
            Err(ExcType::buffer_error_resize())
        } else {
            Ok(())
        }
    }

    /// Returns the storage for a resizing operation, after checking exports.
    pub fn resizable(&mut self) -> RunResult<&mut Vec<u8>> {
        self.check_resizable()?;
        Ok(&mut self.data)
    }
}

/// Resolves `start`/`end` arguments of the search methods.
///
/// Returns `None` when `start` lies beyond the sequence, which makes every search
/// fail even for an empty needle (`b"abc".find(b"", 4)` is -1), and an empty
/// window when `start > end` (`find(b"", 3, 0)` is -1 too, via the window check).
pub(crate) fn search_window(len: usize, start: Option<i64>, end: Option<i64>) -> Option<(usize, usize)> {
    let clamp = |index: i64| -> usize {
        if index < 0 {
            let back = usize::try_from(index.unsigned_abs()).unwrap_or(usize::MAX);
            len.saturating_sub(back)
        } else {
            usize::try_from(index).unwrap_or(usize::MAX).min(len)
        }
    };
    let raw_start = start.unwrap_or(0);
    if raw_start > 0 && usize::try_from(raw_start).map_or(true, |s| s > len) {
        return None;
    }
    let start = clamp(raw_start);
    let end = end.map_or(len, clamp);
    if start > end {
        return None;
    }
    Some((start, end))
}

/// Lowest index of `needle` within `haystack[start..end]`, as an index into `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8], start: Option<i64>, end: Option<i64>) -> Option<usize> {
    let (start, end) = search_window(haystack.len(), start, end)?;
    let window = &haystack[start..end];
    if needle.is_empty() {
        return Some(start);
    }
    window
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| start + i)
}

/// Highest index of `needle` within `haystack[start..end]`.
pub(crate) fn rfind(haystack: &[u8], needle: &[u8], start: Option<i64>, end: Option<i64>) -> Option<usize> {
    let (start, end) = search_window(haystack.len(), start, end)?;
    let window = &haystack[start..end];
    if needle.is_empty() {
        return Some(end);
    }
    window
        .windows(needle.len())
        .rposition(|w| w == needle)
        .map(|i| start + i)
}

/// Number of non-overlapping occurrences of `needle` within `haystack[start..end]`.
pub(crate) fn count(haystack: &[u8], needle: &[u8], start: Option<i64>, end: Option<i64>) -> usize {
    let Some((start, end)) = search_window(haystack.len(), start, end) else {
        return 0;
    };
    let window = &haystack[start..end];
    if needle.is_empty() {
        return window.len() + 1;
    }
    let mut found = 0;
    let mut pos = 0;
    while pos + needle.len() <= window.len() {
        if &window[pos..pos + needle.len()] == needle {
            found += 1;
            pos += needle.len();
        } else {
            pos += 1;
        }
    }
    found
}

/// `startswith`/`endswith` for one candidate affix.
pub(crate) fn has_affix(haystack: &[u8], affix: &[u8], start: Option<i64>, end: Option<i64>, suffix: bool) -> bool {
    let Some((start, end)) = search_window(haystack.len(), start, end) else {
        return false;
    };
    let window = &haystack[start..end];
    if suffix {
        window.ends_with(affix)
    } else {
        window.starts_with(affix)
    }
}

/// Splits at the first occurrence of `sep`: `(head, sep, tail)`, or `(all, "", "")`.
pub(crate) fn partition<'a>(data: &'a [u8], sep: &'a [u8]) -> RunResult<(&'a [u8], &'a [u8], &'a [u8])> {
    if sep.is_empty() {
        return Err(ExcType::value_error_empty_separator());
    }
    Ok(match find(data, sep, None, None) {
        Some(i) => (&data[..i], sep, &data[i + sep.len()..]),
        None => (data, &[], &[]),
    })
}

/// Splits at the last occurrence of `sep`: `(head, sep, tail)`, or `("", "", all)`.
pub(crate) fn rpartition<'a>(data: &'a [u8], sep: &'a [u8]) -> RunResult<(&'a [u8], &'a [u8], &'a [u8])> {
    if sep.is_empty() {
        return Err(ExcType::value_error_empty_separator());
    }
    Ok(match rfind(data, sep, None, None) {
        Some(i) => (&data[..i], sep, &data[i + sep.len()..]),
        None => (&[], &[], data),
    })
}

/// Maps every byte through `table` (when given) after dropping the bytes in `delete`.
pub(crate) fn translate(data: &[u8], table: Option<&[u8]>, delete: &[u8]) -> RunResult<Vec<u8>> {
    if let Some(table) = table
        && table.len() != 256
    {
        return Err(ExcType::value_error_translation_table());
    }
    Ok(data
        .iter()
        .filter(|b| !delete.contains(b))
        .map(|&b| table.map_or(b, |t| t[usize::from(b)]))
        .collect())
}

/// Lowercase hex digits, optionally grouped with a separator every `group` bytes
/// counted from the right.
pub(crate) fn hex(data: &[u8], sep: Option<char>, group: usize) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    let group = group.max(1);
    for (i, byte) in data.iter().enumerate() {
        if let Some(sep) = sep
            && i > 0
            && (data.len() - i) % group == 0
        {
            out.push(sep);
        }
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// CPython-compatible repr of byte data: `b'...'` with `\xNN` escapes.
///
/// Uses single quotes by default, and double quotes if the data contains `'` but
/// not `"`.
#[must_use]
pub fn bytes_repr(data: &[u8]) -> String {
    let has_single = data.contains(&b'\'');
    let has_double = data.contains(&b'"');
    let quote = if has_single && !has_double { '"' } else { '\'' };

    let mut out = String::with_capacity(data.len() + 3);
    out.push('b');
    out.push(quote);
    for &byte in data {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'\t' => out.push_str("\\t"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\'' if quote == '\'' => out.push_str("\\'"),
            0x20..=0x7e => out.push(char::from(byte)),
            _ => {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
    }
    out.push(quote);
    out
}

/// Resolved `start:stop:step` of a slice over a sequence of a given length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceIndices {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
    pub len: usize,
}

impl SliceIndices {
    /// CPython's `PySlice_AdjustIndices` over already-converted bounds.
    pub fn adjust(seq_len: usize, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> RunResult<Self> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err(ExcType::value_error_slice_step_zero());
        }
        let length = i64::try_from(seq_len).unwrap_or(i64::MAX);
        let (lower, upper) = if step < 0 { (-1, length - 1) } else { (0, length) };
        let adjust = |bound: Option<i64>, default: i64| match bound {
            None => default,
            Some(v) if v < 0 => (v + length).max(lower),
            Some(v) => v.min(upper),
        };
        let start = adjust(start, if step < 0 { upper } else { lower });
        let stop = adjust(stop, if step < 0 { lower } else { upper });
        let len = if step < 0 {
            if stop < start { (start - stop - 1) / (-step) + 1 } else { 0 }
        } else if start < stop {
            (stop - start - 1) / step + 1
        } else {
            0
        };
        Ok(Self {
            start,
            stop,
            step,
            len: usize::try_from(len).unwrap_or(0),
        })
    }

    /// The selected positions, in slice order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter_map(move |i| {
            let offset = i64::try_from(i).ok()?;
            usize::try_from(self.start + offset * self.step).ok()
        })
    }

    /// Applies the slice to a byte slice.
    #[must_use]
    pub fn select(&self, data: &[u8]) -> Vec<u8> {
        self.positions().filter_map(|i| data.get(i).copied()).collect()
    }
}

/// Normalizes a single Python index, returning `None` when out of range.
#[must_use]
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let length = i64::try_from(len).ok()?;
    let normalized = if index < 0 { index + length } else { index };
    if (0..length).contains(&normalized) {
        usize::try_from(normalized).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_clamping() {
        assert_eq!(find(b"abc", b"", Some(3), Some(0)), None);
        assert_eq!(find(b"abc", b"", Some(-10), Some(3)), Some(0));
        assert_eq!(find(b"abc", b"", Some(4), None), None);
        assert_eq!(find(b"abc", b"", Some(3), None), Some(3));
        assert_eq!(find(b"abcabc", b"bc", Some(2), None), Some(4));
        assert_eq!(rfind(b"abcabc", b"bc", None, Some(-1)), Some(1));
        assert_eq!(rfind(b"abc", b"", None, None), Some(3));
    }

    #[test]
    fn counts_are_non_overlapping() {
        assert_eq!(count(b"aaaa", b"aa", None, None), 2);
        assert_eq!(count(b"abc", b"", None, None), 4);
        assert_eq!(count(b"abc", b"a", Some(5), None), 0);
    }

    #[test]
    fn partitions() {
        assert_eq!(
            partition(b"a,b,c", b",").unwrap(),
            (&b"a"[..], &b","[..], &b"b,c"[..])
        );
        assert_eq!(
            rpartition(b"a,b,c", b",").unwrap(),
            (&b"a,b"[..], &b","[..], &b"c"[..])
        );
        assert_eq!(rpartition(b"abc", b"x").unwrap(), (&b""[..], &b""[..], &b"abc"[..]));
        let err = partition(b"abc", b"").unwrap_err();
        assert_eq!(err.message(), Some("empty separator"));
    }

    #[test]
    fn translate_table_and_delete() {
        let mut table: Vec<u8> = (0..=255).collect();
        table[usize::from(b'a')] = b'A';
        assert_eq!(translate(b"abca", Some(&table), b"b").unwrap(), b"AcA");
        assert_eq!(translate(b"abc", None, b"c").unwrap(), b"ab");
        assert!(translate(b"abc", Some(b"short"), b"").is_err());
    }

    #[test]
    fn repr_and_hex() {
        assert_eq!(bytes_repr(b"ab\x00'"), "b\"ab\\x00'\"");
        assert_eq!(bytes_repr(b"a\n"), "b'a\\n'");
        assert_eq!(hex(b"\x01\xab\xff", None, 1), "01abff");
        assert_eq!(hex(b"\x01\xab\xff", Some(':'), 2), "01:abff");
    }

    #[test]
    fn slices() {
        let s = SliceIndices::adjust(5, None, None, Some(-2)).unwrap();
        assert_eq!(s.select(b"abcde"), b"eca");
        let s = SliceIndices::adjust(5, Some(1), Some(100), None).unwrap();
        assert_eq!(s.len, 4);
        assert!(SliceIndices::adjust(5, None, None, Some(0)).is_err());
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
    }

    #[test]
    fn exports_block_resize() {
        let mut ba = ByteArray::new(b"abc".to_vec());
        ba.add_export();
        let err = ba.resizable().unwrap_err();
        assert_eq!(
            err.message(),
            Some("Existing exports of data: object cannot be re-sized")
        );
        ba.as_mut_slice()[0] = b'x';
        ba.release_export();
        ba.resizable().unwrap().push(b'd');
        assert_eq!(ba.as_slice(), b"xbcd");
    }
}
