//! Text codecs used by `bytes(str, encoding)`, `str(bytes, encoding)` and `decode`.

use std::fmt::Write;

use crate::exception::{ExcType, RunResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Ascii,
    Latin1,
    Utf8,
    /// UTF-16 with a byte-order mark, little endian.
    Utf16,
    Utf16Le,
    Utf16Be,
}

impl Codec {
    fn lookup(encoding: &str) -> RunResult<Self> {
        let normalized: String = encoding
            .trim()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c.to_ascii_lowercase() })
            .collect();
        Ok(match normalized.as_str() {
            "ascii" | "us-ascii" | "646" => Self::Ascii,
            "latin-1" | "latin1" | "latin" | "l1" | "iso-8859-1" | "iso8859-1" | "cp819" | "8859" => Self::Latin1,
            "utf-8" | "utf8" | "u8" | "utf" | "cp65001" => Self::Utf8,
            "utf-16" | "utf16" | "u16" => Self::Utf16,
            "utf-16-le" | "utf-16le" | "utf16le" => Self::Utf16Le,
            "utf-16-be" | "utf-16be" | "utf16be" => Self::Utf16Be,
            _ => return Err(ExcType::lookup_error_unknown_encoding(encoding)),
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Latin1 => "latin-1",
            Self::Utf8 => "utf-8",
            Self::Utf16 => "utf-16",
            Self::Utf16Le => "utf-16-le",
            Self::Utf16Be => "utf-16-be",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorHandler {
    Strict,
    Ignore,
    Replace,
    BackslashReplace,
}

impl ErrorHandler {
    fn lookup(name: Option<&str>) -> RunResult<Self> {
        Ok(match name.unwrap_or("strict") {
            "strict" => Self::Strict,
            "ignore" => Self::Ignore,
            "replace" => Self::Replace,
            "backslashreplace" => Self::BackslashReplace,
            other => return Err(ExcType::lookup_error_unknown_error_handler(other)),
        })
    }
}

/// Encodes `text` with a named codec and error policy.
pub fn encode(text: &str, encoding: &str, errors: Option<&str>) -> RunResult<Vec<u8>> {
    let codec = Codec::lookup(encoding)?;
    let limit = match codec {
        Codec::Ascii => 0x7f,
        Codec::Latin1 => 0xff,
        Codec::Utf8 => return Ok(text.as_bytes().to_vec()),
        Codec::Utf16 | Codec::Utf16Le | Codec::Utf16Be => return Ok(encode_utf16(text, codec)),
    };
    let mut handler = None;
    let mut out = Vec::with_capacity(text.len());
    for (position, ch) in text.chars().enumerate() {
        if let Ok(byte) = u8::try_from(u32::from(ch))
            && u32::from(byte) <= limit
        {
            out.push(byte);
            continue;
        }
        let policy = match handler {
            Some(h) => h,
            None => *handler.insert(ErrorHandler::lookup(errors)?),
        };
        match policy {
            ErrorHandler::Strict => {
                return Err(ExcType::unicode_encode_error(
                    codec.name(),
                    ch,
                    position,
                    &format!("ordinal not in range({})", limit + 1),
                ));
            }
            ErrorHandler::Ignore => {}
            ErrorHandler::Replace => out.push(b'?'),
            ErrorHandler::BackslashReplace => {
                let code = u32::from(ch);
                let mut escaped = String::new();
                let _ = if code <= 0xff {
                    write!(escaped, "\\x{code:02x}")
                } else if code <= 0xffff {
                    write!(escaped, "\\u{code:04x}")
                } else {
                    write!(escaped, "\\U{code:08x}")
                };
                out.extend_from_slice(escaped.as_bytes());
            }
        }
    }
    Ok(out)
}

fn encode_utf16(text: &str, codec: Codec) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2 + 2);
    if codec == Codec::Utf16 {
        out.extend_from_slice(&[0xff, 0xfe]);
    }
    for unit in text.encode_utf16() {
        let pair = if codec == Codec::Utf16Be {
            unit.to_be_bytes()
        } else {
            unit.to_le_bytes()
        };
        out.extend_from_slice(&pair);
    }
    out
}

/// Decodes `data` with a named codec and error policy.
pub fn decode(data: &[u8], encoding: &str, errors: Option<&str>) -> RunResult<String> {
    let codec = Codec::lookup(encoding)?;
    match codec {
        Codec::Latin1 => Ok(data.iter().map(|&b| char::from(b)).collect()),
        Codec::Ascii => {
            let mut out = String::with_capacity(data.len());
            let mut handler = None;
            for (position, &byte) in data.iter().enumerate() {
                if byte.is_ascii() {
                    out.push(char::from(byte));
                    continue;
                }
                let policy = match handler {
                    Some(h) => h,
                    None => *handler.insert(ErrorHandler::lookup(errors)?),
                };
                decode_error(&mut out, policy, codec, byte, position, "ordinal not in range(128)")?;
            }
            Ok(out)
        }
        Codec::Utf8 => decode_utf8(data, errors),
        Codec::Utf16 | Codec::Utf16Le | Codec::Utf16Be => decode_utf16(data, codec, errors),
    }
}

fn decode_error(
    out: &mut String,
    policy: ErrorHandler,
    codec: Codec,
    byte: u8,
    position: usize,
    reason: &str,
) -> RunResult<()> {
    match policy {
        ErrorHandler::Strict => return Err(ExcType::unicode_decode_error(codec.name(), byte, position, reason)),
        ErrorHandler::Ignore => {}
        ErrorHandler::Replace => out.push('\u{fffd}'),
        ErrorHandler::BackslashReplace => {
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
    Ok(())
}

fn decode_utf8(data: &[u8], errors: Option<&str>) -> RunResult<String> {
    let mut out = String::with_capacity(data.len());
    let mut rest = data;
    let mut offset = 0;
    let mut handler = None;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return Ok(out);
            }
            Err(err) => {
                let good = err.valid_up_to();
                // The prefix was just validated.
                out.push_str(std::str::from_utf8(&rest[..good]).unwrap_or_default());
                let bad_len = err.error_len().unwrap_or(rest.len() - good);
                let reason = if err.error_len().is_some() {
                    "invalid start byte"
                } else {
                    "unexpected end of data"
                };
                let policy = match handler {
                    Some(h) => h,
                    None => *handler.insert(ErrorHandler::lookup(errors)?),
                };
                decode_error(&mut out, policy, Codec::Utf8, rest[good], offset + good, reason)?;
                if policy == ErrorHandler::BackslashReplace {
                    for &byte in &rest[good + 1..good + bad_len] {
                        let _ = write!(out, "\\x{byte:02x}");
                    }
                }
                offset += good + bad_len;
                rest = &rest[good + bad_len..];
            }
        }
    }
}

fn decode_utf16(data: &[u8], codec: Codec, errors: Option<&str>) -> RunResult<String> {
    let mut body = data;
    let mut big_endian = codec == Codec::Utf16Be;
    if codec == Codec::Utf16 {
        if body.starts_with(&[0xff, 0xfe]) {
            body = &body[2..];
        } else if body.starts_with(&[0xfe, 0xff]) {
            body = &body[2..];
            big_endian = true;
        }
    }
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            if big_endian {
                u16::from_be_bytes(pair)
            } else {
                u16::from_le_bytes(pair)
            }
        })
        .collect();
    let mut out = String::with_capacity(units.len());
    let mut handler = None;
    for (index, decoded) in char::decode_utf16(units.iter().copied()).enumerate() {
        match decoded {
            Ok(ch) => out.push(ch),
            Err(err) => {
                let policy = match handler {
                    Some(h) => h,
                    None => *handler.insert(ErrorHandler::lookup(errors)?),
                };
                let [first, _] = err.unpaired_surrogate().to_le_bytes();
                decode_error(&mut out, policy, codec, first, index * 2, "illegal encoding")?;
            }
        }
    }
    if body.len() % 2 == 1 {
        let policy = ErrorHandler::lookup(errors)?;
        let last = body[body.len() - 1];
        decode_error(&mut out, policy, codec, last, body.len() - 1, "truncated data")?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_and_round_trips() {
        assert_eq!(encode("abc", "ASCII", None).unwrap(), b"abc");
        assert_eq!(encode("\u{e9}", "latin_1", None).unwrap(), vec![0xe9]);
        assert_eq!(encode("\u{e9}", "utf8", None).unwrap(), vec![0xc3, 0xa9]);
        assert_eq!(encode("a", "utf-16", None).unwrap(), vec![0xff, 0xfe, b'a', 0]);
        assert_eq!(encode("a", "utf-16-be", None).unwrap(), vec![0, b'a']);
        assert_eq!(decode(&[0xff, 0xfe, b'a', 0], "utf-16", None).unwrap(), "a");
        assert_eq!(decode(&[0xc3, 0xa9], "utf-8", None).unwrap(), "\u{e9}");
    }

    #[test]
    fn error_policies() {
        let err = encode("a\u{e9}", "ascii", None).unwrap_err();
        assert_eq!(
            err.message(),
            Some("'ascii' codec can't encode character '\\xe9' in position 1: ordinal not in range(128)")
        );
        assert_eq!(encode("a\u{e9}", "ascii", Some("replace")).unwrap(), b"a?");
        assert_eq!(encode("a\u{e9}", "ascii", Some("ignore")).unwrap(), b"a");
        assert_eq!(decode(b"a\xff", "utf-8", Some("replace")).unwrap(), "a\u{fffd}");
        let err = decode(b"a\x80", "ascii", None).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::UnicodeDecodeError));
        let err = encode("x", "klingon", None).unwrap_err();
        assert_eq!(err.message(), Some("unknown encoding: klingon"));
        let err = encode("\u{e9}", "ascii", Some("bogus")).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::LookupError));
    }
}
