//! Text forms of numbers as Python prints them.

/// Formats a float the way Python's `repr` does.
///
/// Digits come from `ryu`'s shortest round-tripping representation; the exponent
/// form is used below `1e-4` and from `1e16` up, with a signed two-digit exponent.
#[must_use]
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_owned();
    }
    if f.is_infinite() {
        return if f.is_sign_negative() { "-inf" } else { "inf" }.to_owned();
    }
    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format_finite(f);
    let (digits, exponent) = decompose(shortest);
    let negative = f.is_sign_negative();
    let sign = if negative { "-" } else { "" };
    // `exponent` is the power of ten of the first digit.
    if (-4..16).contains(&exponent) {
        let mut out = String::from(sign);
        if exponent < 0 {
            out.push_str("0.");
            out.extend(std::iter::repeat_n('0', usize::try_from(-exponent - 1).unwrap_or(0)));
            out.push_str(&digits);
        } else {
            let int_len = usize::try_from(exponent + 1).unwrap_or(0);
            if digits.len() <= int_len {
                out.push_str(&digits);
                out.extend(std::iter::repeat_n('0', int_len - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        }
        out
    } else {
        let (first, rest) = digits.split_at(1);
        let mantissa = if rest.is_empty() {
            first.to_owned()
        } else {
            format!("{first}.{rest}")
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{mantissa}e{exp_sign}{:02}", exponent.abs())
    }
}

/// Splits ryu output into significant digits (no leading/trailing zeros) and the
/// decimal exponent of the first digit.
fn decompose(text: &str) -> (String, i32) {
    let text = text.trim_start_matches('-');
    let (mantissa, exp) = match text.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (text, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let mut digits: String = int_part.chars().chain(frac_part.chars()).collect();
    let int_len = i32::try_from(int_part.len()).unwrap_or(0);
    let leading = digits.len() - digits.trim_start_matches('0').len();
    digits.drain(..leading);
    let trimmed = digits.trim_end_matches('0').len();
    digits.truncate(trimmed);
    if digits.is_empty() {
        return ("0".to_owned(), 0);
    }
    let exponent = exp + int_len - 1 - i32::try_from(leading).unwrap_or(0);
    (digits, exponent)
}
