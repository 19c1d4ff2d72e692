//! Literal value parsing: string escapes, integers, hex floats.
//!
//! Token text arrives verbatim from the lexer; these helpers turn it into
//! values. Double literals accept `NaN`, `Inf` and `0x...p...` hex floats
//! in addition to ordinary decimal notation.

/// Decode a string literal token (including quotes and the optional
/// raw-mode `r`/`R` prefix).
pub fn unescape(raw: &str) -> Result<String, String> {
    let (body, raw_mode) = if let Some(rest) = raw.strip_prefix(['r', 'R']) {
        (rest, true)
    } else {
        (raw, false)
    };
    let body = body
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| format!("malformed string literal: {raw}"))?;

    if raw_mode {
        return Ok(body.to_owned());
    }

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let esc = chars
            .next()
            .ok_or_else(|| "trailing backslash in string literal".to_owned())?;
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'x' => out.push(hex_escape(&mut chars, 2)?),
            'u' => out.push(hex_escape(&mut chars, 4)?),
            other => return Err(format!("unknown escape sequence: \\{other}")),
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, digits: usize) -> Result<char, String> {
    let mut value = 0u32;
    for _ in 0..digits {
        let d = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| "truncated hex escape".to_owned())?;
        value = value * 16 + d;
    }
    char::from_u32(value).ok_or_else(|| format!("invalid character escape: {value:#x}"))
}

/// Parse a signed integer literal: decimal or `0x` hex, optional minus.
pub fn parse_int(text: &str) -> Result<i64, String> {
    let (digits, negative) = match text.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (text, false),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).map_err(|e| e.to_string())?
    } else {
        digits.parse::<i64>().map_err(|e| e.to_string())?
    };
    Ok(if negative { -value } else { value })
}

/// Parse a long literal: an integer literal with an `l`/`L` suffix.
pub fn parse_long(text: &str) -> Result<i64, String> {
    let body = text
        .strip_suffix(['l', 'L'])
        .ok_or_else(|| format!("long literal without suffix: {text}"))?;
    parse_int(body)
}

/// Parse a double literal: `NaN`, signed `Inf`, decimal with optional
/// exponent, or a `0x...p...` hex float.
pub fn parse_double(text: &str) -> Result<f64, String> {
    if text == "NaN" {
        return Ok(f64::NAN);
    }
    let (body, sign) = match text.strip_prefix('-') {
        Some(rest) => (rest, -1.0),
        None => (text.strip_prefix('+').unwrap_or(text), 1.0),
    };
    if body == "Inf" {
        return Ok(sign * f64::INFINITY);
    }
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        return parse_hex_float(hex).map(|v| sign * v);
    }
    body.parse::<f64>()
        .map(|v| sign * v)
        .map_err(|e| e.to_string())
}

/// Parse a float literal: a double literal with an `f`/`F` suffix.
pub fn parse_float(text: &str) -> Result<f32, String> {
    let body = text
        .strip_suffix(['f', 'F'])
        .ok_or_else(|| format!("float literal without suffix: {text}"))?;
    parse_double(body).map(|v| v as f32)
}

/// Hex float body: `H.HHHpE` with a power-of-two exponent.
fn parse_hex_float(body: &str) -> Result<f64, String> {
    let (mantissa, exponent) = body
        .split_once(['p', 'P'])
        .ok_or_else(|| format!("hex float without exponent: 0x{body}"))?;
    let exponent = exponent.parse::<i32>().map_err(|e| e.to_string())?;
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let mut value = 0.0f64;
    for c in int_part.chars() {
        let d = c.to_digit(16).ok_or_else(|| format!("bad hex digit: {c}"))?;
        value = value * 16.0 + d as f64;
    }
    let mut scale = 1.0f64 / 16.0;
    for c in frac_part.chars() {
        let d = c.to_digit(16).ok_or_else(|| format!("bad hex digit: {c}"))?;
        value += d as f64 * scale;
        scale /= 16.0;
    }
    Ok(value * 2f64.powi(exponent))
}
