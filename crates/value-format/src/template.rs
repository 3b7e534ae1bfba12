//! printf-style rendering of a single numeric argument.
//!
//! Supported: `%[flags][width][.precision]conv` with flags `-`, `0`, `+`, space
//! and `,` (digit grouping), and conversions `d i x X o f e E s`, plus `%%` and
//! `%n`. Integer conversions only accept integers and float conversions only
//! accept floats; a mismatch is an error rather than a silent cast.

use crate::RenderError;

/// Largest accepted field width or precision.
const MAX_FIELD: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
}

impl Arg {
    fn type_name(&self) -> &'static str {
        match self {
            Arg::Int(_) => "integer",
            Arg::Float(_) => "float",
        }
    }
}

#[derive(Default, Debug)]
struct Directive {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    group: bool,
    width: usize,
    precision: Option<usize>,
}

/// Render `template` with `arg` substituted for its (single) conversion.
pub fn render(template: &str, arg: Arg) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len() + 8);
    let mut arg = Some(arg);
    let mut chars = template.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut dir = Directive::default();
        while let Some(&(_, f)) = chars.peek() {
            match f {
                '-' => dir.left = true,
                '0' => dir.zero = true,
                '+' => dir.plus = true,
                ' ' => dir.space = true,
                ',' => dir.group = true,
                _ => break,
            }
            chars.next();
        }
        dir.width = take_number(&mut chars).unwrap_or(0);
        if let Some(&(_, '.')) = chars.peek() {
            chars.next();
            dir.precision = Some(take_number(&mut chars).unwrap_or(0));
        }
        if dir.width > MAX_FIELD || dir.precision.is_some_and(|p| p > MAX_FIELD) {
            return Err(RenderError::InvalidTemplate(format!(
                "width or precision above {MAX_FIELD} in {:?}",
                &template[start..]
            )));
        }
        let (end, conv) = match chars.next() {
            Some((i, conv)) => (i + conv.len_utf8(), conv),
            None => return Err(RenderError::UnknownConversion(template[start..].to_string())),
        };
        match conv {
            '%' => out.push_str(&pad(&dir, "", "%")),
            'n' => out.push('\n'),
            'd' | 'i' | 'x' | 'X' | 'o' | 'f' | 'e' | 'E' | 's' => {
                let value = arg
                    .take()
                    .ok_or_else(|| RenderError::MissingArgument(template[start..end].to_string()))?;
                out.push_str(&convert(&dir, conv, value)?);
            }
            _ => return Err(RenderError::UnknownConversion(template[start..end].to_string())),
        }
    }
    Ok(out)
}

fn take_number(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(&(_, d)) = chars.peek() {
        let Some(digit) = d.to_digit(10) else { break };
        n = Some(n.unwrap_or(0).saturating_mul(10).saturating_add(digit as usize));
        chars.next();
    }
    n
}

fn convert(dir: &Directive, conv: char, arg: Arg) -> Result<String, RenderError> {
    let illegal = || RenderError::IllegalConversion {
        conversion: conv,
        argument: arg.type_name(),
    };
    match (conv, arg) {
        ('d' | 'i', Arg::Int(v)) => {
            let mut digits = v.unsigned_abs().to_string();
            if dir.group {
                digits = group_thousands(&digits);
            }
            Ok(pad(dir, sign(dir, v < 0), &digits))
        }
        ('x', Arg::Int(v)) => Ok(pad(dir, "", &format!("{v:x}"))),
        ('X', Arg::Int(v)) => Ok(pad(dir, "", &format!("{v:X}"))),
        ('o', Arg::Int(v)) => Ok(pad(dir, "", &format!("{v:o}"))),
        ('f', Arg::Float(v)) => {
            if !v.is_finite() {
                return Ok(pad_text(dir, non_finite(v)));
            }
            let precision = dir.precision.unwrap_or(6);
            let mut body = format!("{:.*}", precision, v.abs());
            if dir.group {
                body = match body.split_once('.') {
                    Some((int, frac)) => format!("{}.{frac}", group_thousands(int)),
                    None => group_thousands(&body),
                };
            }
            Ok(pad(dir, sign(dir, v.is_sign_negative() && v != 0.0), &body))
        }
        ('e' | 'E', Arg::Float(v)) => {
            if !v.is_finite() {
                return Ok(pad_text(dir, non_finite(v)));
            }
            let precision = dir.precision.unwrap_or(6);
            let body = scientific(v.abs(), precision, conv == 'E');
            Ok(pad(dir, sign(dir, v.is_sign_negative() && v != 0.0), &body))
        }
        ('s', _) => {
            let mut text = match arg {
                Arg::Int(v) => v.to_string(),
                Arg::Float(v) => v.to_string(),
            };
            if let Some(p) = dir.precision {
                text = text.chars().take(p).collect();
            }
            Ok(pad_text(dir, &text))
        }
        _ => Err(illegal()),
    }
}

fn sign(dir: &Directive, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if dir.plus {
        "+"
    } else if dir.space {
        " "
    } else {
        ""
    }
}

fn non_finite(v: f64) -> &'static str {
    if v.is_nan() {
        "NaN"
    } else if v > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// `1.570000e+01` style, with at least two exponent digits.
fn scientific(v: f64, precision: usize, upper: bool) -> String {
    let raw = format!("{:.*e}", precision, v);
    let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let exp_sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{exp_sign}{:02}", exp.unsigned_abs())
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Pad a signed numeric body to the directive width.
fn pad(dir: &Directive, sign: &str, body: &str) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= dir.width {
        return format!("{sign}{body}");
    }
    let fill = dir.width - len;
    if dir.left {
        format!("{sign}{body}{}", " ".repeat(fill))
    } else if dir.zero {
        format!("{sign}{}{body}", "0".repeat(fill))
    } else {
        format!("{}{sign}{body}", " ".repeat(fill))
    }
}

fn pad_text(dir: &Directive, text: &str) -> String {
    let len = text.chars().count();
    if len >= dir.width {
        return text.to_string();
    }
    let fill = " ".repeat(dir.width - len);
    if dir.left {
        format!("{text}{fill}")
    } else {
        format!("{fill}{text}")
    }
}
