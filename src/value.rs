use std::fmt;

/// The tagged runtime value. `Undefined` is the sentinel a declared-but
/// unassigned variable holds; it is never handed to an opcode by the
/// default operand reader (see `operand::Operand::read`).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Undefined,
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// The name `TYPE` reports for this value, `""` for `Undefined`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Undefined => "",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            // Bool must be checked ahead of any numeric formatting path,
            // since bool and int are otherwise easy to conflate.
            Value::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_hexfloat(*x)),
            Value::String(s) => write!(f, "{}", s),
            Value::Nil | Value::Undefined => Ok(()),
        }
    }
}

/// Formats `x` as a C `%a`-style hexadecimal float, e.g.
/// `0x1.921fb54442d18p+1` — the same textual form float literals use on
/// input, so `WRITE` output re-parses losslessly.
pub fn format_hexfloat(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x.is_sign_negative() { "-inf" } else { "inf" }.to_string();
    }

    let bits = x.to_bits();
    let sign = (bits >> 63) & 1 == 1;
    let exp_bits = ((bits >> 52) & 0x7ff) as i64;
    let mantissa = bits & 0xF_FFFF_FFFF_FFFF;
    let sign_str = if sign { "-" } else { "" };

    if exp_bits == 0 && mantissa == 0 {
        return format!("{}0x0p+0", sign_str);
    }

    let (leading, exp) = if exp_bits == 0 {
        (0u64, -1022i64)
    } else {
        (1u64, exp_bits - 1023)
    };

    let mantissa_hex = format!("{:013x}", mantissa);
    let trimmed = mantissa_hex.trim_end_matches('0');
    let frac = if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{}", trimmed)
    };

    let exp_str = if exp >= 0 {
        format!("+{}", exp)
    } else {
        format!("{}", exp)
    };

    format!("{}0x{}{}p{}", sign_str, leading, frac, exp_str)
}

/// Parses the same hexadecimal-float textual form `format_hexfloat` emits.
pub fn parse_hexfloat(s: &str) -> Option<f64> {
    let s = s.trim();
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let rest = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X"))?;
    let p_pos = rest.find(|c| c == 'p' || c == 'P')?;
    let (mantissa_part, exp_part) = rest.split_at(p_pos);
    let exp: i32 = exp_part[1..].parse().ok()?;

    let (int_part, frac_part) = match mantissa_part.find('.') {
        Some(dot) => (&mantissa_part[..dot], &mantissa_part[dot + 1..]),
        None => (mantissa_part, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let int_val: u64 = if int_part.is_empty() {
        0
    } else {
        u64::from_str_radix(int_part, 16).ok()?
    };

    let mut mantissa = int_val as f64;
    let mut scale = 1.0f64 / 16.0;
    for c in frac_part.chars() {
        let digit = c.to_digit(16)? as f64;
        mantissa += digit * scale;
        scale /= 16.0;
    }

    let value = mantissa * 2f64.powi(exp);
    Some(if neg { -value } else { value })
}
