//! Comparison values and their storage-class view.
//!
//! [`Scalar`] and [`PredicateValue`] are what callers hand to a predicate.
//! [`SqlValue`] is what both evaluation paths actually compare: the row store
//! sees bound arguments and `json_extract` results as SQLite storage classes,
//! and the in-memory evaluator reduces entity attributes to the same classes
//! so the two paths order and match values identically.

use std::cmp::Ordering;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Single literal a predicate compares against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean literal, bound as the integer 0 or 1.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    Text(String),
}

impl Scalar {
    /// Returns the numeric value for integer and float literals.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text for string literals.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// True for finite integer and float literals.
    pub fn is_numeric(&self) -> bool {
        match self {
            Scalar::Int(_) => true,
            Scalar::Float(v) => v.is_finite(),
            _ => false,
        }
    }

    /// True unless the literal is a NaN or infinite float.
    pub fn is_finite(&self) -> bool {
        !matches!(self, Scalar::Float(v) if !v.is_finite())
    }
}

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Scalar::Bool(b) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*b))),
            Scalar::Int(v) => ToSqlOutput::Owned(SqliteValue::Integer(*v)),
            Scalar::Float(v) => ToSqlOutput::Owned(SqliteValue::Real(*v)),
            Scalar::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Value attached to a predicate: a single literal or an ordered list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    /// Single literal.
    Scalar(Scalar),
    /// Ordered sequence of literals (bounds for ranges, members for `in`).
    List(Vec<Scalar>),
}

impl PredicateValue {
    /// Returns the literal when the value is a scalar.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            PredicateValue::Scalar(s) => Some(s),
            PredicateValue::List(_) => None,
        }
    }

    /// Returns the members when the value is a list.
    pub fn as_list(&self) -> Option<&[Scalar]> {
        match self {
            PredicateValue::Scalar(_) => None,
            PredicateValue::List(items) => Some(items),
        }
    }
}

impl From<Scalar> for PredicateValue {
    fn from(value: Scalar) -> Self {
        PredicateValue::Scalar(value)
    }
}

macro_rules! impl_scalar_from {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from($v: $ty) -> Self {
                    $body
                }
            }

            impl From<$ty> for PredicateValue {
                fn from(value: $ty) -> Self {
                    PredicateValue::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

impl_scalar_from! {
    bool => |v| Scalar::Bool(v),
    i32 => |v| Scalar::Int(i64::from(v)),
    u32 => |v| Scalar::Int(i64::from(v)),
    i64 => |v| Scalar::Int(v),
    f32 => |v| Scalar::Float(f64::from(v)),
    f64 => |v| Scalar::Float(v),
    &str => |v| Scalar::Text(v.to_owned()),
    String => |v| Scalar::Text(v),
}

impl<T: Into<Scalar>> From<Vec<T>> for PredicateValue {
    fn from(values: Vec<T>) -> Self {
        PredicateValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Scalar>, const N: usize> From<[T; N]> for PredicateValue {
    fn from(values: [T; N]) -> Self {
        PredicateValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Column affinity of a resolved property location.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Affinity {
    /// Declared `TEXT` column: numeric operands compare as their text form.
    Text,
    /// Expression without affinity (`json_extract`, `json_each.value`).
    None,
}

/// SQLite storage class of a value as seen by the row store.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`; also what a missing JSON path extracts to.
    Null,
    /// `INTEGER` storage class (booleans land here as 0/1).
    Integer(i64),
    /// `REAL` storage class.
    Real(f64),
    /// `TEXT` storage class (arrays and objects extract as compact JSON text).
    Text(String),
}

impl SqlValue {
    /// Mirrors `json_extract` on the JSON value found at a path.
    pub fn from_json(value: Option<&Json>) -> Self {
        match value {
            None | Some(Json::Null) => SqlValue::Null,
            Some(Json::Bool(b)) => SqlValue::Integer(i64::from(*b)),
            Some(Json::Number(n)) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
            },
            Some(Json::String(s)) => SqlValue::Text(s.clone()),
            Some(other) => SqlValue::Text(other.to_string()),
        }
    }

    /// Mirrors how a [`Scalar`] is bound as a statement argument.
    pub fn from_scalar(value: &Scalar) -> Self {
        match value {
            Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Scalar::Int(v) => SqlValue::Integer(*v),
            Scalar::Float(v) => SqlValue::Real(*v),
            Scalar::Text(s) => SqlValue::Text(s.clone()),
        }
    }

    /// Applies column affinity to a comparison operand.
    pub fn with_affinity(self, affinity: Affinity) -> Self {
        match (affinity, self) {
            (Affinity::Text, SqlValue::Integer(v)) => SqlValue::Text(v.to_string()),
            (Affinity::Text, SqlValue::Real(v)) => SqlValue::Text(format_real(v)),
            (_, value) => value,
        }
    }

    /// True for `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Text rendering used by `LIKE` and `instr`; `None` for `NULL`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(v) => Some(v.to_string()),
            SqlValue::Real(v) => Some(format_real(*v)),
            SqlValue::Text(s) => Some(s.clone()),
        }
    }

    /// Orders two values the way SQLite's comparison operators do.
    ///
    /// `NULL` on either side yields `None`. Numbers order before text and
    /// text compares bytewise (the `BINARY` collation).
    pub fn sql_cmp(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (SqlValue::Null, _) | (_, SqlValue::Null) => None,
            (SqlValue::Integer(a), SqlValue::Integer(b)) => Some(a.cmp(b)),
            (SqlValue::Integer(a), SqlValue::Real(b)) => int_real_cmp(*a, *b),
            (SqlValue::Real(a), SqlValue::Integer(b)) => int_real_cmp(*b, *a).map(Ordering::reverse),
            (SqlValue::Real(a), SqlValue::Real(b)) => a.partial_cmp(b),
            (SqlValue::Text(a), SqlValue::Text(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (SqlValue::Text(_), _) => Some(Ordering::Greater),
            (_, SqlValue::Text(_)) => Some(Ordering::Less),
        }
    }
}

/// Exact integer/real ordering; no rounding of `int` through `f64`.
fn int_real_cmp(int: i64, real: f64) -> Option<Ordering> {
    if real.is_nan() {
        return None;
    }
    // 2^63: the first real above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if real < -LIMIT {
        return Some(Ordering::Greater);
    }
    if real >= LIMIT {
        return Some(Ordering::Less);
    }
    let whole = real.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0f64.partial_cmp(&(real - whole)),
        unequal => Some(unequal),
    }
}

/// Significant digits kept when SQLite renders a `REAL` as text.
const REAL_DIGITS: usize = 15;

/// Renders a float the way SQLite casts `REAL` to `TEXT` (`%!.15g`).
///
/// Fifteen significant digits, rounded half up. Decimal exponents below -4
/// or above 14 switch to `d.ddde+NN` form, and a bare integral mantissa
/// keeps a `.0`, so `1e20` renders as `1.0e+20` and `1e-5` as `1.0e-05`.
pub fn format_real(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-Inf" } else { "Inf" }.to_owned();
    }
    if value == 0.0 {
        return "0.0".to_owned();
    }
    let (digits, exp) = decimal_digits(value.abs());
    let mut out = String::with_capacity(REAL_DIGITS + 8);
    if value < 0.0 {
        out.push('-');
    }
    if exp < -4 || exp >= REAL_DIGITS as i32 {
        out.push_str(&digits[..1]);
        push_fraction(&mut out, &digits[1..]);
        out.push('e');
        out.push(if exp < 0 { '-' } else { '+' });
        out.push_str(&format!("{:02}", exp.unsigned_abs()));
    } else if exp < 0 {
        out.push_str("0.");
        for _ in 0..(-exp - 1) {
            out.push('0');
        }
        out.push_str(&digits);
    } else {
        let int_len = exp as usize + 1;
        if digits.len() > int_len {
            out.push_str(&digits[..int_len]);
            push_fraction(&mut out, &digits[int_len..]);
        } else {
            out.push_str(&digits);
            out.extend(std::iter::repeat('0').take(int_len - digits.len()));
            out.push_str(".0");
        }
    }
    out
}

fn push_fraction(out: &mut String, fraction: &str) {
    out.push('.');
    out.push_str(if fraction.is_empty() { "0" } else { fraction });
}

/// Up to fifteen significant digits of a positive finite `value`, trailing
/// zeros removed, with the decimal exponent of the first digit.
fn decimal_digits(value: f64) -> (String, i32) {
    // Twenty correctly rounded digits, then half-up at the sixteenth.
    let rendered = format!("{value:.19e}");
    let (mantissa, exp) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    let mut exp: i32 = exp.parse().unwrap_or(0);
    let mut digits: Vec<u8> = mantissa.bytes().filter(u8::is_ascii_digit).collect();
    let round_up = digits.get(REAL_DIGITS).is_some_and(|d| *d >= b'5');
    digits.truncate(REAL_DIGITS);
    if round_up {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            if *d == b'9' {
                *d = b'0';
            } else {
                *d += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
            digits.truncate(REAL_DIGITS);
            exp += 1;
        }
    }
    while digits.len() > 1 && digits.last() == Some(&b'0') {
        digits.pop();
    }
    (String::from_utf8(digits).unwrap_or_default(), exp)
}
