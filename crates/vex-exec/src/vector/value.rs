//! Runtime values and implicit coercions.
//!
//! [`Value`] is the scalar a [`super::ValueVector`] hands out per row. The
//! `try_*` conversions implement the implicit coercion rules used by the
//! coercing vector accessors: numeric widening/narrowing, string↔number
//! parsing, DateTime↔Long/String, and the boolean string vocabulary
//! (`y/yes/true/1` / `n/no/false/0`). A failed coercion is a fatal
//! [`VexError::Cast`].

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use vex_common::{VexError, VexResult};

use crate::schema::ResolvedType;
use crate::vector::{TupleVector, ValueVector, VectorRef};

/// A runtime value during query execution.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit floating point.
    Float(f32),
    /// 64-bit floating point.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Date and time as epoch milliseconds.
    DateTime(i64),
    /// A nested table (populate join results).
    Table(TupleVector),
    /// A vector of raw values (scalar-over-group results).
    Vector(VectorRef),
}

impl Value {
    /// Creates a string value.
    pub fn string(v: impl Into<String>) -> Self {
        Value::String(v.into())
    }

    /// Returns true if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the resolved type of this value.
    #[must_use]
    pub fn resolved_type(&self) -> ResolvedType {
        match self {
            Value::Null => ResolvedType::Any,
            Value::Boolean(_) => ResolvedType::Boolean,
            Value::Int(_) => ResolvedType::Int,
            Value::Long(_) => ResolvedType::Long,
            Value::Float(_) => ResolvedType::Float,
            Value::Double(_) => ResolvedType::Double,
            Value::String(_) => ResolvedType::String,
            Value::DateTime(_) => ResolvedType::DateTime,
            Value::Table(v) => ResolvedType::TupleVector(v.schema().clone()),
            Value::Vector(v) => ResolvedType::ValueVector(Box::new(v.resolved_type())),
        }
    }

    /// Coerces to a boolean.
    ///
    /// Numbers are truthy when non-zero; strings follow the SQL-ish
    /// vocabulary `y/yes/true/1` → true, `n/no/false/0` → false
    /// (case-insensitive). Anything else is a cast error.
    pub fn try_boolean(&self) -> VexResult<Option<bool>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Int(i) => Ok(Some(*i != 0)),
            Value::Long(i) => Ok(Some(*i != 0)),
            Value::Float(f) => Ok(Some(*f != 0.0)),
            Value::Double(f) => Ok(Some(*f != 0.0)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Ok(Some(true)),
                "n" | "no" | "false" | "0" => Ok(Some(false)),
                _ => Err(VexError::cast(s, "Boolean")),
            },
            other => Err(VexError::cast(other, "Boolean")),
        }
    }

    /// Coerces to a 32-bit integer (narrowing larger numerics).
    pub fn try_int(&self) -> VexResult<Option<i32>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(i32::from(*b))),
            Value::Int(i) => Ok(Some(*i)),
            Value::Long(i) => Ok(Some(*i as i32)),
            Value::Float(f) => Ok(Some(*f as i32)),
            Value::Double(f) => Ok(Some(*f as i32)),
            Value::String(s) => parse_number(s)
                .map(|n| Some(n as i32))
                .ok_or_else(|| VexError::cast(s, "Int")),
            other => Err(VexError::cast(other, "Int")),
        }
    }

    /// Coerces to a 64-bit integer. DateTime coerces to its epoch millis.
    pub fn try_long(&self) -> VexResult<Option<i64>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(i64::from(*b))),
            Value::Int(i) => Ok(Some(i64::from(*i))),
            Value::Long(i) => Ok(Some(*i)),
            Value::Float(f) => Ok(Some(*f as i64)),
            Value::Double(f) => Ok(Some(*f as i64)),
            Value::DateTime(millis) => Ok(Some(*millis)),
            Value::String(s) => parse_number(s)
                .map(|n| Some(n as i64))
                .ok_or_else(|| VexError::cast(s, "Long")),
            other => Err(VexError::cast(other, "Long")),
        }
    }

    /// Coerces to a 32-bit float.
    pub fn try_float(&self) -> VexResult<Option<f32>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(f32::from(u8::from(*b)))),
            Value::Int(i) => Ok(Some(*i as f32)),
            Value::Long(i) => Ok(Some(*i as f32)),
            Value::Float(f) => Ok(Some(*f)),
            Value::Double(f) => Ok(Some(*f as f32)),
            Value::String(s) => s
                .trim()
                .parse::<f32>()
                .map(Some)
                .map_err(|_| VexError::cast(s, "Float")),
            other => Err(VexError::cast(other, "Float")),
        }
    }

    /// Coerces to a 64-bit float.
    pub fn try_double(&self) -> VexResult<Option<f64>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(f64::from(u8::from(*b)))),
            Value::Int(i) => Ok(Some(f64::from(*i))),
            Value::Long(i) => Ok(Some(*i as f64)),
            Value::Float(f) => Ok(Some(f64::from(*f))),
            Value::Double(f) => Ok(Some(*f)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| VexError::cast(s, "Double")),
            other => Err(VexError::cast(other, "Double")),
        }
    }

    /// Coerces to a string. Nested tables and vectors do not stringify.
    pub fn try_string(&self) -> VexResult<Option<String>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(b.to_string())),
            Value::Int(i) => Ok(Some(i.to_string())),
            Value::Long(i) => Ok(Some(i.to_string())),
            Value::Float(f) => Ok(Some(f.to_string())),
            Value::Double(f) => Ok(Some(f.to_string())),
            Value::String(s) => Ok(Some(s.clone())),
            Value::DateTime(millis) => Ok(Some(format_datetime(*millis))),
            other => Err(VexError::cast(other, "String")),
        }
    }

    /// Coerces to a DateTime (epoch milliseconds).
    ///
    /// Integers are taken as epoch millis; strings are parsed as
    /// ISO-8601 date or date-time.
    pub fn try_datetime(&self) -> VexResult<Option<i64>> {
        match self {
            Value::Null => Ok(None),
            Value::DateTime(millis) => Ok(Some(*millis)),
            Value::Int(i) => Ok(Some(i64::from(*i))),
            Value::Long(i) => Ok(Some(*i)),
            Value::String(s) => parse_datetime(s)
                .map(Some)
                .ok_or_else(|| VexError::cast(s, "DateTime")),
            other => Err(VexError::cast(other, "DateTime")),
        }
    }

    /// Compares two values for ordering (used by Sort and comparisons).
    ///
    /// Returns `None` when either side is NULL. Numbers compare
    /// numerically across variants; a string facing a number is compared
    /// numerically when it parses, otherwise by its display form.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::{Boolean, DateTime, Double, Float, Int, Long, Null, String};

        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.as_str().cmp(b.as_str())),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Long(a), Long(b)) => Some(a.cmp(b)),
            (Int(a), Long(b)) => Some(i64::from(*a).cmp(b)),
            (Long(a), Int(b)) => Some(a.cmp(&i64::from(*b))),
            (DateTime(a), Int(_) | Long(_)) => Some(a.cmp(&other.try_long().ok()??)),
            (Int(_) | Long(_), DateTime(b)) => Some(self.try_long().ok()??.cmp(b)),
            (Float(_) | Double(_), _) | (_, Float(_) | Double(_)) => {
                match (self.try_double().ok().flatten(), other.try_double().ok().flatten()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => Some(self.to_string().cmp(&other.to_string())),
                }
            }
            (String(s), Int(_) | Long(_)) => match parse_number(s) {
                Some(a) => a.partial_cmp(&(other.try_long().ok()?? as f64)),
                None => Some(self.to_string().cmp(&other.to_string())),
            },
            (Int(_) | Long(_), String(s)) => match parse_number(s) {
                Some(b) => (self.try_long().ok()?? as f64).partial_cmp(&b),
                None => Some(self.to_string().cmp(&other.to_string())),
            },
            _ => Some(self.to_string().cmp(&other.to_string())),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => tables_equal(a, b),
            (Value::Vector(a), Value::Vector(b)) => vectors_equal(a, b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.compare(b) == Some(Ordering::Equal)
            }
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_)
        )
    }
}

fn tables_equal(a: &TupleVector, b: &TupleVector) -> bool {
    if a.row_count() != b.row_count() || a.column_count() != b.column_count() {
        return false;
    }
    for col in 0..a.column_count() {
        for row in 0..a.row_count() {
            if a.value(col, row) != b.value(col, row) {
                return false;
            }
        }
    }
    true
}

fn vectors_equal(a: &VectorRef, b: &VectorRef) -> bool {
    a.len() == b.len() && (0..a.len()).all(|i| a.value(i) == b.value(i))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::DateTime(millis) => write!(f, "{}", format_datetime(*millis)),
            Value::Table(v) => write!(f, "<table {} rows>", v.row_count()),
            Value::Vector(v) => write!(f, "<vector {} values>", v.len()),
        }
    }
}

/// Parses a string as a number, integer first.
fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i as f64);
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Parses an ISO-8601 date or date-time string to epoch milliseconds.
fn parse_datetime(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Formats epoch milliseconds as an ISO-8601 date-time string.
fn format_datetime(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |dt| dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
}

/// A value normalized into a common comparable domain for hashing.
///
/// Hash joins and grouping compare keys of heterogeneous declared types
/// (an `Int` probe against a `String` build side). Normalizing before
/// hashing makes `1`, `1i64` and `"1"` land in the same bucket while
/// keeping hash/equality consistent. `NULL` has no normalized form and
/// never participates in a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NormalizedKey {
    /// Boolean domain.
    Boolean(bool),
    /// Integral numeric domain.
    Long(i64),
    /// Non-integral numeric domain (bit pattern of the f64).
    Double(u64),
    /// Textual domain (strings that do not parse as numbers).
    String(String),
    /// Date-time domain (epoch milliseconds).
    DateTime(i64),
}

impl NormalizedKey {
    /// Normalizes a value, returning `None` for NULL and for nested
    /// values which never participate in key matching.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::Table(_) | Value::Vector(_) => None,
            Value::Boolean(b) => Some(Self::Boolean(*b)),
            Value::Int(i) => Some(Self::Long(i64::from(*i))),
            Value::Long(i) => Some(Self::Long(*i)),
            Value::Float(f) => Some(Self::from_f64(f64::from(*f))),
            Value::Double(f) => Some(Self::from_f64(*f)),
            Value::DateTime(millis) => Some(Self::DateTime(*millis)),
            Value::String(s) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Some(Self::Long(i))
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Some(Self::from_f64(f))
                } else {
                    Some(Self::String(s.clone()))
                }
            }
        }
    }

    fn from_f64(f: f64) -> Self {
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
            Self::Long(f as i64)
        } else {
            Self::Double(f.to_bits())
        }
    }
}
