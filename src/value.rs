use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Scalar value of a document field.
///
/// YAML and JSON scalars deserialize into the narrowest variant that accepts
/// them, so `"2024-03-01"` becomes a [Value::Date] and `3` an [Value::Int].
/// A text field holding ISO-looking text may therefore come back as a date,
/// so equality treats a date or time and the text it parses from as equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Host-style truthiness: null, `false`, zero and the empty string are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Date(_) | Value::Time(_) => true,
        }
    }

    /// Numeric view of the value. Null and empty strings count as zero.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) if s.trim().is_empty() => Some(0.0),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Date(_) | Value::Time(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Null => Some(0),
            Value::Bool(b) => Some(*b as i64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Value::Time(t) => Some(*t),
            Value::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Text form used for `like` matching and string comparison.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => (*b as i64).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Date(d) => d.to_string(),
            Value::Time(t) => t.to_string(),
            Value::Str(s) => s.clone(),
        }
    }

    /// Compare two values the way the host database compares column values.
    ///
    /// Numbers compare across integer and float, null compares as zero against
    /// numbers and as the empty string against text, ISO strings compare
    /// against dates and times. Returns `None` when the values are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;

        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Null, Str(s)) => Some("".cmp(s.as_str())),
            (Str(s), Null) => Some(s.as_str().cmp("")),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Date(a), b @ Str(_)) => b.as_date().map(|b| a.cmp(&b)),
            (a @ Str(_), Date(b)) => a.as_date().map(|a| a.cmp(b)),
            (Time(a), Time(b)) => Some(a.cmp(b)),
            (Time(a), b @ Str(_)) => b.as_time().map(|b| a.cmp(&b)),
            (a @ Str(_), Time(b)) => a.as_time().map(|a| a.cmp(b)),
            (Date(_) | Time(_), _) | (_, Date(_) | Time(_)) => None,
            (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        }
    }

    /// Equality under [Value::compare].
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;

        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Str(a), Str(b)) => a == b,
            (Date(d), Str(s)) | (Str(s), Date(d)) => s.parse::<NaiveDate>().is_ok_and(|p| p == *d),
            (Time(t), Str(s)) | (Str(s), Time(t)) => s.parse::<NaiveTime>().is_ok_and(|p| p == *t),
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Date(d) => write!(f, "\"{d}\""),
            Value::Time(t) => write!(f, "\"{t}\""),
            Value::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Round half away from zero to `precision` decimals, like the host's `flt`.
pub fn flt(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}
