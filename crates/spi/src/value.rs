use crate::column::{Column, ColumnType, Columns};
use crate::error::UsageError;
use crate::time::TimeFormat;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A single value of a row, tagged with its storage kind.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    /// Represents a NULL value
    Null,

    /// 16-bit signed integer
    Int16(i16),

    /// 32-bit signed integer
    Int32(i32),

    /// 64-bit signed integer
    Int64(i64),

    /// 8-bit unsigned integer (the `int8` tag stores a byte)
    Int8(u8),

    /// 32-bit float
    Float(f32),

    /// 64-bit float
    Double(f64),

    /// Timestamp
    Datetime(DateTime<Utc>),

    /// IPv4 or IPv6 address
    Ip(IpAddr),

    /// Text
    String(String),

    /// Byte sequence
    Binary(Bytes),

    /// Boolean
    Bool(bool),
}

impl Value {
    /// Short name of the value kind, used in mismatch errors.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Int8(_) => "int8",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Datetime(_) => "datetime",
            Self::Ip(IpAddr::V4(_)) => "ipv4",
            Self::Ip(IpAddr::V6(_)) => "ipv6",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
            Self::Bool(_) => "bool",
        }
    }

    /// True for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int8(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::String(text) => text.trim().parse().ok(),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Converts the value into the storage kind of `column`.
    ///
    /// Integers narrow only when in range. Datetimes accept epoch integers and
    /// text, both read with `time_format` (text in zone `tz`). Nulls pass through.
    #[allow(clippy::cast_possible_truncation)]
    pub fn coerce_to(
        self,
        column: &Column,
        time_format: &TimeFormat,
        tz: &Tz,
    ) -> Result<Self, UsageError> {
        if self.is_null() {
            return Ok(self);
        }

        let actual = self.kind_name();
        let coerced = match column.column_type {
            ColumnType::Int16 => self
                .as_i64()
                .and_then(|v| i16::try_from(v).ok())
                .map(Self::Int16),
            ColumnType::Int32 => self
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Self::Int32),
            ColumnType::Int64 => self.as_i64().map(Self::Int64),
            ColumnType::Int8 => self
                .as_i64()
                .and_then(|v| u8::try_from(v).ok())
                .map(Self::Int8),
            ColumnType::Float => self.as_f64().map(|v| Self::Float(v as f32)),
            ColumnType::Double => self.as_f64().map(Self::Double),
            ColumnType::Datetime => match &self {
                Self::Datetime(ts) => Some(Self::Datetime(*ts)),
                Self::String(text) => time_format.parse(text, tz).ok().map(Self::Datetime),
                other => other
                    .as_i64()
                    .and_then(|v| time_format.from_epoch(v))
                    .map(Self::Datetime),
            },
            ColumnType::Ipv4 => match &self {
                Self::Ip(IpAddr::V4(ip)) => Some(Self::Ip(IpAddr::V4(*ip))),
                Self::String(text) => text
                    .trim()
                    .parse::<Ipv4Addr>()
                    .ok()
                    .map(|ip| Self::Ip(IpAddr::V4(ip))),
                _ => None,
            },
            ColumnType::Ipv6 => match &self {
                Self::Ip(ip) => Some(Self::Ip(IpAddr::V6(to_v6(*ip)))),
                Self::String(text) => text
                    .trim()
                    .parse::<IpAddr>()
                    .ok()
                    .map(|ip| Self::Ip(IpAddr::V6(to_v6(ip)))),
                _ => None,
            },
            ColumnType::String => match self {
                Self::String(text) => Some(Self::String(text)),
                _ => None,
            },
            ColumnType::Binary => match self {
                Self::Binary(bytes) => Some(Self::Binary(bytes)),
                Self::String(text) => Some(Self::Binary(Bytes::from(text.into_bytes()))),
                _ => None,
            },
            ColumnType::Bool => match &self {
                Self::Bool(v) => Some(Self::Bool(*v)),
                Self::String(text) => text.trim().parse().ok().map(Self::Bool),
                _ => None,
            },
        };

        coerced.ok_or_else(|| UsageError::TypeMismatch {
            column: column.name.clone(),
            expected: column.column_type,
            actual,
        })
    }
}

const fn to_v6(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )+
    };
}

impl_from_scalar!(
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Int8,
    f32 => Float,
    f64 => Double,
    DateTime<Utc> => Datetime,
    IpAddr => Ip,
    Ipv4Addr => Ip,
    Ipv6Addr => Ip,
    String => String,
    &str => String,
    Bytes => Binary,
    Vec<u8> => Binary,
    bool => Bool,
);

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Extraction of a Rust value from a [`Value`].
pub trait FromValue: Sized {
    /// Column type reported when extraction fails.
    const EXPECTED: ColumnType;

    /// Returns `None` when the value cannot be represented as `Self`.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($ty:ty, $expected:ident, |$v:ident| $body:expr) => {
        impl FromValue for $ty {
            const EXPECTED: ColumnType = ColumnType::$expected;

            fn from_value($v: &Value) -> Option<Self> {
                $body
            }
        }
    };
}

impl_from_value!(i16, Int16, |value| match value {
    Value::Int8(v) => Some(i16::from(*v)),
    Value::Int16(v) => Some(*v),
    _ => None,
});

impl_from_value!(i32, Int32, |value| match value {
    Value::Int8(v) => Some(i32::from(*v)),
    Value::Int16(v) => Some(i32::from(*v)),
    Value::Int32(v) => Some(*v),
    _ => None,
});

impl_from_value!(i64, Int64, |value| match value {
    Value::Int8(v) => Some(i64::from(*v)),
    Value::Int16(v) => Some(i64::from(*v)),
    Value::Int32(v) => Some(i64::from(*v)),
    Value::Int64(v) => Some(*v),
    _ => None,
});

impl_from_value!(u8, Int8, |value| match value {
    Value::Int8(v) => Some(*v),
    _ => None,
});

impl_from_value!(f32, Float, |value| match value {
    Value::Float(v) => Some(*v),
    _ => None,
});

impl_from_value!(f64, Double, |value| match value {
    Value::Float(v) => Some(f64::from(*v)),
    Value::Double(v) => Some(*v),
    _ => None,
});

impl_from_value!(DateTime<Utc>, Datetime, |value| match value {
    Value::Datetime(v) => Some(*v),
    _ => None,
});

impl_from_value!(IpAddr, Ipv6, |value| match value {
    Value::Ip(v) => Some(*v),
    _ => None,
});

impl_from_value!(String, String, |value| match value {
    Value::String(v) => Some(v.clone()),
    _ => None,
});

impl_from_value!(Bytes, Binary, |value| match value {
    Value::Binary(v) => Some(v.clone()),
    _ => None,
});

impl_from_value!(Vec<u8>, Binary, |value| match value {
    Value::Binary(v) => Some(v.to_vec()),
    _ => None,
});

impl_from_value!(bool, Bool, |value| match value {
    Value::Bool(v) => Some(*v),
    _ => None,
});

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: ColumnType = T::EXPECTED;

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Extraction of a whole row, checked against the row width.
pub trait FromRow: Sized {
    /// Builds `Self` from one row of `columns`.
    fn from_row(columns: &Columns, values: &[Value]) -> Result<Self, UsageError>;
}

impl FromRow for Vec<Value> {
    fn from_row(_columns: &Columns, values: &[Value]) -> Result<Self, UsageError> {
        Ok(values.to_vec())
    }
}

fn extract<T: FromValue>(columns: &Columns, values: &[Value], idx: usize) -> Result<T, UsageError> {
    let value = &values[idx];
    T::from_value(value).ok_or_else(|| {
        let column = columns.name_at(idx);
        if value.is_null() {
            UsageError::NullValue { column }
        } else {
            UsageError::TypeMismatch {
                column,
                expected: T::EXPECTED,
                actual: value.kind_name(),
            }
        }
    })
}

macro_rules! impl_from_row {
    ($len:literal => $($idx:tt $name:ident),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(columns: &Columns, values: &[Value]) -> Result<Self, UsageError> {
                if values.len() != $len {
                    return Err(UsageError::ArityMismatch {
                        expected: columns.len(),
                        actual: $len,
                    });
                }
                Ok(($(extract::<$name>(columns, values, $idx)?,)+))
            }
        }
    };
}

impl_from_row!(1 => 0 A);
impl_from_row!(2 => 0 A, 1 B);
impl_from_row!(3 => 0 A, 1 B, 2 C);
impl_from_row!(4 => 0 A, 1 B, 2 C, 3 D);
impl_from_row!(5 => 0 A, 1 B, 2 C, 3 D, 4 E);
impl_from_row!(6 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_from_row!(7 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_from_row!(8 => 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
