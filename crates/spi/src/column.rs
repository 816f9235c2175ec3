//! Column metadata and the typed buffers derived from it.

use crate::error::{Error, UsageError};
use crate::value::{FromValue, Value};

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::net::IpAddr;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Logical column type. The set is closed; every tag maps to exactly one [`StorageKind`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// `int16`
    Int16,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `int8`, stored as an unsigned byte
    Int8,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `datetime`
    Datetime,
    /// `ipv4`
    Ipv4,
    /// `ipv6`
    Ipv6,
    /// `string`
    String,
    /// `binary`
    Binary,
    /// `bool`
    Bool,
}

impl ColumnType {
    /// Every tag, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Int8,
        Self::Float,
        Self::Double,
        Self::Datetime,
        Self::Ipv4,
        Self::Ipv6,
        Self::String,
        Self::Binary,
        Self::Bool,
    ];

    /// The wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Int8 => "int8",
            Self::Float => "float",
            Self::Double => "double",
            Self::Datetime => "datetime",
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Bool => "bool",
        }
    }

    /// Storage used for scan buffers of this type.
    #[must_use]
    pub const fn storage_kind(self) -> StorageKind {
        match self {
            Self::Int16 => StorageKind::I16,
            Self::Int32 => StorageKind::I32,
            Self::Int64 => StorageKind::I64,
            Self::Int8 => StorageKind::U8,
            Self::Float => StorageKind::F32,
            Self::Double => StorageKind::F64,
            Self::Datetime => StorageKind::Timestamp,
            Self::Ipv4 | Self::Ipv6 => StorageKind::IpAddr,
            Self::String => StorageKind::Text,
            Self::Binary => StorageKind::Bytes,
            Self::Bool => StorageKind::Bool,
        }
    }

    /// Fixed width in bytes, 0 for variable-length types.
    #[must_use]
    pub const fn fixed_size(self) -> usize {
        match self {
            Self::Int8 | Self::Bool => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float => 4,
            Self::Int64 | Self::Double | Self::Datetime => 8,
            Self::Ipv4 => 5,
            Self::Ipv6 => 17,
            Self::String | Self::Binary => 0,
        }
    }
}

impl Display for ColumnType {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == tag)
            .ok_or_else(|| Error::UnknownType(s.to_string()))
    }
}

/// Concrete storage behind a [`Cell`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StorageKind {
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `u8`
    U8,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `DateTime<Utc>`
    Timestamp,
    /// `IpAddr`
    IpAddr,
    /// `String`
    Text,
    /// `Bytes`
    Bytes,
    /// `bool`
    Bool,
}

/// Metadata of one result or table column.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Logical type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Storage width in bytes (0 when variable).
    pub size: usize,

    /// Declared maximum length for variable-length types (0 when unbounded).
    pub length: usize,
}

impl Column {
    /// Creates a column with the fixed size of its type.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            size: column_type.fixed_size(),
            length: 0,
        }
    }

    /// Sets the declared maximum length.
    #[must_use]
    pub const fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }
}

/// Ordered column list of a result set or table. Row values are index-correlated.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Columns(Vec<Column>);

impl Columns {
    /// Creates an empty column list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Column> {
        self.0.get(idx)
    }

    /// Iterates columns in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.0.iter()
    }

    /// Position of the column named `name` (case-insensitive).
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Column names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|column| column.name.clone()).collect()
    }

    /// Column names where datetime columns disclose the zone they are rendered in,
    /// as `name(zone)`.
    #[must_use]
    pub fn names_with_time_location(&self, tz: &Tz) -> Vec<String> {
        self.0
            .iter()
            .map(|column| match column.column_type {
                ColumnType::Datetime => format!("{}({tz})", column.name),
                _ => column.name.clone(),
            })
            .collect()
    }

    /// Column types.
    #[must_use]
    pub fn types(&self) -> Vec<ColumnType> {
        self.0.iter().map(|column| column.column_type).collect()
    }

    /// Allocates an empty scan buffer, one cell per column.
    #[must_use]
    pub fn make_buffer(&self) -> Vec<Cell> {
        self.0
            .iter()
            .map(|column| Cell::empty(column.column_type.storage_kind()))
            .collect()
    }

    /// Name of the column at `idx`, or `#idx` when out of range.
    #[must_use]
    pub fn name_at(&self, idx: usize) -> String {
        self.0
            .get(idx)
            .map_or_else(|| format!("#{idx}"), |column| column.name.clone())
    }

    /// Fills `dest` from `values`, checking arity and kinds. Nothing is written on error.
    pub fn scan_into(&self, values: &[Value], dest: &mut [Cell]) -> Result<(), UsageError> {
        if dest.len() != values.len() {
            return Err(UsageError::ArityMismatch {
                expected: self.len(),
                actual: dest.len(),
            });
        }
        let mut staged = dest.to_vec();
        for (idx, (cell, value)) in staged.iter_mut().zip(values).enumerate() {
            cell.assign(value).map_err(|expected| UsageError::TypeMismatch {
                column: self.name_at(idx),
                expected,
                actual: value.kind_name(),
            })?;
        }
        dest.clone_from_slice(&staged);
        Ok(())
    }
}

impl From<Vec<Column>> for Columns {
    fn from(columns: Vec<Column>) -> Self {
        Self(columns)
    }
}

impl FromIterator<Column> for Columns {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Columns {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One typed storage slot of a scan buffer. `None` holds a null.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// `i16` slot
    I16(Option<i16>),
    /// `i32` slot
    I32(Option<i32>),
    /// `i64` slot
    I64(Option<i64>),
    /// `u8` slot
    U8(Option<u8>),
    /// `f32` slot
    F32(Option<f32>),
    /// `f64` slot
    F64(Option<f64>),
    /// timestamp slot
    Timestamp(Option<DateTime<Utc>>),
    /// IP address slot
    IpAddr(Option<IpAddr>),
    /// text slot
    Text(Option<String>),
    /// byte sequence slot
    Bytes(Option<Bytes>),
    /// boolean slot
    Bool(Option<bool>),
}

impl Cell {
    /// An empty (null) slot of `kind`.
    #[must_use]
    pub const fn empty(kind: StorageKind) -> Self {
        match kind {
            StorageKind::I16 => Self::I16(None),
            StorageKind::I32 => Self::I32(None),
            StorageKind::I64 => Self::I64(None),
            StorageKind::U8 => Self::U8(None),
            StorageKind::F32 => Self::F32(None),
            StorageKind::F64 => Self::F64(None),
            StorageKind::Timestamp => Self::Timestamp(None),
            StorageKind::IpAddr => Self::IpAddr(None),
            StorageKind::Text => Self::Text(None),
            StorageKind::Bytes => Self::Bytes(None),
            StorageKind::Bool => Self::Bool(None),
        }
    }

    /// Storage kind of the slot.
    #[must_use]
    pub const fn kind(&self) -> StorageKind {
        match self {
            Self::I16(_) => StorageKind::I16,
            Self::I32(_) => StorageKind::I32,
            Self::I64(_) => StorageKind::I64,
            Self::U8(_) => StorageKind::U8,
            Self::F32(_) => StorageKind::F32,
            Self::F64(_) => StorageKind::F64,
            Self::Timestamp(_) => StorageKind::Timestamp,
            Self::IpAddr(_) => StorageKind::IpAddr,
            Self::Text(_) => StorageKind::Text,
            Self::Bytes(_) => StorageKind::Bytes,
            Self::Bool(_) => StorageKind::Bool,
        }
    }

    /// True when the slot holds a null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Self::I16(None)
                | Self::I32(None)
                | Self::I64(None)
                | Self::U8(None)
                | Self::F32(None)
                | Self::F64(None)
                | Self::Timestamp(None)
                | Self::IpAddr(None)
                | Self::Text(None)
                | Self::Bytes(None)
                | Self::Bool(None)
        )
    }

    /// Stores `value`, widening where lossless.
    ///
    /// On mismatch the slot is left unchanged and the type it expects is returned.
    pub fn assign(&mut self, value: &Value) -> Result<(), ColumnType> {
        fn put<T: FromValue>(slot: &mut Option<T>, value: &Value) -> Result<(), ColumnType> {
            match <Option<T>>::from_value(value) {
                Some(v) => {
                    *slot = v;
                    Ok(())
                }
                None => Err(T::EXPECTED),
            }
        }

        match self {
            Self::I16(slot) => put(slot, value),
            Self::I32(slot) => put(slot, value),
            Self::I64(slot) => put(slot, value),
            Self::U8(slot) => put(slot, value),
            Self::F32(slot) => put(slot, value),
            Self::F64(slot) => put(slot, value),
            Self::Timestamp(slot) => put(slot, value),
            Self::IpAddr(slot) => put(slot, value),
            Self::Text(slot) => put(slot, value),
            Self::Bytes(slot) => put(slot, value),
            Self::Bool(slot) => put(slot, value),
        }
    }

    /// The slot content as a [`Value`].
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::I16(v) => (*v).into(),
            Self::I32(v) => (*v).into(),
            Self::I64(v) => (*v).into(),
            Self::U8(v) => (*v).into(),
            Self::F32(v) => (*v).into(),
            Self::F64(v) => (*v).into(),
            Self::Timestamp(v) => (*v).into(),
            Self::IpAddr(v) => (*v).into(),
            Self::Text(v) => v.clone().into(),
            Self::Bytes(v) => v.clone().into(),
            Self::Bool(v) => (*v).into(),
        }
    }
}
