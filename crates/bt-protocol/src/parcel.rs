//! Typed parcels and the transactional binder seam.
//!
//! A [`Parcel`] is an ordered sequence of typed values. Writers append,
//! readers consume through a [`ParcelReader`] cursor and must read the same
//! types in the same order; any mismatch is a [`ParcelError`], never a
//! reinterpretation of bytes.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bt_core::BtAddress;
use thiserror::Error;

/// One typed parcel slot.
#[derive(Clone)]
pub enum ParcelValue {
    U8(u8),
    U16(u16),
    U32(u32),
    I32(i32),
    Bool(bool),
    Str(String),
    Address(BtAddress),
    Binder(Arc<dyn Binder>),
}

impl ParcelValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParcelValue::U8(_) => "u8",
            ParcelValue::U16(_) => "u16",
            ParcelValue::U32(_) => "u32",
            ParcelValue::I32(_) => "i32",
            ParcelValue::Bool(_) => "bool",
            ParcelValue::Str(_) => "string",
            ParcelValue::Address(_) => "address",
            ParcelValue::Binder(_) => "binder",
        }
    }
}

impl fmt::Debug for ParcelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParcelValue::U8(v) => write!(f, "U8({v})"),
            ParcelValue::U16(v) => write!(f, "U16({v})"),
            ParcelValue::U32(v) => write!(f, "U32({v})"),
            ParcelValue::I32(v) => write!(f, "I32({v})"),
            ParcelValue::Bool(v) => write!(f, "Bool({v})"),
            ParcelValue::Str(v) => write!(f, "Str({v:?})"),
            ParcelValue::Address(v) => write!(f, "Address({v})"),
            ParcelValue::Binder(_) => write!(f, "Binder(..)"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParcelError {
    #[error("Parcel exhausted at position {position}")]
    Exhausted { position: usize },

    #[error("Parcel type mismatch at position {position}: expected {expected}, found {found}")]
    TypeMismatch {
        position: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: u32 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactError {
    #[error("Unknown transaction code {0:#06x}")]
    UnknownCode(u32),

    #[error("Malformed parcel: {0}")]
    Parcel(#[from] ParcelError),

    #[error("Binder object is dead")]
    DeadObject,

    #[error("Transaction failed: {0}")]
    Failed(String),
}

/// A transactional RPC endpoint.
///
/// `code` selects the operation; `data` carries its typed arguments. The
/// reply parcel is produced by the receiving side.
#[async_trait]
pub trait Binder: Send + Sync {
    async fn transact(&self, code: u32, data: &Parcel) -> Result<Parcel, TransactError>;
}

#[derive(Debug, Clone, Default)]
pub struct Parcel {
    values: Vec<ParcelValue>,
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn reader(&self) -> ParcelReader<'_> {
        ParcelReader {
            values: &self.values,
            position: 0,
        }
    }

    pub fn write_u8(&mut self, v: u8) -> &mut Self {
        self.values.push(ParcelValue::U8(v));
        self
    }

    pub fn write_u16(&mut self, v: u16) -> &mut Self {
        self.values.push(ParcelValue::U16(v));
        self
    }

    pub fn write_u32(&mut self, v: u32) -> &mut Self {
        self.values.push(ParcelValue::U32(v));
        self
    }

    pub fn write_i32(&mut self, v: i32) -> &mut Self {
        self.values.push(ParcelValue::I32(v));
        self
    }

    pub fn write_bool(&mut self, v: bool) -> &mut Self {
        self.values.push(ParcelValue::Bool(v));
        self
    }

    pub fn write_str(&mut self, v: &str) -> &mut Self {
        self.values.push(ParcelValue::Str(v.to_string()));
        self
    }

    pub fn write_address(&mut self, v: BtAddress) -> &mut Self {
        self.values.push(ParcelValue::Address(v));
        self
    }

    pub fn write_binder(&mut self, v: Arc<dyn Binder>) -> &mut Self {
        self.values.push(ParcelValue::Binder(v));
        self
    }
}

/// Read cursor over a [`Parcel`].
pub struct ParcelReader<'a> {
    values: &'a [ParcelValue],
    position: usize,
}

macro_rules! read_scalar {
    ($name:ident, $variant:ident, $ty:ty, $label:literal) => {
        pub fn $name(&mut self) -> Result<$ty, ParcelError> {
            match self.next()? {
                ParcelValue::$variant(v) => Ok(v.clone()),
                other => Err(self.mismatch($label, other)),
            }
        }
    };
}

impl<'a> ParcelReader<'a> {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.values.len().saturating_sub(self.position)
    }

    read_scalar!(read_u8, U8, u8, "u8");
    read_scalar!(read_u16, U16, u16, "u16");
    read_scalar!(read_u32, U32, u32, "u32");
    read_scalar!(read_i32, I32, i32, "i32");
    read_scalar!(read_bool, Bool, bool, "bool");
    read_scalar!(read_string, Str, String, "string");
    read_scalar!(read_address, Address, BtAddress, "address");
    read_scalar!(read_binder, Binder, Arc<dyn Binder>, "binder");

    /// Reads a u8 and maps it through `convert`, naming `field` on failure.
    pub fn read_enum<T>(
        &mut self,
        field: &'static str,
        convert: impl FnOnce(u8) -> Option<T>,
    ) -> Result<T, ParcelError> {
        let raw = self.read_u8()?;
        convert(raw).ok_or(ParcelError::InvalidValue {
            field,
            value: u32::from(raw),
        })
    }

    fn next(&mut self) -> Result<&'a ParcelValue, ParcelError> {
        let value = self.values.get(self.position).ok_or(ParcelError::Exhausted {
            position: self.position,
        })?;
        self.position += 1;
        Ok(value)
    }

    fn mismatch(&self, expected: &'static str, found: &ParcelValue) -> ParcelError {
        ParcelError::TypeMismatch {
            position: self.position.saturating_sub(1),
            expected,
            found: found.type_name(),
        }
    }
}
