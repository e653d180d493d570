//! Host and native value models.
//!
//! [`HostValue`] is what the scripting host hands to and receives from the
//! bridge. [`NativeValue`] is one typed slot of a call record, laid out the way
//! `objc_msgSend` expects it.

use enum_dispatch::enum_dispatch;
use libffi::middle::Arg;
use num_bigint::BigInt;
use std::{
    ffi::{c_char, CStr, CString},
    fmt::{self, Debug, Display, Formatter},
};

use crate::{
    encoding::ElementKind,
    runtime::{RawRef, Selector},
};

pub mod handle;

pub use handle::ForeignHandle;

#[derive(Clone, Debug, PartialEq)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(BigInt),
    String(String),
    Handle(ForeignHandle),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::BigInt(_) => "bigint",
            HostValue::String(_) => "string",
            HostValue::Handle(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, HostValue::Undefined)
    }

    /// Tests whether this value is a wrapped foreign object and unwraps it.
    pub fn as_handle(&self) -> Option<&ForeignHandle> {
        match self {
            HostValue::Handle(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Display for HostValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "undefined"),
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Number(n) => write!(f, "{n}"),
            HostValue::BigInt(b) => write!(f, "{b}n"),
            HostValue::String(s) => write!(f, "{s}"),
            HostValue::Handle(h) => write!(f, "{h}"),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<BigInt> for HostValue {
    fn from(b: BigInt) -> Self {
        HostValue::BigInt(b)
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<ForeignHandle> for HostValue {
    fn from(h: ForeignHandle) -> Self {
        HostValue::Handle(h)
    }
}

/// A `char *` slot. Either owns its buffer (arguments built from host
/// strings) or borrows one owned by the runtime (return values).
pub struct ByteString {
    owned: Option<CString>,
    ptr: *const c_char,
}

impl ByteString {
    pub fn owned(s: CString) -> Self {
        // the heap buffer does not move when `s` does
        let ptr = s.as_ptr();
        Self {
            owned: Some(s),
            ptr,
        }
    }

    pub fn borrowed(ptr: *const c_char) -> Self {
        Self { owned: None, ptr }
    }

    pub fn as_ptr(&self) -> *const c_char {
        self.ptr
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Copies the buffer into a host string.
    ///
    /// # Safety
    /// A borrowed pointer must still point at a live NUL-terminated buffer.
    pub unsafe fn to_string_lossy(&self) -> Option<String> {
        if self.ptr.is_null() {
            return None;
        }
        Some(CStr::from_ptr(self.ptr).to_string_lossy().into_owned())
    }
}

impl Clone for ByteString {
    fn clone(&self) -> Self {
        match &self.owned {
            Some(s) => ByteString::owned(s.clone()),
            None => ByteString::borrowed(self.ptr),
        }
    }
}

impl Debug for ByteString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.owned {
            Some(s) => write!(f, "ByteString({s:?})"),
            None => write!(f, "ByteString({:p})", self.ptr),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct ObjectRef(pub RawRef);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct ClassRef(pub RawRef);

#[enum_dispatch]
pub trait NativeSlot {
    fn kind(&self) -> ElementKind;

    /// A libffi argument pointing at this slot's storage.
    fn as_ffi_arg(&self) -> Arg;
}

macro_rules! native_scalar {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl NativeSlot for $t {
                fn kind(&self) -> ElementKind {
                    ElementKind::$kind
                }

                fn as_ffi_arg(&self) -> Arg {
                    Arg::new(self)
                }
            }
        )*
    };
}

native_scalar! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
}

impl NativeSlot for ByteString {
    fn kind(&self) -> ElementKind {
        ElementKind::ByteString
    }

    fn as_ffi_arg(&self) -> Arg {
        Arg::new(&self.ptr)
    }
}

impl NativeSlot for ObjectRef {
    fn kind(&self) -> ElementKind {
        ElementKind::Object
    }

    fn as_ffi_arg(&self) -> Arg {
        Arg::new(&self.0)
    }
}

impl NativeSlot for ClassRef {
    fn kind(&self) -> ElementKind {
        ElementKind::Class
    }

    fn as_ffi_arg(&self) -> Arg {
        Arg::new(&self.0)
    }
}

impl NativeSlot for Selector {
    fn kind(&self) -> ElementKind {
        ElementKind::Selector
    }

    fn as_ffi_arg(&self) -> Arg {
        Arg::new(self)
    }
}

#[enum_dispatch(NativeSlot)]
#[derive(Clone, Debug)]
pub enum NativeValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    ByteString(ByteString),
    Object(ObjectRef),
    Class(ClassRef),
    Selector(Selector),
}

impl NativeValue {
    /// Widens a numeric slot to the host number domain.
    pub fn to_f64(&self) -> Option<f64> {
        let n = match self {
            NativeValue::I8(v) => *v as f64,
            NativeValue::I16(v) => *v as f64,
            NativeValue::I32(v) => *v as f64,
            NativeValue::I64(v) => *v as f64,
            NativeValue::U8(v) => *v as f64,
            NativeValue::U16(v) => *v as f64,
            NativeValue::U32(v) => *v as f64,
            NativeValue::U64(v) => *v as f64,
            NativeValue::F32(v) => *v as f64,
            NativeValue::F64(v) => *v,
            _ => return None,
        };
        Some(n)
    }

    /// The reference held by an object or class slot.
    pub fn as_raw_ref(&self) -> Option<RawRef> {
        match self {
            NativeValue::Object(ObjectRef(r)) | NativeValue::Class(ClassRef(r)) => Some(*r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_variant() {
        assert_eq!(NativeValue::from(7u16).kind(), ElementKind::U16);
        assert_eq!(NativeValue::from(true).kind(), ElementKind::Bool);
        assert_eq!(NativeValue::from(1.5f32).kind(), ElementKind::F32);
        assert_eq!(
            NativeValue::from(ObjectRef(RawRef::NULL)).kind(),
            ElementKind::Object
        );
        assert_eq!(NativeValue::from(Selector::NULL).kind(), ElementKind::Selector);
    }

    #[test]
    fn test_owned_byte_string_survives_clone() {
        let s = ByteString::owned(CString::new("hello").unwrap());
        let copy = s.clone();
        drop(s);
        assert_eq!(unsafe { copy.to_string_lossy() }, Some("hello".to_string()));
        assert!(ByteString::borrowed(std::ptr::null()).is_null());
    }

    #[test]
    fn test_widening() {
        assert_eq!(NativeValue::from(-3i8).to_f64(), Some(-3.0));
        assert_eq!(NativeValue::from(u64::MAX).to_f64(), Some(u64::MAX as f64));
        assert_eq!(NativeValue::from(Selector::NULL).to_f64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(HostValue::Number(19.0).to_string(), "19");
        assert_eq!(HostValue::BigInt(BigInt::from(5)).to_string(), "5n");
        assert_eq!(HostValue::Undefined.to_string(), "undefined");
        assert_eq!(HostValue::from("hi").to_string(), "hi");
    }
}
