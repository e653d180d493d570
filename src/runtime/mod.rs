//! The foreign runtime seam.
//!
//! Everything the bridge needs from the Objective-C runtime goes through
//! [`ForeignRuntime`]: class and selector lookup, method signatures,
//! reference counting, autorelease pools, and execution of a populated
//! [`CallRecord`].
//!
//! - [`objc::ObjcRuntime`] binds `libobjc` at run time and sends real messages.
//! - [`mock::MockRuntime`] is an in-process runtime with scripted classes.

use std::{
    ffi::{c_void, CStr},
    fmt::{self, Debug, Formatter},
    path::Path,
};

use crate::{dispatch::CallRecord, error::RuntimeError};

pub mod mock;
pub mod objc;

/// An opaque `id` or `Class` pointer. The null reference is a valid value.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawRef(*mut c_void);

impl RawRef {
    pub const NULL: Self = RawRef(std::ptr::null_mut());

    pub fn from_ptr(ptr: *mut c_void) -> Self {
        RawRef(ptr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Debug for RawRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "RawRef({:p})", self.0)
    }
}

/// An interned selector token (`SEL`).
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Selector(*const c_void);

impl Selector {
    pub const NULL: Self = Selector(std::ptr::null());

    pub fn from_ptr(ptr: *const c_void) -> Self {
        Selector(ptr)
    }

    pub fn as_ptr(self) -> *const c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl Debug for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({:p})", self.0)
    }
}

/// Token returned by an autorelease pool push.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PoolToken(pub *mut c_void);

/// Type encodings of one method, excluding the implicit receiver and
/// selector parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodSignature {
    pub return_encoding: String,
    pub argument_encodings: Vec<String>,
}

impl MethodSignature {
    pub fn new(return_encoding: impl Into<String>, argument_encodings: &[&str]) -> Self {
        Self {
            return_encoding: return_encoding.into(),
            argument_encodings: argument_encodings.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.argument_encodings.len()
    }
}

pub trait ForeignRuntime {
    /// Looks up a class descriptor by name.
    fn class_named(&self, name: &str) -> Option<RawRef>;

    /// Name of the class of `object`; for a class descriptor, its own name.
    fn class_name(&self, object: RawRef) -> String;

    fn method_signature(&self, receiver: RawRef, selector: Selector) -> Option<MethodSignature>;

    /// Interns `name`. Repeated calls with the same name return the same token.
    fn register_selector(&self, name: &CStr) -> Selector;

    fn selector_name(&self, selector: Selector) -> Option<String>;

    fn retain(&self, object: RawRef);

    fn release(&self, object: RawRef);

    fn push_autorelease_pool(&self) -> PoolToken;

    fn pop_autorelease_pool(&self, token: PoolToken);

    /// Sends the message described by `record` and fills its return slot.
    fn invoke(&self, record: &mut CallRecord) -> Result<(), RuntimeError>;

    fn load_library(&self, path: &Path) -> Result<(), RuntimeError>;
}

/// Keeps an autorelease pool open until dropped.
pub struct AutoreleaseScope<'r> {
    runtime: &'r dyn ForeignRuntime,
    token: PoolToken,
}

impl<'r> AutoreleaseScope<'r> {
    pub fn enter(runtime: &'r dyn ForeignRuntime) -> Self {
        let token = runtime.push_autorelease_pool();
        Self { runtime, token }
    }
}

impl Drop for AutoreleaseScope<'_> {
    fn drop(&mut self) {
        self.runtime.pop_autorelease_pool(self.token);
    }
}
