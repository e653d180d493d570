use std::{
    fmt::{self, Debug, Display, Formatter},
    rc::Rc,
};

use tracing::trace;

use crate::{
    dispatch,
    error::BridgeError,
    runtime::{ForeignRuntime, RawRef},
    value::HostValue,
};

/// A foreign object as seen by the host.
///
/// Each wrapper takes exactly one retaining stake on its reference when it is
/// created and gives it back when the host drops its last clone. Clones share
/// that single stake; two wrappers built from the same reference hold two.
#[derive(Clone)]
pub struct ForeignHandle(Rc<HandleInner>);

struct HandleInner {
    runtime: Rc<dyn ForeignRuntime>,
    raw: RawRef,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        trace!(object = ?self.raw, "releasing foreign handle");
        self.runtime.release(self.raw);
    }
}

impl ForeignHandle {
    /// Wraps `raw`, taking a new retaining stake. Returns `None` for the
    /// null reference, which the host sees as `null` instead.
    pub(crate) fn retain(runtime: &Rc<dyn ForeignRuntime>, raw: RawRef) -> Option<Self> {
        if raw.is_null() {
            return None;
        }
        runtime.retain(raw);
        trace!(object = ?raw, "wrapped foreign handle");
        Some(ForeignHandle(Rc::new(HandleInner {
            runtime: Rc::clone(runtime),
            raw,
        })))
    }

    /// The host-visible constructor. Handles only come out of the bridge, so
    /// this always fails.
    pub fn construct(_args: &[HostValue]) -> Result<Self, BridgeError> {
        Err(BridgeError::Construction)
    }

    pub fn raw(&self) -> RawRef {
        self.0.raw
    }

    pub fn runtime(&self) -> &Rc<dyn ForeignRuntime> {
        &self.0.runtime
    }

    pub fn class_name(&self) -> String {
        self.0.runtime.class_name(self.0.raw)
    }

    /// Sends `selector` to the wrapped object.
    pub fn dispatch(&self, selector: &str, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        dispatch::send(&self.0.runtime, self.0.raw, selector, args)
    }

    pub fn responds_to(&self, selector: &str) -> Result<bool, BridgeError> {
        let result = self.dispatch("respondsToSelector:", &[HostValue::from(selector)])?;
        // BOOL is a signed char on some targets
        Ok(match result {
            HostValue::Bool(b) => b,
            HostValue::Number(n) => n != 0.0,
            _ => false,
        })
    }

    /// The object's `description`, as used for host-side string conversion.
    pub fn description(&self) -> Result<String, BridgeError> {
        let description = self.dispatch("description", &[])?;
        let Some(handle) = description.as_handle() else {
            return Ok("(null)".to_string());
        };
        match handle.dispatch("UTF8String", &[])? {
            HostValue::String(s) => Ok(s),
            _ => Ok("(null)".to_string()),
        }
    }

    /// Whether both wrappers refer to the same foreign object.
    pub fn same_reference(&self, other: &ForeignHandle) -> bool {
        self.0.raw == other.0.raw
    }

    /// Whether both are clones of one wrapper.
    pub fn same_wrapper(&self, other: &ForeignHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ForeignHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_reference(other)
    }
}

impl Debug for ForeignHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ForeignHandle({:p})", self.0.raw.as_ptr())
    }
}

impl Display for ForeignHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {:p}>", self.class_name(), self.0.raw.as_ptr())
    }
}
