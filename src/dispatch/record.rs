use crate::{
    encoding::ElementKind,
    error::RuntimeError,
    runtime::{RawRef, Selector},
    value::{NativeSlot, NativeValue},
};

/// Everything needed to send one message: target, selector, one typed slot
/// per declared parameter, and the return slot.
///
/// A record is built per call and never shared between calls.
#[derive(Debug)]
pub struct CallRecord {
    receiver: RawRef,
    selector: Selector,
    class_name: String,
    selector_name: String,
    return_encoding: String,
    argument_kinds: Vec<ElementKind>,
    arguments: Vec<Option<NativeValue>>,
    return_kind: ElementKind,
    return_value: Option<NativeValue>,
}

impl CallRecord {
    pub fn new(
        class_name: impl Into<String>,
        selector_name: impl Into<String>,
        return_encoding: impl Into<String>,
        argument_kinds: Vec<ElementKind>,
        return_kind: ElementKind,
    ) -> Self {
        let arguments = vec![None; argument_kinds.len()];
        Self {
            receiver: RawRef::NULL,
            selector: Selector::NULL,
            class_name: class_name.into(),
            selector_name: selector_name.into(),
            return_encoding: return_encoding.into(),
            argument_kinds,
            arguments,
            return_kind,
            return_value: None,
        }
    }

    fn malformed(&self, reason: String) -> RuntimeError {
        RuntimeError::MalformedRecord {
            selector: self.selector_name.clone(),
            reason,
        }
    }

    pub fn set_target(&mut self, receiver: RawRef) {
        self.receiver = receiver;
    }

    pub fn set_selector(&mut self, selector: Selector) {
        self.selector = selector;
    }

    pub fn set_argument(&mut self, index: usize, value: NativeValue) -> Result<(), RuntimeError> {
        let Some(&expected) = self.argument_kinds.get(index) else {
            return Err(self.malformed(format!(
                "argument index {index} out of bounds (method takes {})",
                self.argument_kinds.len()
            )));
        };
        if value.kind() != expected {
            return Err(self.malformed(format!(
                "argument {index} is {}, expected {expected}",
                value.kind()
            )));
        }
        self.arguments[index] = Some(value);
        Ok(())
    }

    pub fn set_return_value(&mut self, value: NativeValue) -> Result<(), RuntimeError> {
        if value.kind() != self.return_kind {
            return Err(self.malformed(format!(
                "return value is {}, expected {}",
                value.kind(),
                self.return_kind
            )));
        }
        self.return_value = Some(value);
        Ok(())
    }

    pub fn receiver(&self) -> RawRef {
        self.receiver
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn selector_name(&self) -> &str {
        &self.selector_name
    }

    pub fn return_encoding(&self) -> &str {
        &self.return_encoding
    }

    pub fn argument_kinds(&self) -> &[ElementKind] {
        &self.argument_kinds
    }

    pub fn return_kind(&self) -> ElementKind {
        self.return_kind
    }

    pub fn argument(&self, index: usize) -> Option<&NativeValue> {
        self.arguments.get(index).and_then(Option::as_ref)
    }

    /// All argument slots in order. Fails if the target, the selector or any
    /// slot is still unset.
    pub fn arguments(&self) -> Result<Vec<&NativeValue>, RuntimeError> {
        if self.receiver.is_null() {
            return Err(self.malformed("no target set".to_string()));
        }
        if self.selector.is_null() {
            return Err(self.malformed("no selector set".to_string()));
        }
        self.arguments
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.as_ref()
                    .ok_or_else(|| self.malformed(format!("argument {i} was never set")))
            })
            .collect()
    }

    pub fn return_value(&self) -> Option<&NativeValue> {
        self.return_value.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;

    fn record() -> CallRecord {
        let mut record = CallRecord::new(
            "NSString",
            "substringWithRange:length:",
            "@",
            vec![ElementKind::U64, ElementKind::U64],
            ElementKind::Object,
        );
        record.set_target(RawRef::from_ptr(16 as *mut c_void));
        record.set_selector(Selector::from_ptr(32 as *const c_void));
        record
    }

    #[test]
    fn test_slots_must_match_kinds() {
        let mut record = record();
        assert!(record.set_argument(0, NativeValue::from(3u64)).is_ok());
        assert!(record.set_argument(1, NativeValue::from(3i64)).is_err());
        assert!(record.set_argument(2, NativeValue::from(3u64)).is_err());
        assert!(record.set_return_value(NativeValue::from(1u64)).is_err());
    }

    #[test]
    fn test_arguments_require_every_slot() {
        let mut record = record();
        record.set_argument(1, NativeValue::from(4u64)).unwrap();
        assert!(record.arguments().is_err());
        record.set_argument(0, NativeValue::from(2u64)).unwrap();
        let args = record.arguments().unwrap();
        assert!(matches!(args[..], [NativeValue::U64(2), NativeValue::U64(4)]));
    }
}
