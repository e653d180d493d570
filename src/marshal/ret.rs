use std::rc::Rc;

use crate::{
    dispatch::CallRecord,
    encoding::ElementKind,
    error::{BridgeError, RuntimeError},
    marshal::conversion,
    runtime::ForeignRuntime,
    value::{ForeignHandle, HostValue, NativeValue},
};

/// Converts the return slot of an executed call record into a host value.
pub fn convert(
    record: &CallRecord,
    kind: ElementKind,
    runtime: &Rc<dyn ForeignRuntime>,
) -> Result<HostValue, BridgeError> {
    (conversion(kind).to_host)(record, runtime)
}

fn slot(record: &CallRecord) -> Result<&NativeValue, BridgeError> {
    record.return_value().ok_or_else(|| {
        RuntimeError::MalformedRecord {
            selector: record.selector_name().to_string(),
            reason: "return slot was never written".to_string(),
        }
        .into()
    })
}

fn mismatch(record: &CallRecord, found: &NativeValue) -> BridgeError {
    RuntimeError::MalformedRecord {
        selector: record.selector_name().to_string(),
        reason: format!(
            "return slot holds {found:?}, expected {}",
            record.return_kind()
        ),
    }
    .into()
}

pub(crate) fn number(
    record: &CallRecord,
    _runtime: &Rc<dyn ForeignRuntime>,
) -> Result<HostValue, BridgeError> {
    let value = slot(record)?;
    value
        .to_f64()
        .map(HostValue::Number)
        .ok_or_else(|| mismatch(record, value))
}

pub(crate) fn boolean(
    record: &CallRecord,
    _runtime: &Rc<dyn ForeignRuntime>,
) -> Result<HostValue, BridgeError> {
    match slot(record)? {
        NativeValue::Bool(b) => Ok(HostValue::Bool(*b)),
        other => Err(mismatch(record, other)),
    }
}

pub(crate) fn void(
    _record: &CallRecord,
    _runtime: &Rc<dyn ForeignRuntime>,
) -> Result<HostValue, BridgeError> {
    Ok(HostValue::Undefined)
}

/// The runtime keeps ownership of returned `char *` buffers; they are copied
/// here, while the call's autorelease pool is still open, and never freed.
pub(crate) fn byte_string(
    record: &CallRecord,
    _runtime: &Rc<dyn ForeignRuntime>,
) -> Result<HostValue, BridgeError> {
    match slot(record)? {
        // SAFETY: the buffer belongs to the runtime and outlives the call
        NativeValue::ByteString(s) => Ok(match unsafe { s.to_string_lossy() } {
            Some(s) => HostValue::String(s),
            None => HostValue::Null,
        }),
        other => Err(mismatch(record, other)),
    }
}

pub(crate) fn reference(
    record: &CallRecord,
    runtime: &Rc<dyn ForeignRuntime>,
) -> Result<HostValue, BridgeError> {
    let value = slot(record)?;
    let raw = value.as_raw_ref().ok_or_else(|| mismatch(record, value))?;
    Ok(ForeignHandle::retain(runtime, raw)
        .map(HostValue::Handle)
        .unwrap_or(HostValue::Null))
}

pub(crate) fn selector(
    record: &CallRecord,
    runtime: &Rc<dyn ForeignRuntime>,
) -> Result<HostValue, BridgeError> {
    match slot(record)? {
        NativeValue::Selector(sel) if sel.is_null() => Ok(HostValue::Null),
        NativeValue::Selector(sel) => Ok(runtime
            .selector_name(*sel)
            .map(HostValue::String)
            .unwrap_or(HostValue::Null)),
        other => Err(mismatch(record, other)),
    }
}

pub(crate) fn unsupported(
    record: &CallRecord,
    _runtime: &Rc<dyn ForeignRuntime>,
) -> Result<HostValue, BridgeError> {
    Err(BridgeError::UnsupportedReturn {
        class: record.class_name().to_string(),
        selector: record.selector_name().to_string(),
        encoding: record.return_encoding().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        runtime::{mock::MockRuntime, RawRef, Selector},
        value::{ByteString, ClassRef, ObjectRef},
    };
    use std::ffi::CString;

    fn record_returning(kind: ElementKind, value: Option<NativeValue>) -> CallRecord {
        let mut record = CallRecord::new("Probe", "probe", "?", vec![], kind);
        if let Some(v) = value {
            record.set_return_value(v).unwrap();
        }
        record
    }

    fn runtime() -> (Rc<MockRuntime>, Rc<dyn ForeignRuntime>) {
        let mock = Rc::new(MockRuntime::new());
        let dynamic: Rc<dyn ForeignRuntime> = mock.clone();
        (mock, dynamic)
    }

    #[test]
    fn test_null_references_become_host_null() {
        let (_, rt) = runtime();
        let object = record_returning(ElementKind::Object, Some(ObjectRef(RawRef::NULL).into()));
        let class = record_returning(ElementKind::Class, Some(ClassRef(RawRef::NULL).into()));
        let sel = record_returning(ElementKind::Selector, Some(Selector::NULL.into()));
        let string = record_returning(
            ElementKind::ByteString,
            Some(ByteString::borrowed(std::ptr::null()).into()),
        );
        for (record, kind) in [
            (object, ElementKind::Object),
            (class, ElementKind::Class),
            (sel, ElementKind::Selector),
            (string, ElementKind::ByteString),
        ] {
            assert_eq!(convert(&record, kind, &rt).unwrap(), HostValue::Null);
        }
    }

    #[test]
    fn test_void_is_undefined_not_null() {
        let (_, rt) = runtime();
        let record = record_returning(ElementKind::Void, None);
        let value = convert(&record, ElementKind::Void, &rt).unwrap();
        assert!(value.is_undefined());
        assert!(!value.is_null());
    }

    #[test]
    fn test_numbers_and_bools() {
        let (_, rt) = runtime();
        let record = record_returning(ElementKind::U64, Some(19u64.into()));
        assert_eq!(convert(&record, ElementKind::U64, &rt).unwrap(), HostValue::Number(19.0));
        let record = record_returning(ElementKind::F32, Some(0.5f32.into()));
        assert_eq!(convert(&record, ElementKind::F32, &rt).unwrap(), HostValue::Number(0.5));
        let record = record_returning(ElementKind::Bool, Some(true.into()));
        assert_eq!(convert(&record, ElementKind::Bool, &rt).unwrap(), HostValue::Bool(true));
    }

    #[test]
    fn test_byte_string_is_copied() {
        let (_, rt) = runtime();
        let buffer = CString::new("UTF8").unwrap();
        let record = record_returning(
            ElementKind::ByteString,
            Some(ByteString::borrowed(buffer.as_ptr()).into()),
        );
        let value = convert(&record, ElementKind::ByteString, &rt).unwrap();
        drop(record);
        drop(buffer);
        assert_eq!(value, HostValue::from("UTF8"));
    }

    #[test]
    fn test_object_result_takes_a_stake() {
        let (mock, rt) = runtime();
        let class = mock.define_class("Widget");
        let object = mock.alloc("Widget", None);
        let record = record_returning(ElementKind::Object, Some(ObjectRef(object).into()));
        let value = convert(&record, ElementKind::Object, &rt).unwrap();
        assert_eq!(mock.retain_count(object), 1);
        assert_eq!(value.as_handle().map(|h| h.raw()), Some(object));
        drop(value);
        assert_eq!(mock.retain_count(object), 0);

        let record = record_returning(ElementKind::Class, Some(ClassRef(class).into()));
        let value = convert(&record, ElementKind::Class, &rt).unwrap();
        assert_eq!(value.as_handle().map(|h| h.class_name()), Some("Widget".to_string()));
    }

    #[test]
    fn test_selector_result_is_named() {
        let (mock, rt) = runtime();
        let sel = mock.register_selector(&CString::new("count").unwrap());
        let record = record_returning(ElementKind::Selector, Some(sel.into()));
        assert_eq!(
            convert(&record, ElementKind::Selector, &rt).unwrap(),
            HostValue::from("count")
        );
    }

    #[test]
    fn test_unsupported_and_malformed() {
        let (_, rt) = runtime();
        let record = record_returning(ElementKind::Unsupported, None);
        let err = convert(&record, ElementKind::Unsupported, &rt).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert_eq!(err.to_string(), "Unsupported return type '?' for probe (on Probe)");

        let record = record_returning(ElementKind::I32, None);
        assert_eq!(
            convert(&record, ElementKind::I32, &rt).unwrap_err().kind(),
            ErrorKind::Runtime
        );
    }
}
