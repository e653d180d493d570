//! The invocation dispatcher.
//!
//! A send resolves the method signature, converts every argument, and only
//! then builds and executes a [`CallRecord`]. A failure anywhere before the
//! call leaves the target method unexecuted.

use std::{ffi::CString, rc::Rc};

use tracing::{debug, trace};

use crate::{
    encoding::{self, ElementKind},
    error::{BridgeError, RuntimeError},
    marshal::{args, ret, ArgumentContext},
    runtime::{AutoreleaseScope, ForeignRuntime, RawRef},
    value::{HostValue, NativeSlot},
};

mod record;

pub use record::CallRecord;

/// Sends `selector_name` to `receiver` with `host_args` and converts the result.
pub fn send(
    runtime: &Rc<dyn ForeignRuntime>,
    receiver: RawRef,
    selector_name: &str,
    host_args: &[HostValue],
) -> Result<HostValue, BridgeError> {
    let class_name = runtime.class_name(receiver);
    debug!(
        class = %class_name,
        selector = selector_name,
        argc = host_args.len(),
        "dispatching message"
    );

    let c_name = CString::new(selector_name)
        .map_err(|_| RuntimeError::InvalidSelectorName(selector_name.to_string()))?;
    let selector = runtime.register_selector(&c_name);

    let signature = runtime
        .method_signature(receiver, selector)
        .ok_or_else(|| BridgeError::Lookup {
            class: class_name.clone(),
            selector: selector_name.to_string(),
        })?;
    trace!(?signature, "resolved method signature");

    // libffi needs the return type up front, so an unsupported one is
    // rejected before anything is sent
    let return_kind = match encoding::resolve(&signature.return_encoding).0 {
        Some(kind) if kind != ElementKind::Unsupported => kind,
        _ => {
            return Err(BridgeError::UnsupportedReturn {
                class: class_name,
                selector: selector_name.to_string(),
                encoding: signature.return_encoding,
            })
        }
    };

    if host_args.len() > signature.arity() {
        return Err(BridgeError::TypeConversion {
            context: ArgumentContext::new(class_name, selector_name, signature.arity()),
            reason: format!("Unexpected argument (method takes {})", signature.arity()),
        });
    }

    let mut kinds = Vec::with_capacity(signature.arity());
    let mut natives = Vec::with_capacity(signature.arity());
    for (index, arg_encoding) in signature.argument_encodings.iter().enumerate() {
        let context = ArgumentContext::new(class_name.as_str(), selector_name, index);
        let value = host_args.get(index).unwrap_or(&HostValue::Undefined);
        let Some(kind) = encoding::resolve(arg_encoding).0 else {
            return Err(BridgeError::UnsupportedArgument {
                context,
                reason: format!("Unsupported argument type '{arg_encoding}'"),
            });
        };
        let native = args::convert(value, kind, &context, runtime.as_ref())?;
        trace!(index, %kind, ?native, "converted argument");
        kinds.push(native.kind());
        natives.push(native);
    }

    let mut record = CallRecord::new(
        class_name,
        selector_name,
        signature.return_encoding,
        kinds,
        return_kind,
    );
    record.set_target(receiver);
    record.set_selector(selector);
    for (index, native) in natives.into_iter().enumerate() {
        record.set_argument(index, native)?;
    }

    let _pool = AutoreleaseScope::enter(runtime.as_ref());
    runtime.invoke(&mut record)?;
    trace!(result = ?record.return_value(), "message returned");
    ret::convert(&record, return_kind, runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, runtime::mock::MockRuntime, value::NativeValue};

    fn setup() -> (Rc<MockRuntime>, Rc<dyn ForeignRuntime>, RawRef) {
        let mock = Rc::new(MockRuntime::new());
        let class = mock.define_class("Counter");
        mock.define_class_method("Counter", "add:to:", "q", &["q", "q"], |_, _, args| {
            match args {
                [NativeValue::I64(a), NativeValue::I64(b)] => Some(NativeValue::from(a + b)),
                _ => None,
            }
        });
        mock.define_class_method("Counter", "shape", "{CGSize=dd}", &[], |_, _, _| None);
        mock.define_class_method("Counter", "takeStruct:", "v", &["{CGSize=dd}"], |_, _, _| None);
        let dynamic: Rc<dyn ForeignRuntime> = mock.clone();
        (mock, dynamic, class)
    }

    #[test]
    fn test_send_converts_and_returns() {
        let (mock, rt, class) = setup();
        let result = send(&rt, class, "add:to:", &[2.0.into(), 40.0.into()]).unwrap();
        assert_eq!(result, HostValue::Number(42.0));
        assert_eq!(mock.invocation_count(), 1);
        assert_eq!(mock.pool_depth(), 0);
    }

    #[test]
    fn test_failed_conversion_issues_no_call() {
        let (mock, rt, class) = setup();
        let err = send(&rt, class, "add:to:", &[2.0.into(), 0.5.into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeConversion);
        assert_eq!(err.context().map(|c| c.index), Some(1));
        assert_eq!(mock.invocation_count(), 0);
    }

    #[test]
    fn test_arity() {
        let (mock, rt, class) = setup();
        let err = send(&rt, class, "add:to:", &[1.0.into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeConversion);
        let err = send(&rt, class, "add:to:", &[1.0.into(), 2.0.into(), 3.0.into()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error converting argument 2 of add:to: (on Counter): Unexpected argument (method takes 2)"
        );
        assert_eq!(mock.invocation_count(), 0);
    }

    #[test]
    fn test_lookup_and_unsupported() {
        let (mock, rt, class) = setup();
        let err = send(&rt, class, "missing", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert_eq!(err.to_string(), "Method missing not found on Counter");

        let err = send(&rt, class, "shape", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        let err = send(&rt, class, "takeStruct:", &[HostValue::Null]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
        assert_eq!(mock.invocation_count(), 0);
    }

    #[test]
    fn test_invalid_selector_name() {
        let (_, rt, class) = setup();
        let err = send(&rt, class, "bad\0name", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }
}
