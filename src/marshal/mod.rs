//! Host ↔ native value conversion.
//!
//! Each [`ElementKind`] owns one pair of conversion functions, looked up by
//! kind in [`CONVERSIONS`]. The kind set is closed, so the table is too.

use std::{
    fmt::{self, Display, Formatter},
    rc::Rc,
};

use crate::{
    dispatch::CallRecord,
    encoding::ElementKind,
    error::BridgeError,
    runtime::ForeignRuntime,
    value::{HostValue, NativeValue},
};

pub mod args;
pub mod ret;

/// Where an argument conversion happened. Only used in error messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgumentContext {
    pub class_name: String,
    pub selector_name: String,
    /// Zero-based position in the host argument list.
    pub index: usize,
}

impl ArgumentContext {
    pub fn new(class_name: impl Into<String>, selector_name: impl Into<String>, index: usize) -> Self {
        Self {
            class_name: class_name.into(),
            selector_name: selector_name.into(),
            index,
        }
    }
}

impl Display for ArgumentContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error converting argument {} of {} (on {})",
            self.index, self.selector_name, self.class_name
        )
    }
}

pub(crate) type ToNative =
    fn(&HostValue, &ArgumentContext, &dyn ForeignRuntime) -> Result<NativeValue, BridgeError>;

pub(crate) type ToHost = fn(&CallRecord, &Rc<dyn ForeignRuntime>) -> Result<HostValue, BridgeError>;

pub(crate) struct Conversion {
    pub to_native: ToNative,
    pub to_host: ToHost,
}

/// Indexed by [`ElementKind::index`].
pub(crate) const CONVERSIONS: [Conversion; ElementKind::COUNT] = [
    Conversion { to_native: args::numeric::<i8>, to_host: ret::number },
    Conversion { to_native: args::numeric::<i16>, to_host: ret::number },
    Conversion { to_native: args::numeric::<i32>, to_host: ret::number },
    Conversion { to_native: args::numeric::<i64>, to_host: ret::number },
    Conversion { to_native: args::numeric::<u8>, to_host: ret::number },
    Conversion { to_native: args::numeric::<u16>, to_host: ret::number },
    Conversion { to_native: args::numeric::<u32>, to_host: ret::number },
    Conversion { to_native: args::numeric::<u64>, to_host: ret::number },
    Conversion { to_native: args::numeric::<f32>, to_host: ret::number },
    Conversion { to_native: args::numeric::<f64>, to_host: ret::number },
    Conversion { to_native: args::boolean, to_host: ret::boolean },
    Conversion { to_native: args::unsupported, to_host: ret::void },
    Conversion { to_native: args::byte_string, to_host: ret::byte_string },
    Conversion { to_native: args::object, to_host: ret::reference },
    Conversion { to_native: args::unsupported, to_host: ret::reference },
    Conversion { to_native: args::selector, to_host: ret::selector },
    Conversion { to_native: args::unsupported, to_host: ret::unsupported },
];

#[inline]
pub(crate) fn conversion(kind: ElementKind) -> &'static Conversion {
    &CONVERSIONS[kind.index()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::MockRuntime;

    #[test]
    fn test_table_covers_every_numeric_kind() {
        let runtime = MockRuntime::new();
        let ctx = ArgumentContext::new("Test", "test:", 0);
        for kind in ElementKind::ALL.iter().filter(|k| k.is_numeric()) {
            let native = (conversion(*kind).to_native)(&HostValue::Number(1.0), &ctx, &runtime)
                .unwrap();
            use crate::value::NativeSlot;
            assert_eq!(native.kind(), *kind);
        }
    }
}
