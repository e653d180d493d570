use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::ffi::CString;
use tracing::debug;

use crate::{
    encoding::ElementKind,
    error::BridgeError,
    marshal::{conversion, ArgumentContext},
    runtime::ForeignRuntime,
    value::{ByteString, HostValue, NativeValue, ObjectRef},
};

/// Converts one host argument into the native value a parameter of `kind`
/// expects.
pub fn convert(
    value: &HostValue,
    kind: ElementKind,
    context: &ArgumentContext,
    runtime: &dyn ForeignRuntime,
) -> Result<NativeValue, BridgeError> {
    let result = (conversion(kind).to_native)(value, context, runtime);
    if let Err(e) = &result {
        debug!(%e, kind = %kind, "argument conversion rejected");
    }
    result
}

fn type_error(context: &ArgumentContext, reason: impl Into<String>) -> BridgeError {
    BridgeError::TypeConversion {
        context: context.clone(),
        reason: reason.into(),
    }
}

fn range_error(context: &ArgumentContext, reason: impl Into<String>) -> BridgeError {
    BridgeError::Range {
        context: context.clone(),
        reason: reason.into(),
    }
}

/// A native numeric type an argument can be converted to.
pub(crate) trait NativeNumber: Copy + Into<NativeValue> {
    const INTEGRAL: bool;
    const SIGNED: bool;

    /// Whether a finite `f64` lies within this type's bounds.
    fn in_range(d: f64) -> bool;
    fn from_f64(d: f64) -> Self;
    fn from_i64(v: i64) -> Option<Self>;
    fn from_u64(v: u64) -> Option<Self>;
}

macro_rules! integral_number {
    ($($t:ty => $signed:expr),* $(,)?) => {
        $(
            impl NativeNumber for $t {
                const INTEGRAL: bool = true;
                const SIGNED: bool = $signed;

                fn in_range(d: f64) -> bool {
                    // MIN and MAX + 1 are both exact in f64 (MAX of the 64-bit
                    // types already rounds up to the next power of two)
                    d >= <$t>::MIN as f64 && d < <$t>::MAX as f64 + 1.0
                }

                fn from_f64(d: f64) -> Self {
                    d as $t
                }

                fn from_i64(v: i64) -> Option<Self> {
                    <$t>::try_from(v).ok()
                }

                fn from_u64(v: u64) -> Option<Self> {
                    <$t>::try_from(v).ok()
                }
            }
        )*
    };
}

integral_number! {
    i8 => true,
    i16 => true,
    i32 => true,
    i64 => true,
    u8 => false,
    u16 => false,
    u32 => false,
    u64 => false,
}

impl NativeNumber for f32 {
    const INTEGRAL: bool = false;
    const SIGNED: bool = true;

    fn in_range(d: f64) -> bool {
        d >= f32::MIN as f64 && d <= f32::MAX as f64
    }

    fn from_f64(d: f64) -> Self {
        d as f32
    }

    fn from_i64(v: i64) -> Option<Self> {
        Some(v as f32)
    }

    fn from_u64(v: u64) -> Option<Self> {
        Self::in_range(v as f64).then_some(v as f32)
    }
}

impl NativeNumber for f64 {
    const INTEGRAL: bool = false;
    const SIGNED: bool = true;

    fn in_range(_d: f64) -> bool {
        true
    }

    fn from_f64(d: f64) -> Self {
        d
    }

    fn from_i64(v: i64) -> Option<Self> {
        Some(v as f64)
    }

    fn from_u64(v: u64) -> Option<Self> {
        Some(v as f64)
    }
}

fn number_to_native<T: NativeNumber>(d: f64, context: &ArgumentContext) -> Result<T, BridgeError> {
    if d.is_nan() {
        return Err(type_error(context, "Number cannot be NaN"));
    }
    if d.is_infinite() {
        return Err(range_error(context, "Number cannot be infinite"));
    }
    if T::INTEGRAL && d.fract() != 0.0 {
        return Err(type_error(context, "Number must be an integer"));
    }
    if !T::in_range(d) {
        return Err(range_error(context, "Number is out of range"));
    }
    Ok(T::from_f64(d))
}

fn bigint_to_native<T: NativeNumber>(
    b: &BigInt,
    context: &ArgumentContext,
) -> Result<T, BridgeError> {
    if T::INTEGRAL {
        return if T::SIGNED {
            let v = b.to_i64().ok_or_else(|| {
                range_error(context, "BigInt out of range for a signed 64-bit integer")
            })?;
            T::from_i64(v).ok_or_else(|| range_error(context, "BigInt out of range"))
        } else {
            let v = b.to_u64().ok_or_else(|| {
                range_error(context, "BigInt out of range for an unsigned 64-bit integer")
            })?;
            T::from_u64(v).ok_or_else(|| range_error(context, "BigInt out of range"))
        };
    }

    if let Some(v) = b.to_i64() {
        return T::from_i64(v)
            .ok_or_else(|| range_error(context, "BigInt too large for floating point value"));
    }
    if let Some(v) = b.to_u64() {
        return T::from_u64(v)
            .ok_or_else(|| range_error(context, "BigInt too large for floating point value"));
    }
    Err(range_error(context, "BigInt out of 64-bit representable range"))
}

pub(crate) fn numeric<T: NativeNumber>(
    value: &HostValue,
    context: &ArgumentContext,
    _runtime: &dyn ForeignRuntime,
) -> Result<NativeValue, BridgeError> {
    match value {
        HostValue::Number(d) => number_to_native::<T>(*d, context).map(Into::into),
        HostValue::BigInt(b) => bigint_to_native::<T>(b, context).map(Into::into),
        _ => Err(type_error(context, "Expected a number or bigint")),
    }
}

pub(crate) fn boolean(
    value: &HostValue,
    context: &ArgumentContext,
    _runtime: &dyn ForeignRuntime,
) -> Result<NativeValue, BridgeError> {
    value
        .as_bool()
        .map(NativeValue::from)
        .ok_or_else(|| type_error(context, "Expected a boolean"))
}

pub(crate) fn byte_string(
    value: &HostValue,
    context: &ArgumentContext,
    _runtime: &dyn ForeignRuntime,
) -> Result<NativeValue, BridgeError> {
    let s = value
        .as_str()
        .ok_or_else(|| type_error(context, "Expected a string"))?;
    let owned =
        CString::new(s).map_err(|_| type_error(context, "String cannot contain NUL bytes"))?;
    Ok(ByteString::owned(owned).into())
}

pub(crate) fn selector(
    value: &HostValue,
    context: &ArgumentContext,
    runtime: &dyn ForeignRuntime,
) -> Result<NativeValue, BridgeError> {
    let name = value
        .as_str()
        .ok_or_else(|| type_error(context, "Expected a string"))?;
    let name =
        CString::new(name).map_err(|_| type_error(context, "Selector cannot contain NUL bytes"))?;
    Ok(runtime.register_selector(&name).into())
}

pub(crate) fn object(
    value: &HostValue,
    context: &ArgumentContext,
    _runtime: &dyn ForeignRuntime,
) -> Result<NativeValue, BridgeError> {
    match value.as_handle() {
        Some(handle) => Ok(ObjectRef(handle.raw()).into()),
        None => Err(BridgeError::UnsupportedArgument {
            context: context.clone(),
            reason: format!(
                "Unsupported argument type (expected a wrapped object, got {})",
                value.type_name()
            ),
        }),
    }
}

pub(crate) fn unsupported(
    _value: &HostValue,
    context: &ArgumentContext,
    _runtime: &dyn ForeignRuntime,
) -> Result<NativeValue, BridgeError> {
    Err(BridgeError::UnsupportedArgument {
        context: context.clone(),
        reason: "Unsupported argument type".to_string(),
    })
}
