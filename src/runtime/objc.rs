//! The `libobjc` backend.
//!
//! The runtime library is opened with `libloading` when an [`ObjcRuntime`] is
//! created, so nothing links against it at build time. Messages are sent
//! through `objc_msgSend` with a libffi call interface built from the
//! record's resolved kinds.

use std::{
    cell::RefCell,
    collections::HashMap,
    ffi::{c_char, c_uint, c_void, CStr, CString},
    path::{Path, PathBuf},
};

use libffi::middle::{Arg, Cif, CodePtr, Type};
use libloading::{Library, Symbol};
use tracing::{debug, trace};

use super::{AutoreleaseScope, ForeignRuntime, MethodSignature, PoolToken, RawRef, Selector};
use crate::{
    config::RuntimeConfig,
    dispatch::CallRecord,
    encoding::ElementKind,
    error::RuntimeError,
    value::{ByteString, ClassRef, NativeSlot, NativeValue, ObjectRef},
};

type Id = *mut c_void;
type Class = *mut c_void;
type Sel = *const c_void;
type Method = *mut c_void;

struct Symbols {
    objc_get_class: unsafe extern "C" fn(*const c_char) -> Class,
    object_get_class: unsafe extern "C" fn(Id) -> Class,
    class_get_name: unsafe extern "C" fn(Class) -> *const c_char,
    class_get_instance_method: unsafe extern "C" fn(Class, Sel) -> Method,
    method_get_number_of_arguments: unsafe extern "C" fn(Method) -> c_uint,
    method_copy_return_type: unsafe extern "C" fn(Method) -> *mut c_char,
    method_copy_argument_type: unsafe extern "C" fn(Method, c_uint) -> *mut c_char,
    sel_register_name: unsafe extern "C" fn(*const c_char) -> Sel,
    sel_get_name: unsafe extern "C" fn(Sel) -> *const c_char,
    objc_retain: unsafe extern "C" fn(Id) -> Id,
    objc_release: unsafe extern "C" fn(Id),
    autorelease_pool_push: unsafe extern "C" fn() -> *mut c_void,
    autorelease_pool_pop: unsafe extern "C" fn(*mut c_void),
    msg_send: CodePtr,
}

fn symbol<T: Copy>(library: &Library, path: &Path, name: &str) -> Result<T, RuntimeError> {
    let sym: Symbol<T> =
        unsafe { library.get(name.as_bytes()) }.map_err(|_| RuntimeError::SymbolNotFound {
            library: path.display().to_string(),
            symbol: name.to_string(),
        })?;
    Ok(*sym)
}

impl Symbols {
    fn load(library: &Library, path: &Path) -> Result<Self, RuntimeError> {
        let msg_send: unsafe extern "C" fn() = symbol(library, path, "objc_msgSend")?;
        Ok(Self {
            objc_get_class: symbol(library, path, "objc_getClass")?,
            object_get_class: symbol(library, path, "object_getClass")?,
            class_get_name: symbol(library, path, "class_getName")?,
            class_get_instance_method: symbol(library, path, "class_getInstanceMethod")?,
            method_get_number_of_arguments: symbol(library, path, "method_getNumberOfArguments")?,
            method_copy_return_type: symbol(library, path, "method_copyReturnType")?,
            method_copy_argument_type: symbol(library, path, "method_copyArgumentType")?,
            sel_register_name: symbol(library, path, "sel_registerName")?,
            sel_get_name: symbol(library, path, "sel_getName")?,
            objc_retain: symbol(library, path, "objc_retain")?,
            objc_release: symbol(library, path, "objc_release")?,
            autorelease_pool_push: symbol(library, path, "objc_autoreleasePoolPush")?,
            autorelease_pool_pop: symbol(library, path, "objc_autoreleasePoolPop")?,
            msg_send: CodePtr::from_fun(msg_send),
        })
    }
}

fn open(path: &Path) -> Result<Library, RuntimeError> {
    unsafe { Library::new(path) }.map_err(|e| RuntimeError::LibraryLoad {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Takes ownership of a `malloc`ed string returned by a `*_copy*` runtime function.
unsafe fn take_copied(ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let s = CStr::from_ptr(ptr).to_string_lossy().into_owned();
    libc::free(ptr.cast());
    Some(s)
}

fn ffi_type(kind: ElementKind) -> Option<Type> {
    let t = match kind {
        ElementKind::I8 => Type::i8(),
        ElementKind::I16 => Type::i16(),
        ElementKind::I32 => Type::i32(),
        ElementKind::I64 => Type::i64(),
        ElementKind::U8 | ElementKind::Bool => Type::u8(),
        ElementKind::U16 => Type::u16(),
        ElementKind::U32 => Type::u32(),
        ElementKind::U64 => Type::u64(),
        ElementKind::F32 => Type::f32(),
        ElementKind::F64 => Type::f64(),
        ElementKind::Void => Type::void(),
        ElementKind::ByteString
        | ElementKind::Object
        | ElementKind::Class
        | ElementKind::Selector => Type::pointer(),
        ElementKind::Unsupported => return None,
    };
    Some(t)
}

pub struct ObjcRuntime {
    symbols: Symbols,
    libraries: RefCell<HashMap<PathBuf, Library>>,
    // declared last so the symbols above never outlive it
    _libobjc: Library,
}

impl ObjcRuntime {
    /// Opens the runtime library named by `config` and loads its frameworks.
    pub fn load(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        debug!(path = %config.libobjc.display(), "loading Objective-C runtime");
        let libobjc = open(&config.libobjc)?;
        let symbols = Symbols::load(&libobjc, &config.libobjc)?;
        let runtime = Self {
            symbols,
            libraries: RefCell::new(HashMap::new()),
            _libobjc: libobjc,
        };
        for framework in &config.frameworks {
            runtime.load_library(framework)?;
        }
        Ok(runtime)
    }

    /// Sends a message whose arguments and return value each fit in one word.
    unsafe fn send_word(&self, receiver: *mut c_void, selector: &CStr, args: &[usize]) -> usize {
        let sel = (self.symbols.sel_register_name)(selector.as_ptr());
        let mut types = vec![Type::pointer(), Type::pointer()];
        types.extend(args.iter().map(|_| Type::usize()));
        let cif = Cif::new(types, Type::usize());
        let mut ffi_args = vec![Arg::new(&receiver), Arg::new(&sel)];
        ffi_args.extend(args.iter().map(Arg::new));
        cif.call::<usize>(self.symbols.msg_send, &ffi_args)
    }

    /// Asks the receiver for its own `NSMethodSignature`. Proxies and
    /// forwarding objects answer here without implementing `selector`.
    fn forwarded_signature(&self, receiver: RawRef, selector: Selector) -> Option<MethodSignature> {
        unsafe {
            let class = (self.symbols.object_get_class)(receiver.as_ptr());
            let query = (self.symbols.sel_register_name)(c"methodSignatureForSelector:".as_ptr());
            if (self.symbols.class_get_instance_method)(class, query).is_null() {
                return None;
            }

            let _pool = AutoreleaseScope::enter(self);
            let signature = self.send_word(
                receiver.as_ptr(),
                c"methodSignatureForSelector:",
                &[selector.as_ptr() as usize],
            ) as *mut c_void;
            if signature.is_null() {
                return None;
            }

            // the encodings point into the signature object; copy them out
            // before the pool drains
            let copy = |ptr: usize| {
                let ptr = ptr as *const c_char;
                (!ptr.is_null()).then(|| CStr::from_ptr(ptr).to_string_lossy().into_owned())
            };
            let return_encoding = copy(self.send_word(signature, c"methodReturnType", &[]))?;
            let count = self.send_word(signature, c"numberOfArguments", &[]);
            let argument_encodings = (2..count)
                .map(|i| copy(self.send_word(signature, c"getArgumentTypeAtIndex:", &[i])))
                .collect::<Option<Vec<_>>>()?;
            debug!(?receiver, ?selector, "resolved signature through methodSignatureForSelector:");
            Some(MethodSignature {
                return_encoding,
                argument_encodings,
            })
        }
    }
}

impl ForeignRuntime for ObjcRuntime {
    fn class_named(&self, name: &str) -> Option<RawRef> {
        let name = CString::new(name).ok()?;
        let class = unsafe { (self.symbols.objc_get_class)(name.as_ptr()) };
        (!class.is_null()).then(|| RawRef::from_ptr(class))
    }

    fn class_name(&self, object: RawRef) -> String {
        if object.is_null() {
            return "nil".to_string();
        }
        unsafe {
            let class = (self.symbols.object_get_class)(object.as_ptr());
            let name = (self.symbols.class_get_name)(class);
            if name.is_null() {
                return "?".to_string();
            }
            CStr::from_ptr(name).to_string_lossy().into_owned()
        }
    }

    fn method_signature(&self, receiver: RawRef, selector: Selector) -> Option<MethodSignature> {
        if receiver.is_null() || selector.is_null() {
            return None;
        }
        unsafe {
            // for a class object this is the metaclass, whose instance
            // methods are the class methods
            let class = (self.symbols.object_get_class)(receiver.as_ptr());
            let method = (self.symbols.class_get_instance_method)(class, selector.as_ptr());
            if method.is_null() {
                return self.forwarded_signature(receiver, selector);
            }
            let count = (self.symbols.method_get_number_of_arguments)(method);
            let return_encoding = take_copied((self.symbols.method_copy_return_type)(method))?;
            // indices 0 and 1 are self and _cmd
            let argument_encodings = (2..count)
                .map(|i| take_copied((self.symbols.method_copy_argument_type)(method, i)))
                .collect::<Option<Vec<_>>>()?;
            Some(MethodSignature {
                return_encoding,
                argument_encodings,
            })
        }
    }

    fn register_selector(&self, name: &CStr) -> Selector {
        Selector::from_ptr(unsafe { (self.symbols.sel_register_name)(name.as_ptr()) })
    }

    fn selector_name(&self, selector: Selector) -> Option<String> {
        if selector.is_null() {
            return None;
        }
        let name = unsafe { (self.symbols.sel_get_name)(selector.as_ptr()) };
        if name.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }

    fn retain(&self, object: RawRef) {
        if !object.is_null() {
            trace!(?object, "objc_retain");
            unsafe { (self.symbols.objc_retain)(object.as_ptr()) };
        }
    }

    fn release(&self, object: RawRef) {
        if !object.is_null() {
            trace!(?object, "objc_release");
            unsafe { (self.symbols.objc_release)(object.as_ptr()) };
        }
    }

    fn push_autorelease_pool(&self) -> PoolToken {
        PoolToken(unsafe { (self.symbols.autorelease_pool_push)() })
    }

    fn pop_autorelease_pool(&self, token: PoolToken) {
        unsafe { (self.symbols.autorelease_pool_pop)(token.0) }
    }

    fn invoke(&self, record: &mut CallRecord) -> Result<(), RuntimeError> {
        let unsupported = |kind: ElementKind| RuntimeError::MalformedRecord {
            selector: record.selector_name().to_string(),
            reason: format!("no native representation for {kind}"),
        };

        let mut types = vec![Type::pointer(), Type::pointer()];
        for kind in record.argument_kinds() {
            types.push(ffi_type(*kind).ok_or_else(|| unsupported(*kind))?);
        }
        let return_kind = record.return_kind();
        let return_type = ffi_type(return_kind).ok_or_else(|| unsupported(return_kind))?;
        let cif = Cif::new(types, return_type);

        let receiver = record.receiver().as_ptr();
        let selector = record.selector().as_ptr();
        let slots = record.arguments()?;
        let mut args: Vec<Arg> = vec![Arg::new(&receiver), Arg::new(&selector)];
        args.extend(slots.iter().map(|v| v.as_ffi_arg()));

        let target = self.symbols.msg_send;
        macro_rules! read_return {
            ($t:ty) => {
                unsafe { cif.call::<$t>(target, &args) }
            };
        }
        // libffi widens integer returns narrower than a register to a full
        // ffi_arg, so those are read as u64 and truncated
        macro_rules! read_widened {
            ($t:ty) => {
                read_return!(u64) as $t
            };
        }
        macro_rules! read_pointer {
            () => {
                read_return!(*mut u8) as *mut c_void
            };
        }

        let value: Option<NativeValue> = match return_kind {
            ElementKind::I8 => Some(read_widened!(i8).into()),
            ElementKind::I16 => Some(read_widened!(i16).into()),
            ElementKind::I32 => Some(read_widened!(i32).into()),
            ElementKind::I64 => Some(read_return!(i64).into()),
            ElementKind::U8 => Some(read_widened!(u8).into()),
            ElementKind::U16 => Some(read_widened!(u16).into()),
            ElementKind::U32 => Some(read_widened!(u32).into()),
            ElementKind::U64 => Some(read_return!(u64).into()),
            ElementKind::F32 => Some(read_return!(f32).into()),
            ElementKind::F64 => Some(read_return!(f64).into()),
            ElementKind::Bool => Some((read_widened!(u8) != 0).into()),
            ElementKind::Void => {
                let _: c_void = read_return!(c_void);
                None
            }
            ElementKind::ByteString => {
                Some(ByteString::borrowed(read_pointer!() as *const c_char).into())
            }
            ElementKind::Object => Some(ObjectRef(RawRef::from_ptr(read_pointer!())).into()),
            ElementKind::Class => Some(ClassRef(RawRef::from_ptr(read_pointer!())).into()),
            ElementKind::Selector => Some(Selector::from_ptr(read_pointer!() as *const c_void).into()),
            ElementKind::Unsupported => return Err(unsupported(return_kind)),
        };
        drop(args);

        if let Some(value) = value {
            record.set_return_value(value)?;
        }
        Ok(())
    }

    fn load_library(&self, path: &Path) -> Result<(), RuntimeError> {
        let mut libraries = self.libraries.borrow_mut();
        if libraries.contains_key(path) {
            return Ok(());
        }
        debug!(path = %path.display(), "loading library");
        let library = open(path)?;
        libraries.insert(path.to_path_buf(), library);
        Ok(())
    }
}

#[cfg(all(test, target_os = "macos"))]
mod tests {
    use super::*;

    #[test]
    fn test_libobjc_binds() {
        let runtime = ObjcRuntime::load(&RuntimeConfig::default()).unwrap();
        let class = runtime.class_named("NSObject").unwrap();
        assert_eq!(runtime.class_name(class), "NSObject");
        let sel = runtime.register_selector(c"description");
        assert_eq!(runtime.selector_name(sel).as_deref(), Some("description"));
        assert!(runtime.method_signature(class, sel).is_some());
    }

    #[test]
    fn test_signature_from_method_signature_for_selector() {
        let config = RuntimeConfig::default()
            .with_framework("/System/Library/Frameworks/Foundation.framework/Foundation");
        let runtime = ObjcRuntime::load(&config).unwrap();
        let class = runtime.class_named("NSString").unwrap();
        let sel = runtime.register_selector(c"stringWithUTF8String:");

        let direct = runtime.method_signature(class, sel).unwrap();
        let forwarded = runtime.forwarded_signature(class, sel).unwrap();
        assert_eq!(forwarded.arity(), 1);
        assert_eq!(forwarded.return_encoding.chars().next(), Some('@'));
        assert_eq!(
            crate::encoding::resolve(&forwarded.argument_encodings[0]).0,
            crate::encoding::resolve(&direct.argument_encodings[0]).0
        );

        let missing = runtime.register_selector(c"notARealSelector");
        assert!(runtime.forwarded_signature(class, missing).is_none());
    }
}
