//! An in-process stand-in for the Objective-C runtime.
//!
//! Classes and methods are scripted from Rust. Object and selector pointers
//! are opaque tokens that are never dereferenced. Retain counts, invocations
//! and autorelease pool depth are observable so the bridge's ownership rules
//! can be checked without `libobjc`.

use std::{
    cell::RefCell,
    collections::HashMap,
    ffi::{c_void, CStr, CString},
    path::{Path, PathBuf},
    rc::Rc,
};

use tracing::trace;

use super::{ForeignRuntime, MethodSignature, PoolToken, RawRef, Selector};
use crate::{
    dispatch::CallRecord,
    error::RuntimeError,
    value::{ByteString, NativeValue},
};

/// A scripted method body: `(runtime, receiver, arguments) -> return value`.
/// Void methods return `None`.
pub type MethodImpl = Rc<dyn Fn(&MockRuntime, RawRef, &[NativeValue]) -> Option<NativeValue>>;

#[derive(Clone)]
struct MockMethod {
    signature: MethodSignature,
    implementation: MethodImpl,
}

#[derive(Default)]
struct MockClass {
    name: String,
    instance_methods: HashMap<String, MockMethod>,
    class_methods: HashMap<String, MockMethod>,
}

struct MockObject {
    class: String,
    is_class: bool,
    text: Option<String>,
    retain_count: isize,
}

#[derive(Default)]
struct MockState {
    objects: Vec<MockObject>,
    classes: HashMap<String, (RawRef, MockClass)>,
    selectors: Vec<String>,
    selector_ids: HashMap<String, usize>,
    pool_depth: usize,
    autoreleased: Vec<(usize, CString)>,
    invocations: usize,
    libraries: Vec<PathBuf>,
}

const TOKEN_STRIDE: usize = 16;

fn token(index: usize) -> *mut c_void {
    ((index + 1) * TOKEN_STRIDE) as *mut c_void
}

fn token_index(ptr: *const c_void) -> Option<usize> {
    let addr = ptr as usize;
    if addr == 0 || addr % TOKEN_STRIDE != 0 {
        return None;
    }
    Some(addr / TOKEN_STRIDE - 1)
}

#[derive(Default)]
pub struct MockRuntime {
    state: RefCell<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a class and returns its class object. Every class answers
    /// `respondsToSelector:` on both the class and its instances.
    pub fn define_class(&self, name: &str) -> RawRef {
        let raw = {
            let mut state = self.state.borrow_mut();
            if let Some((raw, _)) = state.classes.get(name) {
                return *raw;
            }
            let raw = RawRef::from_ptr(token(state.objects.len()));
            state.objects.push(MockObject {
                class: name.to_string(),
                is_class: true,
                text: None,
                retain_count: 0,
            });
            let class = MockClass {
                name: name.to_string(),
                ..MockClass::default()
            };
            state.classes.insert(name.to_string(), (raw, class));
            raw
        };

        let responds = |rt: &MockRuntime, receiver: RawRef, args: &[NativeValue]| match args {
            [NativeValue::Selector(sel)] => Some(NativeValue::from(rt.responds(receiver, *sel))),
            _ => Some(NativeValue::from(false)),
        };
        self.define_method(name, "respondsToSelector:", "B", &[":"], responds);
        self.define_class_method(name, "respondsToSelector:", "B", &[":"], responds);
        raw
    }

    fn insert_method(
        &self,
        class: &str,
        selector: &str,
        method: MockMethod,
        on_class: bool,
    ) {
        let mut state = self.state.borrow_mut();
        let Some((_, class)) = state.classes.get_mut(class) else {
            panic!("method {selector} defined on unknown mock class {class}");
        };
        let table = if on_class {
            &mut class.class_methods
        } else {
            &mut class.instance_methods
        };
        table.insert(selector.to_string(), method);
    }

    /// Adds an instance method to `class`.
    ///
    /// # Panics
    ///
    /// Panics if `class` was never passed to [`MockRuntime::define_class`].
    pub fn define_method<F>(
        &self,
        class: &str,
        selector: &str,
        return_encoding: &str,
        argument_encodings: &[&str],
        implementation: F,
    ) where
        F: Fn(&MockRuntime, RawRef, &[NativeValue]) -> Option<NativeValue> + 'static,
    {
        let method = MockMethod {
            signature: MethodSignature::new(return_encoding, argument_encodings),
            implementation: Rc::new(implementation),
        };
        self.insert_method(class, selector, method, false);
    }

    /// Adds a class method to `class`.
    ///
    /// # Panics
    ///
    /// Panics if `class` was never passed to [`MockRuntime::define_class`].
    pub fn define_class_method<F>(
        &self,
        class: &str,
        selector: &str,
        return_encoding: &str,
        argument_encodings: &[&str],
        implementation: F,
    ) where
        F: Fn(&MockRuntime, RawRef, &[NativeValue]) -> Option<NativeValue> + 'static,
    {
        let method = MockMethod {
            signature: MethodSignature::new(return_encoding, argument_encodings),
            implementation: Rc::new(implementation),
        };
        self.insert_method(class, selector, method, true);
    }

    /// Creates an instance of `class`, optionally carrying a string payload.
    /// New objects start with no retaining stakes.
    pub fn alloc(&self, class: &str, text: Option<&str>) -> RawRef {
        let mut state = self.state.borrow_mut();
        let raw = RawRef::from_ptr(token(state.objects.len()));
        state.objects.push(MockObject {
            class: class.to_string(),
            is_class: false,
            text: text.map(str::to_string),
            retain_count: 0,
        });
        raw
    }

    pub fn text(&self, object: RawRef) -> Option<String> {
        let state = self.state.borrow();
        let index = token_index(object.as_ptr())?;
        state.objects.get(index)?.text.clone()
    }

    pub fn retain_count(&self, object: RawRef) -> isize {
        let state = self.state.borrow();
        token_index(object.as_ptr())
            .and_then(|i| state.objects.get(i))
            .map_or(0, |o| o.retain_count)
    }

    pub fn invocation_count(&self) -> usize {
        self.state.borrow().invocations
    }

    pub fn pool_depth(&self) -> usize {
        self.state.borrow().pool_depth
    }

    pub fn loaded_libraries(&self) -> Vec<PathBuf> {
        self.state.borrow().libraries.clone()
    }

    /// A `char *` owned by the innermost autorelease pool, the way methods
    /// like `UTF8String` hand out their buffers.
    pub fn autorelease_string(&self, s: &str) -> NativeValue {
        let mut state = self.state.borrow_mut();
        let owned = CString::new(s.replace('\0', "")).unwrap_or_default();
        let ptr = owned.as_ptr();
        let depth = state.pool_depth;
        state.autoreleased.push((depth, owned));
        ByteString::borrowed(ptr).into()
    }

    fn lookup(&self, receiver: RawRef, selector: Selector) -> Option<MockMethod> {
        let state = self.state.borrow();
        let object = state.objects.get(token_index(receiver.as_ptr())?)?;
        let name = state.selectors.get(token_index(selector.as_ptr())?)?;
        let (_, class) = state.classes.get(&object.class)?;
        let table = if object.is_class {
            &class.class_methods
        } else {
            &class.instance_methods
        };
        table.get(name).cloned()
    }

    pub fn responds(&self, receiver: RawRef, selector: Selector) -> bool {
        self.lookup(receiver, selector).is_some()
    }
}

impl ForeignRuntime for MockRuntime {
    fn class_named(&self, name: &str) -> Option<RawRef> {
        self.state.borrow().classes.get(name).map(|(raw, _)| *raw)
    }

    fn class_name(&self, object: RawRef) -> String {
        let state = self.state.borrow();
        token_index(object.as_ptr())
            .and_then(|i| state.objects.get(i))
            .and_then(|o| state.classes.get(&o.class))
            .map_or_else(|| "nil".to_string(), |(_, class)| class.name.clone())
    }

    fn method_signature(&self, receiver: RawRef, selector: Selector) -> Option<MethodSignature> {
        self.lookup(receiver, selector).map(|m| m.signature)
    }

    fn register_selector(&self, name: &CStr) -> Selector {
        let name = name.to_string_lossy().into_owned();
        let mut state = self.state.borrow_mut();
        let index = match state.selector_ids.get(&name) {
            Some(&index) => index,
            None => {
                let index = state.selectors.len();
                state.selectors.push(name.clone());
                state.selector_ids.insert(name, index);
                index
            }
        };
        Selector::from_ptr(token(index))
    }

    fn selector_name(&self, selector: Selector) -> Option<String> {
        let state = self.state.borrow();
        state.selectors.get(token_index(selector.as_ptr())?).cloned()
    }

    fn retain(&self, object: RawRef) {
        let mut state = self.state.borrow_mut();
        if let Some(o) = token_index(object.as_ptr()).and_then(|i| state.objects.get_mut(i)) {
            o.retain_count += 1;
            trace!(?object, count = o.retain_count, "mock retain");
        }
    }

    fn release(&self, object: RawRef) {
        let mut state = self.state.borrow_mut();
        if let Some(o) = token_index(object.as_ptr()).and_then(|i| state.objects.get_mut(i)) {
            o.retain_count -= 1;
            trace!(?object, count = o.retain_count, "mock release");
        }
    }

    fn push_autorelease_pool(&self) -> PoolToken {
        let mut state = self.state.borrow_mut();
        state.pool_depth += 1;
        PoolToken(state.pool_depth as *mut c_void)
    }

    fn pop_autorelease_pool(&self, token: PoolToken) {
        let mut state = self.state.borrow_mut();
        let depth = token.0 as usize;
        state.autoreleased.retain(|(d, _)| *d < depth);
        state.pool_depth = depth.saturating_sub(1);
    }

    fn invoke(&self, record: &mut CallRecord) -> Result<(), RuntimeError> {
        let method = self
            .lookup(record.receiver(), record.selector())
            .ok_or_else(|| RuntimeError::MalformedRecord {
                selector: record.selector_name().to_string(),
                reason: "receiver does not implement selector".to_string(),
            })?;
        let args: Vec<NativeValue> = record.arguments()?.into_iter().cloned().collect();
        self.state.borrow_mut().invocations += 1;

        // no borrow is held here, so implementations may call back in
        if let Some(value) = (method.implementation)(self, record.receiver(), &args) {
            record.set_return_value(value)?;
        }
        Ok(())
    }

    fn load_library(&self, path: &Path) -> Result<(), RuntimeError> {
        let mut state = self.state.borrow_mut();
        if !state.libraries.iter().any(|p| p == path) {
            state.libraries.push(path.to_path_buf());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_are_interned() {
        let rt = MockRuntime::new();
        let a = rt.register_selector(c"length");
        let b = rt.register_selector(c"length");
        let c = rt.register_selector(c"count");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(rt.selector_name(c).as_deref(), Some("count"));
        assert_eq!(rt.selector_name(Selector::NULL), None);
    }

    #[test]
    fn test_class_and_instance_tables_are_separate() {
        let rt = MockRuntime::new();
        let class = rt.define_class("Box");
        rt.define_class_method("Box", "new", "@", &[], |_, _, _| None);
        let instance = rt.alloc("Box", None);
        let new = rt.register_selector(c"new");
        assert!(rt.method_signature(class, new).is_some());
        assert!(rt.method_signature(instance, new).is_none());
        assert_eq!(rt.class_name(instance), "Box");
        assert_eq!(rt.class_name(class), "Box");
        assert_eq!(rt.class_named("Box"), Some(class));
    }

    #[test]
    #[should_panic(expected = "unknown mock class Missing")]
    fn test_method_on_undefined_class_panics() {
        let rt = MockRuntime::new();
        rt.define_method("Missing", "length", "Q", &[], |_, _, _| None);
    }

    #[test]
    fn test_pool_pop_drops_autoreleased_buffers() {
        let rt = MockRuntime::new();
        let token = rt.push_autorelease_pool();
        let _ = rt.autorelease_string("temp");
        assert_eq!(rt.state.borrow().autoreleased.len(), 1);
        rt.pop_autorelease_pool(token);
        assert!(rt.state.borrow().autoreleased.is_empty());
        assert_eq!(rt.pool_depth(), 0);
    }
}
