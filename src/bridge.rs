use std::{path::Path, rc::Rc};

use tracing::debug;

use crate::{
    config::RuntimeConfig,
    error::{BridgeError, RuntimeError},
    runtime::{objc::ObjcRuntime, ForeignRuntime},
    value::ForeignHandle,
};

/// The module-level surface a host binds: library loading and class lookup.
/// Everything after that goes through [`ForeignHandle::dispatch`].
#[derive(Clone)]
pub struct Bridge {
    runtime: Rc<dyn ForeignRuntime>,
}

impl Bridge {
    pub fn new(runtime: Rc<dyn ForeignRuntime>) -> Self {
        Self { runtime }
    }

    /// A bridge over the system Objective-C runtime.
    pub fn objc(config: &RuntimeConfig) -> Result<Self, BridgeError> {
        let runtime = ObjcRuntime::load(config)?;
        Ok(Self::new(Rc::new(runtime)))
    }

    pub fn runtime(&self) -> &Rc<dyn ForeignRuntime> {
        &self.runtime
    }

    pub fn load_library(&self, path: impl AsRef<Path>) -> Result<(), BridgeError> {
        Ok(self.runtime.load_library(path.as_ref())?)
    }

    /// Wraps the class object named `name`.
    pub fn class_object(&self, name: &str) -> Result<ForeignHandle, BridgeError> {
        let raw = self
            .runtime
            .class_named(name)
            .ok_or_else(|| RuntimeError::ClassNotFound(name.to_string()))?;
        debug!(class = name, ?raw, "resolved class object");
        ForeignHandle::retain(&self.runtime, raw)
            .ok_or_else(|| RuntimeError::ClassNotFound(name.to_string()).into())
    }
}

/// `stringWithUTF8String$` → `stringWithUTF8String:`
pub fn method_name_to_selector(method_name: &str) -> String {
    method_name.replace('$', ":")
}

/// `stringWithUTF8String:` → `stringWithUTF8String$`
pub fn selector_to_method_name(selector: &str) -> String {
    selector.replace(':', "$")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_name_mapping() {
        assert_eq!(method_name_to_selector("length"), "length");
        assert_eq!(
            method_name_to_selector("initWithBytes$length$encoding$"),
            "initWithBytes:length:encoding:"
        );
        assert_eq!(selector_to_method_name("isEqual:"), "isEqual$");
        assert_eq!(
            method_name_to_selector(&selector_to_method_name("a:b:")),
            "a:b:"
        );
    }
}
