//! Host collaborator interface: objects the embedding application exposes to
//! executed code (e.g. an application handle, a data collection, a session).
//!
//! Hosts implement [`HostObject`] for whatever they want scripts to reach and
//! hand the named set to the bridge as [`HostBindings`] at startup.

use crate::script::{Namespace, ScriptError, Value};
use std::sync::Arc;

/// An application object reachable from scripts (attributes and methods).
///
/// Methods take `&self`; host objects needing mutation use interior
/// mutability, and every call already happens under the executor's
/// serialization, never concurrently with another script.
pub trait HostObject: Send + Sync {
    /// Type name shown by `type(x)` and in error messages.
    fn type_name(&self) -> &str;

    /// Read an attribute. Default: no attributes.
    fn attr(&self, name: &str) -> Result<Value, ScriptError> {
        Err(ScriptError::UnknownAttr {
            object: self.type_name().to_string(),
            attr: name.to_string(),
        })
    }

    /// Call a method. Default: no methods.
    fn call(&self, method: &str, _args: &[Value]) -> Result<Value, ScriptError> {
        Err(ScriptError::UnknownAttr {
            object: self.type_name().to_string(),
            attr: method.to_string(),
        })
    }

    /// Call the object itself, constructor-style. Default: not callable.
    fn invoke(&self, _args: &[Value]) -> Result<Value, ScriptError> {
        Err(ScriptError::NotCallable(self.type_name().to_string()))
    }
}

/// Named bindings injected into the execution namespace at bridge startup.
#[derive(Default)]
pub struct HostBindings {
    entries: Vec<(String, Value)>,
}

impl HostBindings {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Bind `name` to a host object. A later duplicate wins, like assignment.
    pub fn bind(mut self, name: impl Into<String>, object: Arc<dyn HostObject>) -> Self {
        self.entries.push((name.into(), Value::Host(object)));
        self
    }

    /// Bind `name` to a plain value.
    pub fn bind_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.entries.push((name.into(), value));
        self
    }

    /// Build the initial namespace: builtins plus these bindings.
    pub fn into_namespace(self) -> Namespace {
        let mut ns = Namespace::new();
        for (name, value) in self.entries {
            ns.set(name, value);
        }
        ns
    }
}
