use crate::error::{constants, BridgeError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Failure reported by an operation handler.
///
/// The message is sent back to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

type HandlerFn = dyn Fn(Value) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static;

/// Named operations a server can run.
///
/// Cloning shares the same table; a handler registered through one clone is
/// visible to every connection task holding another.
#[derive(Clone)]
pub struct OperationRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<HandlerFn>>>>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.operations())
            .finish()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn register<F>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(Value) -> std::result::Result<Value, HandlerError> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| BridgeError::Internal(constants::ERR_REGISTRY_WRITE_LOCK.to_string()))?;

        handlers.insert(name.to_string(), Arc::new(handler));
        Ok(())
    }

    /// Look up the handler for `name`. The read lock is released before the
    /// caller runs it, so a slow handler never blocks registration.
    pub fn lookup(&self, name: &str) -> Result<Arc<HandlerFn>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| BridgeError::Internal(constants::ERR_REGISTRY_READ_LOCK.to_string()))?;

        handlers
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownOperation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .map(|handlers| handlers.contains_key(name))
            .unwrap_or(false)
    }

    /// Run the handler for `name` on `data`.
    pub fn dispatch(&self, name: &str, data: Value) -> Result<Value> {
        let handler = self.lookup(name)?;
        handler(data).map_err(|e| BridgeError::Handler(e.0))
    }

    /// Registered operation names, sorted.
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
