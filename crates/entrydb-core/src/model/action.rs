use crate::{error::EngineError, value::Value};
use serde_json::Value as JsonValue;
use std::{fmt, sync::Arc};

///
/// ActionTarget
///
/// What an action handler operates on: the field surface of the entry or
/// settings instance it was invoked against. Dyn-safe so one handler shape
/// serves both runtimes.
///

pub trait ActionTarget {
    fn type_name(&self) -> &str;

    fn get_value(&self, field: &str) -> Result<Value, EngineError>;

    fn set_value(&mut self, field: &str, value: Value) -> Result<(), EngineError>;
}

/// Handler for one named action. Receives the bound target and caller
/// params, returns a JSON result for the invoking surface.
pub type ActionFn =
    Arc<dyn Fn(&mut dyn ActionTarget, JsonValue) -> Result<JsonValue, EngineError> + Send + Sync>;

///
/// Action
///
/// A named operation declared on an entry or settings type. Private actions
/// are callable from server-side code only and never appear in the
/// permission-scoped public action list.
///

#[derive(Clone)]
pub struct Action {
    pub key: String,
    pub private: bool,
    pub handler: ActionFn,
}

impl Action {
    #[must_use]
    pub fn new(key: impl Into<String>, handler: ActionFn) -> Self {
        Self {
            key: key.into(),
            private: false,
            handler,
        }
    }

    #[must_use]
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("key", &self.key)
            .field("private", &self.private)
            .finish_non_exhaustive()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_defaults_to_public() {
        let action = Action::new("archive", Arc::new(|_: &mut dyn ActionTarget, _| Ok(JsonValue::Null)));
        assert!(!action.private);

        let action = action.private();
        assert!(action.private);
    }
}
