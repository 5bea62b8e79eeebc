use crate::model::{
    Scope,
    action::Action,
    field::FieldType,
    hook::{HookFn, HookList, HookPhase},
};

///
/// SettingsType
///
/// Declaration for a singleton configuration object: exactly one logical
/// row per tenant (or one globally), persisted as sparse field-rows rather
/// than a dense table. Same declaration shape as an entry type minus
/// table/id-mode.
///

#[derive(Clone, Debug)]
pub struct SettingsType {
    pub name: String,
    pub scope: Scope,
    pub core: bool,
    pub fields: Vec<FieldType>,
    pub hooks: HookList,
    pub actions: Vec<Action>,
}

impl SettingsType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Scope::default(),
            core: false,
            fields: Vec::new(),
            hooks: HookList::new(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub const fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub const fn core_type(mut self) -> Self {
        self.core = true;
        self
    }

    #[must_use]
    pub fn field(mut self, field: FieldType) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn hook(mut self, phase: HookPhase, hook: HookFn) -> Self {
        self.hooks.push(phase, hook);
        self
    }

    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    #[must_use]
    pub fn field_type(&self, key: &str) -> Option<&FieldType> {
        self.fields.iter().find(|f| f.key == key)
    }

    #[must_use]
    pub fn find_action(&self, key: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.key == key)
    }
}

///
/// TESTS
///
