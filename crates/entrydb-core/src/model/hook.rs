use crate::{db::record::HookScope, error::EngineError};
use std::{fmt, sync::Arc};

///
/// HookPhase
///
/// Lifecycle phases in dispatch order. `BeforeUpdate` runs on every save,
/// new or existing, in addition to `BeforeCreate` on the first save, so
/// normalize-on-every-save hooks need not duplicate logic across paths.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HookPhase {
    BeforeValidate,
    Validate,
    BeforeCreate,
    BeforeUpdate,
    AfterCreate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl HookPhase {
    pub const ALL: &'static [Self] = &[
        Self::BeforeValidate,
        Self::Validate,
        Self::BeforeCreate,
        Self::BeforeUpdate,
        Self::AfterCreate,
        Self::AfterUpdate,
        Self::BeforeDelete,
        Self::AfterDelete,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::BeforeValidate => "before_validate",
            Self::Validate => "validate",
            Self::BeforeCreate => "before_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterCreate => "after_create",
            Self::AfterUpdate => "after_update",
            Self::BeforeDelete => "before_delete",
            Self::AfterDelete => "after_delete",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A lifecycle hook. Hooks run strictly sequentially within one operation
/// and mutate the record through the scope only.
pub type HookFn = Arc<dyn Fn(&mut HookScope<'_>) -> Result<(), EngineError> + Send + Sync>;

///
/// HookList
///
/// One immutable ordered hook list per phase, produced by the registration
/// pass at build time. Read-only while serving requests.
///

#[derive(Clone, Default)]
pub struct HookList {
    phases: [Vec<HookFn>; 8],
}

impl HookList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    const fn slot(phase: HookPhase) -> usize {
        match phase {
            HookPhase::BeforeValidate => 0,
            HookPhase::Validate => 1,
            HookPhase::BeforeCreate => 2,
            HookPhase::BeforeUpdate => 3,
            HookPhase::AfterCreate => 4,
            HookPhase::AfterUpdate => 5,
            HookPhase::BeforeDelete => 6,
            HookPhase::AfterDelete => 7,
        }
    }

    pub fn push(&mut self, phase: HookPhase, hook: HookFn) {
        self.phases[Self::slot(phase)].push(hook);
    }

    #[must_use]
    pub fn phase(&self, phase: HookPhase) -> &[HookFn] {
        &self.phases[Self::slot(phase)]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.iter().all(Vec::is_empty)
    }
}

impl fmt::Debug for HookList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("HookList");
        for phase in HookPhase::ALL {
            dbg.field(phase.label(), &self.phase(*phase).len());
        }

        dbg.finish()
    }
}

///
/// TESTS
///
