//! Leaf crate: semantic field kinds, their capability metadata, and the
//! scalar newtypes shared across the engine. No engine logic lives here.

mod float;
mod timestamp;

pub use float::Float64;
pub use timestamp::{Timestamp, TimestampParseError};

///
/// FieldKind
///
/// Canonical semantic kinds a declared field can take. One codec exists per
/// kind; the registry is keyed by this enum.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
    Timestamp,
    Choice,
    MultiChoice,
    Relation,
    File,
    Image,
    Currency,
    Json,
    List,
}

impl FieldKind {
    pub const ALL: &'static [Self] = &[
        Self::Text,
        Self::Number,
        Self::Boolean,
        Self::Timestamp,
        Self::Choice,
        Self::MultiChoice,
        Self::Relation,
        Self::File,
        Self::Image,
        Self::Currency,
        Self::Json,
        Self::List,
    ];

    /// Return the full capability descriptor for one kind.
    #[must_use]
    pub const fn metadata(self) -> FieldKindMeta {
        match self {
            Self::Text | Self::Choice => FieldKindMeta {
                textual: true,
                numeric: false,
                orderable: true,
                many: false,
            },
            Self::File | Self::Image => FieldKindMeta {
                textual: true,
                numeric: false,
                orderable: false,
                many: false,
            },
            Self::Number | Self::Currency => FieldKindMeta {
                textual: false,
                numeric: true,
                orderable: true,
                many: false,
            },
            Self::Boolean => FieldKindMeta {
                textual: false,
                numeric: false,
                orderable: false,
                many: false,
            },
            Self::Timestamp => FieldKindMeta {
                textual: false,
                numeric: true,
                orderable: true,
                many: false,
            },
            // Relations order by their referenced id, which may be textual
            // (ulid/uuid modes) or numeric (auto-increment).
            Self::Relation => FieldKindMeta {
                textual: true,
                numeric: false,
                orderable: true,
                many: false,
            },
            Self::MultiChoice | Self::Json | Self::List => FieldKindMeta {
                textual: false,
                numeric: false,
                orderable: false,
                many: true,
            },
        }
    }

    /// Whether values of this kind have a total order usable in range filters.
    #[must_use]
    pub const fn is_orderable(self) -> bool {
        self.metadata().orderable
    }

    /// Whether values of this kind are stored as text and support substring
    /// operators (`contains`, `startsWith`, `endsWith`).
    #[must_use]
    pub const fn is_textual(self) -> bool {
        self.metadata().textual
    }

    /// Whether values of this kind hold many elements per row.
    #[must_use]
    pub const fn is_many(self) -> bool {
        self.metadata().many
    }

    /// Stable external label, used in diagnostics and config errors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Choice => "choice",
            Self::MultiChoice => "multi_choice",
            Self::Relation => "relation",
            Self::File => "file",
            Self::Image => "image",
            Self::Currency => "currency",
            Self::Json => "json",
            Self::List => "list",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

///
/// FieldKindMeta
///
/// Per-kind capability metadata consulted by filter validation and ordering.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldKindMeta {
    pub textual: bool,
    pub numeric: bool,
    pub orderable: bool,
    pub many: bool,
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_metadata() {
        for kind in FieldKind::ALL {
            // metadata() is total; the call itself is the assertion
            let meta = kind.metadata();
            assert!(
                !(meta.many && meta.orderable),
                "many-valued kind {kind} must not be orderable"
            );
        }
    }

    #[test]
    fn textual_kinds_support_substring_ops() {
        assert!(FieldKind::Text.is_textual());
        assert!(FieldKind::Choice.is_textual());
        assert!(!FieldKind::Number.is_textual());
        assert!(!FieldKind::Json.is_textual());
    }

    #[test]
    fn labels_are_unique() {
        let mut seen = std::collections::BTreeSet::new();
        for kind in FieldKind::ALL {
            assert!(seen.insert(kind.label()), "duplicate label {kind}");
        }
    }
}
