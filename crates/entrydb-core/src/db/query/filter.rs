use crate::{
    codec::{CodecRegistry, StorageValue},
    error::{EngineError, ValidationError},
    model::entry::EntryType,
    value::Value,
};
use entrydb_primitives::FieldKind;
use serde::{Deserialize, Serialize};

///
/// FilterOp
///
/// The recognized operator set, bit-exact with the caller-facing DSL. The
/// verbose spellings (`equal`, `greaterThan`, …) are aliases that fold into
/// the symbolic variants on deserialization.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum FilterOp {
    #[serde(rename = "=", alias = "equal")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">", alias = "greaterThan")]
    Gt,
    #[serde(rename = "<", alias = "lessThan")]
    Lt,
    #[serde(rename = ">=", alias = "greaterThanOrEqual")]
    Gte,
    #[serde(rename = "<=", alias = "lessThanOrEqual")]
    Lte,
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "isNot")]
    IsNot,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "notContains")]
    NotContains,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
    #[serde(rename = "isEmpty")]
    IsEmpty,
    #[serde(rename = "isNotEmpty")]
    IsNotEmpty,
    #[serde(rename = "inList")]
    InList,
    #[serde(rename = "notInList")]
    NotInList,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "notBetween")]
    NotBetween,
}

///
/// FilterClause
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

impl FilterClause {
    #[must_use]
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

///
/// Filter
///
/// A clause list. Top-level combination is AND; the separate OR-list in
/// [`ListOptions`](super::list::ListOptions) combines with OR.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Filter(pub Vec<FilterClause>);

impl Filter {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn clause(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.0.push(FilterClause::new(field, op, value));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

///
/// SqlFragment
///
/// Rendered SQL condition text plus its positional parameters, in order.
///

#[derive(Debug, Default)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub params: Vec<StorageValue>,
}

fn invalid(field: &str, message: impl Into<String>) -> EngineError {
    let mut err = ValidationError::new();
    err.add(field, message);

    err.into()
}

/// Encode one operand for comparison against a column. Engine-managed
/// columns (`id`, timestamps) have fixed shapes; declared fields go through
/// their codec.
fn encode_operand(
    et: &EntryType,
    codecs: &CodecRegistry,
    field: &str,
    value: &Value,
) -> Result<StorageValue, EngineError> {
    if field == "id" {
        return match value {
            Value::Int(n) => Ok(StorageValue::Integer(*n)),
            Value::Text(s) => Ok(StorageValue::Text(s.clone())),
            other => Err(invalid(field, format!("not an id: {}", other.type_label()))),
        };
    }

    let (kind, field_type) = if field == "created_at" || field == "updated_at" {
        (FieldKind::Timestamp, None)
    } else {
        let ft = et
            .field_type(field)
            .ok_or_else(|| invalid(field, "unknown filter field"))?;
        (ft.kind, Some(ft))
    };

    let probe = crate::model::field::FieldType::new(field, kind);
    let descriptor = field_type.unwrap_or(&probe);
    let codec = codecs.get(kind);

    let normalized = codec
        .normalize(value.clone(), descriptor)
        .map_err(|e| invalid(field, e))?;

    codec
        .to_storage(&normalized, descriptor)
        .map_err(|e| invalid(field, e))
}

fn check_field_known(et: &EntryType, field: &str) -> Result<(), EngineError> {
    let known = field == "id"
        || field == "created_at"
        || field == "updated_at"
        || et.field_type(field).is_some();

    if known {
        Ok(())
    } else {
        Err(invalid(field, "unknown filter field"))
    }
}

/// Escape LIKE pattern metacharacters; rendered patterns use `ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }

    out
}

fn text_operand(field: &str, value: &Value) -> Result<String, EngineError> {
    value
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| invalid(field, "substring operators require a text operand"))
}

fn pair_operand(field: &str, value: &Value) -> Result<(Value, Value), EngineError> {
    match value {
        Value::List(items) if items.len() == 2 => Ok((items[0].clone(), items[1].clone())),
        _ => Err(invalid(field, "between operators take a two-element array")),
    }
}

fn render_clause(
    et: &EntryType,
    codecs: &CodecRegistry,
    clause: &FilterClause,
    out: &mut SqlFragment,
) -> Result<String, EngineError> {
    let field = clause.field.as_str();
    check_field_known(et, field)?;
    let col = format!("\"{field}\"");

    fn bind_into(
        out: &mut SqlFragment,
        et: &EntryType,
        codecs: &CodecRegistry,
        field: &str,
        value: &Value,
    ) -> Result<(), EngineError> {
        out.params.push(encode_operand(et, codecs, field, value)?);
        Ok(())
    }

    macro_rules! bind {
        ($value:expr) => {
            bind_into(out, et, codecs, field, $value)?
        };
    }

    let sql = match clause.op {
        FilterOp::Eq => {
            bind!(&clause.value);
            format!("{col} = ?")
        }
        FilterOp::Ne => {
            bind!(&clause.value);
            format!("{col} != ?")
        }
        FilterOp::Gt => {
            bind!(&clause.value);
            format!("{col} > ?")
        }
        FilterOp::Lt => {
            bind!(&clause.value);
            format!("{col} < ?")
        }
        FilterOp::Gte => {
            bind!(&clause.value);
            format!("{col} >= ?")
        }
        FilterOp::Lte => {
            bind!(&clause.value);
            format!("{col} <= ?")
        }
        FilterOp::Is => {
            if clause.value.is_null() {
                format!("{col} IS NULL")
            } else {
                bind!(&clause.value);
                format!("{col} = ?")
            }
        }
        FilterOp::IsNot => {
            if clause.value.is_null() {
                format!("{col} IS NOT NULL")
            } else {
                bind!(&clause.value);
                format!("({col} IS NULL OR {col} != ?)")
            }
        }
        FilterOp::Contains => {
            let pattern = format!("%{}%", escape_like(&text_operand(field, &clause.value)?));
            out.params.push(StorageValue::Text(pattern));
            format!("{col} LIKE ? ESCAPE '\\'")
        }
        FilterOp::NotContains => {
            let pattern = format!("%{}%", escape_like(&text_operand(field, &clause.value)?));
            out.params.push(StorageValue::Text(pattern));
            format!("({col} IS NULL OR {col} NOT LIKE ? ESCAPE '\\')")
        }
        FilterOp::StartsWith => {
            let pattern = format!("{}%", escape_like(&text_operand(field, &clause.value)?));
            out.params.push(StorageValue::Text(pattern));
            format!("{col} LIKE ? ESCAPE '\\'")
        }
        FilterOp::EndsWith => {
            let pattern = format!("%{}", escape_like(&text_operand(field, &clause.value)?));
            out.params.push(StorageValue::Text(pattern));
            format!("{col} LIKE ? ESCAPE '\\'")
        }
        FilterOp::IsEmpty => format!("({col} IS NULL OR {col} = '')"),
        FilterOp::IsNotEmpty => format!("({col} IS NOT NULL AND {col} != '')"),
        FilterOp::InList | FilterOp::NotInList => {
            let Value::List(items) = &clause.value else {
                return Err(invalid(field, "list operators take an array operand"));
            };

            // empty operand lists silently drop to a no-op clause
            if items.is_empty() {
                return Ok("1 = 1".to_string());
            }

            for item in items {
                bind!(item);
            }
            let marks = vec!["?"; items.len()].join(", ");

            if clause.op == FilterOp::InList {
                format!("{col} IN ({marks})")
            } else {
                format!("({col} IS NULL OR {col} NOT IN ({marks}))")
            }
        }
        FilterOp::Between => {
            let (low, high) = pair_operand(field, &clause.value)?;
            bind!(&low);
            bind!(&high);
            format!("{col} BETWEEN ? AND ?")
        }
        FilterOp::NotBetween => {
            let (low, high) = pair_operand(field, &clause.value)?;
            bind!(&low);
            bind!(&high);
            format!("({col} IS NULL OR {col} NOT BETWEEN ? AND ?)")
        }
    };

    Ok(sql)
}

/// Render a clause list into one parenthesized condition.
pub(crate) fn render_filter(
    et: &EntryType,
    codecs: &CodecRegistry,
    filter: &Filter,
    joiner: &str,
) -> Result<SqlFragment, EngineError> {
    let mut out = SqlFragment::default();
    let mut parts = Vec::with_capacity(filter.0.len());

    for clause in &filter.0 {
        let sql = render_clause(et, codecs, clause, &mut out)?;
        parts.push(sql);
    }

    out.sql = parts.join(&format!(" {joiner} "));

    Ok(out)
}

///
/// TESTS
///
