/// Condition compiler.
///
/// A [`FilterSpec`] lists predicates in declaration order. Predicates tagged
/// [`Group::Any`] express "match any of these synonymous fields" and are
/// OR-ed together inside one pair of parentheses; [`Group::All`] predicates
/// are hard scoping constraints AND-ed onto that group.
///
/// Predicates without a usable value are dropped before compilation, so a
/// filter whose values are all empty compiles to no condition at all: every
/// row matches. Listing endpoints rely on that.

use crate::core::value::SqlValue;
use crate::core::{ClubhouseError, Result};
use crate::query::{is_field_reference, CompiledStatement};

/// How a field is compared to its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `field = ?`
    Equals,
    /// `field LIKE 'value%'`, with LIKE wildcards in the value escaped
    Prefix,
    /// `field IN (?, ?, ...)`
    Membership,
}

/// Which group a predicate joins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    /// OR-ed with the other `Any` predicates
    Any,
    /// AND-ed onto the whole condition
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Single(SqlValue),
    List(Vec<SqlValue>),
}

impl FilterValue {
    /// Drops empty list members; `None` when nothing usable remains.
    fn usable(&self) -> Option<FilterValue> {
        match self {
            FilterValue::Single(value) if value.is_empty() => None,
            FilterValue::Single(value) => Some(FilterValue::Single(value.clone())),
            FilterValue::List(values) => {
                let kept: Vec<SqlValue> = values.iter().filter(|v| !v.is_empty()).cloned().collect();
                (!kept.is_empty()).then_some(FilterValue::List(kept))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub comparison: Comparison,
    pub value: Option<FilterValue>,
    pub group: Group,
}

impl Predicate {
    fn compile(&self, value: FilterValue) -> Result<CompiledStatement> {
        match (self.comparison, value) {
            (Comparison::Equals, FilterValue::Single(value)) => Ok(CompiledStatement::new(
                format!("{} = ?", self.field),
                vec![value],
            )),
            (Comparison::Prefix, FilterValue::Single(value)) => Ok(CompiledStatement::new(
                format!("{} LIKE ? ESCAPE '\\'", self.field),
                vec![SqlValue::Text(format!("{}%", escape_like(&value.to_string())))],
            )),
            (Comparison::Membership, FilterValue::Single(value)) => Ok(CompiledStatement::new(
                format!("{} IN (?)", self.field),
                vec![value],
            )),
            (Comparison::Membership, FilterValue::List(values)) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                Ok(CompiledStatement::new(
                    format!("{} IN ({})", self.field, placeholders),
                    values,
                ))
            }
            (comparison, FilterValue::List(_)) => Err(ClubhouseError::Validation(format!(
                "{:?} on '{}' takes a single value, not a list",
                comparison, self.field
            ))),
        }
    }
}

/// Ordered set of search predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    predicates: Vec<Predicate>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate to the OR group.
    pub fn any(self, field: &str, comparison: Comparison, value: impl Into<SqlValue>) -> Self {
        self.with(field, comparison, Some(FilterValue::Single(value.into())), Group::Any)
    }

    /// Adds a hard AND constraint.
    pub fn all(self, field: &str, comparison: Comparison, value: impl Into<SqlValue>) -> Self {
        self.with(field, comparison, Some(FilterValue::Single(value.into())), Group::All)
    }

    /// Adds a membership predicate to the OR group.
    pub fn any_in(self, field: &str, values: Vec<SqlValue>) -> Self {
        self.with(field, Comparison::Membership, Some(FilterValue::List(values)), Group::Any)
    }

    /// Adds a membership constraint.
    pub fn all_in(self, field: &str, values: Vec<SqlValue>) -> Self {
        self.with(field, Comparison::Membership, Some(FilterValue::List(values)), Group::All)
    }

    pub fn with(mut self, field: &str, comparison: Comparison, value: Option<FilterValue>, group: Group) -> Self {
        self.push(Predicate {
            field: field.to_string(),
            comparison,
            value,
            group,
        });
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Compiles the predicates into one condition.
    ///
    /// Returns `Ok(None)` when no predicate carries a usable value.
    ///
    /// # Errors
    ///
    /// `ClubhouseError::Validation` for a field that is not a plain
    /// (optionally alias-qualified) identifier, or a list given to a
    /// single-value comparison.
    pub fn compile(&self) -> Result<Option<CompiledStatement>> {
        let mut any_parts = Vec::new();
        let mut all_parts = Vec::new();

        for predicate in &self.predicates {
            if !is_field_reference(&predicate.field) {
                return Err(ClubhouseError::Validation(format!(
                    "invalid filter field '{}'",
                    predicate.field
                )));
            }
            let Some(value) = predicate.value.as_ref().and_then(FilterValue::usable) else {
                continue;
            };
            let part = predicate.compile(value)?;
            match predicate.group {
                Group::Any => any_parts.push(part),
                Group::All => all_parts.push(part),
            }
        }

        let mut clauses = Vec::new();
        if !any_parts.is_empty() {
            clauses.push(join(any_parts, " OR ", true));
        }
        clauses.extend(all_parts);

        if clauses.is_empty() {
            Ok(None)
        } else {
            Ok(Some(join(clauses, " AND ", false)))
        }
    }

    /// Renders ` WHERE <condition>`, or an empty fragment when nothing
    /// filters.
    pub fn where_clause(&self) -> Result<CompiledStatement> {
        Ok(match self.compile()? {
            Some(condition) => CompiledStatement::new(format!(" WHERE {}", condition.sql), condition.params),
            None => CompiledStatement::default(),
        })
    }
}

fn join(parts: Vec<CompiledStatement>, separator: &str, parenthesize: bool) -> CompiledStatement {
    let mut sql = Vec::with_capacity(parts.len());
    let mut params = Vec::new();
    for part in parts {
        sql.push(part.sql);
        params.extend(part.params);
    }
    let sql = sql.join(separator);
    if parenthesize {
        CompiledStatement::new(format!("({})", sql), params)
    } else {
        CompiledStatement::new(sql, params)
    }
}

/// Escapes LIKE wildcards so user input matches literally.
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
