/// Query compilation.
///
/// Turns structured request input into SQL text with `?` placeholders and
/// an ordered list of bound values. Request data never lands in the SQL text
/// itself; only validated identifiers and integers do.
///
/// - `condition`: filter predicates to a WHERE fragment
/// - `pagination`: page/page size to `LIMIT n OFFSET m`
/// - `procedure_call`: entity field maps to `CALL name(?, ...)`

pub mod condition;
pub mod pagination;
pub mod procedure_call;

pub use condition::{Comparison, FilterSpec, FilterValue, Group, Predicate};
pub use pagination::{PageSpec, Pagination};
pub use procedure_call::{escape_literal, FieldMap, ProcedureCall, ProcedureSignature};

use crate::core::value::SqlValue;
use crate::core::{ClubhouseError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is a valid regex"));

/// Whether `name` is a bare SQL identifier (`team_name`, `_id2`).
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Whether `name` is an identifier, optionally qualified by a table alias
/// (`t.name`).
pub fn is_field_reference(name: &str) -> bool {
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(column), None, None) => is_identifier(column),
        (Some(alias), Some(column), None) => is_identifier(alias) && is_identifier(column),
        _ => false,
    }
}

/// SQL text plus the values for its `?` placeholders, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl CompiledStatement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        CompiledStatement {
            sql: sql.into(),
            params,
        }
    }

    /// Appends SQL text, separated by a space.
    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        if !self.sql.is_empty() && !sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(sql);
        self
    }

    /// Appends a fragment's text and its bound values.
    pub fn append(&mut self, fragment: CompiledStatement) -> &mut Self {
        self.push_sql(&fragment.sql);
        self.params.extend(fragment.params);
        self
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for CompiledStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self.params.iter().map(|p| format!("{:?}", p)).collect();
            write!(f, " [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// A search over one table or view
///
/// `select` must expose a `total_count` column (usually
/// `COUNT(*) OVER () AS total_count`) for the listing total to survive
/// pagination.
#[derive(Debug, Clone)]
pub struct ListingQuery<'a> {
    pub select: &'a str,
    pub filter: &'a FilterSpec,
    pub order_by: Option<&'a str>,
    pub page: Option<PageSpec>,
}

impl ListingQuery<'_> {
    /// Assembles `SELECT ... [WHERE ...] [ORDER BY ...] [LIMIT n OFFSET m]`.
    pub fn compile(&self) -> Result<CompiledStatement> {
        let mut statement = CompiledStatement::new(self.select, Vec::new());
        if let Some(condition) = self.filter.compile()? {
            statement.push_sql("WHERE");
            statement.append(condition);
        }
        if let Some(order_by) = self.order_by {
            let valid = order_by.split(',').all(|term| {
                let mut words = term.split_whitespace();
                match (words.next(), words.next(), words.next()) {
                    (Some(field), direction, None) => {
                        is_field_reference(field)
                            && direction.map_or(true, |d| d.eq_ignore_ascii_case("ASC") || d.eq_ignore_ascii_case("DESC"))
                    }
                    _ => false,
                }
            });
            if !valid {
                return Err(ClubhouseError::Validation(format!(
                    "invalid ORDER BY clause '{}'",
                    order_by
                )));
            }
            statement.push_sql("ORDER BY");
            statement.push_sql(order_by);
        }
        if let Some(pagination) = pagination::compile(self.page) {
            statement.push_sql(&pagination.to_sql());
        }
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(is_identifier("name"));
        assert!(is_identifier("_parent_id2"));
        assert!(!is_identifier("2name"));
        assert!(!is_identifier("name; DROP TABLE teams"));
        assert!(!is_identifier(""));

        assert!(is_field_reference("o.name"));
        assert!(is_field_reference("name"));
        assert!(!is_field_reference("a.b.c"));
        assert!(!is_field_reference("o."));
    }

    #[test]
    fn test_append_keeps_param_order() {
        let mut statement = CompiledStatement::new("SELECT * FROM teams", vec![]);
        statement.append(CompiledStatement::new("WHERE a = ?", vec![SqlValue::Integer(1)]));
        statement.append(CompiledStatement::new("AND b = ?", vec![SqlValue::Integer(2)]));
        assert_eq!(statement.sql, "SELECT * FROM teams WHERE a = ? AND b = ?");
        assert_eq!(statement.params, vec![SqlValue::Integer(1), SqlValue::Integer(2)]);
        assert_eq!(statement.param_count(), 2);
    }

    #[test]
    fn test_listing_query_without_filters() {
        let filter = FilterSpec::new().any("name", Comparison::Prefix, "");
        let statement = ListingQuery {
            select: "SELECT * FROM teams",
            filter: &filter,
            order_by: Some("name ASC, id"),
            page: None,
        }
        .compile()
        .unwrap();
        assert_eq!(statement.sql, "SELECT * FROM teams ORDER BY name ASC, id");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_listing_query_with_filter_and_page() {
        let filter = FilterSpec::new()
            .any("name", Comparison::Prefix, "East")
            .all("organization_id", Comparison::Equals, 4);
        let statement = ListingQuery {
            select: "SELECT * FROM teams",
            filter: &filter,
            order_by: None,
            page: Some(PageSpec::new(3, 20).unwrap()),
        }
        .compile()
        .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM teams WHERE (name LIKE ? ESCAPE '\\') AND organization_id = ? LIMIT 20 OFFSET 40"
        );
        assert_eq!(statement.params, vec![SqlValue::from("East%"), SqlValue::Integer(4)]);
    }

    #[test]
    fn test_listing_query_rejects_order_injection() {
        let filter = FilterSpec::new();
        let result = ListingQuery {
            select: "SELECT * FROM teams",
            filter: &filter,
            order_by: Some("name; DELETE FROM teams"),
            page: None,
        }
        .compile();
        assert!(matches!(result, Err(ClubhouseError::Validation(_))));
    }
}
