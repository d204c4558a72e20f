/// Procedure call builder.
///
/// Renders a stored-procedure invocation from an entity's field map. Each
/// procedure has a fixed positional signature; fields missing from the map,
/// or present but empty, are passed as NULL. Values are always bound, the
/// SQL text only ever contains `CALL name(?, ?, ...)`.
///
/// [`escape_literal`] and [`ProcedureCall::to_literal_sql`] keep the old
/// concatenated rendering available for statement logs. Nothing executes it.

use crate::core::value::SqlValue;
use crate::core::{ClubhouseError, Result};
use crate::query::CompiledStatement;
use serde::Serialize;
use std::fmt;

/// Request fields keyed by parameter name
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Name and positional parameter order of a stored procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcedureSignature {
    pub name: &'static str,
    pub params: &'static [&'static str],
}

impl ProcedureSignature {
    pub const fn new(name: &'static str, params: &'static [&'static str]) -> Self {
        ProcedureSignature { name, params }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// A procedure invocation with its positional arguments
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    name: String,
    params: Vec<SqlValue>,
}

impl ProcedureCall {
    /// Builds a call from already ordered values.
    ///
    /// # Errors
    ///
    /// `ClubhouseError::Arity` when the value count differs from the
    /// signature.
    pub fn new(signature: &ProcedureSignature, params: Vec<SqlValue>) -> Result<Self> {
        if params.len() != signature.arity() {
            return Err(ClubhouseError::Arity {
                name: signature.name.to_string(),
                expected: signature.arity(),
                actual: params.len(),
            });
        }
        Ok(ProcedureCall {
            name: signature.name.to_string(),
            params: params.into_iter().map(|v| format_value(Some(&v))).collect(),
        })
    }

    /// Picks each signature parameter out of `fields`, in signature order.
    pub fn from_fields(signature: &ProcedureSignature, fields: &FieldMap) -> Self {
        let params = signature
            .params
            .iter()
            .map(|param| {
                let value = fields.get(*param).map(SqlValue::from_json);
                format_value(value.as_ref())
            })
            .collect();
        ProcedureCall {
            name: signature.name.to_string(),
            params,
        }
    }

    /// Serializes an entity and builds the call from its fields.
    pub fn from_entity<T: Serialize>(signature: &ProcedureSignature, entity: &T) -> Result<Self> {
        match serde_json::to_value(entity)? {
            serde_json::Value::Object(fields) => Ok(ProcedureCall::from_fields(signature, &fields)),
            other => Err(ClubhouseError::Validation(format!(
                "procedure '{}' needs a field map, got {}",
                signature.name, other
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// `CALL name(?, ...)` with the arguments bound in order.
    pub fn to_statement(&self) -> CompiledStatement {
        let placeholders = vec!["?"; self.params.len()].join(", ");
        CompiledStatement::new(format!("CALL {}({})", self.name, placeholders), self.params.clone())
    }

    /// Concatenated rendering with every text argument escaped. For logs.
    pub fn to_literal_sql(&self) -> String {
        let args: Vec<String> = self
            .params
            .iter()
            .map(|value| match value {
                SqlValue::Null => "NULL".to_string(),
                SqlValue::Text(s) => format!("'{}'", escape_literal(s)),
                other => other.to_string(),
            })
            .collect();
        format!("CALL {}({})", self.name, args.join(", "))
    }
}

impl fmt::Display for ProcedureCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal_sql())
    }
}

impl From<&ProcedureCall> for CompiledStatement {
    fn from(call: &ProcedureCall) -> Self {
        call.to_statement()
    }
}

/// `format(value)`: NULL when absent or empty, otherwise the value.
pub fn format_value(value: Option<&SqlValue>) -> SqlValue {
    match value {
        Some(value) if !value.is_empty() => value.clone(),
        _ => SqlValue::Null,
    }
}

/// Escapes text for a single-quoted SQL literal.
///
/// Quotes are doubled and NUL bytes, which terminate SQL text early in C
/// APIs, are dropped.
pub fn escape_literal(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\'' => escaped.push_str("''"),
            '\0' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEAM_SAVE: ProcedureSignature =
        ProcedureSignature::new("sp_team_save", &["id", "organization_id", "name", "sport"]);

    fn fields(value: serde_json::Value) -> FieldMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_from_fields_follows_signature_order() {
        let call = ProcedureCall::from_fields(
            &TEAM_SAVE,
            &fields(json!({"sport": "netball", "name": "U12 Girls", "organization_id": 4})),
        );
        assert_eq!(
            call.params(),
            &[
                SqlValue::Null,
                SqlValue::Integer(4),
                SqlValue::from("U12 Girls"),
                SqlValue::from("netball")
            ]
        );
    }

    #[test]
    fn test_empty_fields_become_null() {
        let call = ProcedureCall::from_fields(
            &TEAM_SAVE,
            &fields(json!({"id": null, "organization_id": 4, "name": "", "sport": "  "})),
        );
        assert_eq!(call.params()[0], SqlValue::Null);
        assert_eq!(call.params()[2], SqlValue::Null);
        assert_eq!(call.params()[3], SqlValue::Null);
    }

    #[test]
    fn test_statement_uses_placeholders_only() {
        let call = ProcedureCall::from_fields(
            &TEAM_SAVE,
            &fields(json!({"name": "O'Brien Park Rangers", "organization_id": 1})),
        );
        let statement = call.to_statement();
        assert_eq!(statement.sql, "CALL sp_team_save(?, ?, ?, ?)");
        assert_eq!(statement.param_count(), 4);
        assert!(!statement.sql.contains("O'Brien"));
    }

    #[test]
    fn test_literal_rendering_escapes_text() {
        let call = ProcedureCall::from_fields(
            &TEAM_SAVE,
            &fields(json!({"name": "O'Brien'); DROP TABLE teams; --", "organization_id": 1})),
        );
        assert_eq!(
            call.to_literal_sql(),
            "CALL sp_team_save(NULL, 1, 'O''Brien''); DROP TABLE teams; --', NULL)"
        );
    }

    #[test]
    fn test_new_checks_arity() {
        let err = ProcedureCall::new(&TEAM_SAVE, vec![SqlValue::Null]).unwrap_err();
        assert!(matches!(err, ClubhouseError::Arity { expected: 4, actual: 1, .. }));

        let call = ProcedureCall::new(
            &TEAM_SAVE,
            vec![SqlValue::Integer(2), SqlValue::Integer(1), SqlValue::from("A"), SqlValue::from("")],
        )
        .unwrap();
        assert_eq!(call.params()[3], SqlValue::Null);
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("plain"), "plain");
        assert_eq!(escape_literal("it's"), "it''s");
        assert_eq!(escape_literal("nul\0byte"), "nulbyte");
    }

    #[derive(Serialize)]
    struct NewTeam {
        organization_id: i64,
        name: String,
        sport: Option<String>,
    }

    #[test]
    fn test_from_entity() {
        let call = ProcedureCall::from_entity(
            &TEAM_SAVE,
            &NewTeam {
                organization_id: 9,
                name: "Veterans".to_string(),
                sport: None,
            },
        )
        .unwrap();
        assert_eq!(call.to_statement().params[1], SqlValue::Integer(9));
        assert_eq!(call.to_statement().params[3], SqlValue::Null);

        let err = ProcedureCall::from_entity(&TEAM_SAVE, &"not a map").unwrap_err();
        assert!(matches!(err, ClubhouseError::Validation(_)));
    }
}
