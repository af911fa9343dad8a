// Filter engine for the vulnerability-record projector.
//
// A filter is `field=expression`. The expression is matched against the
// projected record's field according to that field's JSON type: strings do
// substring matching, numbers support an optional comparator prefix
// (`>=`, `<=`, `>`, `<`, `!=`), booleans compare for equality, arrays match
// if any element contains the expression as a substring, and anything else
// falls back to plain equality.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct FilterClause {
    pub field: String,
    pub expression: String,
}

impl FilterClause {
    /// Parse `field=expression`. Returns `None` for anything without an `=`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (field, expression) = raw.split_once('=')?;
        Some(Self {
            field: field.trim().to_string(),
            expression: expression.trim().to_string(),
        })
    }

    pub fn matches(&self, record: &Value) -> bool {
        let Some(field_value) = record.get(&self.field) else {
            return false;
        };
        match field_value {
            Value::String(s) => s.to_lowercase().contains(&self.expression.to_lowercase()),
            Value::Number(_) => match_numeric(field_value, &self.expression),
            Value::Bool(b) => match self.expression.to_lowercase().as_str() {
                "true" => *b,
                "false" => !*b,
                _ => false,
            },
            Value::Array(items) => items.iter().any(|v| {
                v.as_str()
                    .map(|s| s.to_lowercase().contains(&self.expression.to_lowercase()))
                    .unwrap_or(false)
            }),
            other => other.to_string() == self.expression,
        }
    }
}

fn match_numeric(field_value: &Value, expression: &str) -> bool {
    let field_num = field_value.as_f64().unwrap_or(f64::NAN);

    for (prefix, cmp) in [
        (">=", Cmp::Ge),
        ("<=", Cmp::Le),
        ("!=", Cmp::Ne),
        (">", Cmp::Gt),
        ("<", Cmp::Lt),
    ] {
        if let Some(rest) = expression.strip_prefix(prefix) {
            return match rest.trim().parse::<f64>() {
                Ok(target) => apply_cmp(field_num, cmp, target),
                Err(_) => false,
            };
        }
    }

    expression.trim().parse::<f64>().map(|target| field_num == target).unwrap_or(false)
}

enum Cmp {
    Ge,
    Le,
    Gt,
    Lt,
    Ne,
}

fn apply_cmp(lhs: f64, cmp: Cmp, rhs: f64) -> bool {
    match cmp {
        Cmp::Ge => lhs >= rhs,
        Cmp::Le => lhs <= rhs,
        Cmp::Gt => lhs > rhs,
        Cmp::Lt => lhs < rhs,
        Cmp::Ne => lhs != rhs,
    }
}

/// Parse a list of `field=expression` query strings, silently dropping any
/// entry that doesn't contain `=`.
pub fn parse_all(raw: &[String]) -> Vec<FilterClause> {
    raw.iter().filter_map(|s| FilterClause::parse(s)).collect()
}

pub fn matches_all(clauses: &[FilterClause], record: &Value) -> bool {
    clauses.iter().all(|c| c.matches(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_operator_prefix() {
        let clause = FilterClause::parse("severity=>=2").unwrap();
        assert!(clause.matches(&json!({"severity": 3})));
        assert!(!clause.matches(&json!({"severity": 1})));
    }

    #[test]
    fn string_substring_is_case_insensitive() {
        let clause = FilterClause::parse("plugin_name=apache").unwrap();
        assert!(clause.matches(&json!({"plugin_name": "Apache HTTP Server"})));
    }

    #[test]
    fn boolean_equality() {
        let clause = FilterClause::parse("enabled=true").unwrap();
        assert!(clause.matches(&json!({"enabled": true})));
        assert!(!clause.matches(&json!({"enabled": false})));
    }

    #[test]
    fn missing_field_never_matches() {
        let clause = FilterClause::parse("nope=1").unwrap();
        assert!(!clause.matches(&json!({"severity": 1})));
    }

    #[test]
    fn malformed_clause_is_dropped() {
        assert!(FilterClause::parse("no-equals-sign").is_none());
    }
}
