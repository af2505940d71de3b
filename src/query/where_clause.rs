//! `where` clause mini-language
//!
//! A clause is `<field><operator><value>` with operator one of
//! `<=`, `<`, `>=`, `>`, `=`, ` like `, ` in ` (keyword operators are
//! space-padded and case-insensitive). Values are JSON literals. Clauses are
//! joined uniformly by ` and ` (all must pass) or ` or ` (any must pass);
//! mixing the two in one expression is unsupported.

use crate::core::error::ServiceError;
use crate::core::record::Record;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Le,
    Lt,
    Ge,
    Gt,
    Eq,
    Like,
    In,
}

#[derive(Debug, Clone)]
struct Clause {
    field: String,
    operator: Operator,
    value: Value,
}

#[derive(Debug, Clone, Copy)]
enum Combinator {
    And,
    Or,
}

/// A parsed `where` filter
#[derive(Debug, Clone)]
pub struct WhereFilter {
    clauses: Vec<Clause>,
    combinator: Combinator,
}

fn clause_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(.+?)(<=|<|>=|>|=| like | in )(.+?)$").expect("static pattern")
    })
}

fn split_pattern(keyword: &str) -> Regex {
    Regex::new(&format!(r"(?i) {keyword} ")).expect("static pattern")
}

fn syntax_error() -> ServiceError {
    ServiceError::Request("Could not parse WHERE clause, check your syntax.".to_string())
}

impl WhereFilter {
    pub fn parse(input: &str) -> Result<Self, ServiceError> {
        let input = input.trim();
        let and = split_pattern("and");
        let or = split_pattern("or");

        let (parts, combinator): (Vec<&str>, Combinator) = if and.is_match(input) {
            (and.split(input).collect(), Combinator::And)
        } else if or.is_match(input) {
            (or.split(input).collect(), Combinator::Or)
        } else {
            (vec![input], Combinator::And)
        };

        let clauses = parts
            .into_iter()
            .map(Clause::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses, combinator })
    }

    /// Evaluate the filter against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self.combinator {
            Combinator::And => self.clauses.iter().all(|c| c.matches(record)),
            Combinator::Or => self.clauses.iter().any(|c| c.matches(record)),
        }
    }
}

impl Clause {
    fn parse(raw: &str) -> Result<Self, ServiceError> {
        let captures = clause_pattern().captures(raw).ok_or_else(syntax_error)?;
        let field = captures[1].trim().to_string();
        let operator = match captures[2].to_lowercase().as_str() {
            "<=" => Operator::Le,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            ">" => Operator::Gt,
            "=" => Operator::Eq,
            " like " => Operator::Like,
            " in " => Operator::In,
            _ => return Err(syntax_error()),
        };
        let raw_value = captures[3].trim();

        let value = match operator {
            // `in` expects a parenthesized comma-separated literal list
            Operator::In => {
                static PARENS: OnceLock<Regex> = OnceLock::new();
                let parens =
                    PARENS.get_or_init(|| Regex::new(r"\((.+?)\)").expect("static pattern"));
                let inner = parens
                    .captures(raw_value)
                    .ok_or_else(syntax_error)?
                    .get(1)
                    .ok_or_else(syntax_error)?
                    .as_str();
                serde_json::from_str(&format!("[{inner}]")).map_err(|_| syntax_error())?
            }
            _ => serde_json::from_str(raw_value).map_err(|_| syntax_error())?,
        };

        Ok(Self {
            field,
            operator,
            value,
        })
    }

    fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };
        match self.operator {
            Operator::Eq => loose_eq(actual, &self.value),
            Operator::Le => compare(actual, &self.value).is_some_and(|o| o.is_le()),
            Operator::Lt => compare(actual, &self.value).is_some_and(|o| o.is_lt()),
            Operator::Ge => compare(actual, &self.value).is_some_and(|o| o.is_ge()),
            Operator::Gt => compare(actual, &self.value).is_some_and(|o| o.is_gt()),
            Operator::Like => match (actual.as_str(), self.value.as_str()) {
                (Some(have), Some(wanted)) => {
                    have.to_lowercase().contains(&wanted.to_lowercase())
                }
                _ => false,
            },
            Operator::In => self
                .value
                .as_array()
                .is_some_and(|list| list.iter().any(|v| loose_eq(actual, v))),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        // String coercion mirrors the reference server's loose comparisons
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose equality: numbers and numeric strings compare numerically,
/// everything else compares structurally
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => {
            // Two strings stay string-compared even when both are numeric
            !(a.is_string() && b.is_string()) && x == y
        }
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn equality_is_case_sensitive() {
        let filter = WhereFilter::parse(r#"name="Lasagna""#).unwrap();
        assert!(filter.matches(&rec(json!({"name": "Lasagna"}))));
        assert!(!filter.matches(&rec(json!({"name": "lasagna"}))));
    }

    #[test]
    fn like_is_case_insensitive_substring() {
        let filter = WhereFilter::parse(r#"name like "SAGN""#).unwrap();
        assert!(filter.matches(&rec(json!({"name": "Lasagna"}))));
        assert!(!filter.matches(&rec(json!({"name": "Guacamole"}))));
    }

    #[test]
    fn keyword_operators_are_case_insensitive() {
        let filter = WhereFilter::parse(r#"name LIKE "gua""#).unwrap();
        assert!(filter.matches(&rec(json!({"name": "Guacamole"}))));
    }

    #[test]
    fn numeric_comparisons() {
        let filter = WhereFilter::parse("likes>=5").unwrap();
        assert!(filter.matches(&rec(json!({"likes": 9}))));
        assert!(!filter.matches(&rec(json!({"likes": 4}))));
    }

    #[test]
    fn numeric_string_coercion() {
        let filter = WhereFilter::parse("maxLevel>100").unwrap();
        assert!(filter.matches(&rec(json!({"maxLevel": "250"}))));
        assert!(!filter.matches(&rec(json!({"maxLevel": "70"}))));
    }

    #[test]
    fn and_requires_all_clauses() {
        let filter = WhereFilter::parse(r#"type="Dessert" and likes>0"#).unwrap();
        assert!(filter.matches(&rec(json!({"type": "Dessert", "likes": 2}))));
        assert!(!filter.matches(&rec(json!({"type": "Dessert", "likes": 0}))));
    }

    #[test]
    fn or_requires_any_clause() {
        let filter = WhereFilter::parse(r#"type="Dessert" or likes>5"#).unwrap();
        assert!(filter.matches(&rec(json!({"type": "Starter", "likes": 7}))));
        assert!(!filter.matches(&rec(json!({"type": "Starter", "likes": 1}))));
    }

    #[test]
    fn in_parenthesized_list() {
        let filter = WhereFilter::parse(r#"type in ("Dessert","Starter")"#).unwrap();
        assert!(filter.matches(&rec(json!({"type": "Starter"}))));
        assert!(!filter.matches(&rec(json!({"type": "Main Course"}))));
    }

    #[test]
    fn unparseable_syntax_is_a_request_error() {
        assert!(matches!(
            WhereFilter::parse("nonsense"),
            Err(ServiceError::Request(_))
        ));
        assert!(matches!(
            WhereFilter::parse("name=unquoted"),
            Err(ServiceError::Request(_))
        ));
    }

    #[test]
    fn missing_field_never_matches() {
        let filter = WhereFilter::parse("likes>0").unwrap();
        assert!(!filter.matches(&rec(json!({"name": "x"}))));
    }
}
