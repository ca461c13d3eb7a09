//! Evaluates the JPQL subset produced by the common builder paths against
//! flushed store rows:
//!
//! `[select <alias | alias.path, … | count(alias)>] from <Entity> [alias]
//!  [where <conditions>] [order by alias.path [asc|desc], …]`
//!
//! Conditions are comparisons (`= <> != < <= > >=`), `like`, `is [not] null`
//! and parenthesized groups combined with `and` / `or`. Joins, grouping and
//! subqueries are rejected with an execution error.

use std::cmp::Ordering;

use regex::Regex;

use crate::core::{PersistenceError, Result, ResultRow, Value};
use crate::criteria::QuerySpec;

use super::pattern::eval_like;
use super::store::Store;

lazy_static::lazy_static! {
    static ref QUERY_SHAPE: Regex = Regex::new(
        r"(?is)^\s*(?:select\s+(?P<select>.+?)\s+)?from\s+(?P<from>.+?)(?:\s+where\s+(?P<where>.+?))?(?:\s+order\s+by\s+(?P<order>.+?))?\s*$"
    ).expect("query shape regex");
    static ref FROM_CLAUSE: Regex =
        Regex::new(r"(?i)^(?P<entity>\w+)(?:\s+(?:as\s+)?(?P<alias>\w+))?$").expect("from regex");
    static ref IS_NULL: Regex =
        Regex::new(r"(?i)^(?P<path>[\w.]+)\s+is\s+(?P<not>not\s+)?null$").expect("is null regex");
    static ref LIKE: Regex =
        Regex::new(r"(?i)^(?P<path>[\w.]+)\s+(?P<not>not\s+)?like\s+(?P<operand>.+)$").expect("like regex");
    static ref COMPARISON: Regex =
        Regex::new(r"^(?P<path>[\w.]+)\s*(?P<op><>|!=|<=|>=|=|<|>)\s*(?P<operand>.+)$").expect("comparison regex");
    static ref COUNT: Regex =
        Regex::new(r"(?i)^count\s*\(\s*(?P<arg>[\w.*]+)\s*\)$").expect("count regex");
    static ref NUMBER: Regex = Regex::new(r"^-?\d+(?:\.\d+)?$").expect("number regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "=" => Some(Self::Eq),
            "<>" | "!=" => Some(Self::NotEq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::LtEq),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::GtEq),
            _ => None,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::NotEq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::LtEq => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::GtEq => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Param(String),
    Literal(Value),
}

#[derive(Debug, Clone)]
enum Condition {
    Compare {
        path: Vec<String>,
        op: CompareOp,
        operand: Operand,
    },
    Like {
        path: Vec<String>,
        pattern: Operand,
        negated: bool,
    },
    IsNull {
        path: Vec<String>,
        negated: bool,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

#[derive(Debug, Clone)]
enum Projection {
    Entity,
    Count,
    Fields(Vec<Vec<String>>),
}

#[derive(Debug, Clone)]
struct OrderItem {
    path: Vec<String>,
    descending: bool,
}

#[derive(Debug)]
struct ParsedQuery {
    entity: String,
    projection: Projection,
    filter: Option<Condition>,
    order: Vec<OrderItem>,
}

/// Filters, sorts and projects store rows. Pagination is left to the caller.
pub(crate) fn execute(query: &QuerySpec, store: &Store) -> Result<Vec<ResultRow>> {
    let parsed = parse(&query.text)?;
    if !store.is_registered(&parsed.entity) {
        return Err(PersistenceError::Execution(format!(
            "unknown entity '{}' in query '{}'",
            parsed.entity, query.text
        )));
    }

    if let Some(filter) = &parsed.filter {
        check_bound(filter, query)?;
    }

    let mut rows = Vec::new();
    for row in store.rows(&parsed.entity)? {
        let keep = match &parsed.filter {
            Some(condition) => evaluate(condition, row, query)?,
            None => true,
        };
        if keep {
            rows.push(row);
        }
    }

    let rows = sort(rows, &parsed.order)?;

    Ok(match parsed.projection {
        Projection::Entity => rows.into_iter().cloned().collect(),
        Projection::Count => vec![ResultRow::from(rows.len() as i64)],
        Projection::Fields(paths) if paths.len() == 1 => rows
            .into_iter()
            .map(|row| lookup(row, &paths[0]).cloned().unwrap_or(ResultRow::Null))
            .collect(),
        Projection::Fields(paths) => rows
            .into_iter()
            .map(|row| {
                ResultRow::Array(
                    paths
                        .iter()
                        .map(|path| lookup(row, path).cloned().unwrap_or(ResultRow::Null))
                        .collect(),
                )
            })
            .collect(),
    })
}

fn unsupported(text: &str, detail: &str) -> PersistenceError {
    PersistenceError::Execution(format!(
        "in-memory session cannot execute '{}': {}",
        text.trim(),
        detail
    ))
}

fn parse(text: &str) -> Result<ParsedQuery> {
    let captures = QUERY_SHAPE
        .captures(text)
        .ok_or_else(|| unsupported(text, "expected [select …] from …"))?;

    let from = captures.name("from").map_or("", |m| m.as_str().trim());
    let from = FROM_CLAUSE
        .captures(from)
        .ok_or_else(|| unsupported(text, "only a single entity is supported in from"))?;
    let entity = from["entity"].to_string();
    let alias = from.name("alias").map(|m| m.as_str().to_string());
    let paths = PathResolver {
        alias: alias.as_deref(),
        text,
    };

    let projection = match captures.name("select") {
        Some(select) => parse_projection(select.as_str(), &paths)?,
        None => Projection::Entity,
    };

    let filter = match captures.name("where") {
        Some(clause) => Some(parse_expression(clause.as_str(), &paths)?),
        None => None,
    };

    let order = match captures.name("order") {
        Some(clause) => parse_order(clause.as_str(), &paths)?,
        None => Vec::new(),
    };

    Ok(ParsedQuery {
        entity,
        projection,
        filter,
        order,
    })
}

struct PathResolver<'a> {
    alias: Option<&'a str>,
    text: &'a str,
}

impl PathResolver<'_> {
    fn is_alias(&self, expr: &str) -> bool {
        self.alias.is_some_and(|alias| alias.eq_ignore_ascii_case(expr))
    }

    /// `alias.a.b` becomes `["a", "b"]`. Without an alias, bare paths are accepted.
    fn resolve(&self, expr: &str) -> Result<Vec<String>> {
        let expr = expr.trim();
        let path = match self.alias {
            Some(alias) => expr
                .strip_prefix(alias)
                .and_then(|rest| rest.strip_prefix('.'))
                .ok_or_else(|| {
                    unsupported(self.text, &format!("'{}' is not a path of '{}'", expr, alias))
                })?,
            None => expr,
        };

        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(unsupported(self.text, &format!("invalid path '{}'", expr)));
        }
        Ok(path.split('.').map(str::to_string).collect())
    }
}

fn parse_projection(select: &str, paths: &PathResolver<'_>) -> Result<Projection> {
    let items = split_top_level(select, ',');
    if items.len() == 1 {
        let item = items[0];
        if paths.is_alias(item) {
            return Ok(Projection::Entity);
        }
        if let Some(count) = COUNT.captures(item) {
            let arg = &count["arg"];
            if arg == "*" || paths.is_alias(arg) {
                return Ok(Projection::Count);
            }
            return Err(unsupported(paths.text, "count() only accepts the entity alias"));
        }
    }

    let fields = items
        .iter()
        .map(|item| paths.resolve(item))
        .collect::<Result<Vec<_>>>()?;
    Ok(Projection::Fields(fields))
}

fn parse_order(clause: &str, paths: &PathResolver<'_>) -> Result<Vec<OrderItem>> {
    split_top_level(clause, ',')
        .into_iter()
        .map(|item| {
            let mut words = item.split_whitespace();
            let path = words
                .next()
                .ok_or_else(|| unsupported(paths.text, "empty order by item"))?;
            let descending = match words.next().map(str::to_ascii_lowercase).as_deref() {
                None | Some("asc") => false,
                Some("desc") => true,
                Some(other) => {
                    return Err(unsupported(
                        paths.text,
                        &format!("unknown sort direction '{}'", other),
                    ));
                }
            };
            Ok(OrderItem {
                path: paths.resolve(path)?,
                descending,
            })
        })
        .collect()
}

/// `a or b` binds looser than `a and b`.
fn parse_expression(expr: &str, paths: &PathResolver<'_>) -> Result<Condition> {
    let disjuncts = split_keyword(expr, "or");
    if disjuncts.len() > 1 {
        return disjuncts
            .into_iter()
            .map(|part| parse_conjunction(part, paths))
            .collect::<Result<Vec<_>>>()
            .map(Condition::Any);
    }
    parse_conjunction(expr, paths)
}

fn parse_conjunction(expr: &str, paths: &PathResolver<'_>) -> Result<Condition> {
    let conjuncts = split_keyword(expr, "and");
    if conjuncts.len() > 1 {
        return conjuncts
            .into_iter()
            .map(|part| parse_atom(part, paths))
            .collect::<Result<Vec<_>>>()
            .map(Condition::All);
    }
    parse_atom(expr, paths)
}

fn parse_atom(expr: &str, paths: &PathResolver<'_>) -> Result<Condition> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(unsupported(paths.text, "empty condition"));
    }

    if let Some(inner) = strip_enclosing_parens(expr) {
        return parse_expression(inner, paths);
    }

    if let Some(captures) = IS_NULL.captures(expr) {
        return Ok(Condition::IsNull {
            path: paths.resolve(&captures["path"])?,
            negated: captures.name("not").is_some(),
        });
    }

    if let Some(captures) = LIKE.captures(expr) {
        return Ok(Condition::Like {
            path: paths.resolve(&captures["path"])?,
            pattern: parse_operand(&captures["operand"], paths)?,
            negated: captures.name("not").is_some(),
        });
    }

    if let Some(captures) = COMPARISON.captures(expr) {
        let op = CompareOp::parse(&captures["op"])
            .ok_or_else(|| unsupported(paths.text, "unknown comparison operator"))?;
        return Ok(Condition::Compare {
            path: paths.resolve(&captures["path"])?,
            op,
            operand: parse_operand(&captures["operand"], paths)?,
        });
    }

    Err(unsupported(paths.text, &format!("unsupported condition '{}'", expr)))
}

fn parse_operand(operand: &str, paths: &PathResolver<'_>) -> Result<Operand> {
    let operand = operand.trim();

    if let Some(name) = operand.strip_prefix(':') {
        return Ok(Operand::Param(name.to_string()));
    }

    if operand.len() >= 2 && operand.starts_with('\'') && operand.ends_with('\'') {
        let text = operand[1..operand.len() - 1].replace("''", "'");
        return Ok(Operand::Literal(Value::Text(text)));
    }

    match operand.to_ascii_lowercase().as_str() {
        "true" => return Ok(Operand::Literal(Value::Boolean(true))),
        "false" => return Ok(Operand::Literal(Value::Boolean(false))),
        "null" => return Ok(Operand::Literal(Value::Null)),
        _ => {}
    }

    if NUMBER.is_match(operand) {
        let value = match operand.parse::<i64>() {
            Ok(i) => Value::Integer(i),
            Err(_) => operand
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| unsupported(paths.text, &e.to_string()))?,
        };
        return Ok(Operand::Literal(value));
    }

    Err(unsupported(paths.text, &format!("unsupported operand '{}'", operand)))
}

/// Returns the inside of `( … )` when the parentheses wrap the whole expression.
fn strip_enclosing_parens(expr: &str) -> Option<&str> {
    if !expr.starts_with('(') || !expr.ends_with(')') {
        return None;
    }

    let mut depth = 0i32;
    let mut in_quote = false;
    for (i, c) in expr.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 && i != expr.len() - 1 {
                    return None;
                }
            }
            _ => {}
        }
    }

    Some(&expr[1..expr.len() - 1])
}

fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            c if c == separator && !in_quote && depth == 0 => {
                parts.push(input[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }

    parts.push(input[start..].trim());
    parts
}

/// Splits on a keyword (case-insensitive, whitespace or parenthesis delimited)
/// outside of parentheses and string literals.
fn split_keyword<'a>(input: &'a str, keyword: &str) -> Vec<&'a str> {
    let bytes = input.as_bytes();
    let keyword = keyword.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => depth -= 1,
            _ if !in_quote && depth == 0 && keyword_at(bytes, i, keyword) => {
                parts.push(input[start..i].trim());
                i += keyword.len();
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    parts.push(input[start..].trim());
    parts
}

fn keyword_at(bytes: &[u8], i: usize, keyword: &[u8]) -> bool {
    let end = i + keyword.len();
    if end > bytes.len() || !bytes[i..end].eq_ignore_ascii_case(keyword) {
        return false;
    }

    let before = i == 0 || bytes[i - 1].is_ascii_whitespace() || bytes[i - 1] == b')';
    let after = end == bytes.len() || bytes[end].is_ascii_whitespace() || bytes[end] == b'(';
    before && after
}

fn lookup<'a>(row: &'a serde_json::Value, path: &[String]) -> Option<&'a serde_json::Value> {
    path.iter().try_fold(row, |value, segment| value.get(segment))
}

fn field_value(row: &serde_json::Value, path: &[String]) -> Result<Value> {
    match lookup(row, path) {
        None => Ok(Value::Null),
        Some(json) => Value::from_json(json).ok_or_else(|| {
            PersistenceError::TypeMismatch(format!(
                "'{}' is not a scalar attribute",
                path.join(".")
            ))
        }),
    }
}

fn operand_value(operand: &Operand, query: &QuerySpec) -> Result<Value> {
    let value = match operand {
        Operand::Literal(value) => value.clone(),
        Operand::Param(name) => query.param(name).cloned().ok_or_else(|| {
            PersistenceError::Execution(format!(
                "parameter ':{}' is not bound in '{}'",
                name, query.text
            ))
        })?,
    };

    // Rows hold the serde form, so timestamps and uuids are compared as text.
    Ok(Value::from_json(&value.to_json()).unwrap_or(Value::Null))
}

/// Fails on the first parameter the query references but does not bind.
fn check_bound(condition: &Condition, query: &QuerySpec) -> Result<()> {
    match condition {
        Condition::Compare { operand, .. } => operand_value(operand, query).map(|_| ()),
        Condition::Like { pattern, .. } => operand_value(pattern, query).map(|_| ()),
        Condition::IsNull { .. } => Ok(()),
        Condition::All(conditions) | Condition::Any(conditions) => conditions
            .iter()
            .try_for_each(|condition| check_bound(condition, query)),
    }
}

fn evaluate(condition: &Condition, row: &serde_json::Value, query: &QuerySpec) -> Result<bool> {
    match condition {
        Condition::Compare { path, op, operand } => {
            let left = field_value(row, path)?;
            let right = operand_value(operand, query)?;
            if left.is_null() || right.is_null() {
                return Ok(false);
            }
            Ok(op.holds(left.compare(&right)?))
        }
        Condition::Like {
            path,
            pattern,
            negated,
        } => {
            let text = field_value(row, path)?;
            let pattern = operand_value(pattern, query)?;
            match (text.as_str(), pattern.as_str()) {
                (Some(text), Some(pattern)) => Ok(eval_like(text, pattern)? != *negated),
                _ if text.is_null() || pattern.is_null() => Ok(false),
                _ => Err(PersistenceError::TypeMismatch(format!(
                    "LIKE needs text operands, got {} and {}",
                    text.type_name(),
                    pattern.type_name()
                ))),
            }
        }
        Condition::IsNull { path, negated } => {
            Ok(field_value(row, path)?.is_null() != *negated)
        }
        Condition::All(conditions) => {
            for condition in conditions {
                if !evaluate(condition, row, query)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Any(conditions) => {
            for condition in conditions {
                if evaluate(condition, row, query)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn sort<'a>(
    rows: Vec<&'a serde_json::Value>,
    order: &[OrderItem],
) -> Result<Vec<&'a serde_json::Value>> {
    if order.is_empty() {
        return Ok(rows);
    }

    let mut keyed = rows
        .into_iter()
        .map(|row| {
            let keys = order
                .iter()
                .map(|item| field_value(row, &item.path))
                .collect::<Result<Vec<_>>>()?;
            Ok((keys, row))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        for ((left, right), item) in a.iter().zip(b.iter()).zip(order) {
            let ordering = match left.compare(right) {
                Ok(ordering) => ordering,
                Err(err) => {
                    failure.get_or_insert(err);
                    Ordering::Equal
                }
            };
            let ordering = if item.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(keyed.into_iter().map(|(_, row)| row).collect()),
    }
}
