use std::fmt;

use serde::de::DeserializeOwned;
use tracing::{Level, event};

use crate::core::{Params, PersistenceError, Result, ResultRow, Value};
use crate::session::PersistenceSession;

use super::QuerySpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
        }
    }
}

/// Fluent JPQL assembler bound to a session.
///
/// Fragments are concatenated verbatim; nothing is parsed or validated here,
/// so a malformed fragment only surfaces when the session executes the query.
/// Every configuration call consumes and returns the builder, and executing
/// consumes it for good.
///
/// ```ignore
/// let names: Vec<String> = Jpql::new(&session)
///     .select(["u.name"])
///     .from(["User u"])
///     .left_join_fetch(["u.roles r"])
///     .where_(["u.active = :active"])
///     .or(["u.age > :min", "u.admin = true"])
///     .with_param("active", true)
///     .with_param("min", 18)
///     .order_by(["u.name"])
///     .max_results(20)
///     .get_result_list_as()
///     .await?;
/// ```
pub struct Jpql<'s, S: PersistenceSession + ?Sized> {
    session: &'s S,
    select: Vec<String>,
    from: Vec<String>,
    where_: Vec<String>,
    params: Params,
    group: Vec<String>,
    having: Vec<String>,
    order: Vec<String>,
    first_result: Option<usize>,
    max_results: Option<usize>,
}

impl<'s, S: PersistenceSession + ?Sized> Jpql<'s, S> {
    pub fn new(session: &'s S) -> Self {
        Self {
            session,
            select: Vec::new(),
            from: Vec::new(),
            where_: Vec::new(),
            params: Params::new(),
            group: Vec::new(),
            having: Vec::new(),
            order: Vec::new(),
            first_result: None,
            max_results: None,
        }
    }

    pub fn select<I, T>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.select.extend(fragments.into_iter().map(Into::into));
        self
    }

    pub fn from<I, T>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.from.extend(fragments.into_iter().map(Into::into));
        self
    }

    /// Alias of [`Jpql::from`] for fragments that already carry their join keyword.
    pub fn join<I, T>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.from(fragments)
    }

    pub fn inner_join<I, T>(self, joins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.join_with(JoinKind::Inner, false, joins)
    }

    pub fn inner_join_fetch<I, T>(self, joins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.join_with(JoinKind::Inner, true, joins)
    }

    pub fn inner_join_with<I, T>(self, fetch: bool, joins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.join_with(JoinKind::Inner, fetch, joins)
    }

    pub fn left_join<I, T>(self, joins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.join_with(JoinKind::Left, false, joins)
    }

    pub fn left_join_fetch<I, T>(self, joins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.join_with(JoinKind::Left, true, joins)
    }

    pub fn left_join_with<I, T>(self, fetch: bool, joins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.join_with(JoinKind::Left, fetch, joins)
    }

    /// Prefixes every target with its join keywords and appends it to the from list.
    pub fn join_with<I, T>(self, kind: JoinKind, fetch: bool, joins: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let fetch = if fetch { "fetch" } else { "" };
        let joins: Vec<String> = joins
            .into_iter()
            .map(|join| format!("{} join {} {}", kind.keyword(), fetch, join.into()))
            .collect();
        self.from(joins)
    }

    /// Alias of [`Jpql::and`].
    pub fn where_<I, T>(self, conditions: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.and(conditions)
    }

    pub fn and<I, T>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.where_.extend(conditions.into_iter().map(Into::into));
        self
    }

    /// Appends one parenthesized disjunction of `conditions` to the where list.
    ///
    /// Consecutive calls produce separate groups that are AND-ed together.
    pub fn or<I, T>(self, conditions: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let joined = conditions
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>()
            .join(" OR ");
        self.and([format!("({})", joined)])
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn group_by<I, T>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.group.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn having<I, T>(mut self, havings: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.having.extend(havings.into_iter().map(Into::into));
        self
    }

    pub fn order_by<I, T>(mut self, orders: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.order.extend(orders.into_iter().map(Into::into));
        self
    }

    pub fn first_result(self, first_result: usize) -> Self {
        self.first_result_opt(Some(first_result))
    }

    pub fn first_result_opt(mut self, first_result: Option<usize>) -> Self {
        self.first_result = first_result;
        self
    }

    pub fn max_results(self, max_results: usize) -> Self {
        self.max_results_opt(Some(max_results))
    }

    pub fn max_results_opt(mut self, max_results: Option<usize>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Renders the query and snapshots its bindings.
    pub fn build(&self) -> QuerySpec {
        QuerySpec {
            text: self.to_string(),
            params: self.params.clone(),
            first_result: self.first_result,
            max_results: self.max_results,
        }
    }

    pub async fn get_result_list(self) -> Result<Vec<ResultRow>> {
        let query = self.build();
        event!(
            Level::DEBUG,
            jpql = %query.text,
            params = query.params.len(),
            first_result = ?query.first_result,
            max_results = ?query.max_results,
            "executing jpql"
        );
        self.session.execute_query(&query).await
    }

    /// Same as [`Jpql::get_result_list`], deserializing every row into `T`.
    ///
    /// The select and from clauses must actually produce `T`.
    pub async fn get_result_list_as<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        self.get_result_list()
            .await?
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(PersistenceError::from))
            .collect()
    }

    /// Fails unless the query yields exactly one row.
    pub async fn get_single_result(self) -> Result<ResultRow> {
        let text = self.to_string();
        let mut rows = self.get_result_list().await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(PersistenceError::NoResult { query: text }),
            count => Err(PersistenceError::NonUniqueResult { query: text, count }),
        }
    }

    pub async fn get_single_result_as<T: DeserializeOwned>(self) -> Result<T> {
        let row = self.get_single_result().await?;
        Ok(serde_json::from_value(row)?)
    }

    /// First row of the result, or `None` when the query yields nothing.
    pub async fn get_any_result(self) -> Result<Option<ResultRow>> {
        Ok(self.get_result_list().await?.into_iter().next())
    }

    pub async fn get_any_result_as<T: DeserializeOwned>(self) -> Result<Option<T>> {
        match self.get_any_result().await? {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }
}

impl<S: PersistenceSession + ?Sized> fmt::Display for Jpql<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut segments: Vec<String> = Vec::with_capacity(6);

        if !self.select.is_empty() {
            segments.push(format!("select {}", self.select.join(", ")));
        }

        // from is rendered even when empty; the session rejects the query.
        segments.push(format!("from {}", self.from.join(" ")));

        if !self.where_.is_empty() {
            segments.push(format!("where {}", self.where_.join(" and ")));
        }
        if !self.group.is_empty() {
            segments.push(format!("group by {}", self.group.join(", ")));
        }
        if !self.having.is_empty() {
            segments.push(format!("having {}", self.having.join(", ")));
        }
        if !self.order.is_empty() {
            segments.push(format!("order by {}", self.order.join(", ")));
        }

        write!(f, "{}", segments.join(" ").trim_end())
    }
}

impl<S: PersistenceSession + ?Sized> fmt::Debug for Jpql<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jpql")
            .field("query", &self.to_string())
            .field("params", &self.params)
            .field("first_result", &self.first_result)
            .field("max_results", &self.max_results)
            .finish()
    }
}
