// SPDX-License-Identifier: Apache-2.0

//! Fluent query builder
//!
//! A [`QueryBuilder`] holds one SELECT, INSERT, UPDATE or DELETE statement as
//! structured parts and renders it for a given [`SqlDialect`]. Values are
//! never inlined: they are registered as named (`:name`) or positional (`?`)
//! parameters and bound by [`QueryBuilder::compile`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;

use qore_core::{EngineError, EngineResult, Value};

use crate::dialect::SqlDialect;
use crate::expr::{col, ColumnRef, Expr, Param, SqlWriter};

const NAMED_PARAMETER_PREFIX: &str = "dcValue";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// One entry of the select list.
#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// Name of the result column this item produces, when it is known
    /// without asking the database.
    pub fn output_name(&self) -> Option<&str> {
        if let Some(alias) = &self.alias {
            return Some(alias);
        }
        match &self.expr {
            Expr::Column(c) => Some(&c.name),
            _ => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.expr, Expr::Wildcard(_))
    }
}

impl From<Expr> for SelectItem {
    fn from(expr: Expr) -> Self {
        Self::new(expr)
    }
}

impl From<ColumnRef> for SelectItem {
    fn from(column: ColumnRef) -> Self {
        Self::new(Expr::Column(column))
    }
}

impl From<&str> for SelectItem {
    fn from(column: &str) -> Self {
        Self::new(col(column))
    }
}

impl From<String> for SelectItem {
    fn from(column: String) -> Self {
        Self::new(col(&column))
    }
}

/// `table [AS alias]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: String,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: Option<&str>) -> Self {
        Self {
            table: table.into(),
            alias: alias.map(str::to_string),
        }
    }

    /// The name columns of this table are qualified with.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    /// Alias the join hangs off. Informational for rendering.
    pub from_alias: String,
    pub table: TableRef,
    pub condition: Option<Expr>,
}

/// Parameter values shared by every query rendered from one builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Parameters {
    named: BTreeMap<String, Value>,
    positional: Vec<Value>,
}

impl Parameters {
    pub fn named(&self, name: &str) -> Option<&Value> {
        self.named.get(name)
    }

    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn set_named(&mut self, name: impl Into<String>, value: Value) {
        self.named.insert(name.into(), value);
    }

    /// Sets the positional value at `index`, padding any gap with NULL.
    pub fn set_positional(&mut self, index: usize, value: Value) {
        if self.positional.len() <= index {
            self.positional.resize(index + 1, Value::Null);
        }
        self.positional[index] = value;
    }

    fn push_positional(&mut self, value: Value) -> usize {
        self.positional.push(value);
        self.positional.len() - 1
    }

    pub fn iter_named(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn has_positional(&self) -> bool {
        !self.positional.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }
}

/// SQL with its bound values, ready for a driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Anything that can hand out the plain builder it is built on.
///
/// Used wherever a builder is embedded in another query, so wrappers do not
/// need to be recognised by type.
pub trait AsInnerBuilder {
    fn as_inner_builder(&self) -> Cow<'_, QueryBuilder>;
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    kind: QueryKind,
    dialect: SqlDialect,
    selects: Vec<SelectItem>,
    from: Option<TableRef>,
    joins: Vec<Join>,
    where_clause: Option<Expr>,
    group_by: Vec<Expr>,
    order_by: Vec<(Expr, OrderDirection)>,
    max_results: Option<u64>,
    first_result: Option<u64>,
    assignments: Vec<(String, Expr)>,
    params: Parameters,
    parameter_counter: usize,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(SqlDialect::default())
    }
}

impl AsInnerBuilder for QueryBuilder {
    fn as_inner_builder(&self) -> Cow<'_, QueryBuilder> {
        Cow::Borrowed(self)
    }
}

impl QueryBuilder {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            kind: QueryKind::Select,
            dialect,
            selects: Vec::new(),
            from: None,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            max_results: None,
            first_result: None,
            assignments: Vec::new(),
            params: Parameters::default(),
            parameter_counter: 0,
        }
    }

    // ==================== Select list ====================

    /// Replaces the select list.
    pub fn select<I, S>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.kind = QueryKind::Select;
        self.selects.clear();
        self.add_select(items)
    }

    pub fn add_select<I, S>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.kind = QueryKind::Select;
        self.selects.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn select_alias(&mut self, item: impl Into<SelectItem>, alias: &str) -> &mut Self {
        let mut item = item.into();
        item.alias = Some(alias.to_string());
        self.add_select([item])
    }

    // ==================== From / joins ====================

    pub fn from(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        self.from = Some(TableRef::new(table, alias));
        self
    }

    pub fn join(
        &mut self,
        kind: JoinKind,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> &mut Self {
        self.joins.push(Join {
            kind,
            from_alias: from_alias.to_string(),
            table: TableRef::new(table, alias),
            condition,
        });
        self
    }

    pub fn inner_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> &mut Self {
        self.join(JoinKind::Inner, from_alias, table, alias, condition)
    }

    pub fn left_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> &mut Self {
        self.join(JoinKind::Left, from_alias, table, alias, condition)
    }

    pub fn right_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> &mut Self {
        self.join(JoinKind::Right, from_alias, table, alias, condition)
    }

    // ==================== Predicates ====================

    /// Replaces the WHERE clause.
    pub fn where_(&mut self, predicate: Expr) -> &mut Self {
        self.where_clause = Some(predicate);
        self
    }

    pub fn and_where(&mut self, predicate: Expr) -> &mut Self {
        self.where_clause = Some(match self.where_clause.take() {
            None => predicate,
            Some(Expr::And(mut parts)) => {
                parts.push(predicate);
                Expr::And(parts)
            }
            Some(existing) => Expr::And(vec![existing, predicate]),
        });
        self
    }

    pub fn or_where(&mut self, predicate: Expr) -> &mut Self {
        self.where_clause = Some(match self.where_clause.take() {
            None => predicate,
            Some(Expr::Or(mut parts)) => {
                parts.push(predicate);
                Expr::Or(parts)
            }
            Some(existing) => Expr::Or(vec![existing, predicate]),
        });
        self
    }

    // ==================== Ordering / grouping / paging ====================

    pub fn order_by(&mut self, expr: Expr, direction: OrderDirection) -> &mut Self {
        self.order_by.clear();
        self.add_order_by(expr, direction)
    }

    pub fn add_order_by(&mut self, expr: Expr, direction: OrderDirection) -> &mut Self {
        self.order_by.push((expr, direction));
        self
    }

    pub fn group_by(&mut self, expr: Expr) -> &mut Self {
        self.group_by.clear();
        self.add_group_by(expr)
    }

    pub fn add_group_by(&mut self, expr: Expr) -> &mut Self {
        self.group_by.push(expr);
        self
    }

    pub fn set_max_results(&mut self, limit: Option<u64>) -> &mut Self {
        self.max_results = limit;
        self
    }

    pub fn set_first_result(&mut self, offset: u64) -> &mut Self {
        self.first_result = (offset > 0).then_some(offset);
        self
    }

    // ==================== Parameters ====================

    /// Registers `value` under a generated name and returns its placeholder.
    pub fn create_named_parameter(&mut self, value: impl Into<Value>) -> Expr {
        self.parameter_counter += 1;
        let name = format!("{NAMED_PARAMETER_PREFIX}{}", self.parameter_counter);
        self.params.set_named(name.clone(), value.into());
        Expr::Param(Param::Named(name))
    }

    pub fn create_positional_parameter(&mut self, value: impl Into<Value>) -> Expr {
        let index = self.params.push_positional(value.into());
        Expr::Param(Param::Positional(index))
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.params.set_named(name, value.into());
        self
    }

    pub fn set_parameters<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (name, value) in values {
            self.params.set_named(name, value.into());
        }
        self
    }

    pub fn set_positional_parameter(&mut self, index: usize, value: impl Into<Value>) -> &mut Self {
        self.params.set_positional(index, value.into());
        self
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    // ==================== Write statements ====================

    pub fn update(&mut self, table: &str) -> &mut Self {
        self.kind = QueryKind::Update;
        self.from = Some(TableRef::new(table, None));
        self
    }

    pub fn set(&mut self, column: &str, value: Expr) -> &mut Self {
        self.assignments.push((column.to_string(), value));
        self
    }

    pub fn insert(&mut self, table: &str) -> &mut Self {
        self.kind = QueryKind::Insert;
        self.from = Some(TableRef::new(table, None));
        self
    }

    pub fn set_value(&mut self, column: &str, value: Expr) -> &mut Self {
        self.set(column, value)
    }

    pub fn delete(&mut self, table: &str) -> &mut Self {
        self.kind = QueryKind::Delete;
        self.from = Some(TableRef::new(table, None));
        self
    }

    // ==================== Accessors ====================

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn selects(&self) -> &[SelectItem] {
        &self.selects
    }

    pub fn from_table(&self) -> Option<&TableRef> {
        self.from.as_ref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    pub fn order_by_items(&self) -> &[(Expr, OrderDirection)] {
        &self.order_by
    }

    pub fn group_by_items(&self) -> &[Expr] {
        &self.group_by
    }

    pub fn max_results(&self) -> Option<u64> {
        self.max_results
    }

    pub fn first_result(&self) -> Option<u64> {
        self.first_result
    }

    /// Result column names known from the select list. Wildcards and
    /// unaliased expressions are skipped.
    pub fn output_columns(&self) -> Vec<String> {
        self.selects
            .iter()
            .filter_map(|s| s.output_name().map(str::to_string))
            .collect()
    }

    pub fn has_wildcard_select(&self) -> bool {
        self.selects.iter().any(SelectItem::is_wildcard)
    }

    // ==================== Rendering ====================

    /// SQL with named placeholders, in the builder's dialect.
    pub fn to_sql(&self) -> String {
        let mut writer = SqlWriter::display(self.dialect);
        self.render_into(&mut writer);
        writer.sql
    }

    /// Renders for `dialect` and binds every parameter positionally.
    ///
    /// Array values expand to one placeholder per element so that
    /// `IN (:ids)` works on every driver.
    pub fn compile(&self, dialect: SqlDialect) -> EngineResult<CompiledQuery> {
        let mut writer = SqlWriter::compile(dialect, &self.params);
        self.render_into(&mut writer);
        if !writer.missing.is_empty() {
            return Err(EngineError::validation(format!(
                "No value bound for parameter(s) {}",
                writer.missing.join(", ")
            )));
        }
        Ok(CompiledQuery {
            sql: writer.sql,
            params: writer.bound,
        })
    }

    pub(crate) fn render_into(&self, w: &mut SqlWriter<'_>) {
        match self.kind {
            QueryKind::Select => self.render_select(w),
            QueryKind::Insert => self.render_insert(w),
            QueryKind::Update => self.render_update(w),
            QueryKind::Delete => {
                w.push("DELETE FROM ");
                self.render_table_name(w);
                self.render_where(w);
            }
        }
    }

    fn render_select(&self, w: &mut SqlWriter<'_>) {
        w.push("SELECT ");
        if self.selects.is_empty() {
            w.push("*");
        }
        for (i, item) in self.selects.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            item.expr.render(w);
            if let Some(alias) = &item.alias {
                w.push(" AS ");
                w.push_ident(alias);
            }
        }

        if let Some(from) = &self.from {
            w.push(" FROM ");
            render_table_ref(w, from);
        }

        for join in &self.joins {
            w.push(" ");
            w.push(join.kind.as_sql());
            w.push(" ");
            render_table_ref(w, &join.table);
            w.push(" ON ");
            match &join.condition {
                Some(condition) => condition.render(w),
                None => w.push("1 = 1"),
            }
        }

        self.render_where(w);

        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            for (i, expr) in self.group_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                expr.render(w);
            }
        }

        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            for (i, (expr, direction)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                expr.render(w);
                w.push(match direction {
                    OrderDirection::Asc => " ASC",
                    OrderDirection::Desc => " DESC",
                });
            }
        }

        let paging = w.dialect.limit_clause(self.max_results, self.first_result);
        w.push(&paging);
    }

    fn render_insert(&self, w: &mut SqlWriter<'_>) {
        w.push("INSERT INTO ");
        self.render_table_name(w);
        w.push(" (");
        for (i, (column, _)) in self.assignments.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push_ident(column);
        }
        w.push(") VALUES (");
        for (i, (_, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            value.render(w);
        }
        w.push(")");
    }

    fn render_update(&self, w: &mut SqlWriter<'_>) {
        w.push("UPDATE ");
        self.render_table_name(w);
        w.push(" SET ");
        for (i, (column, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push_ident(column);
            w.push(" = ");
            value.render(w);
        }
        self.render_where(w);
    }

    fn render_table_name(&self, w: &mut SqlWriter<'_>) {
        if let Some(from) = &self.from {
            w.push_ident(&from.table);
        }
    }

    fn render_where(&self, w: &mut SqlWriter<'_>) {
        if let Some(predicate) = &self.where_clause {
            w.push(" WHERE ");
            predicate.render(w);
        }
    }
}

fn render_table_ref(w: &mut SqlWriter<'_>, table: &TableRef) {
    w.push_ident(&table.table);
    if let Some(alias) = &table.alias {
        w.push(" AS ");
        w.push_ident(alias);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lit;
    use proptest::prelude::*;
    use sqlparser::dialect::{GenericDialect, PostgreSqlDialect};
    use sqlparser::parser::Parser;

    fn file_query() -> QueryBuilder {
        let mut qb = QueryBuilder::new(SqlDialect::Sqlite);
        let storage = qb.create_named_parameter(3);
        qb.select(["f.fileid", "f.path"])
            .from("filecache", Some("f"))
            .left_join(
                "f",
                "file_metadata",
                Some("m"),
                Some(Expr::eq(col("f.fileid"), col("m.fileid"))),
            )
            .where_(Expr::eq(col("f.storage"), storage))
            .and_where(Expr::is_null(col("m.fileid")))
            .order_by(col("f.path"), OrderDirection::Asc)
            .set_max_results(Some(10));
        qb
    }

    #[test]
    fn renders_select_with_joins_in_declaration_order() {
        assert_eq!(
            file_query().to_sql(),
            "SELECT \"f\".\"fileid\", \"f\".\"path\" FROM \"filecache\" AS \"f\" \
             LEFT JOIN \"file_metadata\" AS \"m\" ON \"f\".\"fileid\" = \"m\".\"fileid\" \
             WHERE (\"f\".\"storage\" = :dcValue1) AND (\"m\".\"fileid\" IS NULL) \
             ORDER BY \"f\".\"path\" ASC LIMIT 10"
        );
    }

    #[test]
    fn compiled_sql_parses() {
        let compiled = file_query().compile(SqlDialect::Sqlite).unwrap();
        assert_eq!(compiled.params, vec![Value::Int(3)]);
        Parser::parse_sql(&GenericDialect {}, &compiled.sql).unwrap();
    }

    #[test]
    fn array_parameters_expand_per_element() {
        let mut qb = QueryBuilder::new(SqlDialect::Postgres);
        qb.select(["id"])
            .from("items", None)
            .where_(Expr::in_list(
                col("id"),
                [Expr::Param(Param::Named("ids".into()))],
            ))
            .set_parameter("ids", vec![1_i64, 2, 3]);

        let compiled = qb.compile(SqlDialect::Postgres).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"id\" FROM \"items\" WHERE \"id\" IN ($1, $2, $3)"
        );
        assert_eq!(compiled.params, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        Parser::parse_sql(&PostgreSqlDialect {}, &compiled.sql).unwrap();
    }

    #[test]
    fn empty_array_matches_nothing() {
        let mut qb = QueryBuilder::default();
        qb.from("items", None)
            .where_(Expr::in_list(col("id"), [Expr::Param(Param::Named("ids".into()))]))
            .set_parameter("ids", Vec::<i64>::new());
        let compiled = qb.compile(SqlDialect::Sqlite).unwrap();
        assert!(compiled.sql.ends_with("\"id\" IN (NULL)"));
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn missing_parameter_fails_compilation() {
        let mut qb = QueryBuilder::default();
        qb.from("items", None)
            .where_(Expr::eq(col("id"), Expr::Param(Param::Named("id".into()))));
        let err = qb.compile(SqlDialect::Sqlite).unwrap_err();
        assert!(matches!(err, EngineError::ValidationError { .. }));
        assert!(err.to_string().contains(":id"));
    }

    #[test]
    fn positional_parameters_bind_in_order() {
        let mut qb = QueryBuilder::default();
        let a = qb.create_positional_parameter(1);
        let b = qb.create_positional_parameter("x");
        qb.from("t", None)
            .where_(Expr::and([Expr::eq(col("a"), a), Expr::eq(col("b"), b)]));
        let compiled = qb.compile(SqlDialect::Sqlite).unwrap();
        assert_eq!(compiled.params, vec![Value::Int(1), Value::Text("x".into())]);
        assert!(qb.parameters().has_positional());
    }

    #[test]
    fn subqueries_share_the_outer_parameters() {
        let mut outer = QueryBuilder::default();
        let storage = outer.create_named_parameter(7);
        let mut inner = QueryBuilder::default();
        inner
            .select(["fileid"])
            .from("file_metadata", None)
            .where_(Expr::eq(col("storage"), storage));
        outer
            .from("filecache", Some("f"))
            .where_(Expr::in_subquery(col("f.fileid"), &inner));

        let compiled = outer.compile(SqlDialect::Postgres).unwrap();
        assert!(compiled.sql.contains("IN (SELECT \"fileid\" FROM \"file_metadata\" WHERE \"storage\" = $1)"));
        assert_eq!(compiled.params, vec![Value::Int(7)]);
    }

    #[test]
    fn write_statements_render() {
        let mut update = QueryBuilder::default();
        let path = update.create_named_parameter("a/b");
        update
            .update("filecache")
            .set("path", path)
            .where_(Expr::eq(col("fileid"), lit(5)));
        assert_eq!(
            update.to_sql(),
            "UPDATE \"filecache\" SET \"path\" = :dcValue1 WHERE \"fileid\" = 5"
        );

        let mut insert = QueryBuilder::default();
        insert.insert("filecache").set_value("fileid", lit(1)).set_value("path", lit("x"));
        assert_eq!(
            insert.to_sql(),
            "INSERT INTO \"filecache\" (\"fileid\", \"path\") VALUES (1, 'x')"
        );

        let mut delete = QueryBuilder::default();
        delete.delete("filecache").where_(Expr::eq(col("fileid"), lit(1)));
        assert_eq!(delete.kind(), QueryKind::Delete);
        assert_eq!(delete.to_sql(), "DELETE FROM \"filecache\" WHERE \"fileid\" = 1");
    }

    #[test]
    fn output_columns_prefer_aliases() {
        let mut qb = QueryBuilder::default();
        qb.select(["f.fileid", "*"])
            .select_alias("m.value", "meta_value")
            .add_select([Expr::count(col("f.fileid"))]);
        assert_eq!(qb.output_columns(), vec!["fileid", "meta_value"]);
        assert!(qb.has_wildcard_select());
    }

    fn identifier() -> impl Strategy<Value = String> {
        "[a-z_][a-z0-9_]{0,12}"
    }

    proptest! {
        #[test]
        fn quoted_identifiers_always_parse(table in identifier(), alias in identifier(), column in identifier()) {
            let mut qb = QueryBuilder::new(SqlDialect::Postgres);
            let value = qb.create_named_parameter(1);
            qb.select([Expr::Column(ColumnRef::qualified(alias.clone(), column.clone()))])
                .from(&table, Some(&alias))
                .where_(Expr::eq(Expr::Column(ColumnRef::qualified(alias.clone(), column.clone())), value));
            let compiled = qb.compile(SqlDialect::Postgres).unwrap();
            prop_assert!(Parser::parse_sql(&PostgreSqlDialect {}, &compiled.sql).is_ok());
        }
    }
}
