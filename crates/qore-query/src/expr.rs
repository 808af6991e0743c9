// SPDX-License-Identifier: Apache-2.0

//! Expression tree
//!
//! Every select item, join condition and predicate is an [`Expr`]. The tree
//! carries enough structure to answer "which tables does this touch"
//! exactly, which string predicates cannot.

use std::collections::BTreeSet;
use std::fmt;

use qore_core::Value;

use crate::builder::{AsInnerBuilder, Parameters, QueryBuilder};
use crate::dialect::SqlDialect;

/// A possibly qualified column reference (`alias.column` or `column`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    /// Parses `alias.column` or a bare `column`.
    pub fn parse(column: &str) -> Self {
        match column.split_once('.') {
            Some((qualifier, name)) => Self::qualified(qualifier, name),
            None => Self {
                qualifier: None,
                name: column.to_string(),
            },
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Bound parameter reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    /// `:name`, shared by name across every query that receives the same
    /// parameter set
    Named(String),
    /// `?`, index into the positional parameter list
    Positional(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl BinaryOperator {
    fn as_sql(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::Neq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::Lte => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Gte => ">=",
            BinaryOperator::Like => "LIKE",
        }
    }
}

/// SQL expression
#[derive(Debug, Clone)]
pub enum Expr {
    Column(ColumnRef),
    /// `*` or `alias.*`
    Wildcard(Option<String>),
    Literal(Value),
    Param(Param),
    Binary {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<QueryBuilder>,
        negated: bool,
    },
    Func {
        name: String,
        args: Vec<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        data_type: String,
    },
    /// Opaque SQL. Never attributed to any table.
    Raw(String),
}

/// Column reference, or a wildcard when given `*` / `alias.*`.
pub fn col(column: &str) -> Expr {
    if column == "*" {
        return Expr::Wildcard(None);
    }
    if let Some(qualifier) = column.strip_suffix(".*") {
        return Expr::Wildcard(Some(qualifier.to_string()));
    }
    Expr::Column(ColumnRef::parse(column))
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

impl From<ColumnRef> for Expr {
    fn from(column: ColumnRef) -> Self {
        Expr::Column(column)
    }
}

impl Expr {
    fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Eq, right)
    }

    pub fn neq(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Neq, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Lt, right)
    }

    pub fn lte(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Lte, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Gt, right)
    }

    pub fn gte(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Gte, right)
    }

    pub fn like(left: Expr, right: Expr) -> Self {
        Self::binary(left, BinaryOperator::Like, right)
    }

    pub fn and(parts: impl IntoIterator<Item = Expr>) -> Self {
        Expr::And(parts.into_iter().collect())
    }

    pub fn or(parts: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Or(parts.into_iter().collect())
    }

    pub fn not(expr: Expr) -> Self {
        Expr::Not(Box::new(expr))
    }

    pub fn is_null(expr: Expr) -> Self {
        Expr::IsNull(Box::new(expr))
    }

    pub fn is_not_null(expr: Expr) -> Self {
        Expr::IsNotNull(Box::new(expr))
    }

    pub fn in_list(expr: Expr, list: impl IntoIterator<Item = Expr>) -> Self {
        Expr::InList {
            expr: Box::new(expr),
            list: list.into_iter().collect(),
            negated: false,
        }
    }

    pub fn not_in_list(expr: Expr, list: impl IntoIterator<Item = Expr>) -> Self {
        Expr::InList {
            expr: Box::new(expr),
            list: list.into_iter().collect(),
            negated: true,
        }
    }

    /// `expr IN (subquery)`. The subquery renders with the outer query's
    /// parameters, so create its parameters on the outer builder.
    pub fn in_subquery(expr: Expr, subquery: &dyn AsInnerBuilder) -> Self {
        Expr::InSubquery {
            expr: Box::new(expr),
            subquery: Box::new(subquery.as_inner_builder().into_owned()),
            negated: false,
        }
    }

    pub fn func(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Func {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn count(expr: Expr) -> Self {
        Self::func("COUNT", [expr])
    }

    pub fn cast(expr: Expr, data_type: impl Into<String>) -> Self {
        Expr::Cast {
            expr: Box::new(expr),
            data_type: data_type.into(),
        }
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Expr::Raw(sql.into())
    }

    /// Calls `f` for this node and every nested node, depth first.
    ///
    /// Subqueries are not entered: they are self-contained statements.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::And(parts) | Expr::Or(parts) => {
                for part in parts {
                    part.walk(f);
                }
            }
            Expr::Not(inner)
            | Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::Cast { expr: inner, .. }
            | Expr::InSubquery { expr: inner, .. } => inner.walk(f),
            Expr::InList { expr, list, .. } => {
                expr.walk(f);
                for item in list {
                    item.walk(f);
                }
            }
            Expr::Func { args, .. } => {
                for arg in args {
                    arg.walk(f);
                }
            }
            Expr::Column(_)
            | Expr::Wildcard(_)
            | Expr::Literal(_)
            | Expr::Param(_)
            | Expr::Raw(_) => {}
        }
    }

    /// Every table name or alias this expression qualifies a column with.
    pub fn qualifiers(&self) -> BTreeSet<&str> {
        let mut found = BTreeSet::new();
        self.walk(&mut |node| match node {
            Expr::Column(ColumnRef {
                qualifier: Some(q), ..
            })
            | Expr::Wildcard(Some(q)) => {
                found.insert(q.as_str());
            }
            _ => {}
        });
        found
    }

    /// Whether the expression qualifies any column with `name`.
    pub fn mentions(&self, name: &str) -> bool {
        self.qualifiers().contains(name)
    }

    pub fn has_positional_param(&self) -> bool {
        let mut found = false;
        self.walk(&mut |node| {
            if matches!(node, Expr::Param(Param::Positional(_))) {
                found = true;
            }
        });
        found
    }

    /// Splits nested top-level `AND`s into their conjuncts. `OR` is kept whole.
    pub fn flatten_and(self) -> Vec<Expr> {
        match self {
            Expr::And(parts) => parts.into_iter().flat_map(Expr::flatten_and).collect(),
            other => vec![other],
        }
    }

    /// The column behind this expression, looking through casts.
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(c) => Some(c),
            Expr::Cast { expr, .. } => expr.as_column(),
            _ => None,
        }
    }

    /// True for exactly `<column> IS NULL`.
    pub fn is_null_check_of(&self, column: &ColumnRef) -> bool {
        match self {
            Expr::IsNull(inner) => matches!(inner.as_ref(), Expr::Column(c) if c == column),
            _ => false,
        }
    }

    /// Renders with named placeholders, for display and debugging.
    pub fn to_sql(&self, dialect: SqlDialect) -> String {
        let mut writer = SqlWriter::display(dialect);
        self.render(&mut writer);
        writer.sql
    }

    pub(crate) fn render(&self, w: &mut SqlWriter<'_>) {
        match self {
            Expr::Column(c) => {
                if let Some(q) = &c.qualifier {
                    w.push_ident(q);
                    w.push(".");
                }
                w.push_ident(&c.name);
            }
            Expr::Wildcard(None) => w.push("*"),
            Expr::Wildcard(Some(q)) => {
                w.push_ident(q);
                w.push(".*");
            }
            Expr::Literal(v) => {
                let literal = w.dialect.format_value(v);
                w.push(&literal);
            }
            Expr::Param(p) => w.push_param(p),
            Expr::Binary { left, op, right } => {
                left.render(w);
                w.push(" ");
                w.push(op.as_sql());
                w.push(" ");
                right.render(w);
            }
            Expr::And(parts) => render_composite(w, parts, " AND ", "1 = 1"),
            Expr::Or(parts) => render_composite(w, parts, " OR ", "1 = 0"),
            Expr::Not(inner) => {
                w.push("NOT (");
                inner.render(w);
                w.push(")");
            }
            Expr::IsNull(inner) => {
                inner.render(w);
                w.push(" IS NULL");
            }
            Expr::IsNotNull(inner) => {
                inner.render(w);
                w.push(" IS NOT NULL");
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                expr.render(w);
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    item.render(w);
                }
                w.push(")");
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                expr.render(w);
                w.push(if *negated { " NOT IN (" } else { " IN (" });
                subquery.render_into(w);
                w.push(")");
            }
            Expr::Func { name, args } => {
                w.push(name);
                w.push("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    arg.render(w);
                }
                w.push(")");
            }
            Expr::Cast { expr, data_type } => {
                w.push("CAST(");
                expr.render(w);
                w.push(" AS ");
                w.push(data_type);
                w.push(")");
            }
            Expr::Raw(sql) => w.push(sql),
        }
    }
}

fn render_composite(w: &mut SqlWriter<'_>, parts: &[Expr], separator: &str, empty: &str) {
    match parts {
        [] => w.push(empty),
        [single] => single.render(w),
        _ => {
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    w.push(separator);
                }
                w.push("(");
                part.render(w);
                w.push(")");
            }
        }
    }
}

/// Accumulates rendered SQL.
///
/// In display mode parameters render as `:name` / `?`. In compile mode they
/// are looked up and replaced by the dialect's positional placeholders,
/// arrays expanding to one placeholder per element.
pub(crate) struct SqlWriter<'p> {
    pub(crate) dialect: SqlDialect,
    pub(crate) sql: String,
    params: Option<&'p Parameters>,
    pub(crate) bound: Vec<Value>,
    pub(crate) missing: Vec<String>,
}

impl<'p> SqlWriter<'p> {
    pub(crate) fn display(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: None,
            bound: Vec::new(),
            missing: Vec::new(),
        }
    }

    pub(crate) fn compile(dialect: SqlDialect, params: &'p Parameters) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Some(params),
            bound: Vec::new(),
            missing: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    pub(crate) fn push_ident(&mut self, ident: &str) {
        let quoted = self.dialect.quote_ident(ident);
        self.sql.push_str(&quoted);
    }

    fn bind(&mut self, value: Value) {
        self.bound.push(value);
        let placeholder = self.dialect.placeholder(self.bound.len());
        self.sql.push_str(&placeholder);
    }

    fn push_param(&mut self, param: &Param) {
        let Some(params) = self.params else {
            match param {
                Param::Named(name) => {
                    self.sql.push(':');
                    self.sql.push_str(name);
                }
                Param::Positional(_) => self.sql.push('?'),
            }
            return;
        };

        let value = match param {
            Param::Named(name) => params.named(name),
            Param::Positional(index) => params.positional(*index),
        };
        match value {
            Some(Value::Array(items)) if items.is_empty() => self.sql.push_str("NULL"),
            Some(Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.bind(item.clone());
                }
            }
            Some(value) => self.bind(value.clone()),
            None => {
                self.missing.push(match param {
                    Param::Named(name) => format!(":{name}"),
                    Param::Positional(index) => format!("?{index}"),
                });
                self.sql.push_str("NULL");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn col_parses_qualifiers_and_wildcards() {
        assert!(matches!(col("*"), Expr::Wildcard(None)));
        assert!(matches!(col("f.*"), Expr::Wildcard(Some(ref q)) if q == "f"));
        let Expr::Column(c) = col("f.fileid") else {
            panic!("expected a column");
        };
        assert_eq!(c, ColumnRef::qualified("f", "fileid"));
        assert_eq!(c.to_string(), "f.fileid");
    }

    #[test]
    fn collects_qualifiers_through_nesting() {
        let expr = Expr::or([
            Expr::eq(col("f.storage"), lit(1)),
            Expr::not(Expr::is_null(Expr::cast(col("m.value"), "BIGINT"))),
            Expr::eq(col("bare"), lit(2)),
        ]);
        let qualifiers: Vec<&str> = expr.qualifiers().into_iter().collect();
        assert_eq!(qualifiers, vec!["f", "m"]);
        assert!(expr.mentions("m"));
        assert!(!expr.mentions("bare"));
    }

    #[test]
    fn flatten_and_keeps_or_whole() {
        let expr = Expr::and([
            Expr::eq(col("a.x"), lit(1)),
            Expr::and([Expr::eq(col("a.y"), lit(2)), Expr::eq(col("b.z"), lit(3))]),
            Expr::or([Expr::eq(col("a.x"), lit(4)), Expr::eq(col("b.z"), lit(5))]),
        ]);
        let parts = expr.flatten_and();
        assert_eq!(parts.len(), 4);
        assert!(matches!(parts[3], Expr::Or(_)));
    }

    #[test]
    fn detects_exact_is_null_shape() {
        let column = ColumnRef::qualified("m", "fileid");
        assert!(Expr::is_null(col("m.fileid")).is_null_check_of(&column));
        assert!(!Expr::is_not_null(col("m.fileid")).is_null_check_of(&column));
        assert!(!Expr::is_null(col("m.other")).is_null_check_of(&column));
    }

    #[test]
    fn renders_composites_with_parentheses() {
        let expr = Expr::and([
            Expr::eq(col("f.storage"), Expr::Param(Param::Named("storage".into()))),
            Expr::is_null(col("m.fileid")),
        ]);
        assert_eq!(
            expr.to_sql(SqlDialect::Sqlite),
            "(\"f\".\"storage\" = :storage) AND (\"m\".\"fileid\" IS NULL)"
        );
    }

    #[test]
    fn spots_positional_parameters() {
        let expr = Expr::in_list(col("f.id"), [Expr::Param(Param::Positional(0))]);
        assert!(expr.has_positional_param());
        assert!(!Expr::eq(col("f.id"), lit(1)).has_positional_param());
    }
}
