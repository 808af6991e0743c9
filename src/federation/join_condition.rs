// SPDX-License-Identifier: Apache-2.0

//! Join condition parsing
//!
//! Splits the `ON` expression of a cross-partition join into the single
//! column equality the merger aligns rows on, plus residual filters for
//! either side.

use qore_core::{EngineError, EngineResult};
use qore_query::{BinaryOperator, ColumnRef, Expr};

#[derive(Debug, Clone)]
pub struct JoinCondition {
    /// Column on the side the join starts from
    pub from_column: ColumnRef,
    /// Column on the joined table
    pub to_column: ColumnRef,
    /// Residual filters on the originating side
    pub from_conditions: Vec<Expr>,
    /// Residual filters on the joined side
    pub to_conditions: Vec<Expr>,
}

#[derive(Default)]
struct Parts {
    equality: Option<(ColumnRef, ColumnRef)>,
    from_conditions: Vec<Expr>,
    to_conditions: Vec<Expr>,
}

impl JoinCondition {
    /// Parses the condition of `from_alias JOIN table [alias] ON condition`.
    pub fn parse(
        condition: Option<&Expr>,
        table: &str,
        alias: Option<&str>,
        from_alias: &str,
    ) -> EngineResult<Self> {
        let condition = condition.ok_or_else(|| {
            EngineError::invalid_shape(format!(
                "Joining '{table}' across partitions requires a join condition"
            ))
        })?;
        let to_alias = alias.unwrap_or(table);

        let mut parts = Parts::default();
        collect(condition, to_alias, from_alias, &mut parts)?;

        let (from_column, to_column) = parts.equality.ok_or_else(|| {
            EngineError::invalid_shape(format!(
                "No join condition found between '{from_alias}' and '{to_alias}'"
            ))
        })?;

        Ok(Self {
            from_column,
            to_column,
            from_conditions: parts.from_conditions,
            to_conditions: parts.to_conditions,
        })
    }
}

fn collect(expr: &Expr, to_alias: &str, from_alias: &str, parts: &mut Parts) -> EngineResult<()> {
    if let Expr::And(children) = expr {
        for child in children {
            collect(child, to_alias, from_alias, parts)?;
        }
        return Ok(());
    }

    let qualifiers = expr.qualifiers();
    let spans_both = qualifiers.contains(to_alias) && qualifiers.contains(from_alias);
    if !spans_both {
        if qualifiers.contains(from_alias) {
            parts.from_conditions.push(expr.clone());
        } else {
            parts.to_conditions.push(expr.clone());
        }
        return Ok(());
    }

    let (from_column, to_column) = equality_columns(expr, to_alias, from_alias)?;
    if parts.equality.is_some() {
        return Err(EngineError::invalid_shape(format!(
            "Only one column equality is allowed when joining '{to_alias}' across partitions"
        )));
    }
    parts.equality = Some((from_column, to_column));
    Ok(())
}

fn equality_columns(
    expr: &Expr,
    to_alias: &str,
    from_alias: &str,
) -> EngineResult<(ColumnRef, ColumnRef)> {
    let Expr::Binary {
        left,
        op: BinaryOperator::Eq,
        right,
    } = expr
    else {
        return Err(EngineError::invalid_shape(format!(
            "Cross-partition join conditions must be an eq condition, got: {}",
            expr.to_sql(Default::default())
        )));
    };

    let (Some(left), Some(right)) = (left.as_column(), right.as_column()) else {
        return Err(EngineError::invalid_shape(
            "Cross-partition join conditions must compare two columns",
        ));
    };

    let qualifier = |c: &ColumnRef| c.qualifier.clone().unwrap_or_default();
    match (qualifier(left), qualifier(right)) {
        (l, r) if l == from_alias && r == to_alias => Ok((left.clone(), right.clone())),
        (l, r) if l == to_alias && r == from_alias => Ok((right.clone(), left.clone())),
        _ => Err(EngineError::invalid_shape(format!(
            "Join condition columns must explicitly refer by alias to '{from_alias}' and '{to_alias}'"
        ))),
    }
}
