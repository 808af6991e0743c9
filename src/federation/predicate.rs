// SPDX-License-Identifier: Apache-2.0

//! Predicate routing
//!
//! Decides which query a WHERE conjunct belongs to from the qualifiers it
//! references. The main partition and partitions that were never split
//! count as the main query.

use std::collections::BTreeSet;

use qore_core::{EngineError, EngineResult};
use qore_query::Expr;

use super::partition::PartitionSplit;
use super::split::SplitQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Route {
    Main,
    /// Index into the split queries
    Split(usize),
}

pub(crate) struct PredicateRouter<'a> {
    pub(crate) partitions: &'a [PartitionSplit],
    pub(crate) main_partition: Option<&'a str>,
    pub(crate) splits: &'a [SplitQuery],
}

impl PredicateRouter<'_> {
    /// Route of a single table name or alias.
    pub(crate) fn route_reference(&self, reference: &str) -> Route {
        let Some(partition) = self
            .partitions
            .iter()
            .find(|p| p.contains_reference(reference))
        else {
            return Route::Main;
        };
        if Some(partition.name()) == self.main_partition {
            return Route::Main;
        }
        self.splits
            .iter()
            .position(|s| s.name == partition.name())
            .map_or(Route::Main, Route::Split)
    }

    /// Every distinct route the expression's qualifiers resolve to.
    pub(crate) fn routes(&self, expr: &Expr) -> BTreeSet<Route> {
        expr.qualifiers()
            .into_iter()
            .map(|q| self.route_reference(q))
            .collect()
    }

    /// The single query `predicate` can run in.
    pub(crate) fn route(&self, predicate: &Expr) -> EngineResult<Route> {
        let routes = self.routes(predicate);
        let mut iter = routes.iter();
        match (iter.next(), iter.next()) {
            (None, _) => Ok(Route::Main),
            (Some(route), None) => Ok(*route),
            (Some(_), Some(_)) => Err(EngineError::invalid_shape(format!(
                "Predicate mixes columns from more than one partition: {}",
                predicate.to_sql(Default::default())
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::split::{QueryTarget, SplitJoinMode};
    use qore_query::{col, lit, ColumnRef, QueryBuilder};

    fn fixture() -> (Vec<PartitionSplit>, Vec<SplitQuery>) {
        let mut metadata = PartitionSplit::new("metadata", ["file_metadata"]);
        metadata.add_alias("file_metadata", "m");
        let mut unjoined = PartitionSplit::new("shares", ["share"]);
        unjoined.add_alias("share", "s");
        let split = SplitQuery {
            name: "metadata".into(),
            query: QueryBuilder::default(),
            join_from: ColumnRef::qualified("f", "fileid"),
            join_to: ColumnRef::qualified("m", "fileid"),
            mode: SplitJoinMode::Inner,
            target: QueryTarget::Partition("metadata".into()),
        };
        (vec![metadata, unjoined], vec![split])
    }

    #[test]
    fn routes_by_qualifier() {
        let (partitions, splits) = fixture();
        let router = PredicateRouter {
            partitions: &partitions,
            main_partition: None,
            splits: &splits,
        };
        assert_eq!(router.route(&Expr::eq(col("m.name"), lit("a"))).unwrap(), Route::Split(0));
        assert_eq!(router.route(&Expr::eq(col("f.size"), lit(1))).unwrap(), Route::Main);
        // partitions without a split query count as main
        assert_eq!(
            router
                .route(&Expr::and([Expr::eq(col("s.id"), lit(1)), Expr::eq(col("f.size"), lit(1))]))
                .unwrap(),
            Route::Main
        );
        assert_eq!(router.route(&Expr::raw("m.name = 'a'")).unwrap(), Route::Main);
    }

    #[test]
    fn rejects_cross_partition_or() {
        let (partitions, splits) = fixture();
        let router = PredicateRouter {
            partitions: &partitions,
            main_partition: None,
            splits: &splits,
        };
        let mixed = Expr::or([Expr::eq(col("m.name"), lit("a")), Expr::eq(col("f.size"), lit(1))]);
        let err = router.route(&mixed).unwrap_err();
        assert!(matches!(err, EngineError::InvalidQueryShape { .. }));
    }

    #[test]
    fn main_partition_routes_to_main() {
        let (partitions, splits) = fixture();
        let router = PredicateRouter {
            partitions: &partitions,
            main_partition: Some("metadata"),
            splits: &splits,
        };
        assert_eq!(router.route(&Expr::eq(col("m.name"), lit("a"))).unwrap(), Route::Main);
    }
}
