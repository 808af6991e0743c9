// SPDX-License-Identifier: Apache-2.0

//! Partitioned query builder
//!
//! Wraps a [`QueryBuilder`] and splits joins that cross a partition boundary
//! into separate queries, one per partition, that are merged back after
//! execution. With no partitions registered it behaves exactly like the
//! wrapped builder.
//!
//! Building happens in two phases. Calls accumulate selects, joins and
//! predicates; [`PartitionedQueryBuilder::plan`] then resolves them into an
//! immutable [`FederatedPlan`] without touching the builder, so a query can
//! be rendered or executed any number of times.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tracing::instrument;

use qore_core::{EngineError, EngineResult, Value};
use qore_query::{
    AsInnerBuilder, ColumnRef, Expr, JoinKind, OrderDirection, Parameters, QueryBuilder,
    SelectItem, SqlDialect,
};

use crate::engine::PartitionConnections;

use super::join_condition::JoinCondition;
use super::partition::PartitionSplit;
use super::plan::FederatedPlan;
use super::predicate::{PredicateRouter, Route};
use super::result::FederatedResult;
use super::split::{PendingSelect, QueryTarget, SplitJoinMode, SplitQuery};

const SYNTHETIC_PREFIX: &str = "from_";

pub struct PartitionedQueryBuilder {
    main: QueryBuilder,
    connections: Arc<dyn PartitionConnections>,
    partitions: Vec<PartitionSplit>,
    /// Insertion ordered; merge order follows join order
    splits: Vec<SplitQuery>,
    selects: Vec<PendingSelect>,
    /// Join columns the merger needs, selected unless already covered
    join_columns: Vec<ColumnRef>,
    main_partition: Option<String>,
    has_positional_parameter: bool,
    where_issued: bool,
}

impl PartitionedQueryBuilder {
    pub fn new(connections: Arc<dyn PartitionConnections>) -> Self {
        Self::with_dialect(connections, SqlDialect::default())
    }

    /// `dialect` is only used by [`get_sql`](Self::get_sql); execution
    /// compiles for each target's own dialect.
    pub fn with_dialect(connections: Arc<dyn PartitionConnections>, dialect: SqlDialect) -> Self {
        Self {
            main: QueryBuilder::new(dialect),
            connections,
            partitions: Vec::new(),
            splits: Vec::new(),
            selects: Vec::new(),
            join_columns: Vec::new(),
            main_partition: None,
            has_positional_parameter: false,
            where_issued: false,
        }
    }

    fn new_query(&self) -> QueryBuilder {
        QueryBuilder::new(self.main.dialect())
    }

    // ==================== Partitions ====================

    pub fn add_partition(&mut self, partition: PartitionSplit) -> EngineResult<&mut Self> {
        if self.partition_index(partition.name()).is_some() {
            return Err(EngineError::invalid_shape(format!(
                "Partition '{}' is already registered",
                partition.name()
            )));
        }
        for table in partition.tables() {
            if let Some(existing) = self.partitions.iter().find(|p| p.contains_table(table)) {
                return Err(EngineError::invalid_shape(format!(
                    "Table '{}' already belongs to partition '{}'",
                    table,
                    existing.name()
                )));
            }
        }
        self.partitions.push(partition);
        Ok(self)
    }

    /// Number of queries this logical query executes as.
    pub fn get_partition_count(&self) -> usize {
        self.splits.len() + 1
    }

    pub fn split_queries(&self) -> &[SplitQuery] {
        &self.splits
    }

    pub fn partitions(&self) -> &[PartitionSplit] {
        &self.partitions
    }

    fn partition_index(&self, name: &str) -> Option<usize> {
        self.partitions.iter().position(|p| p.name() == name)
    }

    /// Partition owning a table name or alias.
    fn partition_of(&self, reference: &str) -> Option<usize> {
        self.partitions
            .iter()
            .position(|p| p.contains_reference(reference))
    }

    fn split_index(&self, name: &str) -> Option<usize> {
        self.splits.iter().position(|s| s.name == name)
    }

    fn main_partition_index(&self) -> Option<usize> {
        self.main_partition
            .as_deref()
            .and_then(|name| self.partition_index(name))
    }

    fn main_target(&self) -> QueryTarget {
        match &self.main_partition {
            Some(name) => QueryTarget::Partition(name.clone()),
            None => QueryTarget::Default,
        }
    }

    fn router(&self) -> PredicateRouter<'_> {
        PredicateRouter {
            partitions: &self.partitions,
            main_partition: self.main_partition.as_deref(),
            splits: &self.splits,
        }
    }

    // ==================== Selects ====================

    pub fn select<I, S>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.selects.clear();
        self.add_select(items)
    }

    pub fn add_select<I, S>(&mut self, items: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        self.selects
            .extend(items.into_iter().map(|item| PendingSelect::new(item.into())));
        self
    }

    pub fn select_alias(&mut self, item: impl Into<SelectItem>, alias: &str) -> &mut Self {
        let mut item = item.into();
        item.alias = Some(alias.to_string());
        self.selects.push(PendingSelect::new(item));
        self
    }

    fn ensure_select(&mut self, column: &ColumnRef) {
        if !self.join_columns.contains(column) {
            self.join_columns.push(column.clone());
        }
    }

    // ==================== From / joins ====================

    fn claim_main_table(&mut self, table: &str, alias: Option<&str>) {
        if let Some(index) = self.partition_of(table) {
            let partition = &mut self.partitions[index];
            if let Some(alias) = alias {
                partition.add_alias(table, alias);
            }
            self.main_partition = Some(partition.name().to_string());
        }
    }

    pub fn from(&mut self, table: &str, alias: Option<&str>) -> &mut Self {
        self.claim_main_table(table, alias);
        self.main.from(table, alias);
        self
    }

    pub fn join(
        &mut self,
        kind: JoinKind,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> EngineResult<&mut Self> {
        if self.partitions.is_empty() {
            self.main.join(kind, from_alias, table, alias, condition);
            return Ok(self);
        }

        let mode = match kind {
            JoinKind::Inner => SplitJoinMode::Inner,
            JoinKind::Left => SplitJoinMode::Left,
            JoinKind::Right => {
                return Err(EngineError::invalid_shape(
                    "Right joins are not supported on partitioned queries",
                ))
            }
        };
        if self.where_issued {
            return Err(EngineError::invalid_shape(
                "Joins on a partitioned query must be added before any where clause",
            ));
        }

        let partition = self.partition_of(table);
        let from_partition = self.partition_of(from_alias);
        let main_partition = self.main_partition_index();

        match (partition, from_partition) {
            (Some(target), _) if Some(target) != main_partition => {
                self.join_into_partition(target, mode, from_alias, table, alias, condition)?;
            }
            (_, Some(origin)) if Some(origin) != partition => {
                self.join_out_of_partition(origin, mode, from_alias, table, alias, condition)?;
            }
            _ => {
                self.main.join(kind, from_alias, table, alias, condition);
            }
        }
        Ok(self)
    }

    pub fn inner_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> EngineResult<&mut Self> {
        self.join(JoinKind::Inner, from_alias, table, alias, condition)
    }

    pub fn left_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> EngineResult<&mut Self> {
        self.join(JoinKind::Left, from_alias, table, alias, condition)
    }

    pub fn right_join(
        &mut self,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> EngineResult<&mut Self> {
        self.join(JoinKind::Right, from_alias, table, alias, condition)
    }

    /// Join from the main query into a table of another partition.
    fn join_into_partition(
        &mut self,
        partition: usize,
        mode: SplitJoinMode,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> EngineResult<()> {
        let name = self.partitions[partition].name().to_string();

        if let Some(split) = self.split_index(&name) {
            if !self.partitions[partition].contains_reference(from_alias) {
                return Err(EngineError::invalid_shape(format!(
                    "Can't join across partition boundaries more than once (partition '{name}')"
                )));
            }
            if let Some(alias) = alias {
                self.partitions[partition].add_alias(table, alias);
            }
            self.splits[split]
                .query
                .inner_join(from_alias, table, alias, condition);
            return Ok(());
        }

        let parsed = JoinCondition::parse(condition.as_ref(), table, alias, from_alias)?;
        if let Some(alias) = alias {
            self.partitions[partition].add_alias(table, alias);
        }

        tracing::debug!(
            partition = %name,
            from = %parsed.from_column,
            to = %parsed.to_column,
            ?mode,
            "Splitting join into partition"
        );
        let target = QueryTarget::Partition(name.clone());
        self.push_split(name, target, mode, table, alias, parsed)
    }

    /// Join from a partition table back to a table of the main database.
    fn join_out_of_partition(
        &mut self,
        origin: usize,
        mode: SplitJoinMode,
        from_alias: &str,
        table: &str,
        alias: Option<&str>,
        condition: Option<Expr>,
    ) -> EngineResult<()> {
        let origin_name = self.partitions[origin].name();
        let name = if origin_name.starts_with(SYNTHETIC_PREFIX) {
            origin_name.to_string()
        } else {
            format!("{SYNTHETIC_PREFIX}{origin_name}")
        };

        // the split runs on the default database, which doesn't hold
        // tables of other partitions
        if let Some(owner) = self.partition_of(table) {
            let owner = self.partitions[owner].name();
            if owner != name {
                return Err(EngineError::invalid_shape(format!(
                    "Table '{table}' belongs to partition '{owner}' and can't be joined from partition '{}'",
                    self.partitions[origin].name()
                )));
            }
        }

        if let Some(split) = self.split_index(&name) {
            let synthetic = self
                .partition_index(&name)
                .ok_or_else(|| EngineError::internal(format!("Partition '{name}' has no descriptor")))?;
            if !self.partitions[synthetic].contains_reference(from_alias) {
                return Err(EngineError::invalid_shape(format!(
                    "Can't join across partition boundaries more than once (partition '{name}')"
                )));
            }
            let partition = &mut self.partitions[synthetic];
            partition.add_table(table);
            if let Some(alias) = alias {
                partition.add_alias(table, alias);
            }
            self.splits[split]
                .query
                .inner_join(from_alias, table, alias, condition);
            return Ok(());
        }

        let parsed = JoinCondition::parse(condition.as_ref(), table, alias, from_alias)?;
        let mut partition = PartitionSplit::new(name.clone(), [table]);
        if let Some(alias) = alias {
            partition.add_alias(table, alias);
        }
        self.partitions.push(partition);

        tracing::debug!(
            partition = %name,
            from = %parsed.from_column,
            to = %parsed.to_column,
            ?mode,
            "Splitting join back into the main database"
        );
        self.push_split(name, QueryTarget::Default, mode, table, alias, parsed)
    }

    fn push_split(
        &mut self,
        name: String,
        target: QueryTarget,
        mode: SplitJoinMode,
        table: &str,
        alias: Option<&str>,
        parsed: JoinCondition,
    ) -> EngineResult<()> {
        let mut query = self.new_query();
        query.from(table, alias);
        for condition in parsed.to_conditions {
            query.and_where(condition);
        }

        self.ensure_select(&parsed.from_column);
        self.ensure_select(&parsed.to_column);
        self.splits.push(SplitQuery {
            name,
            query,
            join_from: parsed.from_column,
            join_to: parsed.to_column,
            mode,
            target,
        });

        for condition in parsed.from_conditions {
            self.route_predicate(condition)?;
        }
        Ok(())
    }

    // ==================== Predicates ====================

    fn route_predicate(&mut self, predicate: Expr) -> EngineResult<()> {
        if predicate.has_positional_param() {
            self.has_positional_parameter = true;
        }

        match self.router().route(&predicate)? {
            Route::Main => {
                self.main.and_where(predicate);
            }
            Route::Split(index) => {
                let split = &mut self.splits[index];
                if split.mode == SplitJoinMode::Left {
                    if predicate.is_null_check_of(&split.join_to) {
                        split.mode = SplitJoinMode::LeftNull;
                        return Ok(());
                    }
                    split.mode = SplitJoinMode::Inner;
                }
                split.query.and_where(predicate);
            }
        }
        Ok(())
    }

    /// Without partitions this replaces the WHERE clause. With partitions
    /// registered it adds to it like [`and_where`](Self::and_where), since
    /// join conditions already live there.
    pub fn where_(&mut self, predicate: Expr) -> EngineResult<&mut Self> {
        if self.partitions.is_empty() {
            self.has_positional_parameter |= predicate.has_positional_param();
            self.main.where_(predicate);
            return Ok(self);
        }
        self.and_where(predicate)
    }

    pub fn and_where(&mut self, predicate: Expr) -> EngineResult<&mut Self> {
        if self.partitions.is_empty() {
            self.has_positional_parameter |= predicate.has_positional_param();
            self.main.and_where(predicate);
            return Ok(self);
        }

        self.where_issued = true;
        for conjunct in predicate.flatten_and() {
            self.route_predicate(conjunct)?;
        }
        Ok(self)
    }

    pub fn or_where(&mut self, predicate: Expr) -> EngineResult<&mut Self> {
        if !self.splits.is_empty() {
            return Err(EngineError::invalid_shape(
                "or_where is not supported once a query is split across partitions",
            ));
        }
        self.has_positional_parameter |= predicate.has_positional_param();
        if !self.partitions.is_empty() {
            self.where_issued = true;
        }
        self.main.or_where(predicate);
        Ok(self)
    }

    // ==================== Ordering / grouping / paging ====================

    pub fn order_by(&mut self, expr: Expr, direction: OrderDirection) -> &mut Self {
        self.main.order_by(expr, direction);
        self
    }

    pub fn add_order_by(&mut self, expr: Expr, direction: OrderDirection) -> &mut Self {
        self.main.add_order_by(expr, direction);
        self
    }

    pub fn group_by(&mut self, expr: Expr) -> &mut Self {
        self.main.group_by(expr);
        self
    }

    pub fn add_group_by(&mut self, expr: Expr) -> &mut Self {
        self.main.add_group_by(expr);
        self
    }

    pub fn set_max_results(&mut self, limit: Option<u64>) -> &mut Self {
        self.main.set_max_results(limit);
        self
    }

    pub fn set_first_result(&mut self, offset: u64) -> &mut Self {
        self.main.set_first_result(offset);
        self
    }

    // ==================== Parameters ====================

    pub fn create_named_parameter(&mut self, value: impl Into<Value>) -> Expr {
        self.main.create_named_parameter(value)
    }

    pub fn create_positional_parameter(&mut self, value: impl Into<Value>) -> Expr {
        self.has_positional_parameter = true;
        self.main.create_positional_parameter(value)
    }

    pub fn set_parameter(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.main.set_parameter(name, value);
        self
    }

    pub fn set_parameters<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.main.set_parameters(values);
        self
    }

    pub fn parameters(&self) -> &Parameters {
        self.main.parameters()
    }

    // ==================== Write statements ====================

    pub fn update(&mut self, table: &str) -> &mut Self {
        self.claim_main_table(table, None);
        self.main.update(table);
        self
    }

    pub fn set(&mut self, column: &str, value: Expr) -> &mut Self {
        self.main.set(column, value);
        self
    }

    pub fn insert(&mut self, table: &str) -> &mut Self {
        self.claim_main_table(table, None);
        self.main.insert(table);
        self
    }

    pub fn set_value(&mut self, column: &str, value: Expr) -> &mut Self {
        self.main.set_value(column, value);
        self
    }

    pub fn delete(&mut self, table: &str) -> &mut Self {
        self.claim_main_table(table, None);
        self.main.delete(table);
        self
    }

    // ==================== Resolution ====================

    /// Materializes buffered selects into copies of the main and split
    /// queries and shares the main parameters with every split.
    fn resolve(&self) -> (QueryBuilder, Vec<SplitQuery>) {
        let mut main = self.main.clone();
        let mut splits = self.splits.clone();
        let router = self.router();

        let required = self
            .join_columns
            .iter()
            .filter(|column| !self.selects.iter().any(|s| s.covers(column)))
            .map(|column| SelectItem::new(Expr::Column(column.clone())));
        let items = self.selects.iter().map(|s| s.item.clone()).chain(required);

        let mut main_items = Vec::new();
        for item in items {
            if item.is_wildcard() && item.expr.qualifiers().is_empty() {
                for split in &mut splits {
                    split.query.add_select([item.clone()]);
                }
                main_items.push(item);
                continue;
            }

            let routes = router.routes(&item.expr);
            match routes.iter().next() {
                Some(Route::Split(index)) if routes.len() == 1 => {
                    splits[*index].query.add_select([item]);
                }
                _ => main_items.push(item),
            }
        }
        if !main_items.is_empty() {
            main.add_select(main_items);
        }

        let shared: Vec<(String, Value)> = main
            .parameters()
            .iter_named()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        for split in &mut splits {
            split.query.set_parameters(shared.iter().cloned());
        }

        (main, splits)
    }

    fn reject_split_references(&self, exprs: &[&Expr], clause: &str) -> EngineResult<()> {
        let router = self.router();
        for expr in exprs {
            for route in router.routes(expr) {
                if let Route::Split(index) = route {
                    return Err(EngineError::invalid_shape(format!(
                        "Can't {clause} columns of partition '{}'",
                        self.splits[index].name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves the accumulated calls into an executable plan.
    pub fn plan(&self) -> EngineResult<FederatedPlan> {
        let (main, splits) = self.resolve();

        if !splits.is_empty() {
            if self.has_positional_parameter || main.parameters().has_positional() {
                return Err(EngineError::invalid_shape(
                    "Positional parameters can't be used in a query split across partitions, use named parameters",
                ));
            }

            let order: Vec<&Expr> = main.order_by_items().iter().map(|(e, _)| e).collect();
            self.reject_split_references(&order, "order by")?;
            let group: Vec<&Expr> = main.group_by_items().iter().collect();
            self.reject_split_references(&group, "group by")?;

            let paged = main.max_results().is_some() || main.first_result().is_some();
            if paged && splits.iter().any(|s| s.mode != SplitJoinMode::Left) {
                return Err(EngineError::invalid_shape(
                    "Limit and offset are only supported when every partition is left joined",
                ));
            }
        }

        Ok(FederatedPlan {
            main,
            main_target: self.main_target(),
            splits,
        })
    }

    /// SQL of the main query.
    pub fn get_sql(&self) -> EngineResult<String> {
        Ok(self.plan()?.main.to_sql())
    }

    /// Resolves the plan now; queries run on the first fetch.
    pub fn execute_query(&self) -> EngineResult<FederatedResult> {
        let plan = self.plan()?;
        Ok(FederatedResult::new(plan, Arc::clone(&self.connections)))
    }

    #[instrument(skip(self), fields(target = %self.main_target()))]
    pub async fn execute_statement(&self) -> EngineResult<u64> {
        let plan = self.plan()?;
        if plan.is_split() {
            return Err(EngineError::invalid_shape(
                "Write statements can't be federated across partitions",
            ));
        }
        let executor = self.connections.executor(&plan.main_target)?;
        executor.execute_builder(&plan.main).await
    }
}

impl fmt::Debug for PartitionedQueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionedQueryBuilder")
            .field("main", &self.main)
            .field("main_partition", &self.main_partition)
            .field("partitions", &self.partitions)
            .field("splits", &self.splits)
            .finish_non_exhaustive()
    }
}

impl AsInnerBuilder for PartitionedQueryBuilder {
    fn as_inner_builder(&self) -> Cow<'_, QueryBuilder> {
        Cow::Owned(self.resolve().0)
    }
}
