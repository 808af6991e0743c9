// QoreDB Shard - Cross-partition query federation and sharded key allocation
// Core library

pub mod config;
pub mod engine;
pub mod federation;
pub mod keygen;
pub mod metrics;
pub mod observability;

pub use config::ShardingConfig;
pub use engine::{
    PartitionConnections, ShardConfig, ShardConnectionManager, ShardConnections, ShardDefinition,
    StaticConnections,
};
pub use federation::{
    FederatedPlan, FederatedResult, PartitionSplit, PartitionedQueryBuilder, QueryTarget,
    ResultCursor, SplitJoinMode,
};
pub use keygen::{DistributedCache, KeyAllocator, MemoryCache, RedisCache};

pub use qore_core::{EngineError, EngineResult, QueryResult, Row, RowData, Value};
pub use qore_query::{col, lit, Expr, JoinKind, OrderDirection, QueryBuilder, SqlDialect};
