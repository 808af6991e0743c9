// SPDX-License-Identifier: Apache-2.0

//! Redis cache
//!
//! `add` and `inc` map onto `SET NX` and `INCRBY`. The compare operations
//! run as Lua scripts so that the read and the write happen atomically on
//! the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use qore_core::{EngineError, EngineResult};

use super::cache::{CacheCapabilities, DistributedCache};
use crate::observability::Sensitive;

const COMPARE_AND_SWAP: &str = r#"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
    return 0
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl > 0 then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ttl)
else
    redis.call('SET', KEYS[1], ARGV[2])
end
return 1
"#;

const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const COMPARE_NOT_AND_DELETE: &str = r#"
local value = redis.call('GET', KEYS[1])
if value and value ~= ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

pub struct RedisCache {
    connection: ConnectionManager,
    prefix: String,
    cas_script: Script,
    cad_script: Script,
    ncad_script: Script,
}

impl RedisCache {
    /// Connects to `url` and checks the server answers `PING`.
    pub async fn connect(url: &Sensitive<String>, prefix: impl Into<String>) -> EngineResult<Self> {
        let client = redis::Client::open(url.expose().as_str())
            .map_err(|e| EngineError::connection_failed(e.to_string()))?;
        let mut connection = client
            .get_connection_manager()
            .await
            .map_err(|e| EngineError::connection_failed(format!("Redis connection failed: {e}")))?;

        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .map_err(|e| EngineError::connection_failed(format!("PING failed: {e}")))?;

        tracing::info!(url = %url.redacted_url(), "Connected to Redis cache");
        Ok(Self {
            connection,
            prefix: prefix.into(),
            cas_script: Script::new(COMPARE_AND_SWAP),
            cad_script: Script::new(COMPARE_AND_DELETE),
            ncad_script: Script::new(COMPARE_NOT_AND_DELETE),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Removes `key`. Used to reset state in tests and tooling.
    pub async fn delete(&self, key: &str) -> EngineResult<()> {
        let mut conn = self.connection.clone();
        redis::cmd("DEL")
            .arg(self.key(key))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| map_redis_error("DEL", e))?;
        Ok(())
    }

    async fn run_script(&self, script: &Script, key: &str, args: &[&str]) -> EngineResult<bool> {
        let mut conn = self.connection.clone();
        let mut invocation = script.key(self.key(key));
        for arg in args {
            invocation.arg(*arg);
        }
        let changed: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("EVALSHA", e))?;
        Ok(changed > 0)
    }
}

fn map_redis_error(op: &str, e: redis::RedisError) -> EngineError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        EngineError::connection_failed(format!("Redis {op} failed: {e}"))
    } else {
        EngineError::cache(format!("Redis {op} failed: {e}"))
    }
}

#[async_trait]
impl DistributedCache for RedisCache {
    fn capabilities(&self) -> CacheCapabilities {
        CacheCapabilities {
            atomic: true,
            ttl: true,
            distributed: true,
        }
    }

    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> EngineResult<bool> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        let stored: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("SET NX", e))?;
        Ok(stored.is_some())
    }

    async fn inc(&self, key: &str, step: i64) -> EngineResult<Option<i64>> {
        let mut conn = self.connection.clone();
        match redis::cmd("INCRBY")
            .arg(self.key(key))
            .arg(step)
            .query_async::<i64>(&mut conn)
            .await
        {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == redis::ErrorKind::ResponseError
                && e.to_string().contains("not an integer") =>
            {
                Ok(None)
            }
            Err(e) => Err(map_redis_error("INCRBY", e)),
        }
    }

    async fn cas(&self, key: &str, old: &str, new: &str) -> EngineResult<bool> {
        self.run_script(&self.cas_script, key, &[old, new]).await
    }

    async fn cad(&self, key: &str, old: &str) -> EngineResult<bool> {
        self.run_script(&self.cad_script, key, &[old]).await
    }

    async fn ncad(&self, key: &str, old: &str) -> EngineResult<bool> {
        self.run_script(&self.ncad_script, key, &[old]).await
    }

    async fn set_ttl(&self, key: &str, ttl: Duration) -> EngineResult<()> {
        let mut conn = self.connection.clone();
        redis::cmd("EXPIRE")
            .arg(self.key(key))
            .arg(ttl.as_secs().max(1))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| map_redis_error("EXPIRE", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(self.key(key))
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| map_redis_error("GET", e))
    }
}
