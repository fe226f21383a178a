//! Redis-backed store implementation
//!
//! Connection pooling goes through `redis::aio::ConnectionManager`, which
//! transparently reconnects on connection loss. Batched writes use a
//! pipeline; a pipeline is issue-batched, not a transaction, matching the
//! store contract.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;

use crate::store::adapter::{StoreAdapter, StoreCmd, StoreError, StoreResult};

/// `StoreAdapter` over a Redis instance
#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to the store at `url` (e.g. "redis://127.0.0.1:6379").
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Protocol(format!("invalid store url: {e}")))?;
        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        Ok(Self { conn_manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }
}

fn map_redis_error(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_refusal() || e.is_connection_dropped()
    {
        StoreError::Transient(e.to_string())
    } else {
        StoreError::Protocol(e.to_string())
    }
}

fn append_cmd(pipe: &mut redis::Pipeline, cmd: &StoreCmd) {
    match cmd {
        StoreCmd::Set { key, value, ttl } => {
            let mut set = redis::cmd("SET");
            set.arg(key).arg(value.as_slice());
            if let Some(ttl) = ttl {
                set.arg("PX").arg(ttl.as_millis() as u64);
            }
            pipe.add_command(set);
        }
        StoreCmd::Del { key } => {
            pipe.del(key);
        }
        StoreCmd::Expire { key, ttl } => {
            pipe.pexpire(key, ttl.as_millis() as i64);
        }
        StoreCmd::SAdd { key, members } => {
            pipe.sadd(key, members.as_slice());
        }
        StoreCmd::SRem { key, members } => {
            pipe.srem(key, members.as_slice());
        }
        StoreCmd::ZAdd { key, entries } => {
            let mut zadd = redis::cmd("ZADD");
            zadd.arg(key);
            for (score, member) in entries {
                zadd.arg(*score).arg(member);
            }
            pipe.add_command(zadd);
        }
        StoreCmd::ZRem { key, members } => {
            pipe.zrem(key, members.as_slice());
        }
    }
}

#[async_trait]
impl StoreAdapter for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)?;
        value.ok_or(StoreError::Missing)
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis() as u64);
        }
        cmd.query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let applied: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis() as i64)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)?;
        Ok(applied == 1)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<()> {
        redis::cmd("SADD")
            .arg(key)
            .arg(members)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<()> {
        redis::cmd("SREM")
            .arg(key)
            .arg(members)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn srandmember(&self, key: &str, count: i64) -> StoreResult<Vec<String>> {
        if count <= 0 {
            return Ok(Vec::new());
        }
        redis::cmd("SRANDMEMBER")
            .arg(key)
            .arg(count)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn zadd(&self, key: &str, entries: &[(f64, String)]) -> StoreResult<()> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for (score, member) in entries {
            cmd.arg(*score).arg(member);
        }
        cmd.query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg(max)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn zrem(&self, key: &str, members: &[String]) -> StoreResult<()> {
        redis::cmd("ZREM")
            .arg(key)
            .arg(members)
            .query_async(&mut self.conn())
            .await
            .map_err(map_redis_error)
    }

    async fn do_multi(&self, cmds: Vec<StoreCmd>) -> StoreResult<Vec<StoreResult<()>>> {
        if cmds.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for cmd in &cmds {
            append_cmd(&mut pipe, cmd);
            pipe.ignore();
        }

        // The driver surfaces pipeline failures for the batch as a whole, so
        // a failed batch reports the same error for every sub-command.
        match pipe
            .query_async::<_, redis::Value>(&mut self.conn())
            .await
            .map_err(map_redis_error)
        {
            Ok(_) => Ok(cmds.iter().map(|_| Ok(())).collect()),
            Err(StoreError::Transient(msg)) => Ok(cmds
                .iter()
                .map(|_| Err(StoreError::Transient(msg.clone())))
                .collect()),
            Err(StoreError::Protocol(msg)) => Ok(cmds
                .iter()
                .map(|_| Err(StoreError::Protocol(msg.clone())))
                .collect()),
            Err(StoreError::Missing) => Err(StoreError::Protocol(
                "unexpected nil reply for pipeline".to_string(),
            )),
        }
    }
}
