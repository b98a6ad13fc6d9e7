//! Redis adapters for job groups and the job queue.
//!
//! Key layout under a configurable prefix:
//!
//! - `<prefix>:group:<group_id>` JSON job group
//! - `<prefix>:job:<job_id>` hash with `state` and `spec`
//! - `<prefix>:queue:<probe>` list of queued jobs, consumed by workers
//! - `<prefix>:workers` set of live worker names
//! - `<prefix>:worker:<name>:queues` set of queues a worker consumes
//! - `<prefix>:revoke` channel announcing revoked jobs to workers
//!
//! Workers own the `state` field once they pick a job up.

use std::fmt;

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use serde::Serialize;
use tracing::{debug, info};
use warden_model::{GroupId, JobId};

use crate::error::{Result, WardenError};
use crate::ports::{
    BrokerInspector, GroupStore, JobBroker, JobGroupRecord, JobSpec, JobState, WorkerQueues,
};

/// Opens a managed connection that reconnects on failure.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    info!("Connecting to Redis at {}", redis_url);
    let client = redis::Client::open(redis_url)
        .map_err(|e| WardenError::StoreUnavailable(format!("Failed to create Redis client: {e}")))?;
    let conn = ConnectionManager::new(client)
        .await
        .map_err(|e| WardenError::StoreUnavailable(format!("Failed to connect to Redis: {e}")))?;
    Ok(conn)
}

#[derive(Clone)]
pub struct RedisGroupStore {
    conn: ConnectionManager,
    prefix: String,
}

impl fmt::Debug for RedisGroupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisGroupStore")
            .field("connection", &"ConnectionManager")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisGroupStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, id: GroupId) -> String {
        format!("{}:group:{}", self.prefix, id)
    }
}

#[async_trait]
impl GroupStore for RedisGroupStore {
    async fn save(&self, group: &JobGroupRecord) -> Result<()> {
        let json = serde_json::to_string(group)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.key(group.id), json).await?;
        debug!(group_id = %group.id, jobs = group.jobs.len(), "group saved");
        Ok(())
    }

    async fn restore(&self, id: GroupId) -> Result<Option<JobGroupRecord>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(self.key(id)).await?;
        data.map(|json| serde_json::from_str(&json).map_err(WardenError::from))
            .transpose()
    }

    async fn delete(&self, id: GroupId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(self.key(id)).await?;
        Ok(removed > 0)
    }
}

/// Queue entry pushed for workers.
#[derive(Debug, Serialize)]
struct QueuedJob<'a> {
    id: JobId,
    spec: &'a JobSpec,
}

const REVOKE_IF_PENDING: &str = r#"
    local state = redis.call('HGET', KEYS[1], 'state')
    if state == 'pending' then
        redis.call('HSET', KEYS[1], 'state', 'revoked')
        return 1
    end
    return 0
"#;

/// Job broker over Redis lists, hashes and pub/sub.
#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
    prefix: String,
}

impl fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBroker")
            .field("connection", &"ConnectionManager")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl RedisBroker {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn job_key(&self, id: JobId) -> String {
        format!("{}:job:{}", self.prefix, id)
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}:queue:{}", self.prefix, queue)
    }

    fn workers_key(&self) -> String {
        format!("{}:workers", self.prefix)
    }

    fn worker_queues_key(&self, worker: &str) -> String {
        format!("{}:worker:{}:queues", self.prefix, worker)
    }

    fn revoke_channel(&self) -> String {
        format!("{}:revoke", self.prefix)
    }
}

#[async_trait]
impl JobBroker for RedisBroker {
    async fn send_job(&self, spec: JobSpec) -> Result<JobId> {
        let id = JobId::new();
        let spec_json = serde_json::to_string(&spec)?;
        let entry = serde_json::to_string(&QueuedJob { id, spec: &spec })?;

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset_multiple(
                self.job_key(id),
                &[("state", JobState::Pending.as_str()), ("spec", spec_json.as_str())],
            )
            .ignore()
            .rpush(self.queue_key(&spec.queue), entry)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job = %id, queue = %spec.queue, "job queued");
        Ok(id)
    }

    async fn job_states(&self, jobs: &[JobId]) -> Result<Vec<JobState>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for job in jobs {
            pipe.hget(self.job_key(*job), "state");
        }
        let mut conn = self.conn.clone();
        let states: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

        states
            .into_iter()
            .map(|state| state.map_or(Ok(JobState::Pending), |s| s.parse()))
            .collect()
    }

    async fn revoke(&self, job: JobId, terminate: bool) -> Result<()> {
        let mut conn = self.conn.clone();
        let revoked: i64 = Script::new(REVOKE_IF_PENDING)
            .key(self.job_key(job))
            .invoke_async(&mut conn)
            .await?;
        if revoked == 1 {
            let notice = format!("{job}:{}", if terminate { "terminate" } else { "skip" });
            conn.publish::<_, _, ()>(self.revoke_channel(), notice).await?;
        }
        debug!(%job, terminate, revoked = revoked == 1, "job revoke requested");
        Ok(())
    }
}

#[async_trait]
impl BrokerInspector for RedisBroker {
    async fn active_queues(&self) -> Result<Vec<WorkerQueues>> {
        let mut conn = self.conn.clone();
        let mut workers: Vec<String> = conn.smembers(self.workers_key()).await?;
        workers.sort();

        let mut active = Vec::with_capacity(workers.len());
        for worker in workers {
            let mut queues: Vec<String> = conn.smembers(self.worker_queues_key(&worker)).await?;
            queues.sort();
            active.push(WorkerQueues { worker, queues });
        }
        Ok(active)
    }
}
