//! Redis implementation of `fleetlb_types::ports::PersistenceAdapter`.

use async_trait::async_trait;
use fleetlb_reliability::{retry_with_backoff, RetryConfig};
use fleetlb_types::ports::{FleetSnapshot, PersistenceAdapter};
use fleetlb_types::{FleetError, FleetResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;

const SNAPSHOT_KEY: &str = "fleetlb:snapshot:v1";

pub struct RedisPersistence {
    conn: Mutex<ConnectionManager>,
}

impl RedisPersistence {
    /// Connects with a short exponential-backoff retry so a Redis instance
    /// that is still coming up during the load balancer's own startup
    /// doesn't fail the warm-start on the first refused connection.
    pub async fn connect(redis_url: &str) -> FleetResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| FleetError::internal(format!("invalid redis url: {e}")))?;
        let conn = retry_with_backoff(RetryConfig::default(), || client.get_connection_manager())
            .await
            .map_err(|e| FleetError::internal(format!("failed to connect to redis: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

#[async_trait]
impl PersistenceAdapter for RedisPersistence {
    async fn load_snapshot(&self) -> FleetResult<Option<FleetSnapshot>> {
        let mut conn = self.conn.lock().await;
        let raw: Option<String> = conn
            .get(SNAPSHOT_KEY)
            .await
            .map_err(|e| FleetError::internal(format!("redis GET failed: {e}")))?;
        match raw {
            Some(json) => {
                let snapshot = serde_json::from_str(&json)?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    async fn save_snapshot(&self, snapshot: &FleetSnapshot) -> FleetResult<()> {
        let json = serde_json::to_string(snapshot)?;
        let mut conn = self.conn.lock().await;
        let _: () = conn
            .set(SNAPSHOT_KEY, json)
            .await
            .map_err(|e| FleetError::internal(format!("redis SET failed: {e}")))?;
        Ok(())
    }

    async fn ping(&self) -> FleetResult<()> {
        let mut conn = self.conn.lock().await;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(|e| FleetError::internal(format!("redis PING failed: {e}")))?;
        Ok(())
    }
}

/// In-memory stand-in used when no `redis_url` is configured, or in tests.
/// Warm-start always returns `None`; mirroring is a no-op.
#[derive(Debug, Default)]
pub struct NullPersistence;

#[async_trait]
impl PersistenceAdapter for NullPersistence {
    async fn load_snapshot(&self) -> FleetResult<Option<FleetSnapshot>> {
        Ok(None)
    }

    async fn save_snapshot(&self, _snapshot: &FleetSnapshot) -> FleetResult<()> {
        Ok(())
    }

    async fn ping(&self) -> FleetResult<()> {
        Ok(())
    }
}
