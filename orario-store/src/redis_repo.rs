use async_trait::async_trait;
use redis::AsyncCommands;

use orario_core::repository::SlotLockStore;
use orario_core::StoreError;

/// Slot locks over redis. The only primitives the engine needs are
/// `SET NX EX`, `GET` and `DEL`; everything stateful about a hold lives
/// in the record store.
#[derive(Clone)]
pub struct RedisLockStore {
    client: redis::Client,
}

impl RedisLockStore {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }
}

fn lock_err(err: redis::RedisError) -> StoreError {
    StoreError::Lock(err.to_string())
}

#[async_trait]
impl SlotLockStore for RedisLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<bool, StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(lock_err)?;

        // SET NX: only set if the key does not exist
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(lock_err)?;

        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(lock_err)?;
        conn.get(key).await.map_err(lock_err)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(lock_err)?;
        let _: () = conn.del(key).await.map_err(lock_err)?;
        Ok(())
    }
}
