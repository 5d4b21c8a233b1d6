//! Redis connection helpers
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::info;

use super::{DatabaseError, DatabaseResult};
use crate::retry::{retry, RetryPolicy};

/// Open a managed, auto-reconnecting connection
pub async fn connect_redis(url: &str) -> DatabaseResult<ConnectionManager> {
    let client = Client::open(url)?;
    let manager = client.get_connection_manager().await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Round-trip a PING
pub async fn ping_redis(connection: &mut ConnectionManager) -> DatabaseResult<()> {
    let reply: String = redis::cmd("PING").query_async(connection).await?;
    if reply != "PONG" {
        return Err(DatabaseError::Query(format!(
            "Unexpected PING reply: {}",
            reply
        )));
    }
    Ok(())
}

/// Block until Redis answers PING, then return the connection
pub async fn wait_for_redis(url: &str, policy: RetryPolicy) -> DatabaseResult<ConnectionManager> {
    retry(policy, "redis", move || async move {
        let mut connection = connect_redis(url).await?;
        ping_redis(&mut connection).await?;
        Ok::<_, DatabaseError>(connection)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let result = connect_redis("not-a-redis-url").await;
        assert!(matches!(result, Err(DatabaseError::Redis(_))));
    }

    #[tokio::test]
    async fn test_wait_for_redis_gives_up() {
        let policy = RetryPolicy::new(1, Duration::from_millis(1));
        let result = wait_for_redis("redis://127.0.0.1:1", policy).await;
        assert!(result.is_err());
    }
}
