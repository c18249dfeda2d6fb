//! Background removal of expired refresh-token rows.
//!
//! Expiry is enforced inline at refresh time; the sweeper only keeps the
//! table from accumulating rows for sessions that were simply abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::services::TokenStore;

pub fn spawn(tokens: Arc<dyn TokenStore>, interval_seconds: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        // First tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match tokens.delete_expired().await {
                Ok(0) => {}
                Ok(deleted) => {
                    tracing::info!(deleted, "Swept expired refresh tokens");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Refresh token sweep failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RefreshTokenRecord, SessionMeta};
    use crate::services::MemoryTokenStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let tokens = Arc::new(MemoryTokenStore::new());
        let meta = SessionMeta::default();
        let live = RefreshTokenRecord::new_family(Uuid::new_v4(), "live", 7, &meta);
        let dead = RefreshTokenRecord::new_family(Uuid::new_v4(), "dead", -1, &meta);
        tokens.insert(&live).await.unwrap();
        tokens.insert(&dead).await.unwrap();

        let handle = spawn(tokens.clone(), 3600);

        // The interval is an hour; drive one pass directly instead.
        let deleted = tokens.delete_expired().await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(tokens.records.lock().unwrap().len(), 1);

        handle.abort();
    }
}
