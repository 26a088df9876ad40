use crate::db::KvStore;
use anyhow::Result;
use log::{error, info};
use std::sync::Arc;
use tokio::time::{interval, Duration};

/// Periodically deletes expired correlation entries
pub struct CorrelationCleanupService {
    kv: Arc<dyn KvStore>,
    check_interval_secs: u64,
}

impl CorrelationCleanupService {
    /// Create a new cleanup service; an interval of 0 disables it
    pub fn new(kv: Arc<dyn KvStore>, check_interval_secs: u64) -> Self {
        Self {
            kv,
            check_interval_secs,
        }
    }

    /// Start the cleanup service in the background
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.check_interval_secs == 0 {
            info!("Correlation cleanup service is disabled");
            return Ok(());
        }

        info!(
            "Starting correlation cleanup service with interval of {} seconds",
            self.check_interval_secs
        );

        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(self.check_interval_secs));

            loop {
                interval.tick().await;

                if let Err(e) = self.run_cleanup().await {
                    error!("Error running correlation cleanup: {}", e);
                }
            }
        });

        Ok(())
    }

    /// Run one purge pass
    pub async fn run_cleanup(&self) -> Result<u64> {
        let deleted = self.kv.purge_expired().await?;
        if deleted > 0 {
            info!("Cleaned up {} expired correlations", deleted);
        }
        Ok(deleted)
    }
}
