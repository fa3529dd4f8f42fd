//! Periodic removal of expired authorization requests, codes and refresh
//! tokens.

use std::sync::Arc;
use std::time::Duration;

use crate::storage::{DBClient, StorageError};

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub auth_requests: u64,
    pub authorization_codes: u64,
    pub refresh_tokens: u64,
}

impl SweepReport {
    /// Total rows removed.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.auth_requests + self.authorization_codes + self.refresh_tokens
    }
}

/// Runs all three expiry sweeps once.
///
/// Codes are swept before their authorization requests.
///
/// # Errors
///
/// Returns the first storage error; earlier sweeps stay applied.
pub async fn sweep_expired(db: &dyn DBClient) -> Result<SweepReport, StorageError> {
    let authorization_codes = db.delete_expired_authorization_codes().await?;
    let auth_requests = db.delete_expired_auth_requests().await?;
    let refresh_tokens = db.delete_expired_refresh_tokens().await?;

    Ok(SweepReport {
        auth_requests,
        authorization_codes,
        refresh_tokens,
    })
}

/// Start the background sweeper. Failures are logged and the task keeps
/// running until it is aborted.
pub fn spawn_expiry_sweeper(
    db: Arc<dyn DBClient>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;

            match sweep_expired(db.as_ref()).await {
                Ok(report) if report.total() > 0 => {
                    tracing::info!(
                        auth_requests = report.auth_requests,
                        authorization_codes = report.authorization_codes,
                        refresh_tokens = report.refresh_tokens,
                        "Cleaned up expired OAuth2 records"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "OAuth2 expiry sweep failed");
                }
                _ => {}
            }
        }
    })
}
