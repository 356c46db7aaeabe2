//! Cron job renewing push-notification leases before they lapse.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use apalis::prelude::*;
use apalis_cron::Schedule;

use crate::application::subscription::SubscriptionManager;

/// Leases expiring within this window are renewed eagerly.
const RENEWAL_WINDOW: Duration = Duration::from_secs(12 * 3600);

#[derive(Default, Debug, Clone)]
pub struct RenewSubscriptionsJob;

impl From<chrono::DateTime<chrono::Utc>> for RenewSubscriptionsJob {
    fn from(_: chrono::DateTime<chrono::Utc>) -> Self {
        Self
    }
}

#[derive(Clone)]
pub struct RenewSubscriptionsContext {
    pub subscriptions: Arc<SubscriptionManager>,
}

pub async fn process_renewal_job(
    _job: RenewSubscriptionsJob,
    ctx: Data<RenewSubscriptionsContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.subscriptions.renew_expiring(RENEWAL_WINDOW).await {
        Ok(count) if count > 0 => {
            tracing::info!(renewed = count, "Renewed expiring subscriptions");
        }
        Err(err) => {
            tracing::warn!(error = %err, "Subscription renewal sweep failed");
        }
        _ => {}
    }
    Ok(())
}

/// Runs hourly at minute 15.
pub fn renewal_schedule() -> Schedule {
    Schedule::from_str("0 15 * * * *").expect("Invalid cron expression for renewal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_parses_correctly() {
        let upcoming: Vec<_> = renewal_schedule().upcoming(chrono::Utc).take(3).collect();
        assert_eq!(upcoming.len(), 3);
    }
}
