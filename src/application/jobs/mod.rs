//! Cron-triggered background jobs.

mod reconcile;
mod renewal;
mod scheduled_sync;

pub use reconcile::{
    ReconcileContext, ReconcilePlaylistCountsJob, process_reconcile_job, reconcile_schedule,
};
pub use renewal::{
    RenewSubscriptionsContext, RenewSubscriptionsJob, process_renewal_job, renewal_schedule,
};
pub use scheduled_sync::{
    ScheduledSyncContext, ScheduledSyncJob, process_scheduled_sync_job, scheduled_sync_schedule,
};
