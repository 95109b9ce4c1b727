//! Leader-only backup scheduling.
//!
//! Two nested timers drive the engine. The outer one re-checks leadership
//! every `leadership_check_interval`. While the local member leads, the inner
//! one runs a capture cycle every `backup_interval`, re-checking leadership
//! with a fresh client before each cycle. Cycles never overlap.

use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::etcd::leadership::is_leader;
use crate::etcd::StoreFactory;
use crate::executor::BackupExecutor;

pub struct Scheduler<F> {
    factory: F,
    member_name: String,
    leadership_check_interval: Duration,
    backup_interval: Duration,
    executor: BackupExecutor,
}

impl<F: StoreFactory> Scheduler<F> {
    pub fn new(
        factory: F,
        member_name: impl Into<String>,
        leadership_check_interval: Duration,
        backup_interval: Duration,
        executor: BackupExecutor,
    ) -> Self {
        Self {
            factory,
            member_name: member_name.into(),
            leadership_check_interval,
            backup_interval,
            executor,
        }
    }

    pub fn from_config(factory: F, config: &Config) -> Self {
        Self::new(
            factory,
            config.member.name.clone(),
            config.leadership_check_interval(),
            config.backup_interval(),
            BackupExecutor::from_config(config),
        )
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            member = %self.member_name,
            leadership_check_secs = self.leadership_check_interval.as_secs(),
            backup_secs = self.backup_interval.as_secs(),
            config_dir = %self.executor.config_dir().display(),
            "Scheduler started"
        );

        let mut checks = interval(self.leadership_check_interval);
        checks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = checks.tick() => {}
            }

            if self.backup_while_leader(&shutdown).await.is_break() {
                break;
            }
            // The next check is one full period after leadership was lost.
            checks.reset();
        }

        info!("Scheduler stopped");
    }

    /// Capture a backup every `backup_interval` for as long as the local
    /// member leads. Breaks on shutdown.
    async fn backup_while_leader(&self, shutdown: &CancellationToken) -> ControlFlow<()> {
        let mut backups = interval(self.backup_interval);
        backups.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return ControlFlow::Break(()),
                _ = backups.tick() => {}
            }

            let mut store = match self.factory.connect().await {
                Ok(store) => store,
                Err(e) => {
                    warn!(error = %e, "Failed to connect to etcd");
                    return ControlFlow::Continue(());
                }
            };

            if !is_leader(&mut store, &self.member_name).await {
                debug!(member = %self.member_name, "Waiting for the next leadership check");
                return ControlFlow::Continue(());
            }

            if let Err(e) = self.executor.run_cycle(&mut store).await {
                error!(member = %self.member_name, error = %e, "Backup cycle failed");
            }
        }
    }
}
