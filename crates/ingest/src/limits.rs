use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const CAMPAIGN_CONCURRENCY_ENV: &str = "TRIALMAP_CAMPAIGN_CONCURRENCY";
pub const DEFAULT_CAMPAIGN_CONCURRENCY: usize = 1;
pub const MAX_CAMPAIGN_CONCURRENCY: usize = 16;

static CAMPAIGN_WAITERS: AtomicUsize = AtomicUsize::new(0);
static CAMPAIGN_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignConcurrencySnapshot {
    pub in_flight: usize,
    pub waiters: usize,
}

pub fn parse_campaign_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_CAMPAIGN_CONCURRENCY)
}

pub fn campaign_concurrency_from_env() -> usize {
    let raw = std::env::var(CAMPAIGN_CONCURRENCY_ENV).ok();
    parse_campaign_concurrency(raw.as_deref(), DEFAULT_CAMPAIGN_CONCURRENCY)
}

/// Process-wide view across every running campaign.
pub fn campaign_concurrency_snapshot() -> CampaignConcurrencySnapshot {
    CampaignConcurrencySnapshot {
        in_flight: CAMPAIGN_IN_FLIGHT.load(Ordering::Relaxed),
        waiters: CAMPAIGN_WAITERS.load(Ordering::Relaxed),
    }
}

pub(crate) struct CampaignPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
}

impl Drop for CampaignPermit {
    fn drop(&mut self) {
        CAMPAIGN_IN_FLIGHT.fetch_sub(1, Ordering::Relaxed);
    }
}

struct CampaignWaiterGuard;

impl CampaignWaiterGuard {
    fn new() -> Self {
        CAMPAIGN_WAITERS.fetch_add(1, Ordering::Relaxed);
        Self
    }
}

impl Drop for CampaignWaiterGuard {
    fn drop(&mut self) {
        CAMPAIGN_WAITERS.fetch_sub(1, Ordering::Relaxed);
    }
}

pub(crate) async fn acquire_campaign_permit(semaphore: Arc<Semaphore>) -> CampaignPermit {
    let permit = match semaphore.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            let waiter = CampaignWaiterGuard::new();
            let snapshot = campaign_concurrency_snapshot();
            log::debug!(
                "campaign slot busy: {} in flight, {} waiting",
                snapshot.in_flight,
                snapshot.waiters
            );
            // Campaign semaphores are owned by the campaign and never closed.
            let permit = semaphore
                .acquire_owned()
                .await
                .unwrap_or_else(|_| unreachable!("campaign semaphore closed"));
            drop(waiter);
            permit
        }
    };
    CAMPAIGN_IN_FLIGHT.fetch_add(1, Ordering::Relaxed);
    CampaignPermit { permit }
}
