use crate::limits::{acquire_campaign_permit, campaign_concurrency_from_env};
use crate::pipeline::{IngestRequest, Ingestor};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use trialmap_protocol::{IngestionRun, RunStatus};

/// Outcome of a campaign, one run per request in request order.
#[derive(Debug, Clone, Default)]
pub struct CampaignReport {
    pub runs: Vec<IngestionRun>,
}

impl CampaignReport {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.runs.iter().filter(|r| r.is_completed()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.status == RunStatus::Failed)
            .count()
    }

    #[must_use]
    pub fn needs_review(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.is_completed() && r.needs_review())
            .count()
    }
}

/// Ingest many documents on a bounded pool.
///
/// Requests that depend on each other through `prior_version` are only ordered when
/// the concurrency is 1.
pub struct Campaign {
    ingestor: Arc<Ingestor>,
    concurrency: usize,
}

impl Campaign {
    /// Concurrency from `TRIALMAP_CAMPAIGN_CONCURRENCY`.
    #[must_use]
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self {
            ingestor,
            concurrency: campaign_concurrency_from_env(),
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, crate::limits::MAX_CAMPAIGN_CONCURRENCY);
        self
    }

    #[must_use]
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run(&self, requests: Vec<IngestRequest>) -> CampaignReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let doc_ids: Vec<String> = requests
            .iter()
            .map(|r| r.document.doc_version_id.clone())
            .collect();
        log::info!(
            "campaign of {} documents, concurrency {}",
            requests.len(),
            self.concurrency
        );

        let mut tasks = JoinSet::new();
        for (idx, request) in requests.into_iter().enumerate() {
            let ingestor = self.ingestor.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = acquire_campaign_permit(semaphore).await;
                (idx, ingestor.ingest(request).await)
            });
        }

        let mut slots: Vec<Option<IngestionRun>> = vec![None; doc_ids.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, run)) => slots[idx] = Some(run),
                Err(err) => log::error!("campaign task aborted: {err}"),
            }
        }

        let runs = slots
            .into_iter()
            .zip(&doc_ids)
            .map(|(slot, doc_id)| {
                slot.unwrap_or_else(|| {
                    self.ingestor
                        .failed_run(doc_id, "ingest task aborted".to_string())
                })
            })
            .collect();
        CampaignReport { runs }
    }
}
