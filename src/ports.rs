use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DashError;
use crate::msg::WorkerEvent;
use crate::types::{BeadDetail, BeadSummary, CampaignInput, CampaignOutcome, PipelineInput, PipelineOutput};

// --- Event sender ---

/// Worker-side handle to the event channel.
///
/// `send` races the cancellation token: once cancellation is observed the
/// push is dropped, so a slow consumer can never wedge a cancelled worker.
/// `send_final` does not race — the terminal message must always be
/// delivered before the channel closes.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<WorkerEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Push a status event. Returns false when the push lost the race with
    /// cancellation or the receiver is gone.
    pub async fn send(&self, event: WorkerEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }

    /// Push a terminal event unconditionally.
    pub async fn send_final(&self, event: WorkerEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

// --- Collaborator traits ---

/// Reads bead lists from the work-item store.
#[async_trait::async_trait]
pub trait Lister: Send + Sync {
    async fn ready(&self) -> Result<Vec<BeadSummary>, DashError>;

    /// Recently closed beads. `limit` is advisory.
    async fn closed(&self, limit: usize) -> Result<Vec<BeadSummary>, DashError>;
}

/// Fetches one bead's full detail.
#[async_trait::async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, id: &str) -> Result<BeadDetail, DashError>;
}

/// Executes the phases of a single pipeline, streaming `PhaseUpdate` events
/// to the sink as it goes.
#[async_trait::async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn run(
        &self,
        input: PipelineInput,
        events: EventSender,
    ) -> Result<PipelineOutput, DashError>;
}

/// Sequences child pipelines for a feature/epic parent, streaming campaign
/// and phase events. Child pipelines are composed through `pipeline`.
#[async_trait::async_trait]
pub trait CampaignRunner: Send + Sync {
    async fn run(
        &self,
        input: CampaignInput,
        events: EventSender,
        pipeline: Arc<dyn PipelineRunner>,
    ) -> Result<CampaignOutcome, DashError>;
}

/// One-shot post-pipeline lifecycle hook (merge/close/cleanup). Errors are
/// surfaced only on the status line.
#[async_trait::async_trait]
pub trait PostAction: Send + Sync {
    async fn run(&self, bead_id: &str) -> Result<(), DashError>;
}

/// Reads archived summary/worklog text for closed beads. Absent entries are
/// reported as the not-found kind, never as empty strings.
pub trait ArchiveReader: Send + Sync {
    fn read_summary(&self, id: &str) -> Result<String, DashError>;
    fn read_worklog(&self, id: &str) -> Result<String, DashError>;
}

// --- Bead-id path safety ---

/// Reject ids that can never be path components: empty, leading `-`,
/// the dot directories, or anything containing a separator or NUL.
pub fn validate_bead_id(id: &str) -> Result<(), DashError> {
    if id.is_empty()
        || id.starts_with('-')
        || id == "."
        || id == ".."
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
    {
        return Err(DashError::InvalidBeadId(id.to_string()));
    }
    Ok(())
}
