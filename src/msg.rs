use std::time::Duration;

use crate::types::{
    BeadDetail, BeadSummary, CampaignOutcome, CampaignTaskInfo, PhaseReport, PhaseUpdate,
    PipelineInput, PipelineOutput,
};

// --- Key input ---

/// Decoded key input. The terminal host translates raw key events into this
/// vocabulary so the model never touches the terminal library.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    Enter,
    Esc,
    Tab,
    PageUp,
    PageDown,
    CtrlC,
}

// --- Worker events ---

/// Typed events a pipeline or campaign worker pushes onto its channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    PhaseUpdate(PhaseUpdate),
    PipelineDone(PipelineOutput),
    PipelineError(String),
    CampaignTaskStart {
        index: usize,
    },
    CampaignTaskDone {
        index: usize,
        success: bool,
        duration: Duration,
        reports: Vec<PhaseReport>,
    },
    CampaignDone(CampaignOutcome),
    CampaignError(String),
    CampaignValidationStart,
    CampaignValidationDone {
        passed: bool,
        summary: String,
    },
}

// --- Update-loop messages ---

/// Every way state can change. Exactly one message is processed at a time;
/// sub-state transitions are pure functions over these values.
#[derive(Clone, Debug, PartialEq)]
pub enum Msg {
    Key(Key),
    Resize(u16, u16),
    /// Merged ready+closed list, or the `ready()` error.
    BeadList(Result<Vec<BeadSummary>, String>),
    DetailResolved {
        id: String,
        result: Result<BeadDetail, String>,
    },
    ArchiveLoaded {
        id: String,
        summary: Option<String>,
        worklog: Option<String>,
    },
    /// Debounce timer for detail resolution; carries the id it was armed for.
    ResolveTick {
        id: String,
    },
    SpinnerTick,
    ElapsedTick,
    /// One-shot status-line clear; `seq` is the status generation it belongs to.
    ClearStatus {
        seq: u64,
    },
    /// One worker event received from the channel; `seq` is the dispatch
    /// generation, used to drop events from a superseded worker.
    Worker {
        seq: u64,
        event: WorkerEvent,
    },
    /// The worker channel closed; synthesized by the listener on end of stream.
    ChannelClosed {
        seq: u64,
    },
    PostActionDone {
        bead_id: String,
        err: Option<String>,
    },
}

// --- Commands ---

/// Follow-up work the runtime executes after an update. Commands are value
/// records; the loop itself never blocks or performs I/O.
#[derive(Clone, Debug, PartialEq)]
pub enum Cmd {
    /// Schedule a single receive on the worker channel.
    Listen,
    /// Fetch ready + closed bead lists and deliver `Msg::BeadList`.
    LoadBeads,
    Resolve {
        id: String,
    },
    ReadArchive {
        id: String,
    },
    /// Deliver `msg` after `after` elapses.
    Tick {
        after: Duration,
        msg: Box<Msg>,
    },
    StartPipeline {
        input: PipelineInput,
    },
    StartCampaign {
        parent_id: String,
        parent_title: String,
        provider: String,
        tasks: Vec<CampaignTaskInfo>,
    },
    /// Invoke the cooperative cancellation handle of the active worker.
    CancelWorker,
    RunPostAction {
        bead_id: String,
    },
    Quit,
}
