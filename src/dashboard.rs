use std::time::Duration;

use crate::browse::{BrowseEmit, BrowseState};
use crate::cache::DetailCache;
use crate::campaign::CampaignState;
use crate::config::DashboardOptions;
use crate::confirm::ConfirmState;
use crate::msg::{Cmd, Key, Msg, WorkerEvent};
use crate::pipeline::PipelineState;
use crate::tree;
use crate::types::{BeadDetail, CampaignTaskInfo, PipelineInput};
use crate::viewport::Viewport;

/// Delay between a selection change and the resolver call it may trigger.
pub const RESOLVE_DEBOUNCE: Duration = Duration::from_millis(150);
/// Lifetime of a transient status-line message.
pub const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(5);
pub const SPINNER_INTERVAL: Duration = Duration::from_millis(100);
pub const ELAPSED_INTERVAL: Duration = Duration::from_secs(1);

/// Separator printed between a closed bead's detail and its archive text.
const ARCHIVE_SEPARATOR: &str = "────────────────────────";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Browse,
    Confirm,
    Pipeline,
    Campaign,
    Summary,
    CampaignSummary,
}

/// Which pane receives key input; orthogonal to mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Left,
    Right,
}

/// The root controller: one serialized state machine over every sub-state.
///
/// `update` is a pure transition from `(state, message)` to follow-up
/// commands. It never blocks and never performs I/O; the runtime executes
/// the returned commands and feeds the resulting messages back in.
pub struct Dashboard {
    pub mode: Mode,
    pub focus: Focus,
    pub width: u16,
    pub height: u16,

    pub browse: BrowseState,
    pub pipeline: PipelineState,
    pub campaign: CampaignState,
    pub confirm: Option<ConfirmState>,
    pub cache: DetailCache,
    pub viewport: Viewport,

    pub status_msg: String,
    status_seq: u64,

    /// Bead id of the active (or just-finished) dispatch; empty when none.
    pub dispatched_bead_id: String,
    /// Set when returning to Browse so the next list arrival snaps the
    /// cursor onto the dispatched bead.
    pub last_dispatched_id: String,
    /// Non-None while a pipeline/campaign keeps running in Browse.
    pub background_mode: Option<Mode>,
    /// True from dispatch until ChannelClosed.
    pub worker_running: bool,
    pub aborting: bool,

    /// Debouncer key: the id whose resolve tick is pending.
    pub pending_resolve_id: Option<String>,
    /// In-flight resolver key; stale results never clobber the pane.
    pub resolving_id: Option<String>,

    pub pipeline_output: Option<crate::types::PipelineOutput>,
    pub pipeline_err: Option<String>,
    campaign_done_seen: bool,

    phase_names: Vec<String>,
    provider_names: Vec<String>,
    active_provider: usize,
    has_campaign_validation: bool,
    has_resolver: bool,
    has_archive: bool,
    has_post_action: bool,
    has_pipeline_runner: bool,
    has_campaign_runner: bool,
}

impl Dashboard {
    pub fn new(options: &DashboardOptions) -> Self {
        let provider_names = if options.provider_names.is_empty() {
            vec![options.active_provider.clone()]
        } else {
            options.provider_names.clone()
        };
        let active_provider = provider_names
            .iter()
            .position(|name| *name == options.active_provider)
            .unwrap_or(0);

        Self {
            mode: Mode::Browse,
            focus: Focus::Left,
            width: 80,
            height: 24,
            browse: BrowseState::new(),
            pipeline: PipelineState::new(&options.phase_names, "", "", ""),
            campaign: CampaignState::new("", "", Vec::new(), &options.phase_names, ""),
            confirm: None,
            cache: DetailCache::new(),
            viewport: Viewport::new(20),
            status_msg: String::new(),
            status_seq: 0,
            dispatched_bead_id: String::new(),
            last_dispatched_id: String::new(),
            background_mode: None,
            worker_running: false,
            aborting: false,
            pending_resolve_id: None,
            resolving_id: None,
            pipeline_output: None,
            pipeline_err: None,
            campaign_done_seen: false,
            phase_names: options.phase_names.clone(),
            provider_names,
            active_provider,
            has_campaign_validation: options.has_campaign_validation,
            has_resolver: options.resolver.is_some(),
            has_archive: options.archive.is_some(),
            has_post_action: options.post_action.is_some(),
            has_pipeline_runner: options.pipeline_runner.is_some(),
            has_campaign_runner: options.campaign_runner.is_some(),
        }
    }

    pub fn active_provider_name(&self) -> &str {
        self.provider_names
            .get(self.active_provider)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Commands to run at startup: first list load.
    pub fn init(&mut self) -> Vec<Cmd> {
        vec![Cmd::LoadBeads]
    }

    // --- Update ---

    pub fn update(&mut self, msg: Msg) -> Vec<Cmd> {
        let cmds = match msg {
            Msg::Key(key) => self.route_key(key),
            Msg::Resize(w, h) => {
                self.width = w;
                self.height = h;
                self.viewport.set_height(h.saturating_sub(4) as usize);
                Vec::new()
            }
            Msg::BeadList(result) => self.on_bead_list(result),
            Msg::DetailResolved { id, result } => self.on_detail_resolved(id, result),
            Msg::ArchiveLoaded {
                id,
                summary,
                worklog,
            } => {
                self.on_archive_loaded(&id, summary, worklog);
                Vec::new()
            }
            Msg::ResolveTick { id } => self.on_resolve_tick(id),
            Msg::SpinnerTick => self.on_spinner_tick(),
            Msg::ElapsedTick => self.on_elapsed_tick(),
            Msg::ClearStatus { seq } => {
                if seq == self.status_seq {
                    self.status_msg.clear();
                }
                Vec::new()
            }
            Msg::Worker { event, .. } => self.on_worker_event(event),
            Msg::ChannelClosed { .. } => self.on_channel_closed(),
            Msg::PostActionDone { bead_id, err } => {
                let text = match err {
                    Some(e) => format!("✗ Post action failed for {}: {}", bead_id, e),
                    None => format!("✓ Post action finished for {}", bead_id),
                };
                vec![self.set_status(text)]
            }
        };
        self.sync_report_pane();
        cmds
    }

    /// Keep the right-pane viewport in step with the live report views.
    /// Browse detail content is event-driven and left alone here.
    fn sync_report_pane(&mut self) {
        match self.mode {
            Mode::Pipeline | Mode::Summary => self.viewport.set_content(&self.pipeline.view_report()),
            Mode::Campaign | Mode::CampaignSummary => {
                self.viewport.set_content(&self.campaign.view_report())
            }
            Mode::Browse | Mode::Confirm => {}
        }
    }

    /// The operation worker events should be applied to: the foreground
    /// mode, or the background one after a hand-off.
    fn active_op(&self) -> Option<Mode> {
        self.background_mode.or(match self.mode {
            Mode::Pipeline | Mode::Campaign => Some(self.mode),
            _ => None,
        })
    }

    fn campaign_active(&self) -> bool {
        matches!(self.active_op(), Some(Mode::Campaign))
    }

    // --- Key routing ---

    fn route_key(&mut self, key: Key) -> Vec<Cmd> {
        match self.mode {
            Mode::Confirm => self.confirm_key(key),
            Mode::Browse => self.browse_key(key),
            Mode::Pipeline | Mode::Campaign => self.worker_key(key),
            Mode::Summary | Mode::CampaignSummary => self.summary_key(key),
        }
    }

    fn browse_key(&mut self, key: Key) -> Vec<Cmd> {
        // Enter on the backgrounded bead re-enters that mode in place.
        if key == Key::Enter && self.reenter_background() {
            return Vec::new();
        }
        match key {
            Key::Char('q') | Key::CtrlC => {
                if self.worker_running && self.background_mode.is_some() {
                    return self.cancel_background();
                }
                vec![Cmd::Quit]
            }
            Key::Tab => {
                self.toggle_focus();
                Vec::new()
            }
            Key::Char('p') => self.cycle_provider(),
            _ if self.focus == Focus::Right => {
                self.viewport.handle_key(key);
                Vec::new()
            }
            _ => {
                let emit = self.browse.handle_key(key);
                match emit {
                    BrowseEmit::Confirm {
                        id,
                        bead_type,
                        title,
                    } => {
                        self.open_confirm(id, bead_type, title);
                        Vec::new()
                    }
                    BrowseEmit::Refresh => vec![Cmd::LoadBeads],
                    BrowseEmit::None => self.maybe_resolve(),
                }
            }
        }
    }

    fn reenter_background(&mut self) -> bool {
        let Some(bg) = self.background_mode else {
            return false;
        };
        let selected = self
            .browse
            .selected_bead()
            .map(|b| b.id.clone())
            .unwrap_or_default();
        if selected != self.dispatched_bead_id {
            return false;
        }
        self.mode = bg;
        self.background_mode = None;
        self.focus = Focus::Left;
        true
    }

    fn open_confirm(&mut self, id: String, bead_type: crate::types::BeadType, title: String) {
        let children: Vec<CampaignTaskInfo> = tree::open_children(&self.browse.roots, &id)
            .into_iter()
            .map(|b| CampaignTaskInfo {
                id: b.id,
                title: b.title,
            })
            .collect();
        self.confirm = Some(ConfirmState {
            bead_id: id,
            bead_type,
            bead_title: title,
            children,
            has_validation: self.has_campaign_validation,
            provider: self.active_provider_name().to_string(),
        });
        self.mode = Mode::Confirm;
    }

    fn confirm_key(&mut self, key: Key) -> Vec<Cmd> {
        match key {
            Key::Enter => self.dispatch(),
            Key::Esc | Key::Char('q') => {
                self.confirm = None;
                self.mode = Mode::Browse;
                Vec::new()
            }
            // Everything else is swallowed while the preview is up.
            _ => Vec::new(),
        }
    }

    fn worker_key(&mut self, key: Key) -> Vec<Cmd> {
        match key {
            Key::Esc => self.send_to_background(),
            Key::Char('q') | Key::CtrlC => {
                if self.aborting {
                    return vec![Cmd::Quit];
                }
                self.begin_abort();
                vec![Cmd::CancelWorker]
            }
            Key::Tab => {
                self.toggle_focus();
                Vec::new()
            }
            Key::Char('p') => self.cycle_provider(),
            _ if self.focus == Focus::Right => {
                self.viewport.handle_key(key);
                Vec::new()
            }
            _ => {
                if self.mode == Mode::Campaign {
                    self.campaign.handle_key(key);
                } else {
                    self.pipeline.handle_key(key);
                }
                Vec::new()
            }
        }
    }

    fn summary_key(&mut self, key: Key) -> Vec<Cmd> {
        match key {
            Key::Enter | Key::Esc | Key::Char('b') | Key::Char('r') => self.return_to_browse(false),
            Key::Char('q') | Key::CtrlC => vec![Cmd::Quit],
            Key::Tab => {
                self.toggle_focus();
                Vec::new()
            }
            Key::Char('p') => self.cycle_provider(),
            _ if self.focus == Focus::Right => {
                self.viewport.handle_key(key);
                Vec::new()
            }
            _ => {
                // Scroll the frozen pipeline/campaign.
                if self.mode == Mode::CampaignSummary {
                    self.campaign.handle_key(key);
                } else {
                    self.pipeline.handle_key(key);
                }
                Vec::new()
            }
        }
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Left => Focus::Right,
            Focus::Right => Focus::Left,
        };
    }

    fn cycle_provider(&mut self) -> Vec<Cmd> {
        if self.provider_names.len() < 2 {
            return Vec::new();
        }
        self.active_provider = (self.active_provider + 1) % self.provider_names.len();
        let text = format!("Provider: {}", self.active_provider_name());
        vec![self.set_status(text)]
    }

    // --- Dispatch lifecycle ---

    fn dispatch(&mut self) -> Vec<Cmd> {
        let Some(confirm) = self.confirm.take() else {
            self.mode = Mode::Browse;
            return Vec::new();
        };

        let campaign = confirm.is_campaign() && self.has_campaign_runner;
        if !campaign && !self.has_pipeline_runner {
            self.mode = Mode::Browse;
            return vec![self.set_status("✗ No pipeline runner configured".to_string())];
        }

        self.pipeline_output = None;
        self.pipeline_err = None;
        self.campaign_done_seen = false;
        self.aborting = false;
        self.worker_running = true;
        self.background_mode = None;
        self.dispatched_bead_id = confirm.bead_id.clone();
        self.focus = Focus::Left;

        let mut cmds = Vec::with_capacity(4);
        if campaign {
            self.mode = Mode::Campaign;
            self.campaign = CampaignState::new(
                &confirm.bead_id,
                &confirm.bead_title,
                confirm.children.clone(),
                &self.phase_names,
                &confirm.provider,
            );
            cmds.push(Cmd::StartCampaign {
                parent_id: confirm.bead_id,
                parent_title: confirm.bead_title,
                provider: confirm.provider,
                tasks: confirm.children,
            });
        } else {
            self.mode = Mode::Pipeline;
            self.pipeline = PipelineState::new(
                &self.phase_names,
                &confirm.bead_id,
                &confirm.bead_title,
                &confirm.provider,
            );
            cmds.push(Cmd::StartPipeline {
                input: PipelineInput {
                    bead_id: confirm.bead_id,
                    bead_title: confirm.bead_title,
                    bead_type: confirm.bead_type,
                    provider: confirm.provider,
                },
            });
        }

        cmds.push(Cmd::Listen);
        cmds.push(tick(SPINNER_INTERVAL, Msg::SpinnerTick));
        cmds.push(tick(ELAPSED_INTERVAL, Msg::ElapsedTick));
        cmds
    }

    /// Esc in a worker mode: keep the worker running, go browse.
    fn send_to_background(&mut self) -> Vec<Cmd> {
        self.background_mode = Some(self.mode);
        self.mode = Mode::Browse;
        self.focus = Focus::Left;
        let text = format!("Running {} in background", self.dispatched_bead_id);
        let mut cmds = vec![self.set_status(text)];
        // The right pane goes back to showing the browse selection.
        cmds.extend(self.maybe_resolve());
        cmds
    }

    fn begin_abort(&mut self) {
        self.aborting = true;
        if self.campaign_active() {
            self.campaign.pipeline.aborting = true;
        } else {
            self.pipeline.aborting = true;
        }
    }

    fn cancel_background(&mut self) -> Vec<Cmd> {
        self.begin_abort();
        let text = format!("Cancelling {}…", self.dispatched_bead_id);
        let status = self.set_status(text);
        vec![status, Cmd::CancelWorker]
    }

    // --- Worker events ---

    fn on_worker_event(&mut self, event: WorkerEvent) -> Vec<Cmd> {
        match event {
            WorkerEvent::PhaseUpdate(update) => {
                if self.campaign_active() {
                    self.campaign.apply_phase_update(&update);
                } else {
                    self.pipeline.apply_update(&update);
                }
            }
            WorkerEvent::PipelineDone(output) => {
                self.pipeline.running = false;
                self.pipeline_output = Some(output);
            }
            WorkerEvent::PipelineError(err) => {
                self.pipeline.running = false;
                self.pipeline_err = Some(err);
            }
            WorkerEvent::CampaignTaskStart { index } => self.campaign.task_start(index),
            WorkerEvent::CampaignTaskDone {
                index,
                success,
                duration,
                reports,
            } => self.campaign.task_done(index, success, duration, reports),
            WorkerEvent::CampaignDone(_) => self.campaign_done_seen = true,
            WorkerEvent::CampaignError(err) => self.pipeline_err = Some(err),
            WorkerEvent::CampaignValidationStart => {
                if self.has_campaign_validation {
                    self.campaign.validation_start();
                }
            }
            WorkerEvent::CampaignValidationDone { passed, summary } => {
                if self.has_campaign_validation {
                    self.campaign.validation_done(passed, summary);
                }
            }
        }
        // Event arrival is the only way events enter the state: receive one,
        // process it, schedule the next single receive.
        vec![Cmd::Listen]
    }

    fn on_channel_closed(&mut self) -> Vec<Cmd> {
        self.worker_running = false;

        if self.mode == Mode::Browse && self.background_mode.is_some() {
            return self.finish_background();
        }

        match self.mode {
            Mode::Pipeline => {
                if self.aborting {
                    let bead_id = self.dispatched_bead_id.clone();
                    let mut cmds = self.return_to_browse(true);
                    cmds.push(self.set_status(format!("Pipeline aborted for {}", bead_id)));
                    cmds
                } else {
                    self.mode = Mode::Summary;
                    Vec::new()
                }
            }
            Mode::Campaign => {
                if self.aborting {
                    let bead_id = self.dispatched_bead_id.clone();
                    let mut cmds = self.return_to_browse(true);
                    cmds.push(self.set_status(format!("Campaign aborted for {}", bead_id)));
                    cmds
                } else {
                    if !self.campaign_done_seen {
                        // Closed without a terminal message: synthesize one
                        // from the campaign's own counters.
                        let outcome = self.campaign.outcome();
                        let _ = self.on_worker_event(WorkerEvent::CampaignDone(outcome));
                    }
                    self.campaign.mark_unstarted_skipped();
                    self.mode = Mode::CampaignSummary;
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }

    /// ChannelClosed while backgrounded: report, refresh, hand the cursor
    /// back to the dispatched bead.
    fn finish_background(&mut self) -> Vec<Cmd> {
        let was_campaign = self.background_mode == Some(Mode::Campaign);
        let aborted = self.aborting;
        let bead_id = self.dispatched_bead_id.clone();

        let text = if aborted {
            format!("Cancelled {}", bead_id)
        } else if was_campaign {
            match &self.pipeline_err {
                Some(err) => format!("✗ Campaign failed: {}", err),
                None => {
                    let outcome = self.campaign.outcome();
                    format!(
                        "✓ Campaign complete: {} passed, {} failed",
                        outcome.completed, outcome.failed
                    )
                }
            }
        } else {
            match (&self.pipeline_err, &self.pipeline_output) {
                (Some(err), _) => format!("✗ Pipeline failed: {}", err),
                (None, Some(output)) if output.success => "✓ Pipeline complete".to_string(),
                (None, Some(_)) => "✗ Pipeline failed".to_string(),
                (None, None) => "Pipeline finished".to_string(),
            }
        };

        let mut cmds = Vec::new();
        let succeeded = self
            .pipeline_output
            .as_ref()
            .is_some_and(|o| o.success && self.pipeline_err.is_none());
        if !was_campaign && !aborted && succeeded && self.has_post_action {
            cmds.push(Cmd::RunPostAction {
                bead_id: bead_id.clone(),
            });
        }

        self.cache.invalidate();
        self.browse.loading = true;
        cmds.push(Cmd::LoadBeads);
        cmds.push(self.set_status(text));

        if !aborted {
            self.last_dispatched_id = bead_id;
        }
        self.background_mode = None;
        self.dispatched_bead_id.clear();
        self.aborting = false;
        self.pipeline.aborting = false;
        self.campaign.pipeline.aborting = false;
        cmds
    }

    /// The Summary/CampaignSummary return transition, also used by the abort
    /// path (which skips the cursor snap and post action).
    fn return_to_browse(&mut self, aborted: bool) -> Vec<Cmd> {
        self.mode = Mode::Browse;
        self.focus = Focus::Left;
        self.confirm = None;
        self.cache.invalidate();
        self.browse.loading = true;

        if !aborted && !self.dispatched_bead_id.is_empty() {
            self.last_dispatched_id = self.dispatched_bead_id.clone();
        }
        self.dispatched_bead_id.clear();
        self.background_mode = None;
        self.aborting = false;
        self.pipeline.aborting = false;
        self.campaign.pipeline.aborting = false;
        vec![Cmd::LoadBeads]
    }

    // --- List and detail arrival ---

    fn on_bead_list(&mut self, result: Result<Vec<crate::types::BeadSummary>, String>) -> Vec<Cmd> {
        match result {
            Ok(beads) => {
                self.browse.set_beads(beads);
                if !self.last_dispatched_id.is_empty() {
                    let id = std::mem::take(&mut self.last_dispatched_id);
                    self.browse.select_id(&id);
                }
                self.maybe_resolve()
            }
            Err(err) => {
                self.browse.set_error(err);
                Vec::new()
            }
        }
    }

    /// Debounced detail resolution: render from cache when possible,
    /// otherwise arm the debounce timer for the selected id.
    fn maybe_resolve(&mut self) -> Vec<Cmd> {
        let Some(bead) = self.browse.selected_bead() else {
            self.pending_resolve_id = None;
            self.viewport.set_content("");
            return Vec::new();
        };
        let id = bead.id.clone();
        let closed = bead.closed;

        if let Some(detail) = self.cache.get(&id) {
            let text = compose_detail_text(detail);
            self.viewport.set_content(&text);
            self.viewport.jump_top();
            self.pending_resolve_id = None;
            self.resolving_id = None;
            if closed && self.has_archive {
                return vec![Cmd::ReadArchive { id }];
            }
            return Vec::new();
        }

        if !self.has_resolver {
            self.viewport.set_content(&format!("{}  {}", bead.id, bead.title));
            self.viewport.jump_top();
            return Vec::new();
        }

        self.viewport.set_content("Loading…");
        self.viewport.jump_top();
        self.pending_resolve_id = Some(id.clone());
        vec![tick(RESOLVE_DEBOUNCE, Msg::ResolveTick { id })]
    }

    /// Debounce tick: only the tick matching the still-pending id promotes
    /// to an in-flight resolve; superseded ticks are dropped.
    fn on_resolve_tick(&mut self, id: String) -> Vec<Cmd> {
        if self.pending_resolve_id.as_deref() != Some(id.as_str()) {
            return Vec::new();
        }
        self.pending_resolve_id = None;
        self.resolving_id = Some(id.clone());
        vec![Cmd::Resolve { id }]
    }

    fn on_detail_resolved(
        &mut self,
        id: String,
        result: Result<BeadDetail, String>,
    ) -> Vec<Cmd> {
        match result {
            Ok(detail) => {
                // Cache unconditionally; only the in-flight id may render.
                self.cache.set(detail.clone());
                if self.resolving_id.as_deref() != Some(id.as_str()) {
                    return Vec::new();
                }
                self.resolving_id = None;
                let text = compose_detail_text(&detail);
                self.viewport.set_content(&text);
                self.viewport.jump_top();
                if detail.closed && self.has_archive {
                    return vec![Cmd::ReadArchive { id }];
                }
                Vec::new()
            }
            Err(err) => {
                // Stale failures are discarded entirely.
                let selected = self
                    .browse
                    .selected_bead()
                    .map(|b| b.id.clone())
                    .unwrap_or_default();
                if selected == id {
                    self.viewport.set_content(&format!("Error: {}", err));
                    self.viewport.jump_top();
                }
                if self.resolving_id.as_deref() == Some(id.as_str()) {
                    self.resolving_id = None;
                }
                Vec::new()
            }
        }
    }

    fn on_archive_loaded(&mut self, id: &str, summary: Option<String>, worklog: Option<String>) {
        let selected = self
            .browse
            .selected_bead()
            .map(|b| b.id.clone())
            .unwrap_or_default();
        if selected != id {
            return;
        }
        if summary.is_none() && worklog.is_none() {
            return;
        }
        let Some(detail) = self.cache.get(id) else {
            return;
        };

        let mut text = compose_detail_text(detail);
        text.push_str(&format!("\n\n{}\n", ARCHIVE_SEPARATOR));
        if let Some(s) = summary {
            text.push_str(&format!("\n{}", s.trim_end()));
        }
        if let Some(w) = worklog {
            text.push_str(&format!("\n\n{}", w.trim_end()));
        }
        self.viewport.set_content(&text);
    }

    // --- Timers ---

    fn on_spinner_tick(&mut self) -> Vec<Cmd> {
        if !self.worker_running {
            return Vec::new();
        }
        if self.campaign_active() {
            self.campaign.tick_spinner();
        } else {
            self.pipeline.tick_spinner();
        }
        vec![tick(SPINNER_INTERVAL, Msg::SpinnerTick)]
    }

    fn on_elapsed_tick(&mut self) -> Vec<Cmd> {
        if !self.worker_running {
            return Vec::new();
        }
        if self.campaign_active() {
            self.campaign.tick_elapsed();
        } else {
            self.pipeline.tick_elapsed();
        }
        vec![tick(ELAPSED_INTERVAL, Msg::ElapsedTick)]
    }

    fn set_status(&mut self, text: String) -> Cmd {
        self.status_msg = text;
        self.status_seq += 1;
        tick(
            STATUS_CLEAR_DELAY,
            Msg::ClearStatus {
                seq: self.status_seq,
            },
        )
    }

    // --- View ---

    pub fn view(&self) -> String {
        if self.mode == Mode::Confirm {
            if let Some(confirm) = &self.confirm {
                return format!("{}\n\n{}", self.header(), confirm.view());
            }
        }

        let left = self.left_pane();
        let right = self.right_pane();
        let body_rows = self.height.saturating_sub(4) as usize;
        let left_width = (self.width as usize / 2).max(20);
        let body = join_columns(&left, &right, left_width, body_rows, self.left_anchor());

        format!("{}\n\n{}\n\n{}", self.header(), body, self.footer())
    }

    fn header(&self) -> String {
        let mode = match self.mode {
            Mode::Browse => "browse",
            Mode::Confirm => "confirm",
            Mode::Pipeline => "pipeline",
            Mode::Campaign => "campaign",
            Mode::Summary => "summary",
            Mode::CampaignSummary => "campaign summary",
        };
        let mut line = format!("beadboard  [{}]  provider: {}", mode, self.active_provider_name());
        if let Some(bg) = self.background_mode {
            let label = if bg == Mode::Campaign { "campaign" } else { "pipeline" };
            line.push_str(&format!("  (background {})", label));
        }
        if !self.status_msg.is_empty() {
            line.push_str(&format!("   {}", self.status_msg));
        }
        line
    }

    fn footer(&self) -> String {
        match self.mode {
            Mode::Browse => {
                "j/k move  h/l collapse/expand  Enter dispatch  r refresh  p provider  Tab focus  q quit"
            }
            Mode::Pipeline | Mode::Campaign => "j/k move  Esc background  q abort  Tab focus",
            Mode::Summary | Mode::CampaignSummary => "Enter/b back  r refresh  j/k scroll  q quit",
            Mode::Confirm => "",
        }
        .to_string()
    }

    fn left_pane(&self) -> String {
        match self.mode {
            Mode::Browse | Mode::Confirm => self.browse.view(),
            Mode::Pipeline => self.pipeline.view(),
            Mode::Campaign => self.campaign.view(),
            Mode::Summary => format!("{}\n\n{}", self.pipeline.view(), self.summary_line()),
            Mode::CampaignSummary => {
                format!("{}\n\n{}", self.campaign.view(), self.campaign_summary_line())
            }
        }
    }

    /// Row the left pane should keep visible when it overflows.
    fn left_anchor(&self) -> usize {
        match self.mode {
            Mode::Browse | Mode::Confirm => self.browse.cursor,
            Mode::Pipeline | Mode::Summary => self.pipeline.cursor + 2,
            Mode::Campaign | Mode::CampaignSummary => self.campaign.selected + 2,
        }
    }

    fn summary_line(&self) -> String {
        if let Some(err) = &self.pipeline_err {
            return format!("✗ Pipeline failed: {}", err);
        }
        match &self.pipeline_output {
            Some(output) if output.success => "✓ Pipeline complete".to_string(),
            Some(_) => "✗ Pipeline failed".to_string(),
            None => "Pipeline finished".to_string(),
        }
    }

    fn campaign_summary_line(&self) -> String {
        if let Some(err) = &self.pipeline_err {
            return format!("✗ Campaign failed: {}", err);
        }
        let outcome = self.campaign.outcome();
        format!(
            "Campaign complete: {} passed, {} failed",
            outcome.completed, outcome.failed
        )
    }

    fn right_pane(&self) -> String {
        self.viewport.view()
    }
}

/// Compose the plain-text detail document for the right pane.
fn compose_detail_text(detail: &BeadDetail) -> String {
    let mut out = format!("{}  {}", detail.id, detail.title);
    out.push_str(&format!("\n\ntype: {}", detail.bead_type));
    if detail.closed {
        out.push_str("   closed ✓");
    } else {
        out.push_str(&format!("   priority: P{}", detail.priority));
    }
    if let (Some(id), Some(title)) = (&detail.epic_id, &detail.epic_title) {
        out.push_str(&format!("\nepic: {}  {}", id, title));
    }
    if let (Some(id), Some(title)) = (&detail.feature_id, &detail.feature_title) {
        out.push_str(&format!("\nfeature: {}  {}", id, title));
    }
    if !detail.description.is_empty() {
        out.push_str(&format!("\n\n{}", detail.description));
    }
    if !detail.acceptance.is_empty() {
        out.push_str(&format!("\n\nAcceptance:\n{}", detail.acceptance));
    }
    out
}

fn tick(after: Duration, msg: Msg) -> Cmd {
    Cmd::Tick {
        after,
        msg: Box::new(msg),
    }
}

/// Pad/truncate two line-blocks into side-by-side columns. The left column
/// windows around `anchor` when it has more lines than fit.
fn join_columns(left: &str, right: &str, left_width: usize, rows: usize, anchor: usize) -> String {
    let left_lines = window_lines(left.lines().collect(), anchor, rows);
    let right_lines: Vec<&str> = right.lines().take(rows).collect();
    let count = left_lines.len().max(right_lines.len());

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let l = left_lines.get(i).copied().unwrap_or("");
        let r = right_lines.get(i).copied().unwrap_or("");
        let mut line = String::with_capacity(left_width + r.len() + 3);
        line.push_str(l);
        for _ in l.chars().count()..left_width {
            line.push(' ');
        }
        line.push_str("│ ");
        line.push_str(r);
        out.push(line);
    }
    out.join("\n")
}

/// Slice `lines` down to `rows`, keeping `anchor` visible.
fn window_lines(lines: Vec<&str>, anchor: usize, rows: usize) -> Vec<&str> {
    if rows == 0 || lines.len() <= rows {
        return lines;
    }
    let anchor = anchor.min(lines.len() - 1);
    let start = anchor.saturating_sub(rows / 2).min(lines.len() - rows);
    lines[start..start + rows].to_vec()
}
