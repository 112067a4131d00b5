use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::DashboardOptions;
use crate::dashboard::Dashboard;
use crate::error::DashError;
use crate::msg::{Cmd, Msg, WorkerEvent};
use crate::ports::EventSender;
use crate::tree::merge_bead_lists;
use crate::{log_debug, log_warn};

/// Bounded buffer between workers and the update loop. Must be large enough
/// that a bursty runner rarely blocks; lost pushes are tolerated only under
/// cancellation.
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Executes commands and owns everything the pure model must not touch:
/// the loop's message queue, the worker channel receiver, the cancellation
/// handle, and the collaborator handles.
///
/// The receive end of the worker channel is owned here exclusively. A
/// `Listen` command schedules exactly one receive; each received event
/// becomes one loop message, and the model reschedules the listener after
/// processing it. End of stream synthesizes one `ChannelClosed`.
pub struct Runtime {
    options: DashboardOptions,
    msgs_tx: mpsc::UnboundedSender<Msg>,
    msgs_rx: mpsc::UnboundedReceiver<Msg>,
    worker_rx: Option<Arc<Mutex<mpsc::Receiver<WorkerEvent>>>>,
    cancel: Option<CancellationToken>,
    /// Dispatch generation. Worker messages from a superseded dispatch are
    /// dropped before they reach the model.
    dispatch_seq: u64,
}

impl Runtime {
    pub fn new(options: DashboardOptions) -> Self {
        let (msgs_tx, msgs_rx) = mpsc::unbounded_channel();
        Self {
            options,
            msgs_tx,
            msgs_rx,
            worker_rx: None,
            cancel: None,
            dispatch_seq: 0,
        }
    }

    /// Sender for message producers outside the loop (the input thread).
    pub fn sender(&self) -> mpsc::UnboundedSender<Msg> {
        self.msgs_tx.clone()
    }

    /// Drive the dashboard until quit. `render` is called after every
    /// processed message.
    pub async fn run<F>(mut self, mut dashboard: Dashboard, mut render: F) -> Result<(), DashError>
    where
        F: FnMut(&Dashboard) -> std::io::Result<()>,
    {
        let cmds = dashboard.init();
        if self.execute_all(cmds) {
            return Ok(());
        }
        render(&dashboard)?;

        while let Some(msg) = self.msgs_rx.recv().await {
            if !self.admit(&msg) {
                log_debug!("dropping stale worker message: {:?}", msg);
                continue;
            }
            if matches!(msg, Msg::ChannelClosed { .. }) {
                self.worker_rx = None;
                self.cancel = None;
            }

            let cmds = dashboard.update(msg);
            let quit = self.execute_all(cmds);
            render(&dashboard)?;
            if quit {
                break;
            }
        }
        Ok(())
    }

    /// Only worker messages from the current dispatch reach the model.
    fn admit(&self, msg: &Msg) -> bool {
        match msg {
            Msg::Worker { seq, .. } | Msg::ChannelClosed { seq } => *seq == self.dispatch_seq,
            _ => true,
        }
    }

    /// Execute commands in order. Returns true when a quit was requested.
    fn execute_all(&mut self, cmds: Vec<Cmd>) -> bool {
        let mut quit = false;
        for cmd in cmds {
            if self.execute(cmd) {
                quit = true;
            }
        }
        quit
    }

    fn execute(&mut self, cmd: Cmd) -> bool {
        match cmd {
            Cmd::Quit => return true,
            Cmd::Listen => self.schedule_listen(),
            Cmd::LoadBeads => self.load_beads(),
            Cmd::Resolve { id } => self.resolve(id),
            Cmd::ReadArchive { id } => self.read_archive(id),
            Cmd::Tick { after, msg } => {
                let tx = self.msgs_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tx.send(*msg);
                });
            }
            Cmd::StartPipeline { input } => self.start_pipeline(input),
            Cmd::StartCampaign {
                parent_id,
                parent_title,
                provider,
                tasks,
            } => self.start_campaign(parent_id, parent_title, provider, tasks),
            Cmd::CancelWorker => {
                if let Some(cancel) = &self.cancel {
                    cancel.cancel();
                }
            }
            Cmd::RunPostAction { bead_id } => self.run_post_action(bead_id),
        }
        false
    }

    // --- Command implementations ---

    fn schedule_listen(&self) {
        let Some(rx) = self.worker_rx.clone() else {
            return;
        };
        let tx = self.msgs_tx.clone();
        let seq = self.dispatch_seq;
        tokio::spawn(async move {
            let received = rx.lock().await.recv().await;
            let msg = match received {
                Some(event) => Msg::Worker { seq, event },
                None => Msg::ChannelClosed { seq },
            };
            let _ = tx.send(msg);
        });
    }

    fn load_beads(&self) {
        let tx = self.msgs_tx.clone();
        let Some(lister) = self.options.lister.clone() else {
            let _ = tx.send(Msg::BeadList(Err("no bead lister configured".to_string())));
            return;
        };
        let limit = self.options.closed_fetch_limit;
        tokio::spawn(async move {
            let ready = match lister.ready().await {
                Ok(beads) => beads,
                Err(err) => {
                    let _ = tx.send(Msg::BeadList(Err(err.to_string())));
                    return;
                }
            };
            // A failing closed() fetch is non-fatal: show the open list alone.
            let closed = match lister.closed(limit).await {
                Ok(beads) => beads,
                Err(err) => {
                    log_warn!("closed bead fetch failed: {}", err);
                    Vec::new()
                }
            };
            let _ = tx.send(Msg::BeadList(Ok(merge_bead_lists(ready, closed))));
        });
    }

    fn resolve(&self, id: String) {
        let Some(resolver) = self.options.resolver.clone() else {
            return;
        };
        let tx = self.msgs_tx.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(&id).await.map_err(|e| e.to_string());
            let _ = tx.send(Msg::DetailResolved { id, result });
        });
    }

    fn read_archive(&self, id: String) {
        let Some(archive) = self.options.archive.clone() else {
            return;
        };
        let tx = self.msgs_tx.clone();
        tokio::task::spawn_blocking(move || {
            let summary = match archive.read_summary(&id) {
                Ok(text) => Some(text),
                Err(err) if err.is_not_found() => None,
                Err(err) => {
                    log_warn!("archive summary read failed for {}: {}", id, err);
                    None
                }
            };
            let worklog = match archive.read_worklog(&id) {
                Ok(text) => Some(text),
                Err(err) if err.is_not_found() => None,
                Err(err) => {
                    log_warn!("archive worklog read failed for {}: {}", id, err);
                    None
                }
            };
            let _ = tx.send(Msg::ArchiveLoaded {
                id,
                summary,
                worklog,
            });
        });
    }

    /// Replace any prior worker: cancel it, open a fresh channel and
    /// cancellation handle, bump the dispatch generation.
    fn next_dispatch(&mut self) -> EventSender {
        if let Some(old) = self.cancel.take() {
            old.cancel();
        }
        self.dispatch_seq += 1;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        self.worker_rx = Some(Arc::new(Mutex::new(rx)));
        self.cancel = Some(cancel.clone());
        EventSender::new(tx, cancel)
    }

    fn start_pipeline(&mut self, input: crate::types::PipelineInput) {
        let events = self.next_dispatch();
        let Some(runner) = self.options.pipeline_runner.clone() else {
            // The model guards against this; close out defensively anyway.
            tokio::spawn(async move {
                events
                    .send_final(WorkerEvent::PipelineError(
                        "no pipeline runner configured".to_string(),
                    ))
                    .await;
            });
            return;
        };
        tokio::spawn(async move {
            let result = runner.run(input, events.clone()).await;
            // The terminal message is always delivered, then every sender
            // clone drops and the channel closes.
            let terminal = match result {
                Ok(output) => WorkerEvent::PipelineDone(output),
                Err(err) => WorkerEvent::PipelineError(err.to_string()),
            };
            events.send_final(terminal).await;
        });
    }

    fn start_campaign(
        &mut self,
        parent_id: String,
        parent_title: String,
        provider: String,
        tasks: Vec<crate::types::CampaignTaskInfo>,
    ) {
        let events = self.next_dispatch();
        let (Some(runner), Some(pipeline)) = (
            self.options.campaign_runner.clone(),
            self.options.pipeline_runner.clone(),
        ) else {
            tokio::spawn(async move {
                events
                    .send_final(WorkerEvent::CampaignError(
                        "no campaign runner configured".to_string(),
                    ))
                    .await;
            });
            return;
        };
        let input = crate::types::CampaignInput {
            parent_id,
            parent_title,
            provider,
            tasks,
        };
        tokio::spawn(async move {
            let result = runner.run(input, events.clone(), pipeline).await;
            let terminal = match result {
                Ok(outcome) => WorkerEvent::CampaignDone(outcome),
                Err(err) => WorkerEvent::CampaignError(err.to_string()),
            };
            events.send_final(terminal).await;
        });
    }

    fn run_post_action(&self, bead_id: String) {
        let Some(action) = self.options.post_action.clone() else {
            return;
        };
        let tx = self.msgs_tx.clone();
        // Detached: the post action outlives the dispatch that spawned it.
        tokio::spawn(async move {
            let err = action.run(&bead_id).await.err().map(|e| e.to_string());
            let _ = tx.send(Msg::PostActionDone { bead_id, err });
        });
    }
}
