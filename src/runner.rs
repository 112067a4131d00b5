use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::unistd::Pid;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::config::{BoardConfig, ProviderConfig};
use crate::error::DashError;
use crate::msg::WorkerEvent;
use crate::ports::{validate_bead_id, CampaignRunner, EventSender, PipelineRunner, PostAction};
use crate::types::{
    BeadType, CampaignInput, CampaignOutcome, PhaseReport, PhaseStatus, PhaseUpdate,
    PipelineInput, PipelineOutput,
};
use crate::{log_debug, log_info, log_warn};

/// How long a SIGTERM'd agent gets to clean up before SIGKILL.
const AGENT_STOP_GRACE: Duration = Duration::from_secs(5);

/// How often to re-probe the process group while the grace period runs.
const AGENT_STOP_POLL: Duration = Duration::from_millis(100);

// --- Phase result files ---

/// JSON document the agent writes to the result path when a phase finishes.
#[derive(Debug, Deserialize)]
struct PhaseResultFile {
    phase: String,
    outcome: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    files_changed: Vec<String>,
}

impl PhaseResultFile {
    fn passed(&self) -> bool {
        self.outcome == "passed"
    }
}

fn read_result_file(path: &Path) -> Result<PhaseResultFile, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            format!("Result file not found: {}", path.display())
        } else {
            format!("Failed to read result file {}: {}", path.display(), e)
        }
    })?;
    serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse result JSON from {}: {}", path.display(), e))
}

/// Even a failed result must name the phase it was produced for; a mismatch
/// means the agent wrote somebody else's file and is never retried.
fn validate_result_identity(result: &PhaseResultFile, expected_phase: &str) -> Result<(), String> {
    if result.phase == expected_phase {
        Ok(())
    } else {
        Err(format!(
            "Result identity mismatch: phase expected '{}', got '{}'",
            expected_phase, result.phase
        ))
    }
}

// --- Agent subprocess ---

enum AgentFailure {
    Cancelled,
    Failed(String),
}

/// Spawn an agent subprocess in its own process group, enforce the timeout
/// and cancellation, then read the result file the agent wrote.
///
/// stdin is null: the child runs in a background process group, and a
/// terminal read there would stop it with SIGTTIN.
async fn run_agent_subprocess(
    mut cmd: tokio::process::Command,
    result_path: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<PhaseResultFile, AgentFailure> {
    match std::fs::remove_file(result_path) {
        Ok(()) => log_warn!("Stale result file at {}, deleted", result_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(AgentFailure::Failed(format!(
                "Failed to remove stale result file {}: {}",
                result_path.display(),
                e
            )))
        }
    }

    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    // SAFETY: pre_exec runs between fork() and exec() where only
    // async-signal-safe calls are permitted; setpgid qualifies per POSIX.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(std::io::Error::other)?;
            Ok(())
        });
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| AgentFailure::Failed(format!("Failed to spawn agent: {}", e)))?;
    let child_pid = child
        .id()
        .ok_or_else(|| AgentFailure::Failed("Failed to get child PID".to_string()))?
        as i32;
    log_debug!("[agent] spawned (pid={})", child_pid);

    let wait_result = tokio::select! {
        _ = cancel.cancelled() => {
            log_debug!("[agent] cancelled — killing process group {}", child_pid);
            stop_agent_group(child_pid).await;
            let _ = child.wait().await;
            return Err(AgentFailure::Cancelled);
        }
        wait = tokio::time::timeout(timeout, child.wait()) => wait,
    };

    let exit_status = match wait_result {
        Err(_) => {
            log_debug!("[agent] timeout after {}s — killing", timeout.as_secs());
            stop_agent_group(child_pid).await;
            let _ = child.wait().await;
            return Err(AgentFailure::Failed(format!(
                "Agent timed out after {} seconds",
                timeout.as_secs()
            )));
        }
        Ok(wait) => {
            wait.map_err(|e| AgentFailure::Failed(format!("Error waiting for agent: {}", e)))?
        }
    };

    let result = read_result_file(result_path);
    match (exit_status.success(), result) {
        (true, Ok(parsed)) => {
            cleanup_result_file(result_path);
            Ok(parsed)
        }
        (false, Ok(parsed)) => {
            log_warn!("Agent exited non-zero but produced a valid result file");
            cleanup_result_file(result_path);
            Ok(parsed)
        }
        (_, Err(e)) => {
            let exit_info = match exit_status.code() {
                Some(code) => format!("exit code {}", code),
                None => "killed by signal".to_string(),
            };
            Err(AgentFailure::Failed(format!(
                "Agent failed ({}): {}",
                exit_info, e
            )))
        }
    }
}

fn cleanup_result_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log_warn!("Failed to clean up result file {}: {}", path.display(), e);
    }
}

/// Stop the agent's process group: SIGTERM, then re-probe with signal 0
/// until the grace period runs out, then SIGKILL whatever survived.
///
/// `killpg` never blocks, so the wait is plain async sleeps on the runner's
/// task — the same task that just observed the cancellation or timeout.
async fn stop_agent_group(pgid: i32) {
    use nix::sys::signal::{killpg, Signal};

    let pgid = Pid::from_raw(pgid);
    if killpg(pgid, Signal::SIGTERM) == Err(nix::errno::Errno::ESRCH) {
        return;
    }

    let deadline = tokio::time::Instant::now() + AGENT_STOP_GRACE;
    while tokio::time::Instant::now() < deadline {
        if killpg(pgid, None) == Err(nix::errno::Errno::ESRCH) {
            return;
        }
        tokio::time::sleep(AGENT_STOP_POLL).await;
    }

    if killpg(pgid, Signal::SIGKILL).is_err() {
        log_warn!("Failed to SIGKILL agent process group {}", pgid);
    }
}

// --- Pipeline runner ---

/// Runs each configured phase as one agent CLI subprocess, with per-phase
/// retries. A failed phase fails the pipeline; the rest are reported
/// skipped.
pub struct AgentPipelineRunner {
    providers: Vec<ProviderConfig>,
    phases: Vec<String>,
    root: PathBuf,
    phase_timeout: Duration,
    max_retries: u32,
}

impl AgentPipelineRunner {
    pub fn new(config: &BoardConfig, root: &Path) -> Self {
        Self {
            providers: config.providers.clone(),
            phases: config.phases.iter().map(|p| p.name.clone()).collect(),
            root: root.to_path_buf(),
            phase_timeout: Duration::from_secs(
                config.execution.phase_timeout_minutes as u64 * 60,
            ),
            max_retries: config.execution.max_retries,
        }
    }

    fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    fn result_file_path(&self, bead_id: &str, phase: &str) -> PathBuf {
        self.root
            .join(".beadboard")
            .join(format!("phase_result_{}_{}.json", bead_id, phase))
    }

    /// Run one phase to a terminal update. `Err` only on cancellation.
    async fn run_phase(
        &self,
        provider: &ProviderConfig,
        input: &PipelineInput,
        phase: &str,
        events: &EventSender,
    ) -> Result<PhaseUpdate, DashError> {
        let max_attempts = self.max_retries + 1;
        let result_path = self.result_file_path(&input.bead_id, phase);
        let started = Instant::now();
        let mut failure_context: Option<String> = None;

        for attempt in 1..=max_attempts {
            if events.is_cancelled() {
                return Err(DashError::Pipeline("cancelled".to_string()));
            }
            log_info!(
                "[{}][{}] starting phase (attempt {}/{})",
                input.bead_id,
                phase,
                attempt,
                max_attempts
            );
            events
                .send(WorkerEvent::PhaseUpdate(PhaseUpdate {
                    phase: phase.to_string(),
                    status: PhaseStatus::Running,
                    attempt,
                    max_retry: max_attempts,
                    ..Default::default()
                }))
                .await;

            let prompt = build_phase_prompt(input, phase, &result_path, failure_context.as_deref());
            let mut cmd = tokio::process::Command::new(provider.cli.binary_name());
            cmd.args(provider.cli.build_args(&prompt, provider.model.as_deref()));
            cmd.current_dir(&self.root);

            match run_agent_subprocess(cmd, &result_path, self.phase_timeout, events.cancel_token())
                .await
            {
                Ok(result) => {
                    if let Err(e) = validate_result_identity(&result, phase) {
                        return Ok(terminal_update(
                            phase,
                            PhaseStatus::Error,
                            attempt,
                            max_attempts,
                            started.elapsed(),
                            e,
                            String::new(),
                            Vec::new(),
                        ));
                    }
                    if result.passed() {
                        return Ok(terminal_update(
                            phase,
                            PhaseStatus::Passed,
                            attempt,
                            max_attempts,
                            started.elapsed(),
                            result.summary,
                            String::new(),
                            result.files_changed,
                        ));
                    }
                    if attempt >= max_attempts {
                        return Ok(terminal_update(
                            phase,
                            PhaseStatus::Failed,
                            attempt,
                            max_attempts,
                            started.elapsed(),
                            result.summary,
                            result.feedback,
                            result.files_changed,
                        ));
                    }
                    log_info!(
                        "[{}][{}] failed (attempt {}/{}): {}",
                        input.bead_id,
                        phase,
                        attempt,
                        max_attempts,
                        result.summary
                    );
                    failure_context = Some(result.summary);
                }
                Err(AgentFailure::Cancelled) => {
                    return Err(DashError::Pipeline("cancelled".to_string()));
                }
                Err(AgentFailure::Failed(e)) => {
                    if attempt >= max_attempts {
                        return Ok(terminal_update(
                            phase,
                            PhaseStatus::Error,
                            attempt,
                            max_attempts,
                            started.elapsed(),
                            e,
                            String::new(),
                            Vec::new(),
                        ));
                    }
                    log_info!(
                        "[{}][{}] agent error (attempt {}/{}): {}",
                        input.bead_id,
                        phase,
                        attempt,
                        max_attempts,
                        e
                    );
                    failure_context = Some(e);
                }
            }
        }

        // Unreachable given the loop bounds; report rather than panic.
        Ok(terminal_update(
            phase,
            PhaseStatus::Error,
            max_attempts,
            max_attempts,
            started.elapsed(),
            "retry loop exited unexpectedly".to_string(),
            String::new(),
            Vec::new(),
        ))
    }
}

#[allow(clippy::too_many_arguments)]
fn terminal_update(
    phase: &str,
    status: PhaseStatus,
    attempt: u32,
    max_retry: u32,
    duration: Duration,
    summary: String,
    feedback: String,
    files_changed: Vec<String>,
) -> PhaseUpdate {
    PhaseUpdate {
        phase: phase.to_string(),
        status,
        attempt,
        max_retry,
        duration,
        summary,
        feedback,
        files_changed,
    }
}

#[async_trait::async_trait]
impl PipelineRunner for AgentPipelineRunner {
    async fn run(
        &self,
        input: PipelineInput,
        events: EventSender,
    ) -> Result<PipelineOutput, DashError> {
        validate_bead_id(&input.bead_id)?;
        let provider = self
            .provider(&input.provider)
            .ok_or_else(|| DashError::Pipeline(format!("unknown provider '{}'", input.provider)))?;

        let mut reports: Vec<PhaseReport> = Vec::new();
        let mut failed_phase: Option<String> = None;

        for phase in &self.phases {
            if failed_phase.is_some() {
                events
                    .send(WorkerEvent::PhaseUpdate(PhaseUpdate {
                        phase: phase.clone(),
                        status: PhaseStatus::Skipped,
                        ..Default::default()
                    }))
                    .await;
                continue;
            }

            let terminal = self.run_phase(provider, &input, phase, &events).await?;
            events
                .send(WorkerEvent::PhaseUpdate(terminal.clone()))
                .await;
            reports.push(PhaseReport::from_update(&terminal));
            if terminal.status != PhaseStatus::Passed {
                failed_phase = Some(format!("{}: {}", phase, terminal.summary));
            }
        }

        Ok(PipelineOutput {
            bead_id: input.bead_id,
            success: failed_phase.is_none(),
            summary: failed_phase,
            reports,
        })
    }
}

fn build_phase_prompt(
    input: &PipelineInput,
    phase: &str,
    result_path: &Path,
    failure_context: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are executing the '{}' phase of a development pipeline for work \
         item {} (\"{}\", type {}).\n\n",
        phase, input.bead_id, input.bead_title, input.bead_type
    );
    if let Some(context) = failure_context {
        prompt.push_str(&format!(
            "The previous attempt at this phase failed:\n{}\n\nAddress that \
             failure in this attempt.\n\n",
            context
        ));
    }
    prompt.push_str(&format!(
        "When the phase is complete, write a JSON file to {} with the shape:\n\
         {{\"phase\": \"{}\", \"outcome\": \"passed\"|\"failed\", \
         \"summary\": \"…\", \"feedback\": \"…\", \"files_changed\": [\"…\"]}}\n",
        result_path.display(),
        phase
    ));
    prompt
}

// --- Campaign runner ---

/// Sequences one pipeline per open child, in queue order, then optionally
/// runs a validation command against the parent.
pub struct SequentialCampaignRunner {
    validation_command: Option<String>,
    root: PathBuf,
}

impl SequentialCampaignRunner {
    pub fn new(validation_command: Option<String>, root: &Path) -> Self {
        Self {
            validation_command,
            root: root.to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl CampaignRunner for SequentialCampaignRunner {
    async fn run(
        &self,
        input: CampaignInput,
        events: EventSender,
        pipeline: std::sync::Arc<dyn PipelineRunner>,
    ) -> Result<CampaignOutcome, DashError> {
        validate_bead_id(&input.parent_id)?;
        let mut outcome = CampaignOutcome::default();

        for (index, task) in input.tasks.iter().enumerate() {
            // Cancellation between tasks: stop quietly with what finished.
            if events.is_cancelled() {
                return Ok(outcome);
            }
            events
                .send(WorkerEvent::CampaignTaskStart { index })
                .await;

            let started = Instant::now();
            let child_input = PipelineInput {
                bead_id: task.id.clone(),
                bead_title: task.title.clone(),
                bead_type: BeadType::Task,
                provider: input.provider.clone(),
            };
            let (success, reports) = match pipeline.run(child_input, events.clone()).await {
                Ok(output) => (output.success, output.reports),
                Err(err) => {
                    if events.is_cancelled() {
                        return Ok(outcome);
                    }
                    log_warn!("child pipeline for {} errored: {}", task.id, err);
                    (false, Vec::new())
                }
            };

            if success {
                outcome.completed += 1;
            } else {
                outcome.failed += 1;
            }
            events
                .send(WorkerEvent::CampaignTaskDone {
                    index,
                    success,
                    duration: started.elapsed(),
                    reports,
                })
                .await;
        }

        if let Some(command) = &self.validation_command {
            if !events.is_cancelled() {
                events.send(WorkerEvent::CampaignValidationStart).await;
                let (passed, summary) =
                    run_check_command(command, &input.parent_id, &self.root).await;
                events
                    .send(WorkerEvent::CampaignValidationDone { passed, summary })
                    .await;
            }
        }

        Ok(outcome)
    }
}

// --- Post action ---

/// Runs a configured shell command with the bead id appended. Used for the
/// post-pipeline merge/close/cleanup hook.
pub struct CommandPostAction {
    command: String,
    root: PathBuf,
}

impl CommandPostAction {
    pub fn new(command: &str, root: &Path) -> Self {
        Self {
            command: command.to_string(),
            root: root.to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl PostAction for CommandPostAction {
    async fn run(&self, bead_id: &str) -> Result<(), DashError> {
        validate_bead_id(bead_id)?;
        let (ok, summary) = run_check_command(&self.command, bead_id, &self.root).await;
        if ok {
            Ok(())
        } else {
            Err(DashError::PostAction(summary))
        }
    }
}

/// Run `{command} {id}` through the shell and reduce it to a verdict plus a
/// one-line summary (last stdout line on success, trimmed stderr on
/// failure). The id is passed as a positional parameter so it is never
/// parsed as shell syntax.
async fn run_check_command(command: &str, bead_id: &str, root: &Path) -> (bool, String) {
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(format!("{} \"$0\"", command))
        .arg(bead_id)
        .current_dir(root)
        .stdin(std::process::Stdio::null())
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let summary = stdout
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("ok")
                .trim()
                .to_string();
            (true, summary)
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let summary = if stderr.trim().is_empty() {
                format!("exit code {:?}", output.status.code())
            } else {
                stderr.trim().to_string()
            };
            (false, summary)
        }
        Err(e) => (false, format!("failed to run command: {}", e)),
    }
}

// --- Mock runners ---

/// Scripted pipeline runner for tests: each `run` call replays the next
/// scripted event batch and returns its result.
pub struct MockPipelineRunner {
    script: tokio::sync::Mutex<Vec<MockPipelineRun>>,
}

pub struct MockPipelineRun {
    pub updates: Vec<PhaseUpdate>,
    pub result: Result<PipelineOutput, String>,
}

impl MockPipelineRunner {
    /// Runs are consumed in order; extra calls fail loudly.
    pub fn new(runs: Vec<MockPipelineRun>) -> Self {
        let mut reversed = runs;
        reversed.reverse();
        Self {
            script: tokio::sync::Mutex::new(reversed),
        }
    }
}

#[async_trait::async_trait]
impl PipelineRunner for MockPipelineRunner {
    async fn run(
        &self,
        _input: PipelineInput,
        events: EventSender,
    ) -> Result<PipelineOutput, DashError> {
        let run = self.script.lock().await.pop();
        let Some(run) = run else {
            return Err(DashError::Pipeline(
                "MockPipelineRunner: no more scripted runs".to_string(),
            ));
        };
        for update in run.updates {
            events.send(WorkerEvent::PhaseUpdate(update)).await;
        }
        run.result.map_err(DashError::Pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_identity_mismatch_is_rejected() {
        let result = PhaseResultFile {
            phase: "code".to_string(),
            outcome: "passed".to_string(),
            summary: String::new(),
            feedback: String::new(),
            files_changed: Vec::new(),
        };
        assert!(validate_result_identity(&result, "code").is_ok());
        assert!(validate_result_identity(&result, "plan").is_err());
    }

    #[test]
    fn result_file_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        std::fs::write(
            &path,
            r#"{"phase": "plan", "outcome": "failed", "summary": "missed a case",
                "feedback": "handle empty input", "files_changed": ["src/lib.rs"]}"#,
        )
        .unwrap();
        let result = read_result_file(&path).unwrap();
        assert_eq!(result.phase, "plan");
        assert!(!result.passed());
        assert_eq!(result.feedback, "handle empty input");
        assert_eq!(result.files_changed, vec!["src/lib.rs".to_string()]);

        assert!(read_result_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn prompt_names_phase_result_path_and_failure() {
        let input = PipelineInput {
            bead_id: "cap-002".to_string(),
            bead_title: "Add cache".to_string(),
            bead_type: BeadType::Task,
            provider: "claude".to_string(),
        };
        let path = PathBuf::from("/tmp/result.json");
        let prompt = build_phase_prompt(&input, "code", &path, Some("tests failed"));
        assert!(prompt.contains("'code' phase"));
        assert!(prompt.contains("cap-002"));
        assert!(prompt.contains("/tmp/result.json"));
        assert!(prompt.contains("tests failed"));

        let prompt = build_phase_prompt(&input, "code", &path, None);
        assert!(!prompt.contains("previous attempt"));
    }

    #[tokio::test]
    async fn check_command_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let (ok, summary) = run_check_command("echo done for", "cap-1", dir.path()).await;
        assert!(ok);
        assert_eq!(summary, "done for cap-1");

        let (ok, _) = run_check_command("false", "cap-1", dir.path()).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn post_action_rejects_unsafe_id() {
        let dir = tempfile::tempdir().unwrap();
        let action = CommandPostAction::new("echo", dir.path());
        let err = action.run("cap-1; rm -rf /").await.unwrap_err();
        assert!(err.is_invalid_id());
    }
}
