use std::collections::HashMap;
use std::time::Duration;

use crate::msg::Key;
use crate::pipeline::{format_duration, PipelineState};
use crate::types::{
    CampaignOutcome, CampaignTaskInfo, CampaignTaskStatus, PhaseReport, PhaseStatus, PhaseUpdate,
};

/// State of a sequential campaign over the open children of a feature/epic.
///
/// The queue is fixed at dispatch. One embedded `PipelineState` tracks the
/// currently running task; completed tasks keep only their stored phase
/// reports. The selection cursor is independent of the running index.
#[derive(Debug, Clone)]
pub struct CampaignState {
    pub parent_id: String,
    pub parent_title: String,
    pub tasks: Vec<CampaignTaskInfo>,
    pub statuses: Vec<CampaignTaskStatus>,
    pub durations: Vec<Duration>,
    /// Stored phase reports keyed by bead id.
    pub reports: HashMap<String, Vec<PhaseReport>>,
    /// Index of the running task; `None` between tasks.
    pub current: Option<usize>,
    /// Cursor over the task queue.
    pub selected: usize,
    pub pipeline: PipelineState,
    pub completed: u32,
    pub failed: u32,
    pub validating: bool,
    pub validation: Option<(bool, String)>,
    phase_names: Vec<String>,
    provider: String,
}

impl CampaignState {
    pub fn new(
        parent_id: &str,
        parent_title: &str,
        tasks: Vec<CampaignTaskInfo>,
        phase_names: &[String],
        provider: &str,
    ) -> Self {
        let count = tasks.len();
        Self {
            parent_id: parent_id.to_string(),
            parent_title: parent_title.to_string(),
            tasks,
            statuses: vec![CampaignTaskStatus::Pending; count],
            durations: vec![Duration::ZERO; count],
            reports: HashMap::new(),
            current: None,
            selected: 0,
            pipeline: PipelineState::new(phase_names, "", "", provider),
            completed: 0,
            failed: 0,
            validating: false,
            validation: None,
            phase_names: phase_names.to_vec(),
            provider: provider.to_string(),
        }
    }

    // --- Worker events ---

    /// A task began: fresh embedded pipeline, status flips to running.
    pub fn task_start(&mut self, index: usize) {
        let Some(task) = self.tasks.get(index) else {
            return;
        };
        self.current = Some(index);
        self.statuses[index] = CampaignTaskStatus::Running;
        self.pipeline = PipelineState::new(&self.phase_names, &task.id, &task.title, &self.provider);
    }

    pub fn task_done(
        &mut self,
        index: usize,
        success: bool,
        duration: Duration,
        reports: Vec<PhaseReport>,
    ) {
        let Some(task) = self.tasks.get(index) else {
            return;
        };
        self.statuses[index] = if success {
            CampaignTaskStatus::Passed
        } else {
            CampaignTaskStatus::Failed
        };
        if success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.durations[index] = duration;
        self.reports.insert(task.id.clone(), reports);
        self.current = None;
    }

    pub fn apply_phase_update(&mut self, update: &PhaseUpdate) {
        self.pipeline.apply_update(update);
    }

    pub fn tick_spinner(&mut self) {
        self.pipeline.tick_spinner();
    }

    pub fn tick_elapsed(&mut self) {
        self.pipeline.tick_elapsed();
    }

    pub fn validation_start(&mut self) {
        self.validating = true;
    }

    pub fn validation_done(&mut self, passed: bool, summary: String) {
        self.validating = false;
        self.validation = Some((passed, summary));
    }

    /// Counters for synthesizing a terminal message when the channel closed
    /// without one.
    pub fn outcome(&self) -> CampaignOutcome {
        CampaignOutcome {
            completed: self.completed,
            failed: self.failed,
        }
    }

    /// When the worker stops early (error or cancellation), tasks that never
    /// started stay in the queue; mark them skipped so the summary reads
    /// honestly.
    pub fn mark_unstarted_skipped(&mut self) {
        for status in &mut self.statuses {
            if *status == CampaignTaskStatus::Pending {
                *status = CampaignTaskStatus::Skipped;
            }
        }
    }

    // --- Key handling ---

    pub fn handle_key(&mut self, key: Key) {
        if self.tasks.is_empty() {
            return;
        }
        match key {
            Key::Up | Key::Char('k') => {
                self.selected = if self.selected == 0 {
                    self.tasks.len() - 1
                } else {
                    self.selected - 1
                };
            }
            Key::Down | Key::Char('j') => {
                self.selected = (self.selected + 1) % self.tasks.len();
            }
            _ => {}
        }
    }

    // --- Views ---

    fn task_indicator(&self, index: usize) -> String {
        match self.statuses[index] {
            CampaignTaskStatus::Pending => "○".to_string(),
            CampaignTaskStatus::Running => self.pipeline.spinner_frame().to_string(),
            CampaignTaskStatus::Passed => "✓".to_string(),
            CampaignTaskStatus::Failed => "✗".to_string(),
            CampaignTaskStatus::Skipped => "–".to_string(),
        }
    }

    /// Left pane: queue with the running task's phases inlined beneath it,
    /// and stored reports expanded under the selected completed task.
    pub fn view(&self) -> String {
        let done = self.completed + self.failed;
        let mut lines = vec![
            format!(
                "{}  {}  {}/{}",
                self.parent_id,
                self.parent_title,
                done,
                self.tasks.len()
            ),
            String::new(),
        ];

        for (i, task) in self.tasks.iter().enumerate() {
            let marker = if i == self.selected { "> " } else { "  " };
            let mut line = format!("{}{} {}  {}", marker, self.task_indicator(i), task.id, task.title);
            let dur = format_duration(self.durations[i]);
            if !dur.is_empty() {
                line.push_str(&format!("  {}", dur));
            }
            lines.push(line);

            if self.current == Some(i) {
                for phase_line in self.running_phase_lines() {
                    lines.push(format!("      {}", phase_line));
                }
            } else if i == self.selected && self.is_terminal(i) {
                for report_line in self.stored_report_lines(&task.id) {
                    lines.push(format!("      {}", report_line));
                }
            }
        }

        if self.validating {
            lines.push(String::new());
            lines.push(format!(
                "{} Validating campaign…",
                self.pipeline.spinner_frame()
            ));
        } else if let Some((passed, summary)) = &self.validation {
            lines.push(String::new());
            let verdict = if *passed { "passed" } else { "failed" };
            lines.push(format!("Validation {}: {}", verdict, summary));
        }

        lines.join("\n")
    }

    fn is_terminal(&self, index: usize) -> bool {
        matches!(
            self.statuses[index],
            CampaignTaskStatus::Passed | CampaignTaskStatus::Failed
        )
    }

    fn running_phase_lines(&self) -> Vec<String> {
        self.pipeline
            .phases
            .iter()
            .map(|entry| {
                let indicator = match entry.status {
                    PhaseStatus::Pending => "○".to_string(),
                    PhaseStatus::Running if self.pipeline.aborting => "⚠".to_string(),
                    PhaseStatus::Running => self.pipeline.spinner_frame().to_string(),
                    PhaseStatus::Passed => "✓".to_string(),
                    PhaseStatus::Failed | PhaseStatus::Error => "✗".to_string(),
                    PhaseStatus::Skipped => "–".to_string(),
                };
                let mut line = format!("{} {}", indicator, entry.name);
                if entry.status == PhaseStatus::Running {
                    line.push_str(&format!("  {}s", self.pipeline.elapsed_secs));
                }
                line
            })
            .collect()
    }

    fn stored_report_lines(&self, bead_id: &str) -> Vec<String> {
        let Some(reports) = self.reports.get(bead_id) else {
            return Vec::new();
        };
        reports
            .iter()
            .map(|report| {
                let indicator = if report.status == PhaseStatus::Passed {
                    "✓"
                } else {
                    "✗"
                };
                let mut line = format!("{} {}", indicator, report.phase_name);
                let dur = format_duration(report.duration);
                if !dur.is_empty() {
                    line.push_str(&format!("  {}", dur));
                }
                line
            })
            .collect()
    }

    /// Right pane: live report for the running task, stored reports for a
    /// terminal task, empty otherwise.
    pub fn view_report(&self) -> String {
        if self.current == Some(self.selected) {
            return self.pipeline.view_report();
        }
        if !self.is_terminal(self.selected) {
            return String::new();
        }
        let Some(task) = self.tasks.get(self.selected) else {
            return String::new();
        };
        let Some(reports) = self.reports.get(&task.id) else {
            return String::new();
        };

        let mut paragraphs = Vec::with_capacity(reports.len());
        for report in reports {
            let verdict = if report.status == PhaseStatus::Passed {
                "Passed"
            } else {
                "Failed"
            };
            let mut text = format!("{}  {}", report.phase_name, verdict);
            let dur = format_duration(report.duration);
            if !dur.is_empty() {
                text.push_str(&format!("  {}", dur));
            }
            if !report.summary.is_empty() {
                text.push_str(&format!("\n{}", report.summary));
            }
            paragraphs.push(text);
        }
        paragraphs.join("\n\n")
    }
}
