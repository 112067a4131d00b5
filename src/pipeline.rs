use std::collections::HashMap;
use std::time::Duration;

use crate::msg::Key;
use crate::types::{PhaseEntry, PhaseReport, PhaseStatus, PhaseUpdate};

/// Braille spinner frames, advanced by the spinner tick.
pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Render a duration as compact seconds/minutes text; empty when zero.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        return String::new();
    }
    if secs < 60 {
        format!("{}s", secs)
    } else {
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

// --- Pipeline state ---

/// Visible state of one pipeline run: the phase list, a cursor that follows
/// the running phase until the user navigates, and stored terminal reports.
/// Created at dispatch, persists through Summary, replaced wholesale by the
/// next dispatch.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub phases: Vec<PhaseEntry>,
    pub cursor: usize,
    pub auto_follow: bool,
    pub running: bool,
    pub reports: HashMap<String, PhaseReport>,
    pub aborting: bool,
    pub bead_id: String,
    pub bead_title: String,
    pub provider: String,
    pub spin: usize,
    /// Seconds since the current phase entered running, driven by the
    /// elapsed tick.
    pub elapsed_secs: u64,
}

impl PipelineState {
    pub fn new(phase_names: &[String], bead_id: &str, bead_title: &str, provider: &str) -> Self {
        Self {
            phases: phase_names.iter().map(|n| PhaseEntry::new(n)).collect(),
            cursor: 0,
            auto_follow: true,
            running: false,
            reports: HashMap::new(),
            aborting: false,
            bead_id: bead_id.to_string(),
            bead_title: bead_title.to_string(),
            provider: provider.to_string(),
            spin: 0,
            elapsed_secs: 0,
        }
    }

    /// Apply one status event from the runner.
    ///
    /// Unknown phase names are ignored so a runner upgrade cannot corrupt UI
    /// state. Zero attempt/retry/duration never overwrite known values. A
    /// terminal status stores a report for the phase, replacing any prior
    /// report under the same name.
    pub fn apply_update(&mut self, update: &PhaseUpdate) {
        let Some(idx) = self.phases.iter().position(|p| p.name == update.phase) else {
            return;
        };

        let was_running = self.phases[idx].status == PhaseStatus::Running;
        let entry = &mut self.phases[idx];
        entry.status = update.status;
        if update.attempt > 0 {
            entry.attempt = update.attempt;
        }
        if update.max_retry > 0 {
            entry.max_retry = update.max_retry;
        }
        if update.duration > Duration::ZERO {
            entry.duration = update.duration;
        }

        match update.status {
            PhaseStatus::Running => {
                self.running = true;
                if !was_running {
                    self.elapsed_secs = 0;
                }
                if self.auto_follow {
                    self.cursor = idx;
                }
            }
            status if status.is_terminal() => {
                self.reports
                    .insert(update.phase.clone(), PhaseReport::from_update(update));
            }
            _ => {}
        }
    }

    /// Manual navigation permanently disables auto-follow for this run.
    pub fn handle_key(&mut self, key: Key) {
        if self.phases.is_empty() {
            return;
        }
        match key {
            Key::Up | Key::Char('k') => {
                self.auto_follow = false;
                self.cursor = if self.cursor == 0 {
                    self.phases.len() - 1
                } else {
                    self.cursor - 1
                };
            }
            Key::Down | Key::Char('j') => {
                self.auto_follow = false;
                self.cursor = (self.cursor + 1) % self.phases.len();
            }
            _ => {}
        }
    }

    pub fn tick_spinner(&mut self) {
        self.spin = (self.spin + 1) % SPINNER_FRAMES.len();
    }

    pub fn tick_elapsed(&mut self) {
        self.elapsed_secs += 1;
    }

    pub fn spinner_frame(&self) -> &'static str {
        SPINNER_FRAMES[self.spin]
    }

    pub fn selected_phase(&self) -> Option<&PhaseEntry> {
        self.phases.get(self.cursor)
    }

    fn indicator(&self, entry: &PhaseEntry) -> String {
        match entry.status {
            PhaseStatus::Pending => "○".to_string(),
            PhaseStatus::Running if self.aborting => "⚠".to_string(),
            PhaseStatus::Running => self.spinner_frame().to_string(),
            PhaseStatus::Passed => "✓".to_string(),
            PhaseStatus::Failed | PhaseStatus::Error => "✗".to_string(),
            PhaseStatus::Skipped => "–".to_string(),
        }
    }

    /// One line per phase for the left pane.
    pub fn view(&self) -> String {
        let mut lines = Vec::with_capacity(self.phases.len() + 2);
        lines.push(format!("{}  {}", self.bead_id, self.bead_title));
        lines.push(String::new());

        for (i, entry) in self.phases.iter().enumerate() {
            let marker = if i == self.cursor { "> " } else { "  " };
            let mut line = format!("{}{} {}", marker, self.indicator(entry), entry.name);

            if entry.status == PhaseStatus::Running && self.aborting {
                line.push_str("  Aborting…");
            }
            if entry.attempt > 1 {
                line.push_str(&format!(" ({}/{})", entry.attempt, entry.max_retry));
            }
            let dur = format_duration(entry.duration);
            if !dur.is_empty() {
                line.push_str(&format!("  {}", dur));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// Report text for the phase under the cursor (right pane).
    pub fn view_report(&self) -> String {
        let Some(entry) = self.selected_phase() else {
            return String::new();
        };

        match entry.status {
            PhaseStatus::Pending => "Waiting…".to_string(),
            PhaseStatus::Running if self.aborting => {
                format!("{}  Aborting\n\nCleaning up…", entry.name)
            }
            PhaseStatus::Running => format!(
                "{}  Running\n\n{} {}s",
                entry.name,
                self.spinner_frame(),
                self.elapsed_secs
            ),
            PhaseStatus::Skipped => "Skipped".to_string(),
            _ => self.render_report(entry),
        }
    }

    fn render_report(&self, entry: &PhaseEntry) -> String {
        let Some(report) = self.reports.get(&entry.name) else {
            return "Waiting…".to_string();
        };

        let verdict = if report.status == PhaseStatus::Passed {
            "Passed"
        } else {
            "Failed"
        };
        let mut out = format!("{}  {}", report.phase_name, verdict);

        let dur = format_duration(report.duration);
        if !dur.is_empty() {
            out.push_str(&format!("  {}", dur));
        }
        if !report.summary.is_empty() {
            out.push_str(&format!("\n\n{}", report.summary));
        }
        if !report.files_changed.is_empty() {
            out.push_str("\n\nFiles changed:");
            for file in &report.files_changed {
                out.push_str(&format!("\n  {}", file));
            }
        }
        // Feedback renders only for non-passing phases.
        if report.status != PhaseStatus::Passed && !report.feedback.is_empty() {
            out.push_str(&format!("\n\nFeedback:\n{}", report.feedback));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase_names() -> Vec<String> {
        ["plan", "code", "test", "review"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn state() -> PipelineState {
        PipelineState::new(&phase_names(), "cap-002", "Add parser", "claude")
    }

    fn running(phase: &str) -> PhaseUpdate {
        PhaseUpdate {
            phase: phase.to_string(),
            status: PhaseStatus::Running,
            ..Default::default()
        }
    }

    fn terminal(phase: &str, status: PhaseStatus, summary: &str, secs: u64) -> PhaseUpdate {
        PhaseUpdate {
            phase: phase.to_string(),
            status,
            duration: Duration::from_secs(secs),
            summary: summary.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn auto_follow_tracks_running_phase() {
        let mut s = state();
        s.apply_update(&running("plan"));
        assert_eq!(s.cursor, 0);
        s.apply_update(&running("code"));
        assert_eq!(s.cursor, 1);
        assert!(s.running);
    }

    #[test]
    fn manual_navigation_locks_auto_follow() {
        let mut s = state();
        s.apply_update(&running("plan"));
        s.apply_update(&running("code"));
        s.handle_key(Key::Down);
        assert_eq!(s.cursor, 2);
        assert!(!s.auto_follow);
        s.apply_update(&running("test"));
        assert_eq!(s.cursor, 2, "cursor must stay after manual move");
    }

    #[test]
    fn cursor_wraps_both_directions() {
        let mut s = state();
        s.handle_key(Key::Up);
        assert_eq!(s.cursor, 3);
        s.handle_key(Key::Down);
        assert_eq!(s.cursor, 0);
    }

    #[test]
    fn unknown_phase_is_ignored() {
        let mut s = state();
        s.apply_update(&running("deploy"));
        assert!(!s.running);
        assert_eq!(s.cursor, 0);
        assert!(s.reports.is_empty());
    }

    #[test]
    fn zero_values_do_not_overwrite() {
        let mut s = state();
        let mut with_retry = running("plan");
        with_retry.attempt = 2;
        with_retry.max_retry = 3;
        with_retry.duration = Duration::from_secs(5);
        s.apply_update(&with_retry);
        // A later update with zeroed fields keeps the known values.
        s.apply_update(&running("plan"));
        assert_eq!(s.phases[0].attempt, 2);
        assert_eq!(s.phases[0].max_retry, 3);
        assert_eq!(s.phases[0].duration, Duration::from_secs(5));
    }

    #[test]
    fn latest_terminal_report_wins() {
        let mut s = state();
        s.apply_update(&terminal("plan", PhaseStatus::Passed, "A", 2));
        s.apply_update(&terminal("plan", PhaseStatus::Failed, "B", 3));
        let report = &s.reports["plan"];
        assert_eq!(report.status, PhaseStatus::Failed);
        assert_eq!(report.summary, "B");
        assert_eq!(report.duration, Duration::from_secs(3));
        assert_eq!(s.reports.len(), 1);
    }

    #[test]
    fn elapsed_resets_on_new_running_phase() {
        let mut s = state();
        s.apply_update(&running("plan"));
        s.tick_elapsed();
        s.tick_elapsed();
        assert_eq!(s.elapsed_secs, 2);
        s.apply_update(&running("code"));
        assert_eq!(s.elapsed_secs, 0);
    }

    #[test]
    fn retry_shown_only_after_first_attempt() {
        let mut s = state();
        let mut u = running("plan");
        u.attempt = 1;
        u.max_retry = 3;
        s.apply_update(&u);
        assert!(!s.view().contains("(1/3)"));
        u.attempt = 2;
        s.apply_update(&u);
        assert!(s.view().contains("(2/3)"));
    }

    #[test]
    fn aborting_running_phase_shows_warning() {
        let mut s = state();
        s.apply_update(&running("plan"));
        s.aborting = true;
        let view = s.view();
        assert!(view.contains("⚠"));
        assert!(view.contains("Aborting…"));
        assert!(s.view_report().contains("Aborting"));
    }

    #[test]
    fn passed_report_never_renders_feedback() {
        let mut s = state();
        let mut u = terminal("plan", PhaseStatus::Passed, "All good", 2);
        u.feedback = "should stay hidden".to_string();
        u.files_changed = vec!["src/lib.rs".to_string()];
        s.apply_update(&u);
        let report = s.view_report();
        assert!(report.contains("plan  Passed"));
        assert!(report.contains("Files changed:"));
        assert!(!report.contains("Feedback"));
    }

    #[test]
    fn failed_report_renders_feedback() {
        let mut s = state();
        let mut u = terminal("plan", PhaseStatus::Failed, "Broke", 2);
        u.feedback = "fix the tests".to_string();
        s.apply_update(&u);
        let report = s.view_report();
        assert!(report.contains("plan  Failed"));
        assert!(report.contains("Feedback:"));
        assert!(report.contains("fix the tests"));
    }

    #[test]
    fn pending_and_skipped_report_text() {
        let mut s = state();
        assert_eq!(s.view_report(), "Waiting…");
        s.apply_update(&PhaseUpdate {
            phase: "plan".into(),
            status: PhaseStatus::Skipped,
            ..Default::default()
        });
        assert_eq!(s.view_report(), "Skipped");
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::ZERO), "");
        assert_eq!(format_duration(Duration::from_secs(45)), "45s");
        assert_eq!(format_duration(Duration::from_secs(63)), "1m03s");
        assert_eq!(format_duration(Duration::from_secs(600)), "10m00s");
    }
}
