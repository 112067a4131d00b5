#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use beadboard::config::DashboardOptions;
use beadboard::error::DashError;
use beadboard::ports::{ArchiveReader, Lister, Resolver};
use beadboard::types::{BeadDetail, BeadSummary, BeadType, PhaseStatus, PhaseUpdate};

/// Creates a `BeadSummary` with minimal defaults: priority 2, type task,
/// open, title auto-generated from the id.
pub fn make_bead(id: &str) -> BeadSummary {
    BeadSummary {
        id: id.to_string(),
        title: format!("Bead {}", id),
        priority: 2,
        bead_type: BeadType::Task,
        closed: false,
    }
}

pub fn make_epic(id: &str) -> BeadSummary {
    BeadSummary {
        bead_type: BeadType::Epic,
        ..make_bead(id)
    }
}

pub fn make_feature(id: &str) -> BeadSummary {
    BeadSummary {
        bead_type: BeadType::Feature,
        ..make_bead(id)
    }
}

pub fn make_closed(id: &str) -> BeadSummary {
    BeadSummary {
        closed: true,
        ..make_bead(id)
    }
}

pub fn make_detail(id: &str) -> BeadDetail {
    BeadDetail {
        id: id.to_string(),
        title: format!("Bead {}", id),
        priority: 2,
        description: format!("Description of {}", id),
        acceptance: "It works.".to_string(),
        ..Default::default()
    }
}

pub fn phase_running(phase: &str) -> PhaseUpdate {
    PhaseUpdate {
        phase: phase.to_string(),
        status: PhaseStatus::Running,
        ..Default::default()
    }
}

pub fn phase_terminal(phase: &str, status: PhaseStatus, summary: &str) -> PhaseUpdate {
    PhaseUpdate {
        phase: phase.to_string(),
        status,
        summary: summary.to_string(),
        ..Default::default()
    }
}

pub fn default_phase_names() -> Vec<String> {
    ["plan", "code", "test", "review"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// --- Mock collaborators ---

/// Lister returning fixed lists; errors when a scripted error is set.
pub struct MockLister {
    pub ready: Vec<BeadSummary>,
    pub closed: Vec<BeadSummary>,
    pub ready_error: Option<String>,
    pub closed_error: Option<String>,
}

impl MockLister {
    pub fn new(ready: Vec<BeadSummary>, closed: Vec<BeadSummary>) -> Self {
        Self {
            ready,
            closed,
            ready_error: None,
            closed_error: None,
        }
    }
}

#[async_trait::async_trait]
impl Lister for MockLister {
    async fn ready(&self) -> Result<Vec<BeadSummary>, DashError> {
        match &self.ready_error {
            Some(e) => Err(DashError::Lister(e.clone())),
            None => Ok(self.ready.clone()),
        }
    }

    async fn closed(&self, limit: usize) -> Result<Vec<BeadSummary>, DashError> {
        match &self.closed_error {
            Some(e) => Err(DashError::Lister(e.clone())),
            None => Ok(self.closed.iter().take(limit).cloned().collect()),
        }
    }
}

/// Resolver over a fixed map, counting invocations per id.
pub struct MockResolver {
    details: HashMap<String, BeadDetail>,
    pub calls: std::sync::Mutex<Vec<String>>,
}

impl MockResolver {
    pub fn new(details: Vec<BeadDetail>) -> Self {
        Self {
            details: details.into_iter().map(|d| (d.id.clone(), d)).collect(),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self, id: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|c| c.as_str() == id).count())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, id: &str) -> Result<BeadDetail, DashError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(id.to_string());
        }
        self.details
            .get(id)
            .cloned()
            .ok_or_else(|| DashError::Resolver(format!("unknown bead {}", id)))
    }
}

/// Archive with fixed summary/worklog text per bead id.
pub struct MockArchive {
    pub summaries: HashMap<String, String>,
    pub worklogs: HashMap<String, String>,
}

impl MockArchive {
    pub fn new() -> Self {
        Self {
            summaries: HashMap::new(),
            worklogs: HashMap::new(),
        }
    }
}

impl ArchiveReader for MockArchive {
    fn read_summary(&self, id: &str) -> Result<String, DashError> {
        beadboard::ports::validate_bead_id(id)?;
        self.summaries
            .get(id)
            .cloned()
            .ok_or_else(|| DashError::NotFound(id.to_string()))
    }

    fn read_worklog(&self, id: &str) -> Result<String, DashError> {
        beadboard::ports::validate_bead_id(id)?;
        self.worklogs
            .get(id)
            .cloned()
            .ok_or_else(|| DashError::NotFound(id.to_string()))
    }
}

/// Post action recording the ids it ran for.
pub struct MockPostAction {
    pub calls: std::sync::Mutex<Vec<String>>,
    pub fail_with: Option<String>,
}

impl MockPostAction {
    pub fn new() -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            fail_with: None,
        }
    }
}

#[async_trait::async_trait]
impl beadboard::ports::PostAction for MockPostAction {
    async fn run(&self, bead_id: &str) -> Result<(), DashError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(bead_id.to_string());
        }
        match &self.fail_with {
            Some(e) => Err(DashError::PostAction(e.clone())),
            None => Ok(()),
        }
    }
}

/// Options with a lister/resolver over the given beads and the default
/// phase list; runners are left unset so tests wire their own.
pub fn options_with_store(
    ready: Vec<BeadSummary>,
    details: Vec<BeadDetail>,
) -> (DashboardOptions, Arc<MockResolver>) {
    let resolver = Arc::new(MockResolver::new(details));
    let options = DashboardOptions::new(default_phase_names())
        .with_lister(Arc::new(MockLister::new(ready, Vec::new())))
        .with_resolver(resolver.clone())
        .with_providers(vec!["claude".to_string()], "claude");
    (options, resolver)
}
