use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::ports::{ArchiveReader, CampaignRunner, Lister, PipelineRunner, PostAction, Resolver};

pub const DEFAULT_CLOSED_FETCH_LIMIT: usize = 50;

// --- File config ---

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BoardConfig {
    pub project: ProjectConfig,
    pub execution: ExecutionConfig,
    pub providers: Vec<ProviderConfig>,
    pub active_provider: String,
    pub phases: Vec<PhaseConfig>,
    pub campaign: CampaignConfig,
    pub post_action: PostActionConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Binary used to read the beads backlog.
    pub bead_cli: String,
    /// Directory holding archived summary/worklog files for closed beads,
    /// relative to the project root.
    pub archive_dir: String,
    /// Advisory limit for the recently-closed fetch.
    pub closed_fetch_limit: usize,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub phase_timeout_minutes: u32,
    pub max_retries: u32,
}

#[derive(Default, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CliTool {
    #[default]
    Claude,
    OpenCode,
}

impl CliTool {
    pub fn binary_name(&self) -> &str {
        match self {
            CliTool::Claude => "claude",
            CliTool::OpenCode => "opencode",
        }
    }

    pub fn build_args(&self, prompt: &str, model: Option<&str>) -> Vec<String> {
        match self {
            CliTool::Claude => {
                let mut args = vec!["--dangerously-skip-permissions".to_string()];
                if let Some(m) = model {
                    args.push("--model".to_string());
                    args.push(m.to_string());
                }
                args.push("-p".to_string());
                args.push(prompt.to_string());
                args
            }
            CliTool::OpenCode => {
                let mut args = vec!["run".to_string()];
                if let Some(m) = model {
                    args.push("--model".to_string());
                    args.push(m.to_string());
                }
                args.push("--quiet".to_string());
                args.push(prompt.to_string());
                args
            }
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub cli: CliTool,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PhaseConfig {
    pub name: String,
}

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CampaignConfig {
    /// When set, runs after the last child pipeline with the parent bead id
    /// appended; exit status decides the validation verdict.
    pub validation_command: Option<String>,
}

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PostActionConfig {
    /// Command run with the bead id appended after a successful background
    /// pipeline (merge/close/cleanup hook).
    pub command: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            bead_cli: "bd".to_string(),
            archive_dir: "_archive".to_string(),
            closed_fetch_limit: DEFAULT_CLOSED_FETCH_LIMIT,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            phase_timeout_minutes: 30,
            max_retries: 2,
        }
    }
}

pub fn default_phases() -> Vec<PhaseConfig> {
    ["plan", "code", "test", "review"]
        .iter()
        .map(|name| PhaseConfig {
            name: name.to_string(),
        })
        .collect()
}

pub fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        name: "claude".to_string(),
        cli: CliTool::Claude,
        model: None,
    }]
}

/// Fill in defaults that can't be expressed through `#[serde(default)]`
/// because empty tables are meaningful in toml.
pub fn normalize(config: &mut BoardConfig) {
    if config.phases.is_empty() {
        config.phases = default_phases();
    }
    if config.providers.is_empty() {
        config.providers = default_providers();
    }
    if config.active_provider.is_empty() {
        config.active_provider = config.providers[0].name.clone();
    }
}

/// Validate a normalized config. Collects every problem instead of stopping
/// at the first.
pub fn validate(config: &BoardConfig) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if config.phases.is_empty() {
        problems.push("phases must not be empty".to_string());
    }
    if config.project.closed_fetch_limit == 0 {
        problems.push("project.closed_fetch_limit must be at least 1".to_string());
    }
    if config.execution.phase_timeout_minutes == 0 {
        problems.push("execution.phase_timeout_minutes must be at least 1".to_string());
    }
    if !config
        .providers
        .iter()
        .any(|p| p.name == config.active_provider)
    {
        problems.push(format!(
            "active_provider '{}' is not a configured provider",
            config.active_provider
        ));
    }
    let mut names: Vec<&str> = config.providers.iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    if names.len() != config.providers.len() {
        problems.push("provider names must be unique".to_string());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Load config from an explicit path. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<BoardConfig, String> {
    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        toml::from_str(&raw).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?
    } else {
        BoardConfig::default()
    };
    normalize(&mut config);
    validate(&config).map_err(|problems| {
        format!(
            "Invalid config {}:\n  {}",
            path.display(),
            problems.join("\n  ")
        )
    })?;
    Ok(config)
}

/// Load `beadboard.toml` from the project root.
pub fn load_config(project_root: &Path) -> Result<BoardConfig, String> {
    load_config_from(&project_root.join("beadboard.toml"))
}

// --- Dashboard options ---

/// Builder-style construction surface for the dashboard. Collaborators are
/// optional; the dashboard degrades feature by feature when one is absent.
#[derive(Clone, Default)]
pub struct DashboardOptions {
    pub lister: Option<Arc<dyn Lister>>,
    pub resolver: Option<Arc<dyn Resolver>>,
    pub pipeline_runner: Option<Arc<dyn PipelineRunner>>,
    pub campaign_runner: Option<Arc<dyn CampaignRunner>>,
    pub post_action: Option<Arc<dyn PostAction>>,
    pub archive: Option<Arc<dyn ArchiveReader>>,
    pub phase_names: Vec<String>,
    pub has_campaign_validation: bool,
    pub provider_names: Vec<String>,
    pub active_provider: String,
    pub closed_fetch_limit: usize,
}

impl DashboardOptions {
    pub fn new(phase_names: Vec<String>) -> Self {
        Self {
            phase_names,
            closed_fetch_limit: DEFAULT_CLOSED_FETCH_LIMIT,
            ..Default::default()
        }
    }

    pub fn with_lister(mut self, lister: Arc<dyn Lister>) -> Self {
        self.lister = Some(lister);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_pipeline_runner(mut self, runner: Arc<dyn PipelineRunner>) -> Self {
        self.pipeline_runner = Some(runner);
        self
    }

    pub fn with_campaign_runner(mut self, runner: Arc<dyn CampaignRunner>) -> Self {
        self.campaign_runner = Some(runner);
        self
    }

    pub fn with_post_action(mut self, action: Arc<dyn PostAction>) -> Self {
        self.post_action = Some(action);
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn ArchiveReader>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_campaign_validation(mut self, enabled: bool) -> Self {
        self.has_campaign_validation = enabled;
        self
    }

    pub fn with_providers(mut self, names: Vec<String>, active: &str) -> Self {
        self.provider_names = names;
        self.active_provider = active.to_string();
        self
    }

    pub fn with_closed_fetch_limit(mut self, limit: usize) -> Self {
        self.closed_fetch_limit = limit;
        self
    }
}
