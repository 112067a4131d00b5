use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::DashError;
use crate::ports::{validate_bead_id, Lister, Resolver};
use crate::types::{parse_bead_type, BeadDetail, BeadSummary};

/// Timeout for one `bd` invocation. The store is on the interactive path,
/// so a hung CLI must not wedge the refresh forever.
const BD_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

// --- Wire format ---

/// One bead as printed by `bd … --json`. Fields the dashboard does not use
/// are simply not declared.
#[derive(Debug, Deserialize)]
struct RawBead {
    id: String,
    title: String,
    #[serde(default)]
    priority: u8,
    #[serde(default)]
    issue_type: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    acceptance_criteria: String,
    #[serde(default)]
    epic_id: Option<String>,
    #[serde(default)]
    epic_title: Option<String>,
    #[serde(default)]
    feature_id: Option<String>,
    #[serde(default)]
    feature_title: Option<String>,
}

impl RawBead {
    fn closed(&self) -> bool {
        self.status == "closed"
    }

    fn summary(&self) -> BeadSummary {
        BeadSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            priority: self.priority,
            bead_type: parse_bead_type(&self.issue_type),
            closed: self.closed(),
        }
    }

    fn detail(self) -> BeadDetail {
        let closed = self.closed();
        BeadDetail {
            bead_type: parse_bead_type(&self.issue_type),
            id: self.id,
            title: self.title,
            priority: self.priority,
            closed,
            description: self.description,
            acceptance: self.acceptance_criteria,
            epic_id: self.epic_id,
            epic_title: self.epic_title,
            feature_id: self.feature_id,
            feature_title: self.feature_title,
        }
    }
}

fn parse_bead_list(raw: &str) -> Result<Vec<BeadSummary>, serde_json::Error> {
    let beads: Vec<RawBead> = serde_json::from_str(raw)?;
    Ok(beads.iter().map(RawBead::summary).collect())
}

fn parse_bead_detail(raw: &str) -> Result<BeadDetail, serde_json::Error> {
    // `bd show --json` prints a single-element array in some versions and a
    // bare object in others; accept both.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ShowOutput {
        One(RawBead),
        Many(Vec<RawBead>),
    }
    match serde_json::from_str(raw)? {
        ShowOutput::One(bead) => Ok(bead.detail()),
        ShowOutput::Many(beads) => beads
            .into_iter()
            .next()
            .map(RawBead::detail)
            .ok_or_else(|| serde::de::Error::custom("empty bead array")),
    }
}

// --- CLI store ---

/// Lister + Resolver over the `bd` beads CLI.
pub struct BdCliStore {
    binary: String,
    root: PathBuf,
    timeout: Duration,
}

impl BdCliStore {
    pub fn new(binary: &str, root: &Path) -> Self {
        Self {
            binary: binary.to_string(),
            root: root.to_path_buf(),
            timeout: BD_COMMAND_TIMEOUT,
        }
    }

    async fn run_bd(&self, args: &[&str]) -> Result<String, String> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(std::process::Stdio::null());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                format!(
                    "{} {} timed out after {}s",
                    self.binary,
                    args.first().unwrap_or(&""),
                    self.timeout.as_secs()
                )
            })?
            .map_err(|e| format!("Failed to run {}: {}", self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} {} failed: {}",
                self.binary,
                args.first().unwrap_or(&""),
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl Lister for BdCliStore {
    async fn ready(&self) -> Result<Vec<BeadSummary>, DashError> {
        let raw = self
            .run_bd(&["ready", "--json"])
            .await
            .map_err(DashError::Lister)?;
        parse_bead_list(&raw).map_err(|e| DashError::Lister(format!("bad bead JSON: {}", e)))
    }

    async fn closed(&self, limit: usize) -> Result<Vec<BeadSummary>, DashError> {
        let limit = limit.to_string();
        let raw = self
            .run_bd(&["list", "--status", "closed", "--limit", &limit, "--json"])
            .await
            .map_err(DashError::Lister)?;
        parse_bead_list(&raw).map_err(|e| DashError::Lister(format!("bad bead JSON: {}", e)))
    }
}

#[async_trait::async_trait]
impl Resolver for BdCliStore {
    async fn resolve(&self, id: &str) -> Result<BeadDetail, DashError> {
        // Also keeps ids that look like flags out of the argv.
        validate_bead_id(id)?;
        let raw = self
            .run_bd(&["show", id, "--json"])
            .await
            .map_err(DashError::Resolver)?;
        parse_bead_detail(&raw).map_err(|e| DashError::Resolver(format!("bad bead JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BeadType;

    #[test]
    fn parses_ready_list() {
        let raw = r#"[
            {"id": "cap-001", "title": "Fix parser", "priority": 1, "issue_type": "task", "status": "open"},
            {"id": "cap-002", "title": "Add cache", "issue_type": "epic", "status": "in_progress"}
        ]"#;
        let beads = parse_bead_list(raw).unwrap();
        assert_eq!(beads.len(), 2);
        assert_eq!(beads[0].id, "cap-001");
        assert_eq!(beads[0].priority, 1);
        assert!(!beads[0].closed);
        assert_eq!(beads[1].bead_type, BeadType::Epic);
        assert_eq!(beads[1].priority, 0);
    }

    #[test]
    fn closed_status_maps_to_flag() {
        let raw = r#"[{"id": "cap-003", "title": "Done", "status": "closed"}]"#;
        let beads = parse_bead_list(raw).unwrap();
        assert!(beads[0].closed);
    }

    #[test]
    fn parses_detail_object_and_array_forms() {
        let object = r#"{
            "id": "cap-001", "title": "Fix parser", "status": "open",
            "description": "The parser drops trailing fields.",
            "acceptance_criteria": "Round-trips every fixture.",
            "epic_id": "cap-1", "epic_title": "Parser epic"
        }"#;
        let detail = parse_bead_detail(object).unwrap();
        assert_eq!(detail.description, "The parser drops trailing fields.");
        assert_eq!(detail.acceptance, "Round-trips every fixture.");
        assert_eq!(detail.epic_id.as_deref(), Some("cap-1"));

        let array = r#"[{"id": "cap-001", "title": "Fix parser", "status": "open"}]"#;
        assert_eq!(parse_bead_detail(array).unwrap().id, "cap-001");

        assert!(parse_bead_detail("[]").is_err());
    }

    #[tokio::test]
    async fn resolve_rejects_unsafe_id_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let store = BdCliStore::new("definitely-not-a-binary", dir.path());
        let err = store.resolve("--flag").await.unwrap_err();
        assert!(err.is_invalid_id());
    }
}
