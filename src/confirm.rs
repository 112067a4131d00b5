use crate::types::{BeadType, CampaignTaskInfo};

/// Pre-dispatch preview. A plain value: the root controller swallows every
/// key except confirm/cancel while this screen is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmState {
    pub bead_id: String,
    pub bead_type: BeadType,
    pub bead_title: String,
    /// Open direct children, enumerated at confirmation time.
    pub children: Vec<CampaignTaskInfo>,
    pub has_validation: bool,
    pub provider: String,
}

impl ConfirmState {
    /// Feature/epic beads with open children dispatch as a campaign;
    /// everything else as a single pipeline.
    pub fn is_campaign(&self) -> bool {
        self.bead_type.is_campaign_parent() && !self.children.is_empty()
    }

    pub fn view(&self) -> String {
        let mut lines = Vec::new();
        if self.is_campaign() {
            lines.push(format!(
                "Run campaign for {} \"{}\"?",
                self.bead_id, self.bead_title
            ));
            lines.push(String::new());
            lines.push(format!(
                "Step 1: run a pipeline for each of {} open children:",
                self.children.len()
            ));
            for (i, child) in self.children.iter().enumerate() {
                lines.push(format!("  {}. {}  {}", i + 1, child.id, child.title));
            }
            if self.has_validation {
                lines.push(String::new());
                lines.push("Step 2: validate the combined result".to_string());
            }
        } else {
            lines.push(format!(
                "Run pipeline for {} \"{}\"?",
                self.bead_id, self.bead_title
            ));
        }
        lines.push(String::new());
        lines.push(format!("Provider: {}", self.provider));
        lines.push(String::new());
        lines.push("[Enter] Confirm   [Esc] Cancel".to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(id: &str, title: &str) -> CampaignTaskInfo {
        CampaignTaskInfo {
            id: id.to_string(),
            title: title.to_string(),
        }
    }

    fn confirm(bead_type: BeadType, children: Vec<CampaignTaskInfo>) -> ConfirmState {
        ConfirmState {
            bead_id: "cap-1".to_string(),
            bead_type,
            bead_title: "Parser work".to_string(),
            children,
            has_validation: false,
            provider: "claude".to_string(),
        }
    }

    #[test]
    fn campaign_requires_parent_type_and_children() {
        assert!(confirm(BeadType::Feature, vec![child("cap-1.1", "a")]).is_campaign());
        assert!(confirm(BeadType::Epic, vec![child("cap-1.1", "a")]).is_campaign());
        assert!(!confirm(BeadType::Feature, vec![]).is_campaign());
        assert!(!confirm(BeadType::Task, vec![child("cap-1.1", "a")]).is_campaign());
    }

    #[test]
    fn pipeline_view_names_the_bead() {
        let view = confirm(BeadType::Task, vec![]).view();
        assert!(view.contains("Run pipeline for cap-1 \"Parser work\"?"));
        assert!(view.contains("[Enter] Confirm   [Esc] Cancel"));
        assert!(!view.contains("Step 2"));
    }

    #[test]
    fn campaign_view_enumerates_children_with_ordinals() {
        let view = confirm(
            BeadType::Epic,
            vec![child("cap-1.1", "First"), child("cap-1.2", "Second")],
        )
        .view();
        assert!(view.contains("Run campaign for cap-1"));
        assert!(view.contains("1. cap-1.1  First"));
        assert!(view.contains("2. cap-1.2  Second"));
        assert!(view.contains("[Enter] Confirm   [Esc] Cancel"));
    }

    #[test]
    fn validation_step_mentioned_when_configured() {
        let mut c = confirm(BeadType::Epic, vec![child("cap-1.1", "First")]);
        c.has_validation = true;
        assert!(c.view().contains("Step 2: validate"));
        c.has_validation = false;
        assert!(!c.view().contains("Step 2"));
    }
}
