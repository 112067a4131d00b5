/// Error enum covering the dashboard's failure kinds.
///
/// Categories:
/// - Lister/Resolver: store reads, recovered locally in the UI
/// - InvalidBeadId: an id that can never be a path component
/// - NotFound: archive entry absent, distinct from InvalidBeadId
/// - Pipeline/Campaign: worker failures, surfaced but never fatal
/// - PostAction: post-pipeline hook failure, status line only
/// - Io: host-side filesystem failures
#[derive(Debug, thiserror::Error)]
pub enum DashError {
    #[error("Bead list failed: {0}")]
    Lister(String),

    #[error("Bead resolve failed: {0}")]
    Resolver(String),

    #[error("Invalid bead id '{0}'")]
    InvalidBeadId(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Pipeline failed: {0}")]
    Pipeline(String),

    #[error("Campaign failed: {0}")]
    Campaign(String),

    #[error("Post action failed: {0}")]
    PostAction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashError {
    /// True when the error means "nothing there", as opposed to a real fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DashError::NotFound(_))
    }

    /// True when the bead id itself was rejected before any I/O happened.
    pub fn is_invalid_id(&self) -> bool {
        matches!(self, DashError::InvalidBeadId(_))
    }
}

/// Bridge for status-line text: lets `?` convert `DashError` into the
/// plain strings carried inside update-loop messages.
impl From<DashError> for String {
    fn from(err: DashError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_predicate() {
        assert!(DashError::NotFound("cap-001".into()).is_not_found());
        assert!(!DashError::InvalidBeadId("..".into()).is_not_found());
    }

    #[test]
    fn invalid_id_predicate() {
        assert!(DashError::InvalidBeadId("a/b".into()).is_invalid_id());
        assert!(!DashError::NotFound("cap-001".into()).is_invalid_id());
    }

    #[test]
    fn string_bridge_uses_display() {
        let s: String = DashError::Lister("boom".into()).into();
        assert_eq!(s, "Bead list failed: boom");
    }
}
