use thiserror::Error;

use crate::disk::engine::LayoutStage;

#[derive(Debug, Error)]
pub enum ProvError {
    #[error("bad size: {0}")]
    BadSize(String),

    #[error(
        "insufficient capacity: layout needs more than {required} bytes, device has {capacity}"
    )]
    InsufficientCapacity { required: u64, capacity: u64 },

    #[error("layout failed at stage `{stage}` (device state past this stage is indeterminate): {cause}")]
    LayoutError {
        stage: LayoutStage,
        cause: Box<ProvError>,
    },

    #[error("settings store {path}: {reason}")]
    PersistenceError { path: String, reason: String },

    #[error("step `{step}` failed: {cause}")]
    StepError { step: String, cause: Box<ProvError> },

    #[error("shell command failed: {context}")]
    CmdFailed {
        error: Option<std::io::Error>,
        context: String,
    },

    #[error("file error: {1}: {0}")]
    FileError(std::io::Error, String),

    #[error("bad settings: {0}")]
    BadConfig(String),

    #[error("bad cli arguments: {0}")]
    BadArgs(String),

    #[error("destructive operation not confirmed: {0}")]
    NotConfirmed(String),

    #[error("device locked: {0}")]
    DeviceLocked(String),

    #[error("prov-rs bug: {0}")]
    ProvRsBug(String),
}

impl ProvError {
    /// Planning errors are raised before any destructive command is issued
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            Self::BadSize(_) | Self::InsufficientCapacity { .. }
        )
    }

    /// Errors that leave the device or the stored layout in a state no
    /// later step can rely on. These abort the run whatever the step's policy.
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            Self::LayoutError { .. } | Self::PersistenceError { .. }
        )
    }

    pub fn layout(stage: LayoutStage, cause: ProvError) -> Self {
        Self::LayoutError {
            stage,
            cause: Box::new(cause),
        }
    }

    pub fn persistence<P: AsRef<std::path::Path>>(path: P, reason: impl ToString) -> Self {
        Self::PersistenceError {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::Role;

    #[test]
    fn test_layout_error_names_stage() {
        let err = ProvError::layout(
            LayoutStage::Format(Role::Boot),
            ProvError::CmdFailed {
                error: None,
                context: "mkfs.ext4: device busy".to_string(),
            },
        );

        let msg = err.to_string();
        assert!(msg.contains("format-boot"), "{msg}");
        assert!(msg.contains("device busy"), "{msg}");
        assert!(!err.is_planning());
        assert!(err.is_always_fatal());
    }

    #[test]
    fn test_is_planning() {
        let err = ProvError::InsufficientCapacity {
            required: 10,
            capacity: 5,
        };

        assert!(err.is_planning());
        assert!(ProvError::BadSize("foo".into()).is_planning());
        assert!(!ProvError::BadConfig("foo".into()).is_planning());
    }

    #[test]
    fn test_is_always_fatal() {
        assert!(ProvError::persistence("/etc/prov.yaml", "read-only").is_always_fatal());
        assert!(!ProvError::BadSize("foo".into()).is_always_fatal());
        assert!(!ProvError::CmdFailed {
            error: None,
            context: "pacman".into(),
        }
        .is_always_fatal());
    }
}
