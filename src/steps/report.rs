use std::fmt;
use std::time::Duration;

use colored::Colorize;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::json;

use super::{
    FailurePolicy,
    RunState,
    Step,
    StepState,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub name: String,
    pub policy: FailurePolicy,
    pub state: StepState,

    #[serde(rename = "elapsedTime")]
    pub duration: Duration,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn pending(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            policy: step.failure_policy,
            state: StepState::Pending,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Ordered audit trail of one orchestrator run.
/// Steps never reached stay [StepState::Pending].
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub outcomes: Vec<StepOutcome>,
    pub duration: Duration,
}

impl RunReport {
    /// The failure that aborted the run
    pub fn first_fatal(&self) -> Option<&StepOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.state == StepState::Failed && o.policy == FailurePolicy::Fatal)
    }

    /// Failed warn-and-continue steps
    pub fn warnings(&self) -> Vec<&StepOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.state == StepState::Failed && o.policy == FailurePolicy::WarnAndContinue)
            .collect()
    }

    pub fn not_run(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == StepState::Pending)
            .map(|o| o.name.as_str())
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "state": self.state,
            "steps": self.outcomes,
            "notRun": self.not_run(),
            "elapsedTime": self.duration,
        })
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            let line = format!("{:<20} {:?}", outcome.name, outcome.duration);

            match (outcome.state, outcome.policy) {
                (StepState::Succeeded, _) => writeln!(f, "{} {line}", "ok  ".green())?,
                (StepState::Failed, FailurePolicy::WarnAndContinue) => {
                    writeln!(f, "{} {line}", "warn".yellow())?;
                }
                (StepState::Failed, FailurePolicy::Fatal) => {
                    writeln!(f, "{} {line}", "FAIL".red().bold())?;
                }
                (StepState::Pending, _) | (StepState::Running, _) => {
                    writeln!(f, "{} {}", "skip".dimmed(), outcome.name)?;
                }
            }

            if let Some(err) = &outcome.error {
                writeln!(f, "     {err}")?;
            }
        }

        let state = match self.state {
            RunState::Completed => "completed".green(),
            RunState::Aborted => "aborted".red().bold(),
            RunState::InProgress => "in progress".yellow(),
        };

        write!(f, "run {state} in {:?}", self.duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, policy: FailurePolicy, state: StepState) -> StepOutcome {
        StepOutcome {
            name: name.into(),
            policy,
            state,
            duration: Duration::from_millis(5),
            error: match state {
                StepState::Failed => Some(format!("step `{name}` failed: boom")),
                _ => None,
            },
        }
    }

    fn aborted_report() -> RunReport {
        RunReport {
            state: RunState::Aborted,
            outcomes: vec![
                outcome("update-clock", FailurePolicy::WarnAndContinue, StepState::Failed),
                outcome("prepare-disk", FailurePolicy::Fatal, StepState::Succeeded),
                outcome("pacstrap", FailurePolicy::Fatal, StepState::Failed),
                outcome("genfstab", FailurePolicy::Fatal, StepState::Pending),
            ],
            duration: Duration::from_secs(3),
        }
    }

    #[test]
    fn test_report_queries() {
        let report = aborted_report();

        assert_eq!(report.first_fatal().map(|o| o.name.as_str()), Some("pacstrap"));
        assert_eq!(report.warnings().len(), 1);
        assert_eq!(report.not_run(), vec!["genfstab"]);
    }

    #[test]
    fn test_report_json() {
        let json = aborted_report().to_json();

        assert_eq!(json["state"], "aborted");
        assert_eq!(json["notRun"], json!(["genfstab"]));
        assert_eq!(json["steps"][0]["policy"], "warn-and-continue");
        assert_eq!(json["steps"][2]["state"], "failed");
        assert!(json["steps"][1].get("error").is_none());
    }

    #[test]
    fn test_report_display_lists_every_step() {
        colored::control::set_override(false);
        let text = aborted_report().to_string();

        for name in ["update-clock", "prepare-disk", "pacstrap", "genfstab"] {
            assert!(text.contains(name), "{text}");
        }
        assert!(text.contains("step `pacstrap` failed: boom"));
        assert!(text.ends_with("run aborted in 3s"));
    }
}
