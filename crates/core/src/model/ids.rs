use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Exam module a session belongs to.
///
/// Every attempt and checkpoint is keyed by module so that progress in one
/// section never bleeds into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamModule {
    Reading,
    Listening,
    Writing,
    Speaking,
}

impl ExamModule {
    /// Stable lowercase name, used in storage keys and wire payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamModule::Reading => "reading",
            ExamModule::Listening => "listening",
            ExamModule::Writing => "writing",
            ExamModule::Speaking => "speaking",
        }
    }
}

impl fmt::Display for ExamModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for parsing identifiers from strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse {kind} from string")]
pub struct ParseIdError {
    kind: String,
}

impl ParseIdError {
    fn new(kind: &str) -> Self {
        Self { kind: kind.to_string() }
    }
}

impl FromStr for ExamModule {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reading" => Ok(ExamModule::Reading),
            "listening" => Ok(ExamModule::Listening),
            "writing" => Ok(ExamModule::Writing),
            "speaking" => Ok(ExamModule::Speaking),
            _ => Err(ParseIdError::new("ExamModule")),
        }
    }
}

/// Opaque identifier for one learner's engagement with an exam instance.
///
/// Owned exclusively by the attempt identity manager; never regenerated while
/// progress for the instance exists.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(String);

impl AttemptId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a practically-unique random attempt id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttemptId({})", self.0)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a single question within an exam instance.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QuestionId({})", self.0)
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies a piece of exam content: one module plus one instance of it.
///
/// Stable across resumes; the pair is the key under which attempt ids and
/// local snapshots are stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExamInstanceRef {
    pub module: ExamModule,
    pub instance_id: String,
}

impl ExamInstanceRef {
    #[must_use]
    pub fn new(module: ExamModule, instance_id: impl Into<String>) -> Self {
        Self {
            module,
            instance_id: instance_id.into(),
        }
    }
}

impl fmt::Display for ExamInstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_round_trips_through_str() {
        for module in [
            ExamModule::Reading,
            ExamModule::Listening,
            ExamModule::Writing,
            ExamModule::Speaking,
        ] {
            let parsed: ExamModule = module.as_str().parse().unwrap();
            assert_eq!(parsed, module);
        }
    }

    #[test]
    fn module_rejects_unknown_names() {
        assert!("vocabulary".parse::<ExamModule>().is_err());
    }

    #[test]
    fn attempt_ids_are_unique() {
        assert_ne!(AttemptId::random(), AttemptId::random());
    }

    #[test]
    fn instance_ref_display_is_key_friendly() {
        let instance = ExamInstanceRef::new(ExamModule::Reading, "cambridge-18-t1");
        assert_eq!(instance.to_string(), "reading:cambridge-18-t1");
    }
}
