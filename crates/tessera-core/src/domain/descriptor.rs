//! Task identity: what should happen (`TaskKind`) to which resource.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchedulerError;

/// Kind tag of a task, e.g. `fetch`, `verify`, `install`.
///
/// Operation factories are registered per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKind(String);

impl TaskKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Immutable identity of a requested task.
///
/// Two descriptors are equal iff kind, resource and version all match; this is
/// the dedup key of the registry. There is no way to mutate one after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskDescriptor {
    kind: TaskKind,
    resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
}

impl TaskDescriptor {
    /// Build a descriptor, rejecting empty or whitespace-bearing parts.
    pub fn new(kind: impl Into<TaskKind>, resource: impl Into<String>) -> Result<Self, SchedulerError> {
        let kind = kind.into();
        let resource = resource.into();
        validate_part("kind", kind.as_str())?;
        validate_part("resource", &resource)?;
        Ok(Self {
            kind,
            resource,
            version: None,
        })
    }

    /// Same kind and resource, pinned to `version`.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }
}

fn validate_part(field: &str, value: &str) -> Result<(), SchedulerError> {
    if value.is_empty() {
        return Err(SchedulerError::MalformedDescriptor(format!("{field} is empty")));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(SchedulerError::MalformedDescriptor(format!(
            "{field} '{value}' contains whitespace"
        )));
    }
    Ok(())
}

/// `kind:resource` or `kind:resource@version`.
impl fmt::Display for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.resource)?;
        if let Some(version) = self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

impl FromStr for TaskDescriptor {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s.split_once(':').ok_or_else(|| {
            SchedulerError::MalformedDescriptor(format!("'{s}' is missing the ':' separator"))
        })?;

        match rest.rsplit_once('@') {
            Some((resource, version)) => {
                let version = version.parse::<u64>().map_err(|e| {
                    SchedulerError::MalformedDescriptor(format!("bad version in '{s}': {e}"))
                })?;
                Ok(Self::new(kind, resource)?.with_version(version))
            }
            None => Self::new(kind, rest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn equality_covers_kind_resource_and_version() {
        let a = TaskDescriptor::new("fetch", "fonts").unwrap();
        let b = TaskDescriptor::new("fetch", "fonts").unwrap();
        let other_kind = TaskDescriptor::new("verify", "fonts").unwrap();
        let pinned = TaskDescriptor::new("fetch", "fonts").unwrap().with_version(3);

        assert_eq!(a, b);
        assert_ne!(a, other_kind);
        assert_ne!(a, pinned);

        let set: HashSet<_> = [a, b, other_kind, pinned].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[rstest]
    #[case("fetch:fonts", "fetch", "fonts", None)]
    #[case("install:ui-kit@12", "install", "ui-kit", Some(12))]
    #[case("verify:a@b@7", "verify", "a@b", Some(7))]
    fn parses_text_form(
        #[case] text: &str,
        #[case] kind: &str,
        #[case] resource: &str,
        #[case] version: Option<u64>,
    ) {
        let d: TaskDescriptor = text.parse().unwrap();
        assert_eq!(d.kind().as_str(), kind);
        assert_eq!(d.resource(), resource);
        assert_eq!(d.version(), version);
        assert_eq!(d.to_string(), text);
    }

    #[rstest]
    #[case("fonts")]
    #[case(":fonts")]
    #[case("fetch:")]
    #[case("fetch:fo nts")]
    #[case("fetch:fonts@latest")]
    fn rejects_malformed_text(#[case] text: &str) {
        let err = text.parse::<TaskDescriptor>().unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedDescriptor(_)));
    }
}
