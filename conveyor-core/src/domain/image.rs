//! Image tags and references

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum tag length accepted by container registries
const MAX_TAG_LEN: usize = 128;

/// A validated image tag
///
/// Non-empty, at most 128 characters, made of ASCII letters, digits, `_`,
/// `.` and `-`, and not starting with `.` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageTag(String);

impl ImageTag {
    /// Alias pushed next to every build tag
    pub const LATEST: &'static str = "latest";

    pub fn new(tag: impl Into<String>) -> Result<Self, ConfigError> {
        let tag = tag.into();

        if tag.is_empty() {
            return Err(ConfigError::InvalidTag {
                tag,
                reason: "tag cannot be empty",
            });
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(ConfigError::InvalidTag {
                tag,
                reason: "tag is longer than 128 characters",
            });
        }
        if tag.starts_with('.') || tag.starts_with('-') {
            return Err(ConfigError::InvalidTag {
                tag,
                reason: "tag cannot start with '.' or '-'",
            });
        }
        if !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(ConfigError::InvalidTag {
                tag,
                reason: "tag may only contain letters, digits, '_', '.' and '-'",
            });
        }

        Ok(Self(tag))
    }

    /// Derives the run tag from the CI build counter
    ///
    /// Build counters start at 1, so 0 is rejected.
    pub fn from_build_number(build_number: u64) -> Result<Self, ConfigError> {
        if build_number == 0 {
            return Err(ConfigError::InvalidBuildNumber);
        }
        Self::new(build_number.to_string())
    }

    pub fn latest() -> Self {
        Self(Self::LATEST.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ImageTag {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageTag> for String {
    fn from(tag: ImageTag) -> Self {
        tag.0
    }
}

/// A fully qualified image reference (`repository:tag`)
///
/// The repository may carry a registry host prefix
/// (e.g. `registry.example.com/shop/web`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    repository: String,
    tag: ImageTag,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: ImageTag) -> Self {
        Self {
            repository: repository.into(),
            tag,
        }
    }

    /// Same repository under a different tag
    pub fn with_tag(&self, tag: ImageTag) -> Self {
        Self {
            repository: self.repository.clone(),
            tag,
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &ImageTag {
        &self.tag
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
