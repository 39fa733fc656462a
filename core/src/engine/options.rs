//! Session options and the builder that derives them from caller strings
//!
//! Callers hand over loosely typed option strings (from the CLI or the
//! settings file). Anything unrecognized degrades to the engine default
//! instead of failing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Order in which the engine may assume samples were captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleOrdering {
    Sequential,
    #[default]
    Unordered,
}

/// How aggressively the engine looks for landmarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSensitivity {
    #[default]
    Normal,
    High,
}

/// Level of detail of the produced model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detail {
    Reduced,
    #[default]
    Medium,
    Full,
    Raw,
}

impl SampleOrdering {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleOrdering::Sequential => "sequential",
            SampleOrdering::Unordered => "unordered",
        }
    }
}

impl FeatureSensitivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureSensitivity::Normal => "normal",
            FeatureSensitivity::High => "high",
        }
    }
}

impl Detail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Detail::Reduced => "reduced",
            Detail::Medium => "medium",
            Detail::Full => "full",
            Detail::Raw => "raw",
        }
    }
}

impl fmt::Display for SampleOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for FeatureSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Detail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine configuration for one session. Built once per `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    pub sample_ordering: SampleOrdering,
    pub feature_sensitivity: FeatureSensitivity,
}

/// The single model-file request submitted to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRequest {
    pub destination: PathBuf,
    pub detail: Detail,
}

impl OutputRequest {
    pub fn model_file(destination: impl AsRef<Path>, detail: Detail) -> Self {
        Self {
            destination: destination.as_ref().to_path_buf(),
            detail,
        }
    }
}

/// Translates caller option strings into engine types
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationBuilder;

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the session configuration and the request detail level.
    ///
    /// Unknown ordering falls back to `Unordered`, unknown sensitivity to
    /// `Normal` and unknown detail to `Medium`. Matching ignores case and
    /// surrounding whitespace.
    pub fn build(
        &self,
        detail: &str,
        ordering: &str,
        sensitivity: &str,
    ) -> (SessionConfig, Detail) {
        let config = SessionConfig {
            sample_ordering: Self::ordering(ordering),
            feature_sensitivity: Self::sensitivity(sensitivity),
        };
        (config, Self::detail(detail))
    }

    fn ordering(value: &str) -> SampleOrdering {
        match normalize(value).as_str() {
            "sequential" => SampleOrdering::Sequential,
            _ => SampleOrdering::Unordered,
        }
    }

    fn sensitivity(value: &str) -> FeatureSensitivity {
        match normalize(value).as_str() {
            "high" => FeatureSensitivity::High,
            _ => FeatureSensitivity::Normal,
        }
    }

    fn detail(value: &str) -> Detail {
        match normalize(value).as_str() {
            "reduced" => Detail::Reduced,
            "full" => Detail::Full,
            "raw" => Detail::Raw,
            _ => Detail::Medium,
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
