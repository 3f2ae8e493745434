pub mod session;
pub mod settings;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use session::SessionState;
pub use settings::{CaptionSettings, CompletionSettings, Settings, SettingsError};

/// Returned in both result fields whenever any generation stage comes back empty.
pub const SENTINEL: &str = "Something went wrong, please try again.";

/// Shown to the user when a generate call errors out entirely.
pub const CLIENT_ERROR_MESSAGE: &str = "Something went wrong, Please try again in 10 minutes";

// --- Types ---

/// The framework used to phrase the analysis and suggestion prompts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Theory {
    #[default]
    #[serde(rename = "7-elements", alias = "seven-elements")]
    SevenElements,
    #[serde(rename = "feng-shui")]
    FengShui,
}

impl Theory {
    pub const ALL: [Theory; 2] = [Theory::SevenElements, Theory::FengShui];

    /// Wire identifier, as sent by the page.
    pub fn as_str(&self) -> &'static str {
        match self {
            Theory::SevenElements => "7-elements",
            Theory::FengShui => "feng-shui",
        }
    }

    /// Human-readable label used in the theory selector.
    pub fn label(&self) -> &'static str {
        match self {
            Theory::SevenElements => "7 elements of interior design",
            Theory::FengShui => "Feng Shui",
        }
    }
}

impl fmt::Display for Theory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7-elements" | "seven-elements" => Ok(Theory::SevenElements),
            "feng-shui" => Ok(Theory::FengShui),
            other => Err(format!("unknown theory: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub image_url: String,
    pub theory: Theory,
}

/// Analysis and suggestion pair. Either both fields carry model text or both
/// carry [`SENTINEL`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub analysis: String,
    pub suggestion: String,
}

impl GenerationResult {
    pub fn sentinel() -> Self {
        Self {
            analysis: SENTINEL.to_string(),
            suggestion: SENTINEL.to_string(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.analysis == SENTINEL && self.suggestion == SENTINEL
    }
}
