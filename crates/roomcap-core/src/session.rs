use serde::{Deserialize, Serialize};

use crate::{GenerationRequest, GenerationResult, Theory, CLIENT_ERROR_MESSAGE};

/// State behind the single-page form: the chosen image and theory, the
/// in-flight flag, and whatever the last generate call produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub original_image: Option<String>,
    pub theory: Theory,
    pub analysis: Option<String>,
    pub suggestion: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_image(&mut self, url: impl Into<String>) {
        self.original_image = Some(url.into());
    }

    pub fn set_theory(&mut self, theory: Theory) {
        self.theory = theory;
    }

    /// Whether the generate control should be enabled.
    pub fn can_generate(&self) -> bool {
        !self.is_loading && self.original_image.is_some()
    }

    /// Enter the loading state and hand back the request to send.
    /// Returns `None` without touching state when there is no image or a
    /// request is already in flight.
    pub fn begin_generate(&mut self) -> Option<GenerationRequest> {
        if !self.can_generate() {
            return None;
        }
        let image_url = self.original_image.clone()?;
        self.error = None;
        self.is_loading = true;
        Some(GenerationRequest {
            image_url,
            theory: self.theory,
        })
    }

    /// Apply the outcome of a generate call and leave the loading state.
    pub fn finish<E>(&mut self, outcome: Result<GenerationResult, E>) {
        match outcome {
            Ok(result) => {
                self.analysis = Some(result.analysis);
                self.suggestion = Some(result.suggestion);
            }
            Err(_) => {
                self.error = Some(CLIENT_ERROR_MESSAGE.to_string());
            }
        }
        self.is_loading = false;
    }

    /// Clear the image and any previous output. Ignored while loading.
    pub fn reset(&mut self) {
        if self.is_loading {
            return;
        }
        self.original_image = None;
        self.analysis = None;
        self.suggestion = None;
        self.error = None;
    }
}
