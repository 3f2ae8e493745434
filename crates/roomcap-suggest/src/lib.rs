pub mod caption;
pub mod engine;
pub mod error;
mod parse;
pub mod prompt;

use std::time::Duration;

use roomcap_core::{GenerationRequest, GenerationResult, Settings};
use tracing::{info, instrument, warn};

pub use caption::{get_caption, CaptionService, JobStatus, PollPolicy, ReplicateCaptioner};
pub use engine::CompletionClient;
pub use error::{FailedStage, GenerateError};

/// Upper bound on any single call to the captioning or completion service.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a generate run produced before it is flattened for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Generated(GenerationResult),
    Failed(FailedStage),
}

impl Outcome {
    pub fn into_result(self) -> GenerationResult {
        match self {
            Outcome::Generated(result) => result,
            Outcome::Failed(_) => GenerationResult::sentinel(),
        }
    }
}

/// Runs the caption → analysis → suggestion chain. Holds only immutable
/// clients, so one instance serves concurrent requests.
pub struct Generator {
    captioner: Box<dyn CaptionService>,
    completer: Box<dyn CompletionClient>,
    policy: PollPolicy,
}

impl Generator {
    pub fn new(
        captioner: Box<dyn CaptionService>,
        completer: Box<dyn CompletionClient>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            captioner,
            completer,
            policy,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(GenerateError::Client)?;
        let captioner = ReplicateCaptioner::new(client.clone(), &settings.caption);
        let completer = engine::from_settings(client, &settings.completion)?;
        Ok(Self::new(
            Box::new(captioner),
            completer,
            PollPolicy::from_settings(&settings.caption),
        ))
    }

    /// Generate analysis and suggestion for one request. Stage failures come
    /// back as the sentinel pair; transport failures are errors.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerateError> {
        Ok(self.run(request).await?.into_result())
    }

    /// Same as [`Generator::generate`] but keeps track of which stage came
    /// back empty.
    #[instrument(skip(self, request), fields(theory = %request.theory))]
    pub async fn run(&self, request: &GenerationRequest) -> Result<Outcome, GenerateError> {
        let caption = get_caption(self.captioner.as_ref(), &request.image_url, &self.policy).await?;
        if caption.trim().is_empty() {
            warn!(stage = %FailedStage::Caption, "generation failed");
            return Ok(Outcome::Failed(FailedStage::Caption));
        }
        info!(%caption, "captioned");

        let analysis = self
            .completer
            .complete(&prompt::analysis_prompt(&caption, request.theory))
            .await?;

        let suggestion = self
            .completer
            .complete(&prompt::suggestion_prompt(&caption, &analysis, request.theory))
            .await?;

        let failed = if analysis.trim().is_empty() {
            Some(FailedStage::Analysis)
        } else if suggestion.trim().is_empty() {
            Some(FailedStage::Suggestion)
        } else {
            None
        };
        if let Some(stage) = failed {
            warn!(%stage, "generation failed");
            return Ok(Outcome::Failed(stage));
        }

        info!(
            analysis_chars = analysis.len(),
            suggestion_chars = suggestion.len(),
            "generation complete"
        );
        Ok(Outcome::Generated(GenerationResult {
            analysis,
            suggestion,
        }))
    }
}
