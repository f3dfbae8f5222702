use crate::model::{invoke, Invocation, LanguageModel};
use crate::prompt::{build_context, build_merge_prompt, estimate_tokens};
use crate::response::{assess_confidence, extract_code_block};
use agentmerge_core::config::AiSettings;
use agentmerge_core::{ResolverStats, TaskSnapshot};
use merge_engine::{Conflict, MergeResult};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub max_context_tokens: usize,
    pub chars_per_token: usize,
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::from(&AiSettings::default())
    }
}

impl From<&AiSettings> for ResolverConfig {
    fn from(settings: &AiSettings) -> Self {
        Self {
            max_context_tokens: settings.max_context_tokens,
            chars_per_token: settings.chars_per_token,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// Escalates conflicts to a language model.
///
/// One resolver serves one merge run; its counters cover only that run.
pub struct AiResolver {
    model: Arc<dyn LanguageModel>,
    config: ResolverConfig,
    stats: ResolverStats,
}

impl AiResolver {
    pub fn new(model: Arc<dyn LanguageModel>, config: ResolverConfig) -> Self {
        Self {
            model,
            config,
            stats: ResolverStats::default(),
        }
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Ask the model to merge the involved tasks' versions of the file.
    ///
    /// Oversized contexts go to human review without a call. Every call that
    /// is made counts toward the stats, whatever its outcome. Calls are never
    /// retried.
    pub async fn resolve_conflict(
        &mut self,
        conflict: &Conflict,
        base: &str,
        snapshots: &[TaskSnapshot],
    ) -> MergeResult {
        let context = build_context(conflict, base, snapshots);
        let tokens = estimate_tokens(&context, self.config.chars_per_token);

        if tokens > self.config.max_context_tokens {
            tracing::warn!(
                file = %conflict.file_path,
                tokens,
                max = self.config.max_context_tokens,
                "Conflict context over budget, skipping AI"
            );
            return MergeResult::needs_review(format!("Context too large ({} tokens)", tokens));
        }

        let prompt = build_merge_prompt(&context);
        self.stats.calls_made += 1;
        self.stats.estimated_tokens_used += tokens;

        tracing::info!(
            model = self.model.name(),
            file = %conflict.file_path,
            location = %conflict.location,
            tokens,
            "Requesting AI resolution"
        );

        let mut result = match invoke(self.model.as_ref(), &prompt, self.config.timeout).await {
            Invocation::Completed(response) => match extract_code_block(&response) {
                Some(code) => MergeResult::ai_merged(
                    code,
                    format!("AI resolved conflict at {}", conflict.location),
                    assess_confidence(&response),
                    tokens,
                ),
                None => {
                    tracing::warn!(file = %conflict.file_path, "AI response had no code block");
                    MergeResult::needs_review("Could not parse AI response").with_raw_response(response)
                }
            },
            Invocation::TimedOut(after) => {
                tracing::error!(file = %conflict.file_path, "AI call timed out after {:?}", after);
                MergeResult::failed(format!("Model call timed out after {:?}", after))
            }
            Invocation::Failed(e) => {
                tracing::error!(file = %conflict.file_path, error = %e, "AI call failed");
                MergeResult::failed(e.to_string())
            }
        };
        result.ai_calls_made = 1;
        result.tokens_used = tokens;
        result
    }
}
