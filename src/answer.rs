//! Grounded answer generation.
//!
//! Turns retrieval hits into a single-shot prompt, calls the LLM through a
//! bounded retry loop, and normalizes the raw completion into a
//! user-facing answer. The prompt instructs the model to answer strictly
//! from the supplied context and is primed so the completion continues the
//! sentence "Based on the provided document context, " (stripped again
//! during post-processing if the model echoes it).

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::RagError;
use crate::llm::Llm;
use crate::models::SearchHit;

/// Canned responses for the degenerate generation paths.
const NO_CONTEXT_ANSWER: &str =
    "I couldn't find relevant information in the document to answer your question.";
const EMPTY_RESPONSE_ANSWER: &str = "I couldn't generate a response. Please try again.";
const SHORT_RESPONSE_ANSWER: &str =
    "I couldn't find sufficient information in the document to provide a complete answer.";

const ECHO_PREFIX: &str = "Based on the provided document context,";

/// Context assembly uses at most this many hits.
const MAX_CONTEXT_SOURCES: usize = 5;
/// Answers longer than this are truncated at sentence boundaries.
const MAX_ANSWER_CHARS: usize = 1000;
/// Minimum length for an answer to count as substantive.
const MIN_ANSWER_CHARS: usize = 10;

/// Retry schedule for completion attempts: exponential delay, clamped to
/// the `[min, max]` window.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = Duration::from_secs(1u64 << attempt.min(16));
        exp.clamp(self.min_delay, self.max_delay)
    }
}

pub struct AnswerGenerator {
    llm: Arc<dyn Llm>,
    retry: RetryPolicy,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn Llm>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    /// Generate a grounded answer for `question` from retrieval hits.
    ///
    /// With no hits at all, returns a canned no-context answer without
    /// touching the LLM. Otherwise the completion is retried per the
    /// configured policy, and the last error surfaces as
    /// [`RagError::LlmGeneration`] once attempts are exhausted.
    pub async fn generate(
        &self,
        question: &str,
        hits: &[SearchHit],
    ) -> Result<String, RagError> {
        if hits.is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let context = build_context(hits);
        let prompt = build_prompt(question, &context);
        debug!(prompt_chars = prompt.len(), "generating answer");

        let mut last_err = None;
        for attempt in 1..=self.retry.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.delay_after(attempt - 1)).await;
            }
            match self.llm.complete(&prompt).await {
                Ok(raw) => return Ok(postprocess(&raw)),
                Err(e) => {
                    warn!(attempt, error = %e, "completion attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| RagError::LlmGeneration("no completion attempts made".to_string())))
    }
}

/// Format the top hits as labelled sources, preferring parent text when
/// present so the model sees the wider passage.
fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .take(MAX_CONTEXT_SOURCES)
        .enumerate()
        .map(|(i, hit)| {
            let text = if hit.parent_text.is_empty() {
                &hit.text
            } else {
                &hit.parent_text
            };
            format!(
                "**Source {} (Page {}, {}):**\n{}\n",
                i + 1,
                hit.page_number,
                hit.chunk_type,
                text
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert assistant specializing in analyzing insurance policy documents. \
Your task is to provide accurate, concise answers based strictly on the provided document context.

**INSTRUCTIONS:**
1. Answer the question using ONLY the information provided in the context below
2. Be direct and specific in your response
3. If the answer involves specific terms, conditions, or amounts, quote them exactly
4. If the information is not in the context, state clearly that the information is not available
5. Keep your answer focused and avoid unnecessary elaboration
6. When mentioning specific clauses or conditions, reference the source if possible

**CONTEXT FROM DOCUMENT:**
{context}

**QUESTION:**
{question}

**ANSWER:**
Based on the provided document context, "
    )
}

/// Normalize a raw completion into the final answer.
///
/// Strips the primed prompt prefix if echoed, replaces empty or
/// near-empty responses with canned fallbacks, and truncates overlong
/// answers at sentence boundaries (three sentences, extended to five when
/// the first three run short). Length thresholds count characters, not
/// bytes, so multi-byte text is not penalized.
fn postprocess(raw: &str) -> String {
    if raw.is_empty() {
        return EMPTY_RESPONSE_ANSWER.to_string();
    }

    let mut answer = raw.trim().to_string();
    if let Some(rest) = answer.strip_prefix(ECHO_PREFIX) {
        answer = rest.trim().to_string();
    }

    if answer.chars().count() < MIN_ANSWER_CHARS {
        return SHORT_RESPONSE_ANSWER.to_string();
    }

    if answer.chars().count() > MAX_ANSWER_CHARS {
        let sentences: Vec<&str> = answer.split(". ").collect();
        let mut truncated = sentences[..sentences.len().min(3)].join(". ");
        if truncated.chars().count() < 500 && sentences.len() > 3 {
            truncated.push_str(". ");
            truncated.push_str(&sentences[3..sentences.len().min(5)].join(". "));
        }
        if !truncated.ends_with('.') {
            truncated.push('.');
        }
        answer = truncated;
    }

    answer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeLlm {
        response: String,
        fail_first: u32,
        calls: AtomicU32,
    }

    impl FakeLlm {
        fn answering(response: &str) -> Self {
            Self {
                response: response.to_string(),
                fail_first: 0,
                calls: AtomicU32::new(0),
            }
        }
        fn failing_first(n: u32, response: &str) -> Self {
            Self {
                response: response.to_string(),
                fail_first: n,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Llm for FakeLlm {
        async fn complete(&self, _prompt: &str) -> Result<String, RagError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(RagError::LlmGeneration("transient".to_string()))
            } else {
                Ok(self.response.clone())
            }
        }
        async fn health(&self) -> bool {
            true
        }
    }

    fn hit(page: usize, text: &str, parent: &str) -> SearchHit {
        SearchHit {
            id: format!("id-{page}"),
            score: 1.0,
            text: text.to_string(),
            page_number: page,
            chunk_type: ChunkKind::Text,
            parent_text: parent.to_string(),
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
        }
    }

    #[test]
    fn delays_are_exponential_within_the_clamp_window() {
        let policy = RetryPolicy {
            max_attempts: 3,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(4));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
        assert_eq!(policy.delay_after(4), Duration::from_secs(10));
        assert_eq!(policy.delay_after(30), Duration::from_secs(10));
    }

    #[test]
    fn context_labels_sources_and_prefers_parent_text() {
        let hits = vec![
            hit(3, "child one", "parent passage one"),
            hit(7, "child two", ""),
        ];
        let context = build_context(&hits);
        assert!(context.contains("**Source 1 (Page 3, text):**\nparent passage one\n"));
        assert!(context.contains("**Source 2 (Page 7, text):**\nchild two\n"));
        assert!(context.contains("\n---\n"));
    }

    #[test]
    fn context_uses_at_most_five_sources() {
        let hits: Vec<SearchHit> = (1..=8).map(|p| hit(p, "t", "p")).collect();
        let context = build_context(&hits);
        assert!(context.contains("**Source 5"));
        assert!(!context.contains("**Source 6"));
    }

    #[test]
    fn prompt_contains_question_context_and_primer() {
        let prompt = build_prompt("What is the grace period?", "SOME CONTEXT");
        assert!(prompt.contains("**QUESTION:**\nWhat is the grace period?"));
        assert!(prompt.contains("**CONTEXT FROM DOCUMENT:**\nSOME CONTEXT"));
        assert!(prompt.ends_with("Based on the provided document context, "));
    }

    #[test]
    fn postprocess_strips_echoed_primer() {
        let out = postprocess("Based on the provided document context, the grace period is thirty days.");
        assert_eq!(out, "the grace period is thirty days.");
    }

    #[test]
    fn postprocess_replaces_empty_response() {
        assert_eq!(postprocess(""), EMPTY_RESPONSE_ANSWER);
    }

    #[test]
    fn postprocess_replaces_near_empty_response() {
        assert_eq!(postprocess("Yes."), SHORT_RESPONSE_ANSWER);
        assert_eq!(
            postprocess("Based on the provided document context, ok"),
            SHORT_RESPONSE_ANSWER
        );
    }

    #[test]
    fn postprocess_truncates_overlong_answers_at_sentence_boundaries() {
        let sentence = "This sentence is deliberately padded to around eighty characters of answer text okay";
        let long = (0..20).map(|_| sentence).collect::<Vec<_>>().join(". ");
        let out = postprocess(&long);
        assert!(out.len() < long.len());
        assert!(out.ends_with('.'));
        // 3 sentences of ~85 chars each fall short of 500, so two more are added
        assert_eq!(out.matches(sentence).count(), 5);
    }

    #[test]
    fn postprocess_length_thresholds_count_characters_not_bytes() {
        // 900 chars but 2700 bytes: under the limit, must pass untouched
        let answer = "\u{20b9}".repeat(900);
        assert_eq!(postprocess(&answer), answer);

        // 9 chars but 27 bytes: still below the minimum
        assert_eq!(postprocess(&"\u{20b9}".repeat(9)), SHORT_RESPONSE_ANSWER);
    }

    #[test]
    fn postprocess_keeps_three_sentences_when_they_are_long_enough() {
        let sentence = "x".repeat(400);
        let long = (0..4).map(|_| sentence.clone()).collect::<Vec<_>>().join(". ");
        let out = postprocess(&long);
        assert_eq!(out.matches(&sentence).count(), 3);
        assert!(out.ends_with('.'));
    }

    #[tokio::test]
    async fn empty_hits_short_circuit_without_llm_call() {
        let llm = Arc::new(FakeLlm::answering("should never be used"));
        let generator = AnswerGenerator::new(llm.clone(), fast_policy(3));
        let answer = generator.generate("q", &[]).await.unwrap();
        assert_eq!(answer, NO_CONTEXT_ANSWER);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let llm = Arc::new(FakeLlm::failing_first(
            2,
            "The waiting period for pre-existing diseases is thirty-six months.",
        ));
        let generator = AnswerGenerator::new(llm.clone(), fast_policy(3));
        let answer = generator
            .generate("waiting period?", &[hit(1, "t", "p")])
            .await
            .unwrap();
        assert!(answer.contains("thirty-six months"));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_the_last_error() {
        let llm = Arc::new(FakeLlm::failing_first(10, "unreachable"));
        let generator = AnswerGenerator::new(llm, fast_policy(3));
        let err = generator
            .generate("q", &[hit(1, "t", "p")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::LlmGeneration(_)));
    }
}
