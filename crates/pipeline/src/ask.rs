//! Request orchestration.
//!
//! `Received -> ContextMerged -> Rewritten -> Planned ->
//! {StructuredRetrieved | SemanticRetrieved} -> Aggregated -> Delivered`,
//! with `Errored` reachable from any stage.

use crate::aggregate::{self, GENERIC_ERROR_ANSWER};
use crate::config::PipelineConfig;
use crate::context::{accumulate_bounded, merge_facts};
use crate::deadline;
use crate::planner;
use crate::reasoning::ReasoningService;
use crate::registry::CollectionRegistry;
use crate::rewrite;
use crate::semantic::{self, SemanticIndex, SemanticSettings};
use crate::stream::StreamChannel;
use crate::structured::{self, project, StructuredStore};
use crate::types::{
    AskRequest, AskResponse, ChatTurn, CollectionDescriptor, ConversationContext, FaqMatch,
    JsonMap, RetrievalResult, StreamEvent,
};
use faqroute_core::{AppError, AppResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// How the answer is delivered.
#[derive(Debug)]
pub enum Reply {
    Complete(AskResponse),
    Stream(mpsc::UnboundedReceiver<StreamEvent>),
}

/// Answer plus the updated conversation context.
#[derive(Debug)]
pub struct AskOutcome {
    pub context: ConversationContext,
    pub reply: Reply,
}

/// The routing pipeline with its injected collaborators.
pub struct Pipeline {
    reasoner: Arc<dyn ReasoningService>,
    registry: Arc<dyn CollectionRegistry>,
    store: Arc<dyn StructuredStore>,
    index: Arc<dyn SemanticIndex>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        reasoner: Arc<dyn ReasoningService>,
        registry: Arc<dyn CollectionRegistry>,
        store: Arc<dyn StructuredStore>,
        index: Arc<dyn SemanticIndex>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            reasoner,
            registry,
            store,
            index,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer one question.
    ///
    /// Only a missing question is an error; every later failure degrades to a
    /// safer path or, at worst, the generic apology.
    pub async fn ask(&self, request: AskRequest) -> AppResult<AskOutcome> {
        if request.question.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "question is required".to_string(),
            ));
        }

        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("ask", %request_id);
        Ok(self.run(request).instrument(span).await)
    }

    async fn run(&self, request: AskRequest) -> AskOutcome {
        let question = request.question.trim().to_string();
        tracing::info!(stage = "Received", stream = request.stream, "{}", question);

        let context =
            accumulate_bounded(request.context.clone(), &question, self.config.history_limit);
        tracing::debug!(stage = "ContextMerged", keywords = context.keywords.len());

        match self.answer(&request, &question, context.clone()).await {
            Ok(outcome) => {
                tracing::info!(stage = "Delivered");
                outcome
            }
            Err(e) => {
                tracing::error!(stage = "Errored", "Pipeline failed: {}", e);
                AskOutcome {
                    context,
                    reply: error_reply(request.stream),
                }
            }
        }
    }

    async fn answer(
        &self,
        request: &AskRequest,
        question: &str,
        mut context: ConversationContext,
    ) -> AppResult<AskOutcome> {
        let timeout = self.config.call_timeout();

        let turns = prior_turns(request);
        let query = rewrite::rewrite(
            self.reasoner.as_ref(),
            &turns,
            question,
            self.config.rewrite_turns,
            timeout,
        )
        .await;
        tracing::debug!(stage = "Rewritten", query = %query);

        let collections = self.enabled_collections().await;
        let samples = self.samples(&collections).await;
        let outcome = planner::plan(
            self.reasoner.as_ref(),
            &query,
            &collections,
            &samples,
            &context.facts,
            timeout,
        )
        .await;

        if !outcome.facts.is_empty() {
            let known = std::mem::take(&mut context.facts);
            context.facts = merge_facts(known, outcome.facts, question);
        }

        let plan = outcome.plan;
        tracing::debug!(
            stage = "Planned",
            intent = ?plan.intent,
            collection = ?plan.collection,
            operation = plan.operation.as_str()
        );

        let semantic_settings = SemanticSettings {
            top_k: self.config.faq_top_k,
            threshold: self.config.relevance_threshold,
            timeout,
        };

        if plan.is_realtime() {
            let descriptor = plan
                .collection
                .as_deref()
                .and_then(|name| collections.iter().find(|c| c.name == name))
                .ok_or_else(|| {
                    AppError::Pipeline(format!(
                        "Realtime plan without an enabled collection: {:?}",
                        plan.collection
                    ))
                })?;

            let (result, faq) = tokio::join!(
                structured::retrieve(
                    self.store.as_ref(),
                    &plan,
                    descriptor,
                    self.config.list_limit,
                    timeout,
                ),
                semantic::retrieve(
                    self.reasoner.as_ref(),
                    self.index.as_ref(),
                    &query,
                    semantic_settings,
                ),
            );
            tracing::debug!(
                stage = "StructuredRetrieved",
                kind = result.kind(),
                faq_matches = faq.len()
            );

            let response = self.batched(&query, &result, &faq, &context.facts).await;
            return Ok(AskOutcome {
                context,
                reply: Reply::Complete(response),
            });
        }

        let faq = semantic::retrieve(
            self.reasoner.as_ref(),
            self.index.as_ref(),
            &query,
            semantic_settings,
        )
        .await;
        tracing::debug!(stage = "SemanticRetrieved", faq_matches = faq.len());

        if request.stream {
            let receiver = self.spawn_stream(query, faq, context.facts.clone());
            return Ok(AskOutcome {
                context,
                reply: Reply::Stream(receiver),
            });
        }

        let response = self
            .batched(&query, &RetrievalResult::None, &faq, &context.facts)
            .await;
        Ok(AskOutcome {
            context,
            reply: Reply::Complete(response),
        })
    }

    async fn batched(
        &self,
        query: &str,
        result: &RetrievalResult,
        faq: &[FaqMatch],
        facts: &JsonMap,
    ) -> AskResponse {
        let timeout = self.config.call_timeout();
        let summary = aggregate::interpret(self.reasoner.as_ref(), query, result, timeout).await;
        let response = aggregate::synthesize(
            self.reasoner.as_ref(),
            query,
            result,
            summary.as_deref(),
            faq,
            facts,
            timeout,
        )
        .await;
        tracing::debug!(stage = "Aggregated", kind = result.kind());
        response
    }

    fn spawn_stream(
        &self,
        query: String,
        faq: Vec<FaqMatch>,
        facts: JsonMap,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (channel, receiver) = StreamChannel::open();
        let reasoner = Arc::clone(&self.reasoner);
        let timeout = self.config.call_timeout();

        tokio::spawn(
            async move {
                aggregate::stream_faq_answer(
                    reasoner.as_ref(),
                    &query,
                    &faq,
                    &facts,
                    timeout,
                    channel,
                )
                .await;
                tracing::debug!(stage = "Aggregated", "Answer stream closed");
            }
            .instrument(tracing::Span::current()),
        );

        receiver
    }

    async fn enabled_collections(&self) -> Vec<CollectionDescriptor> {
        match deadline::within(
            self.config.call_timeout(),
            "collection registry",
            self.registry.list_enabled_collections(),
        )
        .await
        {
            Ok(collections) => collections,
            Err(e) => {
                tracing::warn!("Collection registry unavailable, FAQ only: {}", e);
                Vec::new()
            }
        }
    }

    /// Reference records for the planner, projected to exposed fields.
    async fn samples(&self, collections: &[CollectionDescriptor]) -> BTreeMap<String, Vec<JsonMap>> {
        let timeout = self.config.call_timeout();
        let limit = self.config.sample_limit;

        let fetches = collections.iter().map(|descriptor| async move {
            let records = deadline::within(
                timeout,
                "sample records",
                self.store.sample(&descriptor.name, limit),
            )
            .await;
            (descriptor, records)
        });

        let mut samples = BTreeMap::new();
        for (descriptor, records) in futures::future::join_all(fetches).await {
            match records {
                Ok(records) => {
                    let projected = records
                        .iter()
                        .map(|r| project(r, &descriptor.exposed_fields))
                        .collect();
                    samples.insert(descriptor.name.clone(), projected);
                }
                Err(e) => {
                    tracing::debug!("No samples for '{}': {}", descriptor.name, e);
                }
            }
        }
        samples
    }
}

/// Chat turns for the rewriter: the caller's history, or the context's prior
/// questions when the caller sent none.
fn prior_turns(request: &AskRequest) -> Vec<ChatTurn> {
    if !request.history.is_empty() {
        return request.history.clone();
    }
    request
        .context
        .history
        .iter()
        .map(|q| ChatTurn::new("user", q.clone()))
        .collect()
}

fn error_reply(stream: bool) -> Reply {
    if !stream {
        return Reply::Complete(AskResponse::text(GENERIC_ERROR_ANSWER));
    }
    let (mut channel, receiver) = StreamChannel::open();
    channel.send_token(GENERIC_ERROR_ANSWER);
    channel.finish();
    Reply::Stream(receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prior_turns_prefer_caller_history() {
        let mut request = AskRequest::new("and Rome?");
        request.context.history = vec!["flights to Paris".to_string()];
        assert_eq!(
            prior_turns(&request),
            vec![ChatTurn::new("user", "flights to Paris")]
        );

        request.history = vec![ChatTurn::new("assistant", "Three flights.")];
        assert_eq!(
            prior_turns(&request),
            vec![ChatTurn::new("assistant", "Three flights.")]
        );
    }

    #[tokio::test]
    async fn test_error_reply_for_stream_ends_with_done() {
        let mut rx = match error_reply(true) {
            Reply::Stream(rx) => rx,
            Reply::Complete(r) => panic!("expected stream, got {:?}", r),
        };
        assert_eq!(
            rx.recv().await,
            Some(StreamEvent::Token {
                value: GENERIC_ERROR_ANSWER.to_string()
            })
        );
        assert_eq!(rx.recv().await, Some(StreamEvent::Done));
        assert_eq!(rx.recv().await, None);

        match error_reply(false) {
            Reply::Complete(response) => assert_eq!(response.content(), GENERIC_ERROR_ANSWER),
            Reply::Stream(_) => panic!("expected batched apology"),
        }
    }
}
