//! Conversation sync pipeline
//!
//! One run brings the database up to date with every conversation updated
//! since the stored watermark. All writes of a run share one transaction.

use std::collections::VecDeque;

use async_trait::async_trait;
use indicatif::ProgressBar;
use serde::Serialize;

use super::{
    ErrorHandlingStep, Flow, Pipeline, PipelineContext, PipelineStep, PostExecutionStep,
    PreExecutionStep,
};
use crate::intercom::{Conversation, IntercomClient};
use crate::records::ConversationRecords;
use crate::storage::SqliteStore;
use crate::{Error, Result};

/// Time range a run covers: `start < updated_at <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub start: i64,
    pub end: i64,
}

/// One conversation to sync
#[derive(Debug)]
pub struct ConversationPayload {
    pub conversation_id: String,
    pub window: SyncWindow,
    pub api_data: Option<Conversation>,
    pub records: Option<ConversationRecords>,
}

impl ConversationPayload {
    pub fn new(conversation_id: impl Into<String>, window: SyncWindow) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            window,
            api_data: None,
            records: None,
        }
    }
}

/// Shared state of a sync run
pub struct ConversationSync {
    pub store: SqliteStore,
    pub client: IntercomClient,
    payloads: VecDeque<ConversationPayload>,
    window: Option<SyncWindow>,
    progress: ProgressBar,
}

impl ConversationSync {
    pub fn new(store: SqliteStore, client: IntercomClient) -> Self {
        Self {
            store,
            client,
            payloads: VecDeque::new(),
            window: None,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report loaded conversations on a progress bar; its length is set
    /// once the payloads are known
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// The window of the current run, once it has been determined
    pub fn window(&self) -> Option<SyncWindow> {
        self.window
    }

    pub fn into_store(self) -> SqliteStore {
        self.progress.finish_and_clear();
        self.store
    }
}

impl PipelineContext for ConversationSync {
    type Payload = ConversationPayload;

    fn next_payload(&mut self) -> Option<ConversationPayload> {
        self.payloads.pop_front()
    }

    fn pending_payloads(&self) -> usize {
        self.payloads.len()
    }
}

/// The Intercom conversation sync pipeline
pub fn conversation_pipeline() -> Pipeline<ConversationSync> {
    Pipeline::new()
        .pre_execution(BeginTransaction)
        .pre_execution(GetPayloads)
        .step(RetrieveApiData)
        .step(ParseApiData)
        .step(LoadToDatabase)
        .post_execution(CommitTransaction)
        .on_error(RollbackTransaction)
}

// ========== Pre-execution ==========

/// Every write of the run goes into a single transaction, committed only
/// once all payloads have been loaded
pub struct BeginTransaction;

#[async_trait]
impl PreExecutionStep<ConversationSync> for BeginTransaction {
    fn name(&self) -> &'static str {
        "BeginTransaction"
    }

    async fn execute(&self, ctx: &mut ConversationSync) -> Result<Flow> {
        ctx.store.begin_transaction()?;
        Ok(Flow::Continue)
    }
}

/// Queue one payload per conversation updated since the watermark.
///
/// The window end is fixed up front from the API rather than taken as
/// "now": updates landing while the run pages through results are left for
/// the next run instead of being half-captured by this one.
pub struct GetPayloads;

#[async_trait]
impl PreExecutionStep<ConversationSync> for GetPayloads {
    fn name(&self) -> &'static str {
        "GetPayloads"
    }

    async fn execute(&self, ctx: &mut ConversationSync) -> Result<Flow> {
        let start = ctx.store.max_conversation_updated_at()?;
        let Some(end) = ctx.client.max_updated_at(start).await? else {
            return Ok(Flow::StopPipeline(
                "No updates to conversations found, stopping pipeline.".to_string(),
            ));
        };

        let window = SyncWindow { start, end };
        let ids = ctx.client.conversation_ids_updated_between(start, end).await?;
        tracing::info!("{} conversation(s) updated in ({}, {}]", ids.len(), start, end);

        ctx.payloads = ids
            .into_iter()
            .map(|id| ConversationPayload::new(id, window))
            .collect();
        ctx.window = Some(window);
        ctx.progress.set_length(ctx.payloads.len() as u64);
        Ok(Flow::Continue)
    }
}

// ========== Per payload ==========

pub struct RetrieveApiData;

#[async_trait]
impl PipelineStep<ConversationSync> for RetrieveApiData {
    fn name(&self) -> &'static str {
        "RetrieveApiData"
    }

    async fn execute(&self, ctx: &mut ConversationSync, payload: &mut ConversationPayload) -> Result<Flow> {
        ctx.progress.set_message(payload.conversation_id.clone());
        let conversation = ctx.client.conversation(&payload.conversation_id).await?;
        payload.api_data = Some(conversation);
        Ok(Flow::Continue)
    }
}

pub struct ParseApiData;

#[async_trait]
impl PipelineStep<ConversationSync> for ParseApiData {
    fn name(&self) -> &'static str {
        "ParseApiData"
    }

    async fn execute(&self, _ctx: &mut ConversationSync, payload: &mut ConversationPayload) -> Result<Flow> {
        let api = payload.api_data.take().ok_or(Error::MissingStepInput {
            step: "ParseApiData",
            input: "api_data",
        })?;
        payload.records = Some(ConversationRecords::from_api(&api, payload.window.end));
        Ok(Flow::Continue)
    }
}

pub struct LoadToDatabase;

#[async_trait]
impl PipelineStep<ConversationSync> for LoadToDatabase {
    fn name(&self) -> &'static str {
        "LoadToDatabase"
    }

    async fn execute(&self, ctx: &mut ConversationSync, payload: &mut ConversationPayload) -> Result<Flow> {
        let records = payload.records.as_ref().ok_or(Error::MissingStepInput {
            step: "LoadToDatabase",
            input: "records",
        })?;
        ctx.store.replace_conversation(records)?;
        tracing::debug!(
            "Loaded conversation {} with {} part(s)",
            records.conversation_id(),
            records.parts.len()
        );
        ctx.progress.inc(1);
        Ok(Flow::Continue)
    }
}

// ========== Post-execution / error handling ==========

pub struct CommitTransaction;

#[async_trait]
impl PostExecutionStep<ConversationSync> for CommitTransaction {
    fn name(&self) -> &'static str {
        "CommitTransaction"
    }

    async fn execute(&self, ctx: &mut ConversationSync) -> Result<()> {
        if ctx.store.in_transaction() {
            ctx.store.commit()?;
        }
        Ok(())
    }
}

/// A failed run leaves no partially updated tables behind
pub struct RollbackTransaction;

#[async_trait]
impl ErrorHandlingStep<ConversationSync> for RollbackTransaction {
    fn name(&self) -> &'static str {
        "RollbackTransaction"
    }

    async fn execute(&self, ctx: &mut ConversationSync) -> Result<()> {
        if ctx.store.in_transaction() {
            ctx.store.rollback()?;
        }
        Ok(())
    }
}
