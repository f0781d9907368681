//! Pipeline engine - ordered steps applied to a queue of payloads
//!
//! A pipeline runs in four phases:
//! - pre-execution steps, once, before any payload (they usually fill the
//!   payload queue)
//! - pipeline steps, in order, for each payload
//! - post-execution steps, once, after everything succeeded
//! - error-handling steps, once, if any of the above failed
//!
//! Steps steer the run through [`Flow`] rather than through errors: stopping
//! a payload or the whole pipeline early is a normal outcome.

pub mod conversation;

use async_trait::async_trait;
use serde::Serialize;
use crate::Result;

/// What the pipeline does after a step returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Carry on with the next step
    Continue,
    /// Skip the remaining steps for the current payload
    StopPayload(String),
    /// Skip everything left and go straight to the post-execution steps
    StopPipeline(String),
}

/// State shared by all steps of one run, including the payload queue
pub trait PipelineContext: Send {
    type Payload: Send;

    /// Take the next payload off the queue
    fn next_payload(&mut self) -> Option<Self::Payload>;

    fn pending_payloads(&self) -> usize;
}

/// Runs once before the payloads are processed
#[async_trait]
pub trait PreExecutionStep<C: PipelineContext>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Any flow other than `Continue` stops the pipeline
    async fn execute(&self, ctx: &mut C) -> Result<Flow>;
}

/// Runs once per payload
#[async_trait]
pub trait PipelineStep<C: PipelineContext>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C, payload: &mut C::Payload) -> Result<Flow>;
}

/// Runs once after all payloads were processed successfully
#[async_trait]
pub trait PostExecutionStep<C: PipelineContext>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<()>;
}

/// Runs once when the pipeline fails
#[async_trait]
pub trait ErrorHandlingStep<C: PipelineContext>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<()>;
}

/// Outcome of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Payloads that went through every step
    pub processed: usize,
    /// Payloads a step stopped early
    pub stopped_payloads: usize,
    /// Why the pipeline stopped early, if it did
    pub stopped_reason: Option<String>,
}

/// An ETL pipeline over a context type
pub struct Pipeline<C: PipelineContext> {
    pre_execution_steps: Vec<Box<dyn PreExecutionStep<C>>>,
    pipeline_steps: Vec<Box<dyn PipelineStep<C>>>,
    post_execution_steps: Vec<Box<dyn PostExecutionStep<C>>>,
    error_handling_steps: Vec<Box<dyn ErrorHandlingStep<C>>>,
}

impl<C: PipelineContext> Default for Pipeline<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PipelineContext> Pipeline<C> {
    pub fn new() -> Self {
        Self {
            pre_execution_steps: Vec::new(),
            pipeline_steps: Vec::new(),
            post_execution_steps: Vec::new(),
            error_handling_steps: Vec::new(),
        }
    }

    pub fn pre_execution(mut self, step: impl PreExecutionStep<C> + 'static) -> Self {
        self.pre_execution_steps.push(Box::new(step));
        self
    }

    pub fn step(mut self, step: impl PipelineStep<C> + 'static) -> Self {
        self.pipeline_steps.push(Box::new(step));
        self
    }

    pub fn post_execution(mut self, step: impl PostExecutionStep<C> + 'static) -> Self {
        self.post_execution_steps.push(Box::new(step));
        self
    }

    pub fn on_error(mut self, step: impl ErrorHandlingStep<C> + 'static) -> Self {
        self.error_handling_steps.push(Box::new(step));
        self
    }

    /// Run every phase against `ctx`.
    ///
    /// On failure the error-handling steps run and the failing step's error is
    /// returned.
    pub async fn execute(&self, ctx: &mut C) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        match self.run(ctx, &mut summary).await {
            Ok(()) => Ok(summary),
            Err(err) => {
                tracing::error!("Encountered unexpected error: {}", err);
                self.run_error_handling(ctx).await;
                Err(err)
            }
        }
    }

    async fn run(&self, ctx: &mut C, summary: &mut RunSummary) -> Result<()> {
        let mut flow = self.run_pre_execution_steps(ctx).await?;
        if flow == Flow::Continue {
            flow = self.run_all_payloads(ctx, summary).await?;
        }

        if let Flow::StopPipeline(reason) | Flow::StopPayload(reason) = flow {
            tracing::info!("Stopping pipeline early: {}", reason);
            summary.stopped_reason = Some(reason);
        }

        self.run_post_execution_steps(ctx).await
    }

    async fn run_pre_execution_steps(&self, ctx: &mut C) -> Result<Flow> {
        tracing::info!("{} pre execution step(s) to execute.", self.pre_execution_steps.len());
        for step in &self.pre_execution_steps {
            tracing::info!("Starting pre execution step: {}", step.name());
            let flow = step.execute(ctx).await?;
            if flow != Flow::Continue {
                return Ok(flow);
            }
        }
        tracing::info!("Processed all pre execution steps successfully.");
        Ok(Flow::Continue)
    }

    /// Payloads are pulled off the queue one at a time and dropped once
    /// processed, so a large backlog never holds more than one processed
    /// payload in memory.
    async fn run_all_payloads(&self, ctx: &mut C, summary: &mut RunSummary) -> Result<Flow> {
        if ctx.pending_payloads() == 0 {
            tracing::info!("No payloads to process.");
            return Ok(Flow::Continue);
        }

        loop {
            let remaining = ctx.pending_payloads();
            let Some(mut payload) = ctx.next_payload() else {
                break;
            };
            tracing::info!("{} payload(s) to process.", remaining);

            match self.run_payload(ctx, &mut payload).await? {
                Flow::Continue => summary.processed += 1,
                Flow::StopPayload(_) => summary.stopped_payloads += 1,
                stop @ Flow::StopPipeline(_) => return Ok(stop),
            }
        }

        tracing::info!("Processed all payloads successfully.");
        Ok(Flow::Continue)
    }

    async fn run_payload(&self, ctx: &mut C, payload: &mut C::Payload) -> Result<Flow> {
        for step in &self.pipeline_steps {
            tracing::info!("Starting pipeline step: {}", step.name());
            match step.execute(ctx, payload).await? {
                Flow::Continue => tracing::debug!("Finished pipeline step: {}", step.name()),
                Flow::StopPayload(reason) => {
                    tracing::info!("Stopping payload early: {}", reason);
                    return Ok(Flow::StopPayload(reason));
                }
                stop @ Flow::StopPipeline(_) => return Ok(stop),
            }
        }
        tracing::debug!("Processed payload successfully.");
        Ok(Flow::Continue)
    }

    async fn run_post_execution_steps(&self, ctx: &mut C) -> Result<()> {
        tracing::info!("{} post execution step(s) to execute.", self.post_execution_steps.len());
        for step in &self.post_execution_steps {
            tracing::info!("Starting post execution step: {}", step.name());
            step.execute(ctx).await?;
        }
        tracing::info!("Processed all post execution steps successfully.");
        Ok(())
    }

    /// Every handler runs even if an earlier one fails; their errors are
    /// logged so they never mask the error that triggered them.
    async fn run_error_handling(&self, ctx: &mut C) {
        tracing::info!("{} error handling step(s) to execute.", self.error_handling_steps.len());
        for step in &self.error_handling_steps {
            tracing::info!("Starting error handling step: {}", step.name());
            if let Err(err) = step.execute(ctx).await {
                tracing::error!("Error handling step {} failed: {}", step.name(), err);
            }
        }
    }
}
