// core/src/flow/execution.rs

//! `Flow::run()`: executes steps in order and unwinds completed steps on failure.

use crate::flow::context_data::ContextData;
use crate::flow::control::{FlowControl, FlowResult};
use crate::flow::definition::Flow;
use crate::flow::error::FlowError;
use tracing::{event, instrument, span, Instrument, Level};

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Executes the flow against `ctx_data`.
  ///
  /// On the first handler error, compensations of all previously completed
  /// steps run in reverse order and the original error is returned. A
  /// compensation that itself fails is logged and skipped.
  #[instrument(
    name = "Flow::run",
    skip_all,
    fields(flow = %self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<FlowResult, Err> {
    event!(Level::DEBUG, "Flow execution starting.");
    let mut completed: Vec<&str> = Vec::with_capacity(self.steps.len());

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = span!(
        Level::INFO,
        "flow_step",
        step_name = step_name,
        step_index = step_idx,
        optional = step_def.optional
      );

      let Some(handler_fn) = self.on.get(step_name) else {
        if step_def.optional {
          event!(parent: &step_span, Level::DEBUG, "Optional step has no handler, skipping.");
          continue;
        }
        event!(parent: &step_span, Level::ERROR, "Non-optional step has no handler.");
        self.unwind(&completed, &ctx_data).await;
        return Err(Err::from(FlowError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      };

      match handler_fn(ctx_data.clone()).instrument(step_span.clone()).await {
        Ok(FlowControl::Continue) => {
          completed.push(step_name);
        }
        Ok(FlowControl::Stop) => {
          event!(parent: &step_span, Level::INFO, "Flow stopped by step handler.");
          return Ok(FlowResult::Stopped);
        }
        Err(e) => {
          event!(parent: &step_span, Level::WARN, error = %e, "Step handler failed, unwinding.");
          self.unwind(&completed, &ctx_data).await;
          return Err(e);
        }
      }
    }

    event!(Level::DEBUG, "Flow execution completed.");
    Ok(FlowResult::Completed)
  }

  async fn unwind(&self, completed: &[&str], ctx_data: &ContextData<TData>) {
    for step_name in completed.iter().rev() {
      let Some(compensation) = self.compensations.get(*step_name) else {
        continue;
      };
      let comp_span = span!(Level::INFO, "flow_compensation", step_name = *step_name);
      match compensation(ctx_data.clone()).instrument(comp_span).await {
        Ok(()) => event!(Level::INFO, step_name = *step_name, "Compensation applied."),
        Err(e) => event!(
          Level::ERROR,
          step_name = *step_name,
          error = %e,
          "Compensation failed; continuing unwind."
        ),
      }
    }
  }
}
