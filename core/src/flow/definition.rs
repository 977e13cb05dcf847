// core/src/flow/definition.rs

//! The `Flow<TData, Err>` definition and its handler registration methods.

use crate::flow::context_data::ContextData;
use crate::flow::control::FlowControl;
use crate::flow::error::FlowError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Boxed step handler. Takes a clone of the run's `ContextData<TData>`.
pub type StepHandler<TData, Err> =
  Box<dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<FlowControl, Err>> + Send>> + Send + Sync>;

/// Boxed compensation for a completed step. Runs only while unwinding a failed flow.
pub type Compensation<TData, Err> =
  Box<dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<(), Err>> + Send>> + Send + Sync>;

/// A named step and whether it may run without a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDef {
  pub name: String,
  pub optional: bool,
}

/// An ordered, named sequence of asynchronous steps over `ContextData<TData>`.
///
/// `Err` must be constructible from [`FlowError`] so the runner can report
/// misconfiguration through the same channel as handler failures.
pub struct Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef>,
  pub(crate) on: HashMap<String, StepHandler<TData, Err>>,
  pub(crate) compensations: HashMap<String, Compensation<TData, Err>>,
}

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Creates a flow from `(step_name, optional)` pairs.
  pub fn new(name: impl Into<String>, step_defs: &[(&str, bool)]) -> Result<Self, FlowError> {
    let mut steps: Vec<StepDef> = Vec::with_capacity(step_defs.len());
    for (step_name, optional) in step_defs {
      if steps.iter().any(|s| s.name == *step_name) {
        return Err(FlowError::DuplicateStep {
          step_name: (*step_name).to_string(),
        });
      }
      steps.push(StepDef {
        name: (*step_name).to_string(),
        optional: *optional,
      });
    }

    Ok(Self {
      name: name.into(),
      steps,
      on: HashMap::new(),
      compensations: HashMap::new(),
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn steps(&self) -> &[StepDef] {
    &self.steps
  }

  fn ensure_step_exists(&self, step_name: &str) -> Result<(), FlowError> {
    if self.steps.iter().any(|s| s.name == step_name) {
      Ok(())
    } else {
      Err(FlowError::StepNotFound {
        step_name: step_name.to_string(),
      })
    }
  }

  /// Sets the handler for `step_name`, replacing any previous one.
  ///
  /// The handler's own error type only has to convert into the flow's `Err`.
  pub fn on_step<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) -> Result<&mut Self, FlowError>
  where
    F: Future<Output = Result<FlowControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name)?;
    let handler: StepHandler<TData, Err> = Box::new(move |ctx_data| {
      let user_fut = handler_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self.on.insert(step_name.to_string(), handler);
    Ok(self)
  }

  /// Registers the undo action for `step_name`.
  pub fn compensate_step<F, UserErr>(
    &mut self,
    step_name: &str,
    compensation_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) -> Result<&mut Self, FlowError>
  where
    F: Future<Output = Result<(), UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name)?;
    let compensation: Compensation<TData, Err> = Box::new(move |ctx_data| {
      let user_fut = compensation_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self.compensations.insert(step_name.to_string(), compensation);
    Ok(self)
  }
}

impl<TData, Err> std::fmt::Debug for Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Flow")
      .field("name", &self.name)
      .field("steps", &self.steps)
      .field("handlers", &self.on.len())
      .field("compensations", &self.compensations.len())
      .finish()
  }
}
