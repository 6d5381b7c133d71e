//! Drives a chain and numbers what it produces.

use crate::event::{ChainEvent, EventFrame};
use quill_engine::{Chain, ChainError, ChainResponse, ChainStateError, StepResult};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmitterError {
    /// A terminal event was already emitted.
    #[error("event stream is closed")]
    Closed,

    /// The host misused the chain protocol. Nothing was emitted and the
    /// stream stays open.
    #[error(transparent)]
    State(#[from] ChainStateError),
}

pub type EmitterResult<T> = Result<T, EmitterError>;

/// Turns chain calls into an ordered event stream.
#[derive(Debug, Clone, Default)]
pub struct EventEmitter {
    last_id: u64,
    /// Index of the step currently waiting for a response.
    open_step: Option<usize>,
    closed: bool,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Id of the most recent frame; zero before the first.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    /// Start (`None`) or resume `chain` and return the frames it produced.
    ///
    /// An accepted response yields `step-complete` followed by the next
    /// `step` or `complete`. A compile failure yields a single `error`.
    pub fn advance(
        &mut self,
        chain: &mut Chain,
        response: Option<ChainResponse>,
    ) -> EmitterResult<Vec<EventFrame>> {
        if self.closed {
            return Err(EmitterError::Closed);
        }

        let answered = response.as_ref().and_then(|response| {
            self.open_step.map(|index| ChainEvent::StepComplete {
                index,
                response: response.clone(),
            })
        });

        let result = match response {
            Some(response) => chain.resume(response),
            None => chain.step(None),
        };

        let mut frames = Vec::new();
        match result {
            Ok(StepResult::Step(step)) => {
                frames.extend(answered.map(|event| self.frame(event)));
                self.open_step = Some(step.index);
                frames.push(self.frame(ChainEvent::Step(step)));
            }
            Ok(StepResult::Complete(completion)) => {
                frames.extend(answered.map(|event| self.frame(event)));
                frames.push(self.frame(ChainEvent::Complete(completion)));
            }
            Err(ChainError::State(err)) => {
                trace!(error = %err, "chain rejected call");
                return Err(err.into());
            }
            Err(err) => frames.push(self.frame(ChainEvent::from_error(&err))),
        }

        debug!(frames = frames.len(), last_id = self.last_id, closed = self.closed, "advanced chain");
        Ok(frames)
    }

    fn frame(&mut self, event: ChainEvent) -> EventFrame {
        self.last_id += 1;
        if event.is_terminal() {
            self.closed = true;
            self.open_step = None;
        }
        EventFrame {
            id: self.last_id,
            event,
        }
    }
}
