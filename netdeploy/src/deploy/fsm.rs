//! Finite State Machine for a single device deployment

use serde::{Deserialize, Serialize};

/// Deployment state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    /// Initial state, no session yet
    Pending,

    /// Session established
    Connected,

    /// Running and intended configs compared
    DeltaComputed { empty: bool },

    /// Pre-change backup persisted
    BackedUp,

    /// Delta committed and saved
    Applied,

    /// Post-change validation ran
    Validated { ok: bool },

    /// Finished, successfully or flagged
    Done,

    /// Hard error; absorbing
    Failed,
}

impl DeployState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Done | DeployState::Failed)
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// Session acquired
    Connect,

    /// Delta computed with this many lines
    DeltaComputed(usize),

    /// Backup written
    BackedUp,

    /// Delta applied
    Applied,

    /// Validation finished with the given verdict
    Validated(bool),

    /// Wrap up
    Finish,

    /// Any step failed
    Fail(String),
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    state: DeployState,
    error: Option<String>,
    history: Vec<DeployState>,
}

impl DeployFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: DeployState::Pending,
            error: None,
            history: vec![DeployState::Pending],
        }
    }

    /// Get current state
    pub fn state(&self) -> &DeployState {
        &self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Every state visited so far, starting with `Pending`
    pub fn history(&self) -> &[DeployState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeployEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (DeployState::Pending, DeployEvent::Connect) => DeployState::Connected,

            (DeployState::Connected, DeployEvent::DeltaComputed(n)) => {
                DeployState::DeltaComputed { empty: *n == 0 }
            }

            // Empty delta: nothing to back up, apply or validate
            (DeployState::DeltaComputed { empty: true }, DeployEvent::Finish) => DeployState::Done,
            (DeployState::DeltaComputed { empty: false }, DeployEvent::BackedUp) => {
                DeployState::BackedUp
            }

            (DeployState::BackedUp, DeployEvent::Applied) => DeployState::Applied,

            (DeployState::Applied, DeployEvent::Validated(ok)) => DeployState::Validated { ok: *ok },

            (DeployState::Validated { .. }, DeployEvent::Finish) => DeployState::Done,

            (state, DeployEvent::Fail(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                DeployState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.history.push(new_state.clone());
        self.state = new_state;
        Ok(())
    }

    /// Whether the deployment reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

impl Default for DeployFsm {
    fn default() -> Self {
        Self::new()
    }
}
