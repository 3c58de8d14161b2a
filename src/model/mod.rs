//! Reconstruction model: one LSTM layer (hidden width = feature count)
//! followed by a tanh dense layer projecting back to feature space.
//!
//! The model is a pure function of `(parameters, batch)`. Recurrent state
//! is created fresh inside every forward call and never survives it;
//! parameters change only through the trainer's optimiser step.

pub mod lstm;
pub mod params;
mod network;

pub use lstm::{LstmCell, StepCache};
pub use network::{RecurrentMode, SequenceModel};
pub use params::ModelParameters;
