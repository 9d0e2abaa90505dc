//! Client editor scenarios.
//!
//! Remote operations are built by hand the way the authority would deliver
//! them, so every step of the state machine can be checked.

mod batching;
mod convergence;
mod scenarios;
