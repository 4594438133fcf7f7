//! End-to-end tests for Tidegate
//!
//! Each test opens a real gateway on a loopback port, backed by the
//! simulated engine, and talks to it over HTTP.

mod gateway_workflow;
mod harness;
mod shutdown;
