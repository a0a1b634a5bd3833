//! Behavioural suites for the daemon.

mod batch_behaviour;
mod bootstrap_behaviour;
mod dispatch_flow;
mod support;
