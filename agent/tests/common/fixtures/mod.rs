#![allow(dead_code)]

pub mod stubs;
pub mod test_agent;

pub use stubs::{StubClient, StubGate, StubSupervisor};
pub use test_agent::{TestAgent, API_KEY, MONIKER};
