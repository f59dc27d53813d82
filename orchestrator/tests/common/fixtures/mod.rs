//! Shared test utilities:
//! - Fake supervisor and client that record every call
//! - Mock archive and RPC servers, plus a server that cuts bodies short
//! - Node settings and on-disk layout builders
//! - Common test data

// Not every test binary uses every fixture
#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fake_client;
pub mod fake_supervisor;
pub mod mock_archive;
pub mod mock_rpc;
pub mod test_data;
pub mod test_node;
pub mod truncated_archive;

pub use fake_client::{FakeClient, PassingGate};
pub use fake_supervisor::FakeSupervisor;
pub use mock_archive::{tar_archive, MockArchiveServer};
pub use mock_rpc::MockRpcServer;
pub use test_data::*;
pub use test_node::TestNode;
pub use truncated_archive::{large_story_archive, noisy_archive, TruncatedArchiveServer};
