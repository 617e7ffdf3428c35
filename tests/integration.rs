// Integration test suite for the conversation gateway.
//
// Organized by API surface; each module shares `common::TestClient` for
// per-test sqlite lifecycle management.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/system.rs"]
mod system;
#[path = "integration/send.rs"]
mod send;
#[path = "integration/bindings.rs"]
mod bindings;
#[path = "integration/replay.rs"]
mod replay;
#[path = "integration/usage.rs"]
mod usage;
