//! End-to-end session tests against the mock backend

pub mod connection_tests;
pub mod reconnect_tests;
pub mod streaming_tests;
