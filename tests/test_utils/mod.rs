pub mod fixtures;

pub use fixtures::{DSN, TestTransport, clock, test_transport};
