pub mod fakes;
pub mod test_harness;

pub use fakes::{InMemoryBroker, StubFetcher};
pub use test_harness::{wait_until, TestHarness};
