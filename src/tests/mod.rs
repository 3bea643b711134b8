//! Test support shared by unit tests and the `tests/` integration suite.

pub mod fakes;
