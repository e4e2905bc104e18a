//! Unit tests for the lifecycle driver.

mod state;
