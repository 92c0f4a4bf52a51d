//! Unit tests for tiering

mod test_lifecycle;
