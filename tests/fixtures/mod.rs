//! Shared integration test fixtures

#![allow(dead_code)]

pub mod test_data;
