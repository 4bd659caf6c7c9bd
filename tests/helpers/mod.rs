//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod grammars;
pub mod tree_assertions;
