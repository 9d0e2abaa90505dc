//! Shared object model tests.

mod collaboration;
