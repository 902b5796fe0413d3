//! Core data types shared between the feed client and book consumers.

pub mod book;

pub use book::*;
