//! Small leaf utilities shared by every aptsync crate.

pub mod error;
pub mod fs;
pub mod hash;
pub mod path;
