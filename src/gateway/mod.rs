//! Usage: Outbound side of the access layer (platform adapters and their plumbing).

pub mod access;
