//! Core domain types and utilities for fieldcheck.
//!
//! This crate provides the identifiers and error handling shared by the
//! session, authorization and data crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ClientId, InspectionId, ParseIdError, SessionId, TeamId, TemplateId, TestId, UserId};
