//! noit-api — research Q&A backend.
//!
//! The interesting part is the authenticated-request gate: every inbound
//! request passes the single-origin gate, and protected endpoints resolve
//! a stateless HS256 session token to a subject identity before any
//! business logic runs. Accounts live in SQLite with salted, stretched
//! credential hashes; answers come from the OpenAI chat API or a
//! development echo fallback.

pub mod auth;
pub mod config;
pub mod database;
pub mod gateway;
pub mod research;
