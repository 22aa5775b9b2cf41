//! # Banking API
//!
//! A digital-banking REST service: user registration with OTP email
//! verification, JWT-authenticated sessions, checking/savings accounts, and
//! money movement (deposits, withdrawals, transfers, admin reversals) with
//! admin oversight and reporting.
//!
//! ## Architecture
//!
//! The crate follows a layered architecture:
//! ```text
//! REST Layer (axum handlers, request/response translation)
//!     ↓
//! Domain Layer (services, ledger rules, notification events)
//!     ↓
//! Storage Layer (SQLite repositories, atomic balance posting)
//! ```
//!
//! ## Key Responsibilities
//!
//! - **rest**: HTTP surface, auth extraction, error-to-status translation
//! - **domain**: business rules, the monetary posting engine, OTP lifecycle
//! - **storage**: typed per-entity repositories over a shared pool
//! - **auth**: JWT issuance/validation and the authorization policy
//! - **email**: SMTP delivery of verification, reset and transaction mail
//!
//! Every balance mutation runs inside a single database transaction so that
//! concurrent operations against the same account can never lose an update.

pub mod auth;
pub mod config;
pub mod domain;
pub mod email;
pub mod errors;
pub mod rest;
pub mod storage;
