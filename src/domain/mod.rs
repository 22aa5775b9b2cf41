//! # Domain Module
//!
//! Contains all business logic for the banking service.
//!
//! This module encapsulates the core business rules, entities, and services
//! that define how customers, accounts, and transactions are modeled and
//! managed. It operates independently of any specific HTTP framework or
//! storage mechanism.
//!
//! ## Module Organization
//!
//! - **models**: Entities, enums, request/response types and the pagination envelope
//! - **ledger**: Pure money arithmetic, reference generation, and posting plans
//! - **user_service**: Registration, OTP verification, login, and password reset
//! - **account_service**: Account lifecycle (create, update, close) and statements
//! - **transaction_service**: Deposits, withdrawals, transfers, and reversals
//! - **admin_service**: Administrative operations and the daily summary report
//! - **notifier**: Event hand-off for completed-transaction notifications
//!
//! ## Key Responsibilities
//!
//! - **Account Management**: Opening, updating, freezing, and closing accounts
//! - **Money Movement**: Validating and atomically posting balance changes
//! - **Business Rule Enforcement**: Ownership checks, status checks, funds checks
//! - **Authentication Flows**: OTP issuance and verification, credential checks
//! - **Reporting**: Daily platform activity summaries for administrators
//!
//! ## Business Rules
//!
//! - Amounts are positive decimals with at most two fractional digits
//! - Deposits, withdrawals and transfers record the resulting balance on the
//!   ledger row they create
//! - A balance can never be driven below zero by a withdrawal or transfer
//! - Transfers require both accounts active and the same currency
//! - Only completed transactions can be reversed, and only once

pub mod account_service;
pub mod admin_service;
pub mod ledger;
pub mod models;
pub mod notifier;
pub mod transaction_service;
pub mod user_service;

pub use account_service::*;
pub use admin_service::*;
pub use models::*;
pub use notifier::*;
pub use transaction_service::*;
pub use user_service::*;
