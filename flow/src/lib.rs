// Copyright (c) 2026 PARCEL Contributors. MIT License.
// See LICENSE for details.

//! # PARCEL Flow — Core Library
//!
//! This is the heart of PARCEL's buy side: the purchase flow that turns
//! "I want $2,000 of that building" into settled, on-chain property units.
//!
//! PARCEL takes a deliberately boring stance on architecture: the flow is a
//! strictly linear state machine, every collaborator that lives outside the
//! process (backend, wallet, card processor, analytics) sits behind a trait,
//! and nothing in this crate ever pretends to know the backend's business
//! rules. The backend validates; we orchestrate.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual stages of a
//! purchase:
//!
//! - **asset** — The investable catalog. Read-only, cached, never trusted
//!   past its TTL.
//! - **session** — Flow sessions and status snapshots. A session is a
//!   backend-issued handle for one attempted purchase.
//! - **backend** — The query/command interface to the tokenization backend,
//!   plus the HTTP implementation and a scripted mock.
//! - **wallet** — The injected wallet capability. Sign-and-send is someone
//!   else's problem; we just hold the trait.
//! - **payment** — Payment rails. One trait, one implementation per rail.
//!   Adding a rail never touches the controller.
//! - **poller** — Fixed-interval status polling with bounded retries.
//!   Backends go down; flows should not spin forever when they do.
//! - **controller** — The flow state machine. Owns all mutable flow state,
//!   exclusively.
//! - **analytics** — Fire-and-forget event emission. Failures are logged
//!   and swallowed, never surfaced to the buyer.
//! - **config** — Flow constants and tunables.
//! - **error** — The complete failure taxonomy of a purchase.
//!
//! ## Design Philosophy
//!
//! 1. The backend is authoritative. Client-side bounds are advisory.
//! 2. State transitions are linear and explicit. No backwards edges except
//!    a user-initiated reset.
//! 3. Every remote collaborator is a trait. Tests inject; production wires.
//! 4. If it touches money, it has tests. Plural.

pub mod analytics;
pub mod asset;
pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod payment;
pub mod poller;
pub mod session;
pub mod wallet;

pub use controller::{FlowController, FlowState};
pub use error::FlowError;
pub use session::{FlowSession, SessionStatus, StatusSnapshot};
