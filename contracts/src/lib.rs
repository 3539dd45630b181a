// Copyright (c) 2026 PARCEL Contributors. MIT License.
// See LICENSE for details.

//! # PARCEL Contracts
//!
//! The contract-side model of PARCEL's tokenization: a typed, in-process
//! mirror of what the on-chain property-token contract and the gateway's
//! settlement escrow do. The gateway uses these to settle purchases; tests
//! use them to assert settlement math without an RPC node in sight.
//!
//! - **Property Token** — per-property unit registries with issuer-gated
//!   minting and strict supply accounting.
//! - **Purchase Escrow** — per-session custody of buyer funds between
//!   payment and mint, released to the issuer on success or refunded on
//!   failure.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow — `checked_add` and
//!    `checked_sub` everywhere, because wrapping arithmetic and money do
//!    not mix.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Signature verification gates every privileged operation.
//! 4. Every public type is serializable (serde) for wire transport.

pub mod escrow;
pub mod property_token;
