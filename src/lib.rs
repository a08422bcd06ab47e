// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! FCMS CAPI: OAuth-guarded access to the Frontier Companion API
//!
//! This crate keeps a commander's Frontier OAuth credential fresh and uses
//! it to fetch the commander profile and fleet carrier from CAPI.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
