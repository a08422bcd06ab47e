// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the token lifecycle.

pub mod credential;
pub mod user;

pub use credential::{Credential, TokenResponse};
pub use user::User;
