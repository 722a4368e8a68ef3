// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! The `cloudbackup` command line: configuration, service wiring, and one
//! module per command family.

pub mod commands;
pub mod common;
pub mod config;
