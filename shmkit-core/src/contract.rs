// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fatal contract enforcement.
//!
//! A broken precondition on a structure that lives in shared memory corrupts
//! it for every attached process, so there is no recovery path: log and abort.

use crate::error::ContractViolation;

/// Log the violation and terminate the process immediately.
#[cold]
#[inline(never)]
pub fn fatal(violation: ContractViolation) -> ! {
    tracing::error!(%violation, "Contract violation, aborting");
    eprintln!("shmkit: fatal contract violation: {}", violation);
    std::process::abort()
}
