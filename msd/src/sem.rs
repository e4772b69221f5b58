// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Take a register-block lock.  A panic while a transaction was in flight
/// leaves the hardware in whatever state it reached, same as an error
/// return, so a poisoned lock is simply taken over.
pub(crate) fn lock(sem: &Mutex<()>) -> MutexGuard<'_, ()> {
    sem.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One lock per indirect register block.  Where an operation needs two, it
/// always takes them in declaration order.
#[derive(Default)]
pub(crate) struct Semaphores {
    /// Monitor/management and per-port policy pointer registers
    pub tbl_regs: Mutex<()>,
    /// Address translation unit
    pub atu_regs: Mutex<()>,
    /// PTP time-of-day arrays
    pub ptp_tod: Mutex<()>,
    /// PTP mode pointer register
    pub ptp_mode: Mutex<()>,
    /// AVB/PTP command window
    pub ptp_regs: Mutex<()>,
    /// MACSec APB window
    pub apb_regs: Mutex<()>,
}
