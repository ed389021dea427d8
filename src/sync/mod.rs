// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Synchronization Substrate (spec.md §4.1): a counting semaphore, a mutex
//! built from it, a condition variable, and a writer-preferring
//! readers-writer lock built from the condition variable.
//!
//! All four primitives expose a scoped "run-with" helper that guarantees
//! release on every exit path, including panics unwinding through the
//! future (release happens via `Drop`, never via a fallible manual call —
//! see DESIGN.md for why this is a strictly stronger rendition of the
//! source spec's "release on unheld lock fails fatally" contract).

pub mod condition;
pub mod mutex;
pub mod rwlock;
pub mod semaphore;

pub use condition::Condition;
pub use mutex::Mutex;
pub use rwlock::RwLock;
pub use semaphore::{Semaphore, SemaphorePermit};
