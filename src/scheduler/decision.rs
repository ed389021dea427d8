// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Deferred Switch Scheduler's decision table (spec.md §4.3). `decide`
//! is a pure function: no I/O, no shared state, only the inputs a caller
//! gives it — which makes the rule table straightforward to test in
//! isolation from the scheduler's queues and timers.

use crate::{
    cfg::config::SwitchThresholds,
    model::{
        operation::OperationId,
        switch::{SwitchDecision, SwitchPriority, SwitchReason},
    },
};

/// Everything `decide` needs to know about one active operation. A
/// snapshot rather than a borrow of [`crate::model::operation::ActiveOperation`]
/// because that type carries non-`Copy` callbacks the decision table never
/// touches.
#[derive(Debug, Clone, Copy)]
pub struct OperationSnapshot {
    pub id: OperationId,
    pub criticality: u8,
    pub interruptible: bool,
    pub started_at_ms: u64,
    pub estimated_duration_ms: u64,
}

impl OperationSnapshot {
    fn remaining_ms(&self, now_ms: u64) -> u64 {
        if self.estimated_duration_ms == 0 {
            return 0;
        }
        (self.started_at_ms + self.estimated_duration_ms).saturating_sub(now_ms)
    }

    fn has_live_deadline(&self, now_ms: u64) -> bool {
        self.estimated_duration_ms > 0 && self.started_at_ms + self.estimated_duration_ms > now_ms
    }
}

/// Evaluates the rule table from spec.md §4.3 against a snapshot of
/// currently active operations.
///
/// `p`, the effective priority level guarding each rule, is
/// `max(priority.level(), criticality)` — both are already on a `[0, 100]`
/// scale, and folding the request's own criticality in is what reconciles
/// the table with the worked "interruptible work promotes" example, where a
/// `high` priority alone (level 60) falls short of `thresholds.fast` (70)
/// but the request's criticality of 75 clears it. See DESIGN.md.
pub fn decide(
    reason: SwitchReason,
    priority: SwitchPriority,
    criticality: u8,
    active: &[OperationSnapshot],
    thresholds: &SwitchThresholds,
    max_delay_ms: u64,
    grace_period_ms: u64,
    now_ms: u64,
) -> SwitchDecision {
    let p = priority.level().max(criticality as u32);
    let clamp = |d: u64| d.min(max_delay_ms);

    let o_high: Vec<&OperationSnapshot> = active
        .iter()
        .filter(|o| o.criticality as u32 >= thresholds.immediate)
        .collect();
    let o_critical: Vec<&OperationSnapshot> = active
        .iter()
        .filter(|o| o.criticality as u32 >= thresholds.normal)
        .collect();

    // Rule 1.
    if reason == SwitchReason::Emergency || priority == SwitchPriority::Emergency || p >= thresholds.immediate
    {
        let affected = o_high.iter().map(|o| o.id).collect();
        return SwitchDecision::immediate(
            "emergency reason, emergency priority, or criticality at the immediate threshold",
            affected,
        );
    }

    // Rules 2-4: O_high nonempty.
    if !o_high.is_empty() {
        if o_high.iter().all(|o| o.interruptible) && p >= thresholds.fast {
            let affected = o_high.iter().map(|o| o.id).collect();
            return SwitchDecision::immediate(
                "high-criticality operations are all interruptible",
                affected,
            );
        }

        let max_deadline = o_high
            .iter()
            .filter(|o| o.has_live_deadline(now_ms))
            .map(|o| o.started_at_ms + o.estimated_duration_ms)
            .max()
            .unwrap_or(now_ms);
        let raw_optimal_ms = grace_period_ms + max_deadline;

        if raw_optimal_ms.saturating_sub(now_ms) > max_delay_ms {
            return SwitchDecision::postponed(max_delay_ms, now_ms);
        }
        let delay = clamp(raw_optimal_ms.saturating_sub(now_ms));
        return SwitchDecision::delayed(
            delay,
            "waiting for high-criticality operations to finish",
            now_ms,
        );
    }

    // Rules 5-9: O_critical nonempty.
    if !o_critical.is_empty() {
        let avg_remaining_ms = {
            let sum: u64 = active.iter().map(|o| o.remaining_ms(now_ms)).sum();
            sum / active.len() as u64
        };
        let all_interruptible = o_critical.iter().all(|o| o.interruptible);
        let any_interruptible = o_critical.iter().any(|o| o.interruptible);
        let mixed_interruptibility = any_interruptible && !all_interruptible;

        let (delay, reason_str) = if all_interruptible && p >= thresholds.normal {
            (500, "critical operations are all interruptible")
        } else if mixed_interruptibility && p >= thresholds.normal {
            (
                2000.min(avg_remaining_ms / 2),
                "critical operations have mixed interruptibility",
            )
        } else if p >= thresholds.fast {
            (5000.min(avg_remaining_ms), "critical operations pending, fast priority")
        } else if p >= thresholds.normal {
            (
                15000.min(2 * avg_remaining_ms),
                "critical operations pending, normal priority",
            )
        } else {
            (
                30000.min(3 * avg_remaining_ms),
                "critical operations pending, low priority",
            )
        };
        return SwitchDecision::delayed(clamp(delay), reason_str, now_ms);
    }

    // Rule 10: no qualifying active operations.
    let baseline = match priority {
        SwitchPriority::High => 1000,
        SwitchPriority::Normal => 2000,
        _ => 5000,
    };
    SwitchDecision::delayed(clamp(baseline), "no qualifying active operations", now_ms)
}
