//! Reflection triggers: pure predicates over an immutable counters snapshot.
//!
//! A trigger never mutates anything. It reports whether reflection should
//! run and which counters the caller should reset afterwards.

use chrono::Duration;

use crate::types::SimTime;

/// Immutable snapshot of a persona's reflection bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionContext {
    /// Budget restored on reset.
    pub importance_trigger_max: i32,
    /// Remaining budget; reflection is due at or below zero.
    pub importance_trigger_curr: i32,
    /// Elements (events) accumulated since the last reset.
    pub importance_ele_n: u32,
    /// Summed poignancy of those elements.
    pub importance_accumulated: u32,
    /// Current simulated time.
    pub now: SimTime,
    /// When reflection last ran, if ever.
    pub last_reflection: Option<SimTime>,
    /// Events in the store.
    pub total_events: usize,
    /// Thoughts in the store.
    pub total_thoughts: usize,
    /// Events added since the event counter was last reset.
    pub events_since_reflection: u32,
    /// Thoughts added since the event counter was last reset.
    pub thoughts_since_reflection: u32,
    /// Whether there is any event or thought to reflect on.
    pub has_memories: bool,
}

/// A trigger's verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerResult {
    /// Run reflection now.
    pub should_reflect: bool,
    /// Restore the importance budget and zero the accumulators.
    pub reset_importance_counter: bool,
    /// Zero the since-reflection event and thought counters.
    pub reset_event_counter: bool,
    /// Human-readable explanation for logs.
    pub reason: String,
}

impl TriggerResult {
    fn fire(reason: impl Into<String>) -> Self {
        Self {
            should_reflect: true,
            reason: reason.into(),
            ..Self::default()
        }
    }

    fn hold(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }
}

/// Decides when a persona should reflect.
pub trait ReflectionTrigger: Send + Sync {
    /// Evaluate against a snapshot.
    fn check(&self, ctx: &ReflectionContext) -> TriggerResult;

    /// Short identifier for logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Reflect once the importance budget counts down to zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportanceThresholdTrigger;

impl ReflectionTrigger for ImportanceThresholdTrigger {
    fn check(&self, ctx: &ReflectionContext) -> TriggerResult {
        if !ctx.has_memories {
            return TriggerResult::hold("no memories to reflect on");
        }
        if ctx.importance_trigger_curr <= 0 {
            return TriggerResult {
                reset_importance_counter: true,
                ..TriggerResult::fire(format!(
                    "importance threshold reached (curr={}, max={})",
                    ctx.importance_trigger_curr, ctx.importance_trigger_max
                ))
            };
        }
        TriggerResult::hold(format!(
            "importance not yet accumulated (curr={})",
            ctx.importance_trigger_curr
        ))
    }

    fn name(&self) -> &'static str {
        "importance_threshold"
    }
}

/// Reflect after enough new events or new thoughts.
#[derive(Debug, Clone, Copy)]
pub struct EventCountTrigger {
    event_threshold: u32,
    thought_threshold: u32,
}

impl EventCountTrigger {
    /// Fire when either count reaches its threshold.
    #[must_use]
    pub fn new(event_threshold: u32, thought_threshold: u32) -> Self {
        Self {
            event_threshold,
            thought_threshold,
        }
    }
}

impl Default for EventCountTrigger {
    fn default() -> Self {
        Self::new(50, 20)
    }
}

impl ReflectionTrigger for EventCountTrigger {
    fn check(&self, ctx: &ReflectionContext) -> TriggerResult {
        if !ctx.has_memories {
            return TriggerResult::hold("no memories");
        }
        let mut hit = Vec::new();
        if ctx.events_since_reflection >= self.event_threshold {
            hit.push(format!("events={}/{}", ctx.events_since_reflection, self.event_threshold));
        }
        if ctx.thoughts_since_reflection >= self.thought_threshold {
            hit.push(format!("thoughts={}/{}", ctx.thoughts_since_reflection, self.thought_threshold));
        }
        if hit.is_empty() {
            return TriggerResult::hold(format!(
                "counts below threshold (events={}, thoughts={})",
                ctx.events_since_reflection, ctx.thoughts_since_reflection
            ));
        }
        TriggerResult {
            reset_event_counter: true,
            ..TriggerResult::fire(format!("event count threshold reached: {}", hit.join(", ")))
        }
    }

    fn name(&self) -> &'static str {
        "event_count"
    }
}

/// Reflect every `interval` of simulated time, and immediately if the
/// persona has never reflected.
#[derive(Debug, Clone, Copy)]
pub struct TimedTrigger {
    interval: Duration,
}

impl TimedTrigger {
    /// Interval in simulated minutes.
    #[must_use]
    pub fn new(interval_minutes: u32) -> Self {
        Self {
            interval: Duration::minutes(i64::from(interval_minutes)),
        }
    }
}

impl Default for TimedTrigger {
    fn default() -> Self {
        Self::new(180)
    }
}

impl ReflectionTrigger for TimedTrigger {
    fn check(&self, ctx: &ReflectionContext) -> TriggerResult {
        if !ctx.has_memories {
            return TriggerResult::hold("no memories");
        }
        let Some(last) = ctx.last_reflection else {
            return TriggerResult::fire("initial reflection");
        };
        let elapsed = ctx.now - last;
        let minutes = (elapsed.num_minutes(), self.interval.num_minutes());
        if elapsed >= self.interval {
            TriggerResult::fire(format!("interval reached ({}m >= {}m)", minutes.0, minutes.1))
        } else {
            TriggerResult::hold(format!("interval not reached ({}m < {}m)", minutes.0, minutes.1))
        }
    }

    fn name(&self) -> &'static str {
        "timed"
    }
}

/// Fires whenever there is something to reflect on.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTrigger;

impl ReflectionTrigger for AlwaysTrigger {
    fn check(&self, ctx: &ReflectionContext) -> TriggerResult {
        if ctx.has_memories {
            TriggerResult::fire("always")
        } else {
            TriggerResult::hold("no memories")
        }
    }

    fn name(&self) -> &'static str {
        "always"
    }
}

/// Never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverTrigger;

impl ReflectionTrigger for NeverTrigger {
    fn check(&self, _ctx: &ReflectionContext) -> TriggerResult {
        TriggerResult::hold("reflection disabled")
    }

    fn name(&self) -> &'static str {
        "never"
    }
}

/// AND / OR combination of sub-triggers.
///
/// Reset flags are the OR of whichever sub-triggers fired, in both modes.
/// With no sub-triggers it never fires.
pub struct CompositeTrigger {
    triggers: Vec<Box<dyn ReflectionTrigger>>,
    require_all: bool,
}

impl CompositeTrigger {
    /// Combine `triggers`; `require_all` selects AND over OR.
    #[must_use]
    pub fn new(triggers: Vec<Box<dyn ReflectionTrigger>>, require_all: bool) -> Self {
        Self {
            triggers,
            require_all,
        }
    }
}

impl ReflectionTrigger for CompositeTrigger {
    fn check(&self, ctx: &ReflectionContext) -> TriggerResult {
        if self.triggers.is_empty() {
            return TriggerResult::hold("no triggers configured");
        }
        let (fired, held): (Vec<TriggerResult>, Vec<TriggerResult>) = self
            .triggers
            .iter()
            .map(|t| t.check(ctx))
            .partition(|r| r.should_reflect);

        let should_reflect = if self.require_all {
            held.is_empty()
        } else {
            !fired.is_empty()
        };
        if !should_reflect {
            let reasons: Vec<&str> = held.iter().map(|r| r.reason.as_str()).collect();
            return TriggerResult::hold(format!("composite not met: {}", reasons.join(", ")));
        }
        let reasons: Vec<&str> = fired.iter().map(|r| r.reason.as_str()).collect();
        TriggerResult {
            should_reflect: true,
            reset_importance_counter: fired.iter().any(|r| r.reset_importance_counter),
            reset_event_counter: fired.iter().any(|r| r.reset_event_counter),
            reason: format!("composite ({})", reasons.join(" + ")),
        }
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

/// Fires when the average poignancy per event since the last reflection
/// reaches a threshold.
///
/// The snapshot carries only totals, so the average is a proxy for "a very
/// important event just happened". Firing resets both the numerator and the
/// denominator so each burst is averaged on its own.
#[derive(Debug, Clone, Copy)]
pub struct HighImportanceEventTrigger {
    poignancy_threshold: f64,
}

impl HighImportanceEventTrigger {
    /// Fire at or above `poignancy_threshold` average.
    #[must_use]
    pub fn new(poignancy_threshold: f64) -> Self {
        Self {
            poignancy_threshold,
        }
    }
}

impl Default for HighImportanceEventTrigger {
    fn default() -> Self {
        Self::new(8.0)
    }
}

impl ReflectionTrigger for HighImportanceEventTrigger {
    fn check(&self, ctx: &ReflectionContext) -> TriggerResult {
        if !ctx.has_memories {
            return TriggerResult::hold("no memories");
        }
        let average =
            f64::from(ctx.importance_accumulated) / f64::from(ctx.events_since_reflection.max(1));
        if average >= self.poignancy_threshold {
            TriggerResult {
                reset_importance_counter: true,
                reset_event_counter: true,
                ..TriggerResult::fire(format!(
                    "high average importance ({average:.1} >= {})",
                    self.poignancy_threshold
                ))
            }
        } else {
            TriggerResult::hold(format!("average importance below threshold ({average:.1})"))
        }
    }

    fn name(&self) -> &'static str {
        "high_importance_event"
    }
}
