//! Per-function call-type profiling: the counters the JIT uses to pick a
//! specialization and to decide when a specialization has gone stale.

/// The two concrete native specializations the JIT emits. A function is
/// compiled generically nowhere — every compiled body assumes one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitSpecialization {
    /// All arguments and the return value are treated as `i64`.
    IntOnly,
    /// All arguments and the return value are treated as `f64`.
    FloatOnly,
}

/// Running counts of how a function has been invoked, used both to pick the
/// initial specialization at compile time and to detect, after
/// [`crate::consts::VmConfig::recompile_threshold`] further calls, that the
/// call-site mix no longer matches the chosen specialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeProfile {
    /// Calls where every argument was an `Integer`.
    pub int_calls: u64,
    /// Calls where every argument was a `Float`.
    pub float_calls: u64,
    /// Calls with a mix of argument types, or any non-numeric argument.
    pub mixed_calls: u64,
}

impl TypeProfile {
    /// Record one call's argument-type classification.
    pub fn record(&mut self, all_int: bool, all_float: bool) {
        if all_int {
            self.int_calls += 1;
        } else if all_float {
            self.float_calls += 1;
        } else {
            self.mixed_calls += 1;
        }
    }

    /// Total calls observed across all three buckets.
    pub fn total_calls(&self) -> u64 {
        self.int_calls + self.float_calls + self.mixed_calls
    }

    /// The specialization this profile favors, or `None` if any call was
    /// mixed-type, or the profile has seen both int and float calls and no
    /// mixed ones — both are a `None` ("Mixed") verdict here, and callers
    /// that need a concrete specialization default that to `IntOnly`.
    pub fn preferred_specialization(&self) -> Option<JitSpecialization> {
        if self.mixed_calls > 0 {
            None
        } else if self.float_calls > 0 && self.int_calls == 0 {
            Some(JitSpecialization::FloatOnly)
        } else if self.int_calls > 0 && self.float_calls == 0 {
            Some(JitSpecialization::IntOnly)
        } else {
            None
        }
    }

    /// Whether `current` is still the profile's preferred specialization —
    /// used to decide, at the recompile threshold, whether a fresh compile
    /// is actually warranted.
    pub fn still_prefers(&self, current: JitSpecialization) -> bool {
        self.preferred_specialization() == Some(current)
    }

    /// Reset all counters, e.g. immediately after a (re)compile so the next
    /// window of calls is measured independently of the one that triggered it.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_the_majority_bucket() {
        let mut p = TypeProfile::default();
        for _ in 0..5 {
            p.record(true, false);
        }
        assert_eq!(p.preferred_specialization(), Some(JitSpecialization::IntOnly));
    }

    #[test]
    fn no_preference_with_no_calls() {
        assert_eq!(TypeProfile::default().preferred_specialization(), None);
    }

    #[test]
    fn mixed_calls_suppress_a_preference() {
        let mut p = TypeProfile::default();
        p.record(false, false);
        p.record(false, false);
        p.record(true, false);
        assert_eq!(p.preferred_specialization(), None);
    }

    #[test]
    fn reset_clears_counters() {
        let mut p = TypeProfile::default();
        p.record(true, false);
        p.reset();
        assert_eq!(p.total_calls(), 0);
    }
}
