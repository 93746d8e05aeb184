//! # Framework configuration.
//!
//! Provides [`Config`], the settings a [`Framework`](crate::Framework) is built from.
//!
//! Config is used in two ways:
//! 1. **Caller selection**: `threaded` and `recursion_limit` pick the caller
//!    the builder wires up when none is given explicitly.
//! 2. **Defaults for operations**: `capture_stack` for managed resources and
//!    `default_parallelism` for `eventually_collect`.
//!
//! ## Sentinel values
//! - `recursion_limit = 0` → no recursion guard
//! - `default_parallelism = 0` → treated as 1

/// Settings for the framework and the callers it builds.
///
/// ## Caller selection
/// ```text
/// threaded = true           → ThreadedCaller(executor)
/// recursion_limit = n > 0   → RecursionSafeCaller(DirectCaller, executor, n)
/// otherwise                 → DirectCaller
/// ```
/// Both executor-backed modes require an executor; the builder rejects the
/// configuration otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Always hand callbacks off to the executor.
    pub threaded: bool,

    /// Nested inline dispatches allowed per thread before handing off.
    ///
    /// - `0` = no recursion guard
    /// - `n > 0` = trampoline onto the executor past depth `n`
    pub recursion_limit: usize,

    /// Capture a backtrace per borrow of managed resources, reported when a
    /// borrow leaks. Off by default; capturing is expensive.
    pub capture_stack: bool,

    /// Parallelism used by [`Framework::eventually_collect`](crate::Framework::eventually_collect)
    /// when the caller passes `None`.
    pub default_parallelism: usize,
}

impl Config {
    /// Returns the recursion limit as an `Option`.
    ///
    /// - `None` → no recursion guard
    /// - `Some(n)` → guard at depth `n`
    #[inline]
    pub fn recursion_guard(&self) -> Option<usize> {
        if self.recursion_limit == 0 {
            None
        } else {
            Some(self.recursion_limit)
        }
    }

    /// Returns the default parallelism clamped to a minimum of 1.
    #[inline]
    pub fn parallelism_clamped(&self) -> usize {
        self.default_parallelism.max(1)
    }

    /// Name of the caller mode this config selects, used in errors and logs.
    pub(crate) fn mode(&self) -> &'static str {
        if self.threaded {
            "threaded"
        } else if self.recursion_limit > 0 {
            "recursion_safe"
        } else {
            "direct"
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `threaded = false` (inline dispatch)
    /// - `recursion_limit = 0` (no guard)
    /// - `capture_stack = false`
    /// - `default_parallelism = 8`
    fn default() -> Self {
        Self {
            threaded: false,
            recursion_limit: 0,
            capture_stack: false,
            default_parallelism: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        let mut cfg = Config::default();
        assert_eq!(cfg.recursion_guard(), None);
        assert_eq!(cfg.mode(), "direct");

        cfg.recursion_limit = 128;
        cfg.default_parallelism = 0;
        assert_eq!(cfg.recursion_guard(), Some(128));
        assert_eq!(cfg.parallelism_clamped(), 1);
        assert_eq!(cfg.mode(), "recursion_safe");

        cfg.threaded = true;
        assert_eq!(cfg.mode(), "threaded");
    }
}
