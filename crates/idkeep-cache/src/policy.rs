//! Refresh policy: when is a cached credential stale?

use chrono::{DateTime, Utc};
use idkeep_core::Credential;
use std::time::Duration;

/// Default fraction of lifetime remaining at which a refresh is due.
pub const DEFAULT_RENEW_THRESHOLD_FRACTION: f64 = 0.20;

/// Default tolerance for a `not_before` slightly in the future.
pub const DEFAULT_NOT_BEFORE_SKEW_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Default upper bound on a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning for [`needs_refresh`] and the cache's fetch path.
///
/// Out-of-range values never produce an error: they fall back to the
/// defaults, so a bad configuration still yields a working cache.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshOptions {
    renew_threshold_fraction: f64,
    not_before_skew_tolerance: Duration,
    fetch_timeout: Duration,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshOptions {
    /// Options with all defaults
    #[must_use]
    pub const fn new() -> Self {
        Self {
            renew_threshold_fraction: DEFAULT_RENEW_THRESHOLD_FRACTION,
            not_before_skew_tolerance: DEFAULT_NOT_BEFORE_SKEW_TOLERANCE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set the renewal threshold; values outside `(0, 1)` (or NaN) reset to the default.
    #[must_use]
    pub fn renew_threshold_fraction(mut self, fraction: f64) -> Self {
        self.renew_threshold_fraction = if fraction > 0.0 && fraction < 1.0 {
            fraction
        } else {
            DEFAULT_RENEW_THRESHOLD_FRACTION
        };
        self
    }

    /// Set the `not_before` skew tolerance; zero resets to the default.
    #[must_use]
    pub const fn not_before_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.not_before_skew_tolerance = if tolerance.is_zero() {
            DEFAULT_NOT_BEFORE_SKEW_TOLERANCE
        } else {
            tolerance
        };
        self
    }

    /// Set the fetch timeout; zero resets to the default.
    #[must_use]
    pub const fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = if timeout.is_zero() {
            DEFAULT_FETCH_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Effective renewal threshold
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.renew_threshold_fraction
    }

    /// Effective skew tolerance
    #[must_use]
    pub const fn skew_tolerance(&self) -> Duration {
        self.not_before_skew_tolerance
    }

    /// Effective fetch timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.fetch_timeout
    }

    fn skew(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.not_before_skew_tolerance)
            .unwrap_or_else(|_| chrono::Duration::seconds(300))
    }
}

/// Logical status of a cached credential, recomputed on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    /// Nothing fetched yet
    Unfetched,
    /// Usable without a refresh
    Fresh,
    /// The next read will try to refresh it
    DueForRefresh,
}

/// Decide whether `cred` must be refreshed at `now`.
///
/// Checks run in order and short-circuit:
/// absent, expired, `not_before` beyond the skew tolerance, non-positive
/// lifetime, remaining fraction at or below the threshold.
#[must_use]
pub fn needs_refresh(cred: Option<&Credential>, options: &RefreshOptions, now: DateTime<Utc>) -> bool {
    let Some(cred) = cred else {
        return true;
    };
    if now >= cred.not_after() {
        return true;
    }
    // A skew too large to add to `now` puts no bound on `not_before`.
    if now
        .checked_add_signed(options.skew())
        .is_some_and(|latest| cred.not_before() > latest)
    {
        return true;
    }
    match cred.remaining_fraction(now) {
        None => true,
        Some(remaining) => remaining <= options.threshold(),
    }
}

/// Status of `cred` at `now` under `options`.
#[must_use]
pub fn status_of(cred: Option<&Credential>, options: &RefreshOptions, now: DateTime<Utc>) -> CredentialStatus {
    match cred {
        None => CredentialStatus::Unfetched,
        Some(_) if needs_refresh(cred, options, now) => CredentialStatus::DueForRefresh,
        Some(_) => CredentialStatus::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as TimeDelta;
    use idkeep_testkit::credential_with_window;
    use proptest::prelude::*;

    fn cred(now: DateTime<Utc>, before: TimeDelta, after: TimeDelta) -> Credential {
        credential_with_window("spiffe://example.org/api", now + before, now + after)
    }

    #[test]
    fn absent_credential_needs_refresh() {
        assert!(needs_refresh(None, &RefreshOptions::default(), Utc::now()));
    }

    #[test]
    fn mostly_remaining_lifetime_is_fresh() {
        let now = Utc::now();
        let c = cred(now, TimeDelta::hours(-1), TimeDelta::hours(23));
        assert!(!needs_refresh(Some(&c), &RefreshOptions::default(), now));
        assert_eq!(
            status_of(Some(&c), &RefreshOptions::default(), now),
            CredentialStatus::Fresh
        );
    }

    #[test]
    fn little_remaining_lifetime_is_stale() {
        let now = Utc::now();
        let c = cred(now, TimeDelta::hours(-23), TimeDelta::hours(1));
        assert!(needs_refresh(Some(&c), &RefreshOptions::default(), now));
        assert_eq!(
            status_of(Some(&c), &RefreshOptions::default(), now),
            CredentialStatus::DueForRefresh
        );
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let now = Utc::now();
        // exactly 20% of a 10h lifetime left
        let c = cred(now, TimeDelta::hours(-8), TimeDelta::hours(2));
        assert!(needs_refresh(Some(&c), &RefreshOptions::default(), now));

        let c = cred(now, TimeDelta::hours(-7), TimeDelta::hours(3));
        assert!(!needs_refresh(Some(&c), &RefreshOptions::default(), now));
    }

    #[test]
    fn expired_credential_needs_refresh() {
        let now = Utc::now();
        let c = cred(now, TimeDelta::hours(-2), TimeDelta::zero());
        assert!(needs_refresh(Some(&c), &RefreshOptions::default(), now));
    }

    #[test]
    fn future_not_before_beyond_skew_needs_refresh() {
        let now = Utc::now();
        let options = RefreshOptions::default();

        let within = cred(now, TimeDelta::minutes(3), TimeDelta::hours(24));
        assert!(!needs_refresh(Some(&within), &options, now));

        let beyond = cred(now, TimeDelta::minutes(10), TimeDelta::hours(24));
        assert!(needs_refresh(Some(&beyond), &options, now));
    }

    #[test]
    fn non_positive_lifetime_needs_refresh() {
        let now = Utc::now();
        let options = RefreshOptions::default();

        let zero = cred(now, TimeDelta::hours(1), TimeDelta::hours(1));
        assert!(needs_refresh(Some(&zero), &options, now));

        let inverted = cred(now, TimeDelta::hours(2), TimeDelta::hours(1));
        assert!(needs_refresh(Some(&inverted), &options, now));
    }

    #[test]
    fn invalid_options_fall_back_to_defaults() {
        for bad in [0.0, -0.5, 1.0, 1.5, f64::NAN] {
            let options = RefreshOptions::new().renew_threshold_fraction(bad);
            assert!((options.threshold() - DEFAULT_RENEW_THRESHOLD_FRACTION).abs() < f64::EPSILON);
        }
        let options = RefreshOptions::new()
            .not_before_skew_tolerance(Duration::ZERO)
            .fetch_timeout(Duration::ZERO);
        assert_eq!(options.skew_tolerance(), DEFAULT_NOT_BEFORE_SKEW_TOLERANCE);
        assert_eq!(options.timeout(), DEFAULT_FETCH_TIMEOUT);
    }

    #[test]
    fn huge_skew_tolerance_does_not_overflow() {
        let now = Utc::now();
        let options = RefreshOptions::new()
            .not_before_skew_tolerance(Duration::from_secs(10_000_000_000_000));

        let far_future = cred(now, TimeDelta::days(3650), TimeDelta::days(3651));
        assert!(!needs_refresh(Some(&far_future), &options, now));

        let stale = cred(now, TimeDelta::hours(-23), TimeDelta::hours(1));
        assert!(needs_refresh(Some(&stale), &options, now));
        assert_eq!(status_of(Some(&stale), &options, now), CredentialStatus::DueForRefresh);
    }

    #[test]
    fn custom_threshold_changes_decision() {
        let now = Utc::now();
        // 50% remaining
        let c = cred(now, TimeDelta::hours(-5), TimeDelta::hours(5));
        assert!(!needs_refresh(Some(&c), &RefreshOptions::default(), now));
        let eager = RefreshOptions::new().renew_threshold_fraction(0.6);
        assert!(needs_refresh(Some(&c), &eager, now));
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    /// Lifetime in seconds paired with an elapsed offset strictly before `notAfter`.
    /// Negative offsets put `notBefore` up to five minutes in the future.
    fn live_window() -> impl Strategy<Value = (i64, i64)> {
        (60i64..10_000_000).prop_flat_map(|lifetime| (Just(lifetime), -300i64..lifetime))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Property: more lifetime left than the threshold, with `notBefore`
        /// inside the skew tolerance, never triggers a refresh.
        #[test]
        fn prop_remaining_above_threshold_is_fresh(
            (lifetime, elapsed) in live_window(),
            threshold in 0.01f64..0.99,
        ) {
            let remaining = (lifetime - elapsed) as f64 / lifetime as f64;
            prop_assume!(remaining > threshold);

            let now = fixed_now();
            let c = cred(now, TimeDelta::seconds(-elapsed), TimeDelta::seconds(lifetime - elapsed));
            let options = RefreshOptions::new().renew_threshold_fraction(threshold);
            prop_assert!(!needs_refresh(Some(&c), &options, now));
            prop_assert_eq!(status_of(Some(&c), &options, now), CredentialStatus::Fresh);
        }

        /// Property: at or below the threshold a refresh is always due,
        /// including for credentials that already expired.
        #[test]
        fn prop_remaining_at_or_below_threshold_is_stale(
            (lifetime, elapsed) in (60i64..10_000_000)
                .prop_flat_map(|lifetime| (Just(lifetime), 0i64..=lifetime * 2)),
            threshold in 0.01f64..0.99,
        ) {
            let remaining = (lifetime - elapsed) as f64 / lifetime as f64;
            prop_assume!(remaining <= threshold);

            let now = fixed_now();
            let c = cred(now, TimeDelta::seconds(-elapsed), TimeDelta::seconds(lifetime - elapsed));
            let options = RefreshOptions::new().renew_threshold_fraction(threshold);
            prop_assert!(needs_refresh(Some(&c), &options, now));
        }

        /// Property: a window with `notAfter <= notBefore` always needs a refresh.
        #[test]
        fn prop_non_positive_lifetime_is_stale(
            not_before in -1_000_000i64..1_000_000,
            shrink in 0i64..1_000_000,
            threshold in 0.01f64..0.99,
            skew_secs in 1u64..100_000,
        ) {
            let now = fixed_now();
            let c = cred(
                now,
                TimeDelta::seconds(not_before),
                TimeDelta::seconds(not_before - shrink),
            );
            let options = RefreshOptions::new()
                .renew_threshold_fraction(threshold)
                .not_before_skew_tolerance(Duration::from_secs(skew_secs));
            prop_assert!(needs_refresh(Some(&c), &options, now));
        }
    }
}
