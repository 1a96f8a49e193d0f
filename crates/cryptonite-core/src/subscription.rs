//! Trial and paid eligibility.
//!
//! ## States
//!
//! - **Paid**: a purchase was confirmed, the extension works indefinitely
//! - **Trial**: the trial started and has not run out yet
//! - **Expired**: neither paid nor in an active trial
//!
//! A trial starts at most once. Its expiry is scheduled by the host, but a
//! host that restarts after the expiry moment is covered by the lazy check
//! in [`SubscriptionGate::status`].

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::ClassificationApi;
use crate::config::DEFAULT_TRIAL_DAYS;
use crate::store::{keys, PropertyStore};

/// Longest trial a config may ask for.
pub const MAX_TRIAL_DAYS: i64 = 3650;

/// Raw persisted subscription fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub is_paid: bool,
    pub is_trial_active: bool,
    /// Trial start in milliseconds since the epoch.
    pub trial_start_timestamp: Option<i64>,
}

/// Effective eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Paid,
    Trial {
        #[serde(rename = "expiresAt")]
        expires_at: DateTime<Utc>,
    },
    Expired,
}

impl SubscriptionStatus {
    /// Returns true if classification may run.
    pub fn can_use_extension(&self) -> bool {
        !matches!(self, Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Trial { .. } => "trial",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subscription gate over the persisted flags.
#[derive(Debug, Clone)]
pub struct SubscriptionGate {
    props: PropertyStore,
    trial_length: Duration,
}

impl SubscriptionGate {
    /// Trial lengths outside `1..=MAX_TRIAL_DAYS` fall back to the default.
    pub fn new(props: PropertyStore, trial_days: i64) -> Self {
        let trial_length = Some(trial_days)
            .filter(|days| (1..=MAX_TRIAL_DAYS).contains(days))
            .and_then(Duration::try_days)
            .unwrap_or_else(|| {
                warn!(trial_days, "Unusable trial length, using {} days", DEFAULT_TRIAL_DAYS);
                Duration::days(DEFAULT_TRIAL_DAYS)
            });

        Self {
            props,
            trial_length,
        }
    }

    pub fn trial_length(&self) -> Duration {
        self.trial_length
    }

    /// Reads the persisted fields as-is.
    pub fn state(&self) -> SubscriptionState {
        SubscriptionState {
            is_paid: self.props.get_bool(keys::EXTENSION_PAID),
            is_trial_active: self.props.get_bool(keys::TRIAL_ACTIVE),
            trial_start_timestamp: self.props.get_i64(keys::TRIAL_START_TIMESTAMP),
        }
    }

    fn trial_start(&self) -> Option<DateTime<Utc>> {
        let ms = self.props.get_i64(keys::TRIAL_START_TIMESTAMP)?;
        Utc.timestamp_millis_opt(ms).single()
    }

    /// When the current trial runs out.
    pub fn trial_expires_at(&self) -> Option<DateTime<Utc>> {
        self.trial_start()?.checked_add_signed(self.trial_length)
    }

    /// Current eligibility. Expires an overdue trial as a side effect.
    pub fn status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        if self.props.get_bool(keys::EXTENSION_PAID) {
            return SubscriptionStatus::Paid;
        }

        if self.is_trial_active(now) {
            match self.trial_expires_at() {
                Some(expires_at) => SubscriptionStatus::Trial { expires_at },
                None => SubscriptionStatus::Expired,
            }
        } else {
            SubscriptionStatus::Expired
        }
    }

    pub fn can_use_extension(&self, now: DateTime<Utc>) -> bool {
        self.status(now).can_use_extension()
    }

    /// Reads the trial flag, expiring the trial if its end has passed.
    pub fn is_trial_active(&self, now: DateTime<Utc>) -> bool {
        if !self.props.get_bool(keys::TRIAL_ACTIVE) {
            return false;
        }

        match self.trial_expires_at() {
            Some(expires_at) if now >= expires_at => {
                debug!(%expires_at, "Trial ran out while no timer was pending");
                self.expire_trial();
                false
            }
            Some(_) => true,
            None => {
                warn!("Active trial has no start timestamp");
                self.expire_trial();
                false
            }
        }
    }

    /// Starts the trial if it never started.
    ///
    /// Returns the expiry to schedule, or `None` if a trial already started.
    pub fn start_trial(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.props.get_i64(keys::TRIAL_START_TIMESTAMP).is_some() {
            return None;
        }

        self.begin_trial(now)
    }

    fn begin_trial(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.props
            .set(keys::TRIAL_START_TIMESTAMP, &now.timestamp_millis());
        self.props.set(keys::TRIAL_ACTIVE, &true);

        let expires_at = now.checked_add_signed(self.trial_length)?;
        info!(%expires_at, "Trial started");
        Some(expires_at)
    }

    /// Ends the trial. Returns false if it was not active.
    pub fn expire_trial(&self) -> bool {
        if !self.props.get_bool(keys::TRIAL_ACTIVE) {
            return false;
        }

        info!("Trial expired");
        self.props.set(keys::TRIAL_ACTIVE, &false);
        true
    }

    /// Restarts an inactive trial from `now`.
    ///
    /// Returns the new expiry, or `None` if the trial is still active.
    pub fn reactivate_trial(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_trial_active(now) {
            return None;
        }

        self.begin_trial(now)
    }

    pub fn set_paid(&self, paid: bool) {
        info!(paid, "Updating paid flag");
        self.props.set(keys::EXTENSION_PAID, &paid);
    }

    pub fn subscription_id(&self) -> Option<String> {
        self.props
            .get_string(keys::SUBSCRIPTION_ID)
            .filter(|id| !id.is_empty())
    }

    pub fn set_subscription_id(&self, id: &str) {
        self.props.set(keys::SUBSCRIPTION_ID, id);
    }

    /// Looks up the stored subscription and marks the extension paid on success.
    ///
    /// Returns the paid flag after the lookup. Lookup failures leave it unchanged.
    pub async fn refresh_purchases(&self, api: &dyn ClassificationApi) -> bool {
        let Some(id) = self.subscription_id() else {
            return self.props.get_bool(keys::EXTENSION_PAID);
        };

        match api.check_extension_status(&id).await {
            Ok(true) => self.set_paid(true),
            Ok(false) => debug!(subscription_id = %id, "Purchase not confirmed"),
            Err(e) => debug!(error = %e, "Purchase lookup failed"),
        }

        self.props.get_bool(keys::EXTENSION_PAID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, CheckRequest, ClassificationResponse};
    use async_trait::async_trait;

    fn gate() -> SubscriptionGate {
        SubscriptionGate::new(PropertyStore::in_memory(), 7)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    // ==================== Trial Length Tests ====================

    #[test]
    fn out_of_range_trial_length_uses_default() {
        for days in [0, -3, MAX_TRIAL_DAYS + 1, i64::MAX, i64::MIN] {
            let gate = SubscriptionGate::new(PropertyStore::in_memory(), days);
            assert_eq!(gate.trial_length(), Duration::days(DEFAULT_TRIAL_DAYS), "{days}");
        }
    }

    #[test]
    fn configured_trial_length_is_used() {
        let gate = SubscriptionGate::new(PropertyStore::in_memory(), 30);
        assert_eq!(gate.start_trial(t0()), Some(t0() + Duration::days(30)));
    }

    // ==================== Status Tests ====================

    #[test]
    fn fresh_gate_is_expired() {
        let gate = gate();
        assert_eq!(gate.status(t0()), SubscriptionStatus::Expired);
        assert!(!gate.can_use_extension(t0()));
        assert_eq!(gate.state(), SubscriptionState::default());
    }

    #[test]
    fn paid_overrides_trial() {
        let gate = gate();
        gate.set_paid(true);
        assert_eq!(gate.status(t0()), SubscriptionStatus::Paid);
        assert!(gate.can_use_extension(t0()));
    }

    #[test]
    fn trial_runs_for_configured_days() {
        let gate = gate();
        let expires = gate.start_trial(t0()).unwrap();
        assert_eq!(expires, t0() + Duration::days(7));

        assert_eq!(
            gate.status(t0() + Duration::days(6)),
            SubscriptionStatus::Trial { expires_at: expires }
        );
        assert!(gate.state().is_trial_active);
    }

    #[test]
    fn overdue_trial_expires_lazily() {
        let gate = gate();
        gate.start_trial(t0());

        assert_eq!(gate.status(t0() + Duration::days(8)), SubscriptionStatus::Expired);
        assert!(!gate.state().is_trial_active);
    }

    // ==================== Transition Tests ====================

    #[test]
    fn trial_starts_only_once() {
        let gate = gate();
        assert!(gate.start_trial(t0()).is_some());
        assert!(gate.start_trial(t0() + Duration::days(1)).is_none());
        assert_eq!(gate.state().trial_start_timestamp, Some(t0().timestamp_millis()));

        gate.expire_trial();
        assert!(gate.start_trial(t0() + Duration::days(2)).is_none());
        assert!(!gate.can_use_extension(t0() + Duration::days(2)));
    }

    #[test]
    fn expire_is_idempotent() {
        let gate = gate();
        gate.start_trial(t0());
        assert!(gate.expire_trial());
        assert!(!gate.expire_trial());
        assert_eq!(gate.status(t0()), SubscriptionStatus::Expired);
    }

    #[test]
    fn reactivate_is_idempotent() {
        let gate = gate();
        gate.start_trial(t0());
        assert!(gate.reactivate_trial(t0()).is_none());
        assert_eq!(gate.state().trial_start_timestamp, Some(t0().timestamp_millis()));

        gate.expire_trial();
        let later = t0() + Duration::days(30);
        assert_eq!(gate.reactivate_trial(later), Some(later + Duration::days(7)));
        assert!(gate.can_use_extension(later));
    }

    // ==================== Purchase Tests ====================

    struct StubApi {
        paid: bool,
    }

    #[async_trait]
    impl ClassificationApi for StubApi {
        async fn check_url(
            &self,
            _request: CheckRequest,
        ) -> crate::api::Result<Option<ClassificationResponse>> {
            Ok(None)
        }

        async fn check_extension_status(&self, _subscription_id: &str) -> crate::api::Result<bool> {
            if self.paid {
                Ok(true)
            } else {
                Err(ApiError::Status(404))
            }
        }
    }

    #[tokio::test]
    async fn refresh_without_subscription_id() {
        let gate = gate();
        assert!(!gate.refresh_purchases(&StubApi { paid: true }).await);
    }

    #[tokio::test]
    async fn refresh_sets_paid() {
        let gate = gate();
        gate.set_subscription_id("sub_123");
        assert!(gate.refresh_purchases(&StubApi { paid: true }).await);
        assert_eq!(gate.status(t0()), SubscriptionStatus::Paid);
    }

    #[tokio::test]
    async fn refresh_failure_keeps_state() {
        let gate = gate();
        gate.set_subscription_id("sub_123");
        assert!(!gate.refresh_purchases(&StubApi { paid: false }).await);
        assert!(!gate.state().is_paid);
    }

    #[test]
    fn status_serializes_with_tag() {
        let json = serde_json::to_value(SubscriptionStatus::Trial {
            expires_at: t0(),
        })
        .unwrap();
        assert_eq!(json["status"], "trial");
        assert!(json["expiresAt"].is_string());
    }
}
