use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::DEFAULT_VISION_TIMEOUT_SECS;
use crate::context::{ConsumptionWriter, ContextReader, TargetWriter};
use crate::ledger::{MealError, MealLedger};
use crate::models::{
    CalorieStatus, DaySnapshot, DerivedTargets, Goal, HomeSettings, ImageRef, MealEntry, MealSlot,
    Profile,
};
use crate::store::{load_json, meal_key, save_json, KeyValueStore, HOME_SETTINGS_KEY, USER_PROFILE_KEY};
use crate::targets::compute_targets;
use crate::vision::{estimate_calories, CalorieEstimator};

/// What the dashboard shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub bmr: f64,
    pub targets: Option<DerivedTargets>,
    pub consumed: u32,
    pub remaining: i64,
    pub status: CalorieStatus,
}

/// Owns the profile and goal and is the only writer of the daily target.
pub struct Dashboard {
    store: Arc<dyn KeyValueStore>,
    target: TargetWriter,
    reader: ContextReader,
    profile: Option<Profile>,
    goal: Goal,
    targets: Option<DerivedTargets>,
}

impl Dashboard {
    pub fn new(store: Arc<dyn KeyValueStore>, target: TargetWriter, reader: ContextReader) -> Self {
        Self {
            store,
            target,
            reader,
            profile: None,
            goal: Goal::default(),
            targets: None,
        }
    }

    /// Restore the goal and, if no usable profile is loaded, the cached profile.
    pub fn load_settings(&mut self) {
        if !self.has_profile() {
            if let Some(profile) = load_json::<Profile>(self.store.as_ref(), USER_PROFILE_KEY) {
                self.profile = Some(profile);
            }
        }
        if let Some(settings) = load_json::<HomeSettings>(self.store.as_ref(), HOME_SETTINGS_KEY) {
            self.goal = settings.goal;
        }
        self.recompute();
    }

    /// Take a profile from the profile service and cache it locally.
    pub fn set_profile(&mut self, profile: Profile) {
        save_json(self.store.as_ref(), USER_PROFILE_KEY, &profile);
        self.profile = Some(profile);
        self.recompute();
    }

    pub fn set_goal(&mut self, goal: Goal) {
        self.goal = goal;
        self.recompute();
    }

    /// Whether a profile complete enough to compute targets is loaded.
    pub fn has_profile(&self) -> bool {
        self.profile.as_ref().is_some_and(Profile::is_complete)
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn targets(&self) -> Option<&DerivedTargets> {
        self.targets.as_ref()
    }

    pub fn summary(&self) -> Summary {
        let consumed = self.reader.consumed();
        Summary {
            bmr: self.profile.as_ref().map_or(0.0, |p| p.bmr),
            targets: self.targets,
            consumed,
            remaining: self.reader.remaining(),
            status: self.reader.status(),
        }
    }

    // Targets only exist once the profile is complete.
    fn recompute(&mut self) {
        if let Some(profile) = self.profile.as_ref().filter(|p| p.is_complete()) {
            let targets = compute_targets(profile, &self.goal);
            debug!(daily_target = targets.daily_calorie_target, tdee = targets.tdee, "recomputed targets");
            self.target.publish(targets.daily_calorie_target);
            self.targets = Some(targets);
        } else if self.targets.take().is_some() {
            self.target.publish(0);
        }

        let settings = HomeSettings {
            goal: self.goal,
            bmr: self.profile.as_ref().map_or(0.0, |p| p.bmr),
            targets: self.targets,
        };
        save_json(self.store.as_ref(), HOME_SETTINGS_KEY, &settings);
    }
}

/// Today's meals. The only writer of the consumed total.
pub struct MealLog {
    ledger: Mutex<MealLedger>,
    store: Arc<dyn KeyValueStore>,
    estimator: Arc<dyn CalorieEstimator>,
    consumed: ConsumptionWriter,
    timeout: Duration,
}

impl MealLog {
    /// Load the ledger for `today` (empty if nothing was stored) and publish its total.
    pub fn open(
        today: NaiveDate,
        store: Arc<dyn KeyValueStore>,
        estimator: Arc<dyn CalorieEstimator>,
        consumed: ConsumptionWriter,
    ) -> Self {
        let ledger = load_ledger(store.as_ref(), today);
        consumed.publish(ledger.daily_total());
        Self {
            ledger: Mutex::new(ledger),
            store,
            estimator,
            consumed,
            timeout: Duration::from_secs(DEFAULT_VISION_TIMEOUT_SECS),
        }
    }

    /// Give up on an estimate after this long.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a photo to a slot and ask the estimator for its calories.
    ///
    /// Other slots stay usable while this runs. On failure the slot is left
    /// settled (not analyzing) and the error can be shown as a retry prompt.
    pub async fn analyze(&self, slot: MealSlot, image: ImageRef, jpeg: &[u8]) -> Result<u32, MealError> {
        let pending = {
            let mut ledger = self.ledger.lock().await;
            let pending = ledger.record_meal_image(slot, image)?;
            self.commit(&ledger);
            pending
        };

        let outcome = match tokio::time::timeout(
            self.timeout,
            estimate_calories(self.estimator.as_ref(), jpeg),
        )
        .await
        {
            Ok(Ok(calories)) => Ok(calories),
            Ok(Err(e)) => Err(format!("{:#}", e)),
            Err(_) => Err(format!("no answer after {}s", self.timeout.as_secs_f32())),
        };

        let mut ledger = self.ledger.lock().await;
        let result = ledger.resolve_meal_estimate(&pending, outcome);
        match &result {
            Ok(calories) => info!(%slot, calories, "meal estimated"),
            Err(MealError::Superseded(_)) => {
                warn!(
                    %slot,
                    date = %pending.date,
                    image = %pending.image,
                    "dropping estimate for a replaced photo"
                );
                return result;
            }
            Err(e) => warn!(%slot, error = %e, "meal estimate failed"),
        }
        self.commit(&ledger);
        result
    }

    /// Enter calories by hand.
    pub async fn set_calories(&self, slot: MealSlot, calories: u32) -> Result<(), MealError> {
        let mut ledger = self.ledger.lock().await;
        ledger.set_calories(slot, calories)?;
        self.commit(&ledger);
        Ok(())
    }

    /// Clear a slot. Confirmation is up to the caller.
    pub async fn delete(&self, slot: MealSlot) -> MealEntry {
        let mut ledger = self.ledger.lock().await;
        let removed = ledger.delete_meal(slot);
        self.commit(&ledger);
        removed
    }

    /// Switch to a new calendar day's ledger. Returns whether the day changed.
    pub async fn roll_over(&self, today: NaiveDate) -> bool {
        let mut ledger = self.ledger.lock().await;
        if ledger.date() == today {
            return false;
        }
        *ledger = load_ledger(self.store.as_ref(), today);
        self.consumed.publish(ledger.daily_total());
        info!(%today, "started a new day");
        true
    }

    pub async fn entry(&self, slot: MealSlot) -> MealEntry {
        self.ledger.lock().await.entry(slot).clone()
    }

    pub async fn snapshot(&self) -> DaySnapshot {
        self.ledger.lock().await.snapshot()
    }

    pub async fn daily_total(&self) -> u32 {
        self.ledger.lock().await.daily_total()
    }

    // Persist (last write wins) and republish after every mutation.
    fn commit(&self, ledger: &MealLedger) {
        save_json(self.store.as_ref(), &meal_key(ledger.date()), &ledger.snapshot());
        self.consumed.publish(ledger.daily_total());
    }
}

fn load_ledger(store: &dyn KeyValueStore, date: NaiveDate) -> MealLedger {
    match load_json::<DaySnapshot>(store, &meal_key(date)) {
        Some(snapshot) if snapshot.date == date => MealLedger::from_snapshot(snapshot),
        _ => MealLedger::new(date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use crate::models::{ActivityLevel, Gender};
    use crate::store::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;

    struct NoEstimator;

    #[async_trait]
    impl CalorieEstimator for NoEstimator {
        async fn analyze(&self, _jpeg: &[u8]) -> Result<String> {
            anyhow::bail!("offline")
        }
    }

    fn profile() -> Profile {
        Profile {
            weight: 80.0,
            height: 180.0,
            age: 35,
            gender: Gender::Male,
            bmr: 1500.0,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn dashboard_and_meals_share_state() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (target, consumed, reader) = context::channel();
        let mut dashboard = Dashboard::new(store.clone(), target, reader.clone());
        let meals = MealLog::open(day(), store.clone(), Arc::new(NoEstimator), consumed);

        dashboard.set_profile(profile());
        dashboard.set_goal(Goal {
            target_weight: 70.0,
            target_days: 50,
            activity: ActivityLevel::Sedentary,
        });
        assert_eq!(reader.daily_target(), 260);

        meals.set_calories(MealSlot::Lunch, 250).await.unwrap();
        let summary = dashboard.summary();
        assert_eq!(summary.consumed, 250);
        assert_eq!(summary.remaining, 10);
        assert_eq!(summary.status, CalorieStatus::OnTarget);
    }

    #[tokio::test]
    async fn no_target_without_bmr() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (target, _consumed, reader) = context::channel();
        let mut dashboard = Dashboard::new(store.clone(), target, reader.clone());

        dashboard.set_profile(Profile { bmr: 0.0, ..profile() });
        assert!(dashboard.targets().is_none());
        assert_eq!(reader.daily_target(), 0);
        assert_eq!(dashboard.summary().status, CalorieStatus::Deficit);
    }

    #[tokio::test]
    async fn incomplete_profile_clears_target() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (target, _consumed, reader) = context::channel();
        let mut dashboard = Dashboard::new(store, target, reader.clone());

        dashboard.set_profile(profile());
        assert!(dashboard.has_profile());
        assert!(reader.daily_target() > 0);

        dashboard.set_profile(Profile { age: 0, ..profile() });
        assert!(!dashboard.has_profile());
        assert!(dashboard.targets().is_none());
        assert_eq!(reader.daily_target(), 0);
    }

    #[tokio::test]
    async fn settings_reload_into_a_new_dashboard() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let goal = Goal {
            target_weight: 75.0,
            target_days: 100,
            activity: ActivityLevel::LightlyActive,
        };
        {
            let (target, _c, reader) = context::channel();
            let mut dashboard = Dashboard::new(store.clone(), target, reader);
            dashboard.set_profile(profile());
            dashboard.set_goal(goal);
        }

        let (target, _c, reader) = context::channel();
        let mut dashboard = Dashboard::new(store, target, reader.clone());
        dashboard.load_settings();
        assert_eq!(dashboard.goal(), &goal);
        assert_eq!(dashboard.profile(), Some(&profile()));
        // 1500 * 1.375 - 5 * 7700 / 100
        assert_eq!(reader.daily_target(), 1678);
    }

    #[tokio::test]
    async fn failed_estimate_keeps_total() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (_t, consumed, reader) = context::channel();
        let meals = MealLog::open(day(), store, Arc::new(NoEstimator), consumed);

        meals.set_calories(MealSlot::Breakfast, 300).await.unwrap();
        let err = meals
            .analyze(MealSlot::Breakfast, ImageRef("b.jpg".into()), b"jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, MealError::EstimateFailed { .. }));
        assert!(!meals.entry(MealSlot::Breakfast).await.is_analyzing());
        assert_eq!(reader.consumed(), 300);
    }
}
