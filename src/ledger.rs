use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{DaySnapshot, ImageRef, MealEntry, MealSlot, SlotSnapshot};

pub const MIN_ESTIMATE_KCAL: u32 = 50;
pub const MAX_ESTIMATE_KCAL: u32 = 5000;
/// Used when the estimator's reply contains no number at all.
pub const FALLBACK_ESTIMATE_KCAL: u32 = 350;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MealError {
    #[error("{0} is still being analyzed")]
    AlreadyAnalyzing(MealSlot),
    #[error("{0} has no pending estimate")]
    NotAnalyzing(MealSlot),
    #[error("The {0} photo was replaced before its estimate arrived")]
    Superseded(MealSlot),
    #[error("Could not analyze the {slot} photo, please try again: {reason}")]
    EstimateFailed { slot: MealSlot, reason: String },
}

/// Extreme readings are treated as noise and pulled into range.
pub fn clamp_estimate(raw: u64) -> u32 {
    raw.clamp(u64::from(MIN_ESTIMATE_KCAL), u64::from(MAX_ESTIMATE_KCAL)) as u32
}

/// Handed out when a photo starts analyzing. Only the matching estimate may settle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEstimate {
    pub date: NaiveDate,
    pub slot: MealSlot,
    pub image: ImageRef,
}

/// One calendar day of meals. Each slot moves `Empty -> Analyzing -> Resolved`
/// and back to `Empty` when deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealLedger {
    date: NaiveDate,
    entries: [MealEntry; 3],
}

impl MealLedger {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Default::default(),
        }
    }

    pub fn from_snapshot(snapshot: DaySnapshot) -> Self {
        Self {
            date: snapshot.date,
            entries: [
                snapshot.breakfast.into(),
                snapshot.lunch.into(),
                snapshot.dinner.into(),
            ],
        }
    }

    pub fn snapshot(&self) -> DaySnapshot {
        DaySnapshot {
            date: self.date,
            breakfast: SlotSnapshot::from(self.entry(MealSlot::Breakfast)),
            lunch: SlotSnapshot::from(self.entry(MealSlot::Lunch)),
            dinner: SlotSnapshot::from(self.entry(MealSlot::Dinner)),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn entry(&self, slot: MealSlot) -> &MealEntry {
        &self.entries[slot.index()]
    }

    /// Attach a new photo to a slot and mark it as waiting for an estimate.
    /// The slot keeps showing its previous calories until the estimate lands.
    pub fn record_meal_image(
        &mut self,
        slot: MealSlot,
        image: ImageRef,
    ) -> Result<PendingEstimate, MealError> {
        let entry = &mut self.entries[slot.index()];
        if entry.is_analyzing() {
            return Err(MealError::AlreadyAnalyzing(slot));
        }
        let previous_calories = entry.calories();
        *entry = MealEntry::Analyzing {
            image: image.clone(),
            previous_calories,
        };
        Ok(PendingEstimate {
            date: self.date,
            slot,
            image,
        })
    }

    /// Settle a pending estimate.
    ///
    /// On success the clamped calories are stored and returned. On failure the slot
    /// stops analyzing but keeps the new photo next to its previous calories, and the
    /// error is handed back so the caller can offer a retry.
    ///
    /// An estimate for another day or another photo is dropped with `Superseded`
    /// and the slot is left as it is.
    pub fn resolve_meal_estimate(
        &mut self,
        pending: &PendingEstimate,
        outcome: Result<u32, String>,
    ) -> Result<u32, MealError> {
        let slot = pending.slot;
        let same_day = pending.date == self.date;
        let entry = &mut self.entries[slot.index()];
        let previous_calories = match entry {
            MealEntry::Analyzing {
                image,
                previous_calories,
            } if same_day && *image == pending.image => *previous_calories,
            MealEntry::Analyzing { .. } => return Err(MealError::Superseded(slot)),
            _ if !same_day => return Err(MealError::Superseded(slot)),
            _ => return Err(MealError::NotAnalyzing(slot)),
        };
        let image = pending.image.clone();

        match outcome {
            Ok(raw) => {
                let calories = clamp_estimate(u64::from(raw));
                *entry = MealEntry::Resolved {
                    image: Some(image),
                    calories,
                };
                Ok(calories)
            }
            Err(reason) => {
                *entry = MealEntry::Resolved {
                    image: Some(image),
                    calories: previous_calories,
                };
                Err(MealError::EstimateFailed { slot, reason })
            }
        }
    }

    /// Manually set a slot's calories, keeping any photo.
    pub fn set_calories(&mut self, slot: MealSlot, calories: u32) -> Result<(), MealError> {
        let entry = &mut self.entries[slot.index()];
        if entry.is_analyzing() {
            return Err(MealError::AlreadyAnalyzing(slot));
        }
        let image = entry.image().cloned();
        *entry = SlotSnapshot { calories, image }.into();
        Ok(())
    }

    /// Reset a slot to empty. Returns what was there.
    pub fn delete_meal(&mut self, slot: MealSlot) -> MealEntry {
        std::mem::take(&mut self.entries[slot.index()])
    }

    pub fn daily_total(&self) -> u32 {
        self.entries
            .iter()
            .fold(0u32, |sum, entry| sum.saturating_add(entry.calories()))
    }

    pub fn is_analyzing(&self, slot: MealSlot) -> bool {
        self.entry(slot).is_analyzing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn img(name: &str) -> ImageRef {
        ImageRef(name.to_string())
    }

    fn pending(slot: MealSlot, name: &str) -> PendingEstimate {
        PendingEstimate {
            date: day(),
            slot,
            image: img(name),
        }
    }

    #[test]
    fn total_after_record_and_delete() {
        let mut ledger = MealLedger::new(day());
        let pending = ledger.record_meal_image(MealSlot::Breakfast, img("b.jpg")).unwrap();
        ledger.resolve_meal_estimate(&pending, Ok(200)).unwrap();
        assert_eq!(ledger.daily_total(), 200);

        ledger.delete_meal(MealSlot::Breakfast);
        assert_eq!(ledger.daily_total(), 0);
        assert_eq!(ledger.entry(MealSlot::Breakfast), &MealEntry::Empty);
    }

    #[test]
    fn estimates_are_clamped() {
        let mut ledger = MealLedger::new(day());
        let lunch = ledger.record_meal_image(MealSlot::Lunch, img("l.jpg")).unwrap();
        assert_eq!(ledger.resolve_meal_estimate(&lunch, Ok(9999)), Ok(5000));

        let dinner = ledger.record_meal_image(MealSlot::Dinner, img("d.jpg")).unwrap();
        assert_eq!(ledger.resolve_meal_estimate(&dinner, Ok(10)), Ok(50));
        assert_eq!(ledger.daily_total(), 5050);
    }

    #[test]
    fn previous_calories_shown_while_analyzing() {
        let mut ledger = MealLedger::new(day());
        ledger.set_calories(MealSlot::Lunch, 300).unwrap();
        ledger.record_meal_image(MealSlot::Lunch, img("l.jpg")).unwrap();

        assert!(ledger.is_analyzing(MealSlot::Lunch));
        assert_eq!(ledger.daily_total(), 300);
    }

    #[test]
    fn failure_clears_analyzing_and_keeps_photo() {
        let mut ledger = MealLedger::new(day());
        ledger.set_calories(MealSlot::Dinner, 450).unwrap();
        let pending = ledger.record_meal_image(MealSlot::Dinner, img("new.jpg")).unwrap();

        let err = ledger
            .resolve_meal_estimate(&pending, Err("timeout".into()))
            .unwrap_err();
        assert!(matches!(err, MealError::EstimateFailed { slot: MealSlot::Dinner, .. }));

        let entry = ledger.entry(MealSlot::Dinner);
        assert!(!entry.is_analyzing());
        assert_eq!(entry.calories(), 450);
        assert_eq!(entry.image(), Some(&img("new.jpg")));
    }

    #[test]
    fn double_trigger_is_refused() {
        let mut ledger = MealLedger::new(day());
        ledger.record_meal_image(MealSlot::Breakfast, img("a.jpg")).unwrap();
        assert_eq!(
            ledger.record_meal_image(MealSlot::Breakfast, img("b.jpg")),
            Err(MealError::AlreadyAnalyzing(MealSlot::Breakfast))
        );
        assert_eq!(
            ledger.set_calories(MealSlot::Breakfast, 100),
            Err(MealError::AlreadyAnalyzing(MealSlot::Breakfast))
        );
        assert!(ledger.is_analyzing(MealSlot::Breakfast));

        // other slots are unaffected
        ledger.record_meal_image(MealSlot::Lunch, img("c.jpg")).unwrap();
    }

    #[test]
    fn resolve_without_pending_estimate() {
        let mut ledger = MealLedger::new(day());
        assert_eq!(
            ledger.resolve_meal_estimate(&pending(MealSlot::Lunch, "l.jpg"), Ok(500)),
            Err(MealError::NotAnalyzing(MealSlot::Lunch))
        );
        assert_eq!(ledger.entry(MealSlot::Lunch), &MealEntry::Empty);
    }

    #[test]
    fn estimate_for_a_replaced_photo_is_dropped() {
        let mut ledger = MealLedger::new(day());
        let old = ledger.record_meal_image(MealSlot::Dinner, img("old.jpg")).unwrap();
        ledger.delete_meal(MealSlot::Dinner);
        let new = ledger.record_meal_image(MealSlot::Dinner, img("new.jpg")).unwrap();

        assert_eq!(
            ledger.resolve_meal_estimate(&old, Ok(900)),
            Err(MealError::Superseded(MealSlot::Dinner))
        );
        assert!(ledger.is_analyzing(MealSlot::Dinner));
        assert_eq!(ledger.resolve_meal_estimate(&new, Ok(400)), Ok(400));
    }

    #[test]
    fn estimate_from_another_day_is_dropped() {
        let mut ledger = MealLedger::new(day());
        let mut yesterday = pending(MealSlot::Lunch, "l.jpg");
        yesterday.date = day().pred_opt().unwrap();
        ledger.record_meal_image(MealSlot::Lunch, img("l.jpg")).unwrap();

        assert_eq!(
            ledger.resolve_meal_estimate(&yesterday, Ok(800)),
            Err(MealError::Superseded(MealSlot::Lunch))
        );
        assert_eq!(ledger.entry(MealSlot::Lunch).calories(), 0);
        assert!(ledger.is_analyzing(MealSlot::Lunch));
    }

    #[test]
    fn manual_entry_keeps_photo() {
        let mut ledger = MealLedger::new(day());
        let pending = ledger.record_meal_image(MealSlot::Lunch, img("l.jpg")).unwrap();
        ledger.resolve_meal_estimate(&pending, Ok(700)).unwrap();
        ledger.set_calories(MealSlot::Lunch, 650).unwrap();

        assert_eq!(
            ledger.entry(MealSlot::Lunch),
            &MealEntry::Resolved {
                image: Some(img("l.jpg")),
                calories: 650
            }
        );

        ledger.set_calories(MealSlot::Breakfast, 0).unwrap();
        assert_eq!(ledger.entry(MealSlot::Breakfast), &MealEntry::Empty);
    }

    #[test]
    fn snapshot_drops_analyzing_flag() {
        let mut ledger = MealLedger::new(day());
        ledger.set_calories(MealSlot::Breakfast, 250).unwrap();
        ledger.record_meal_image(MealSlot::Breakfast, img("b.jpg")).unwrap();

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.breakfast.calories, 250);
        assert_eq!(snapshot.breakfast.image, Some(img("b.jpg")));
        assert_eq!(snapshot.consumed_calories(), 250);

        let restored = MealLedger::from_snapshot(snapshot);
        assert!(!restored.is_analyzing(MealSlot::Breakfast));
        assert_eq!(restored.daily_total(), 250);
        assert_eq!(restored.date(), day());
    }
}
