use crate::models::{ActivityLevel, CalorieStatus, DerivedTargets, Gender, Goal, Profile};

/// Energy content of one kg of body mass (kcal).
pub const KCAL_PER_KG: f64 = 7700.0;

pub const DEFAULT_WEIGHT_KG: f64 = 70.0;
pub const DEFAULT_TARGET_WEIGHT_KG: f64 = 65.0;
pub const DEFAULT_TARGET_DAYS: u32 = 30;

/// Consumption within this percentage band of the target counts as on target.
pub const ON_TARGET_MIN_PCT: f64 = 95.0;
pub const ON_TARGET_MAX_PCT: f64 = 105.0;

/// Compute the energy budget for a profile and goal.
///
/// The target is TDEE (BMR scaled by the activity multiplier) minus the daily share
/// of the energy needed to reach the target weight in the chosen number of days.
/// A profile without a usable weight is computed at the default weight.
pub fn compute_targets(profile: &Profile, goal: &Goal) -> DerivedTargets {
    let weight = if profile.weight.is_finite() && profile.weight > 0.0 {
        profile.weight
    } else {
        DEFAULT_WEIGHT_KG
    };
    energy_budget(weight, profile.bmr, goal)
}

/// Same as [`compute_targets`] from raw numbers, for callers that only have a
/// weight and a BMR (e.g. an incomplete profile).
///
/// A zero `target_days` is treated as the default rather than dividing by zero.
pub fn energy_budget(weight_kg: f64, bmr: f64, goal: &Goal) -> DerivedTargets {
    let days = if goal.target_days == 0 {
        DEFAULT_TARGET_DAYS
    } else {
        goal.target_days
    };

    let tdee = bmr * goal.activity.multiplier();
    let weight_delta = weight_kg - goal.target_weight;
    let total_energy_delta = weight_delta * KCAL_PER_KG;
    let daily_energy_delta = total_energy_delta / f64::from(days);
    let daily_target = tdee - daily_energy_delta;

    DerivedTargets {
        tdee: round_half_up(tdee),
        daily_calorie_target: round_half_up(daily_target),
        weight_delta,
        daily_energy_delta: round_half_up(daily_energy_delta),
    }
}

/// Classify consumption against the daily target.
///
/// A non-positive target yields 0% and therefore a deficit.
pub fn derive_status(consumed: u32, target: i64) -> CalorieStatus {
    let percentage = if target > 0 {
        f64::from(consumed) * 100.0 / target as f64
    } else {
        0.0
    };

    if percentage < ON_TARGET_MIN_PCT {
        CalorieStatus::Deficit
    } else if percentage <= ON_TARGET_MAX_PCT {
        CalorieStatus::OnTarget
    } else {
        CalorieStatus::Surplus
    }
}

/// Calories left for the day; negative when over the target.
pub fn remaining(consumed: u32, target: i64) -> i64 {
    target - i64::from(consumed)
}

/// Mifflin-St Jeor resting energy estimate, rounded to whole kcal.
pub fn estimate_bmr(weight_kg: f64, height_cm: f64, age: u32, gender: Gender) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age);
    let bmr = match gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    };
    round_half_up(bmr.max(0.0)) as f64
}

/// Rounds halves toward positive infinity (2.5 -> 3, -2.5 -> -2).
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Goal fields as typed into the dashboard, before defaults are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalInput {
    pub target_weight: String,
    pub target_days: String,
    pub activity_multiplier: f64,
}

impl GoalInput {
    /// Apply the dashboard's fallbacks: unparseable or non-positive values take
    /// their defaults instead of being rejected.
    pub fn to_goal(&self) -> Goal {
        let target_days = parse_number(&self.target_days)
            .map(f64::round)
            .filter(|d| *d >= 1.0 && *d <= f64::from(u32::MAX))
            .map(|d| d as u32)
            .unwrap_or(DEFAULT_TARGET_DAYS);

        Goal {
            target_weight: parse_or(&self.target_weight, DEFAULT_TARGET_WEIGHT_KG),
            target_days,
            activity: ActivityLevel::from_multiplier(self.activity_multiplier),
        }
    }
}

fn parse_or(raw: &str, default: f64) -> f64 {
    parse_number(raw).filter(|v| *v > 0.0).unwrap_or(default)
}

/// Parse the leading decimal number of a string, ignoring any trailing text
/// ("72.5 kg" -> 72.5).
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if frac_end > frac_start || digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    // Optional exponent, only consumed when well formed.
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}
