use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Self::Male),
            "female" | "f" => Ok(Self::Female),
            other => Err(anyhow!("Unknown gender: {}", other)),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Male => f.write_str("male"),
            Self::Female => f.write_str("female"),
        }
    }
}

/// Biometric profile as stored by the profile service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Weight in kg
    pub weight: f64,
    /// Height in cm
    pub height: f64,
    /// Age in years
    pub age: u32,
    pub gender: Gender,
    /// Basal metabolic rate (kcal/day)
    pub bmr: f64,
}

impl Profile {
    /// A profile the dashboard can compute targets from.
    pub fn is_complete(&self) -> bool {
        self.bmr > 0.0 && self.weight > 0.0 && self.height > 0.0 && self.age > 0
    }

    /// Build a profile from a `GET /profile` body.
    ///
    /// The service answers with null fields and a zero BMR when the user has not
    /// saved a profile yet; that placeholder maps to `None`. Numeric columns may
    /// arrive as strings (DECIMAL), so both forms are accepted.
    pub fn from_record(record: &Value) -> Option<Self> {
        let parse_num = |k: &str| -> Option<f64> {
            record.get(k).and_then(|v| {
                v.as_f64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            })
        };

        let weight = parse_num("weight")?;
        let height = parse_num("height")?;
        let age = parse_num("age")?;
        let gender = record
            .get("gender")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())?;
        let bmr = parse_num("bmr").unwrap_or(0.0);

        if weight <= 0.0 || height <= 0.0 || age < 1.0 {
            return None;
        }

        Some(Self {
            weight,
            height,
            age: age.round() as u32,
            gender,
            bmr,
        })
    }
}

/// Self-reported exercise frequency, serialized as its TDEE multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityLevel {
    #[default]
    Sedentary,
    LightlyActive,
    ModeratelyActive,
    VeryActive,
    ExtraActive,
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 5] = [
        Self::Sedentary,
        Self::LightlyActive,
        Self::ModeratelyActive,
        Self::VeryActive,
        Self::ExtraActive,
    ];

    pub fn multiplier(self) -> f64 {
        match self {
            Self::Sedentary => 1.2,
            Self::LightlyActive => 1.375,
            Self::ModeratelyActive => 1.55,
            Self::VeryActive => 1.725,
            Self::ExtraActive => 1.9,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sedentary => "Desk job / no exercise",
            Self::LightlyActive => "Light exercise 1-3 days/week",
            Self::ModeratelyActive => "Moderate exercise 3-5 days/week",
            Self::VeryActive => "Hard exercise 6-7 days/week",
            Self::ExtraActive => "Very hard exercise / physical job",
        }
    }

    /// Closest level to a stored multiplier. Garbage falls back to sedentary.
    pub fn from_multiplier(value: f64) -> Self {
        if !value.is_finite() {
            return Self::Sedentary;
        }
        Self::ALL
            .into_iter()
            .min_by(|a, b| {
                let da = (a.multiplier() - value).abs();
                let db = (b.multiplier() - value).abs();
                da.total_cmp(&db)
            })
            .unwrap_or_default()
    }
}

impl Serialize for ActivityLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.multiplier())
    }
}

impl<'de> Deserialize<'de> for ActivityLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Self::from_multiplier(value))
    }
}

/// Weight goal and activity inputs from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// Target weight in kg
    pub target_weight: f64,
    /// Days to reach the target weight
    pub target_days: u32,
    #[serde(rename = "activityLevel")]
    pub activity: ActivityLevel,
}

impl Default for Goal {
    fn default() -> Self {
        Self {
            target_weight: 65.0,
            target_days: 30,
            activity: ActivityLevel::Sedentary,
        }
    }
}

/// Energy budget derived from a profile and a goal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedTargets {
    /// Total daily energy expenditure (kcal), rounded
    pub tdee: i64,
    /// Calories to eat per day to hit the goal (kcal), rounded
    pub daily_calorie_target: i64,
    /// Current weight minus target weight (kg). Positive means a loss goal.
    pub weight_delta: f64,
    /// Daily deficit (positive) or surplus (negative) in kcal, rounded
    pub daily_energy_delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalorieStatus {
    Deficit,
    OnTarget,
    Surplus,
}

impl CalorieStatus {
    pub fn advice(self) -> &'static str {
        match self {
            Self::Deficit => "Eat a bit more to reach today's target",
            Self::OnTarget => "Intake is right on target",
            Self::Surplus => "Cut back or add some exercise",
        }
    }
}

impl fmt::Display for CalorieStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deficit => f.write_str("deficit"),
            Self::OnTarget => f.write_str("on target"),
            Self::Surplus => f.write_str("surplus"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
}

impl MealSlot {
    pub const ALL: [MealSlot; 3] = [Self::Breakfast, Self::Lunch, Self::Dinner];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Breakfast => 0,
            Self::Lunch => 1,
            Self::Dinner => 2,
        }
    }
}

impl FromStr for MealSlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            other => Err(anyhow!("Unknown meal slot: {}", other)),
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to a meal photo (file path or URI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of one meal slot for the day.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MealEntry {
    #[default]
    Empty,
    /// A photo was captured and an estimate is pending. Calories shown meanwhile
    /// are whatever the slot held before.
    Analyzing {
        image: ImageRef,
        previous_calories: u32,
    },
    Resolved {
        image: Option<ImageRef>,
        calories: u32,
    },
}

impl MealEntry {
    pub fn calories(&self) -> u32 {
        match self {
            Self::Empty => 0,
            Self::Analyzing {
                previous_calories, ..
            } => *previous_calories,
            Self::Resolved { calories, .. } => *calories,
        }
    }

    pub fn image(&self) -> Option<&ImageRef> {
        match self {
            Self::Empty => None,
            Self::Analyzing { image, .. } => Some(image),
            Self::Resolved { image, .. } => image.as_ref(),
        }
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self, Self::Analyzing { .. })
    }
}

/// Persisted form of one meal slot. The analyzing flag is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    #[serde(default)]
    pub calories: u32,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

impl From<&MealEntry> for SlotSnapshot {
    fn from(entry: &MealEntry) -> Self {
        Self {
            calories: entry.calories(),
            image: entry.image().cloned(),
        }
    }
}

impl From<SlotSnapshot> for MealEntry {
    fn from(snapshot: SlotSnapshot) -> Self {
        match snapshot {
            SlotSnapshot {
                calories: 0,
                image: None,
            } => MealEntry::Empty,
            SlotSnapshot { calories, image } => MealEntry::Resolved { image, calories },
        }
    }
}

/// One calendar day of the meal ledger as written to local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySnapshot {
    pub date: NaiveDate,
    #[serde(default)]
    pub breakfast: SlotSnapshot,
    #[serde(default)]
    pub lunch: SlotSnapshot,
    #[serde(default)]
    pub dinner: SlotSnapshot,
}

impl DaySnapshot {
    pub fn consumed_calories(&self) -> u32 {
        self.breakfast
            .calories
            .saturating_add(self.lunch.calories)
            .saturating_add(self.dinner.calories)
    }
}

/// Dashboard settings cached on the device: the goal plus the last derived targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeSettings {
    #[serde(flatten)]
    pub goal: Goal,
    #[serde(default)]
    pub bmr: f64,
    #[serde(default)]
    pub targets: Option<DerivedTargets>,
}

/// Response of a successful `POST /register`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredUser {
    pub user_id: u64,
}

/// User summary returned by `POST /login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedInUser {
    pub id: u64,
    pub name: Option<String>,
    pub email: String,
}
