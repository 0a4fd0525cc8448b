use crate::storage::FieldMap;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Summary record for a single calendar day. At most one exists per day key;
/// it is created lazily by the first workout write and updated by merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub steps: u32,
    pub calories: u32,
    pub workout_minutes: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DailyAggregate {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            steps: 0,
            calories: 0,
            workout_minutes: 0,
            updated_at: None,
        }
    }

    /// Decodes a stored document. Missing or mistyped numeric fields read as
    /// zero and a bad timestamp reads as absent, so a partially written or
    /// older document never fails the read path.
    pub fn from_fields(date: NaiveDate, fields: &FieldMap) -> Self {
        Self {
            date,
            steps: read_u32(fields, "steps"),
            calories: read_u32(fields, "calories"),
            workout_minutes: read_u32(fields, "workoutMinutes"),
            updated_at: fields
                .get("updatedAt")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|ts| ts.with_timezone(&Utc)),
        }
    }

    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("steps".into(), self.steps.into());
        fields.insert("calories".into(), self.calories.into());
        fields.insert("workoutMinutes".into(), self.workout_minutes.into());
        if let Some(ts) = self.updated_at {
            fields.insert("updatedAt".into(), ts.to_rfc3339().into());
        }
        fields
    }
}

/// Partial workout write. A `None` (or zero, which a blank form input becomes)
/// field is "not mentioned" and survives the merge untouched.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct WorkoutUpdate {
    pub steps: Option<u32>,
    pub calories: Option<u32>,
    pub workout_minutes: Option<u32>,
}

impl WorkoutUpdate {
    pub fn new(steps: u32, calories: u32, workout_minutes: u32) -> Self {
        Self {
            steps: Some(steps),
            calories: Some(calories),
            workout_minutes: Some(workout_minutes),
        }
        .normalized()
    }

    pub fn normalized(self) -> Self {
        let keep = |field: Option<u32>| field.filter(|value| *value > 0);
        Self {
            steps: keep(self.steps),
            calories: keep(self.calories),
            workout_minutes: keep(self.workout_minutes),
        }
    }

    pub fn mentions_nothing(&self) -> bool {
        self.steps.is_none() && self.calories.is_none() && self.workout_minutes.is_none()
    }

    pub fn apply(&self, aggregate: &mut DailyAggregate, now: DateTime<Utc>) {
        if let Some(steps) = self.steps {
            aggregate.steps = steps;
        }
        if let Some(calories) = self.calories {
            aggregate.calories = calories;
        }
        if let Some(minutes) = self.workout_minutes {
            aggregate.workout_minutes = minutes;
        }
        aggregate.updated_at = Some(now);
    }

    /// Mentioned fields plus the update stamp, for the aggregate merge write.
    pub fn merge_fields(&self, now: DateTime<Utc>) -> FieldMap {
        let mut fields = FieldMap::new();
        if let Some(steps) = self.steps {
            fields.insert("steps".into(), steps.into());
        }
        if let Some(calories) = self.calories {
            fields.insert("calories".into(), calories.into());
        }
        if let Some(minutes) = self.workout_minutes {
            fields.insert("workoutMinutes".into(), minutes.into());
        }
        fields.insert("updatedAt".into(), now.to_rfc3339().into());
        fields
    }

    /// Full history row; unmentioned fields log as zero.
    pub fn log_fields(&self, now: DateTime<Utc>) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("steps".into(), self.steps.unwrap_or(0).into());
        fields.insert("calories".into(), self.calories.unwrap_or(0).into());
        fields.insert(
            "workoutMinutes".into(),
            self.workout_minutes.unwrap_or(0).into(),
        );
        fields.insert("timestamp".into(), now.to_rfc3339().into());
        fields
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleepEntry {
    pub hours_slept: f64,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub notes: String,
}

impl SleepEntry {
    pub fn log_fields(&self, now: DateTime<Utc>) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("hoursSlept".into(), self.hours_slept.into());
        fields.insert("sleepQuality".into(), self.quality.clone().into());
        fields.insert("notes".into(), self.notes.clone().into());
        fields.insert("timestamp".into(), now.to_rfc3339().into());
        fields
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NutritionEntry {
    pub meal_name: String,
    pub calories: u32,
    #[serde(default)]
    pub notes: String,
}

impl NutritionEntry {
    pub fn log_fields(&self, now: DateTime<Utc>) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("mealName".into(), self.meal_name.clone().into());
        fields.insert("calories".into(), self.calories.into());
        fields.insert("notes".into(), self.notes.clone().into());
        fields.insert("timestamp".into(), now.to_rfc3339().into());
        fields
    }
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub date: String,
    pub steps: u32,
    pub calories: u32,
    pub workout_minutes: u32,
    pub last_updated: String,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
}

fn read_u32(fields: &FieldMap, name: &str) -> u32 {
    fields
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(0)
}
