//! Built-in exercise catalog.
//!
//! Workout exercises reference catalog entries by id; the catalog supplies the
//! display name and the metrics shown by default.

use crate::types::Metric;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Broad grouping used for display and validation
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseCategory {
    Strength,
    Conditioning,
    Mobility,
}

/// A catalog exercise definition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogExercise {
    pub id: String,
    pub name: String,
    pub category: ExerciseCategory,
    pub default_metrics: Vec<Metric>,
    pub tags: Vec<String>,
}

/// The complete exercise catalog
#[derive(Clone, Debug)]
pub struct Catalog {
    pub exercises: HashMap<String, CatalogExercise>,
}

/// Cached default catalog - built once and reused across all operations
static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(build_default_catalog);

/// Get a reference to the cached default catalog
pub fn get_default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

fn entry(
    id: &str,
    name: &str,
    category: ExerciseCategory,
    default_metrics: &[Metric],
    tags: &[&str],
) -> (String, CatalogExercise) {
    (
        id.to_string(),
        CatalogExercise {
            id: id.to_string(),
            name: name.to_string(),
            category,
            default_metrics: default_metrics.to_vec(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        },
    )
}

/// Builds the default catalog
///
/// **Note**: For production use, prefer `get_default_catalog()` which returns a
/// cached reference.
pub fn build_default_catalog() -> Catalog {
    use ExerciseCategory::*;
    use Metric::*;

    let exercises = [
        entry(
            "back_squat",
            "Back Squat",
            Strength,
            &[Reps, Weight, Rpe],
            &["lower", "squat"],
        ),
        entry(
            "deadlift",
            "Deadlift",
            Strength,
            &[Reps, Weight, Rpe],
            &["lower", "hinge"],
        ),
        entry(
            "bench_press",
            "Bench Press",
            Strength,
            &[Reps, Weight, Rpe],
            &["upper", "push"],
        ),
        entry(
            "overhead_press",
            "Overhead Press",
            Strength,
            &[Reps, Weight, PercentOneRm],
            &["upper", "push"],
        ),
        entry(
            "pullup",
            "Pull-up",
            Strength,
            &[Reps, Weight],
            &["upper", "pull"],
        ),
        entry(
            "goblet_squat",
            "Goblet Squat",
            Strength,
            &[Reps, Weight, Tempo],
            &["lower", "warmup"],
        ),
        entry(
            "row_erg",
            "Rowing Ergometer",
            Conditioning,
            &[Distance, Time],
            &["conditioning"],
        ),
        entry(
            "kb_swing",
            "Kettlebell Swing",
            Conditioning,
            &[Reps, Weight],
            &["hinge", "conditioning"],
        ),
        entry("plank", "Plank", Mobility, &[Time], &["core", "warmup"]),
        entry(
            "hip_cars",
            "Hip CARs",
            Mobility,
            &[Reps],
            &["mobility", "hip", "warmup"],
        ),
    ];

    Catalog {
        exercises: exercises.into_iter().collect(),
    }
}

impl Catalog {
    pub fn get(&self, id: &str) -> Option<&CatalogExercise> {
        self.exercises.get(id)
    }

    /// Validate the catalog for consistency
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (id, exercise) in &self.exercises {
            if id.is_empty() || exercise.id.is_empty() {
                errors.push("Exercise has empty ID".to_string());
            }
            if id != &exercise.id {
                errors.push(format!(
                    "Exercise key '{}' doesn't match exercise.id '{}'",
                    id, exercise.id
                ));
            }
            if exercise.name.is_empty() {
                errors.push(format!("Exercise '{}' has empty name", id));
            }
            if exercise.default_metrics.is_empty() {
                errors.push(format!("Exercise '{}' has no default metrics", id));
            }
            if exercise.category == ExerciseCategory::Strength
                && !exercise.default_metrics.contains(&Metric::Reps)
            {
                errors.push(format!("Strength exercise '{}' does not track reps", id));
            }
        }

        errors
    }
}
