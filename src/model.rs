use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub points_earned: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Grade {
    pub fn new(points_earned: f64) -> Self {
        Self {
            points_earned,
            updated_at: None,
        }
    }

    /// `None` when `points_possible` cannot produce a finite percentage.
    pub fn percentage(&self, points_possible: f64) -> Option<f64> {
        if !points_possible.is_finite() || points_possible <= 0.0 || !self.points_earned.is_finite()
        {
            return None;
        }
        Some(100.0 * self.points_earned.max(0.0) / points_possible)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub name: String,
    pub category_id: String,
    pub points_possible: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub grade: Option<Grade>,
}

impl Assignment {
    /// Copy of this assignment carrying `grade` instead of the recorded one.
    pub fn with_grade(&self, grade: Grade) -> Self {
        Self {
            grade: Some(grade),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: String,
    pub name: String,
    pub credit_hours: f64,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
}

/// One class with everything needed to grade it, as handed out by a
/// `ClassTreeSource`. Treated as an immutable snapshot by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTree {
    pub class: Class,
    pub categories: Vec<Category>,
    pub assignments: Vec<Assignment>,
}

impl ClassTree {
    pub fn find_assignment(&self, assignment_id: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.id == assignment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_allows_extra_credit() {
        let g = Grade::new(11.0);
        assert_eq!(g.percentage(10.0), Some(110.0));
    }

    #[test]
    fn percentage_guards_bad_points_possible() {
        let g = Grade::new(5.0);
        assert_eq!(g.percentage(0.0), None);
        assert_eq!(g.percentage(-10.0), None);
        assert_eq!(g.percentage(f64::INFINITY), None);
        assert_eq!(Grade::new(f64::NAN).percentage(10.0), None);
    }

    #[test]
    fn with_grade_leaves_original_untouched() {
        let a = Assignment {
            id: "a1".into(),
            name: "Quiz".into(),
            category_id: "c1".into(),
            points_possible: 20.0,
            due_date: None,
            grade: Some(Grade::new(10.0)),
        };
        let b = a.with_grade(Grade::new(20.0));
        assert_eq!(a.grade, Some(Grade::new(10.0)));
        assert_eq!(b.grade, Some(Grade::new(20.0)));
        assert_eq!(b.id, a.id);
    }
}
