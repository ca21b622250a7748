use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::model::{Assignment, Category, Class, ClassTree};

/// Half-up 1-decimal rounding used for every displayed percentage:
/// `floor(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn clamp_percent(p: f64) -> f64 {
    if p.is_nan() {
        return 0.0;
    }
    p.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterStep {
    pub letter: String,
    pub min_percent: f64,
    pub gpa_points: f64,
}

impl LetterStep {
    fn new(letter: &str, min_percent: f64, gpa_points: f64) -> Self {
        Self {
            letter: letter.to_string(),
            min_percent,
            gpa_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterGrade {
    pub letter: String,
    pub gpa_points: f64,
}

/// Ordered percentage thresholds mapping to letters and GPA points.
///
/// Steps are kept sorted by `min_percent`, highest first; the first step
/// whose threshold is met wins. Anything below the last step gets the
/// fallback letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterScale {
    pub steps: Vec<LetterStep>,
    pub fallback_letter: String,
    pub fallback_points: f64,
    pub gpa_cap: f64,
}

impl Default for LetterScale {
    fn default() -> Self {
        Self {
            steps: vec![
                LetterStep::new("A+", 97.0, 4.3),
                LetterStep::new("A", 93.0, 4.0),
                LetterStep::new("A-", 90.0, 3.7),
                LetterStep::new("B+", 87.0, 3.3),
                LetterStep::new("B", 83.0, 3.0),
                LetterStep::new("B-", 80.0, 2.7),
                LetterStep::new("C+", 77.0, 2.3),
                LetterStep::new("C", 73.0, 2.0),
                LetterStep::new("C-", 70.0, 1.7),
                LetterStep::new("D+", 67.0, 1.3),
                LetterStep::new("D", 63.0, 1.0),
                LetterStep::new("D-", 60.0, 0.7),
            ],
            fallback_letter: "F".to_string(),
            fallback_points: 0.0,
            gpa_cap: 4.0,
        }
    }
}

impl LetterScale {
    /// Out-of-range input is clamped to [0, 100] first; NaN maps like 0.
    pub fn map_percentage(&self, percentage: f64) -> LetterGrade {
        let p = clamp_percent(percentage);
        for step in &self.steps {
            if p >= step.min_percent {
                return LetterGrade {
                    letter: step.letter.clone(),
                    gpa_points: step.gpa_points.min(self.gpa_cap),
                };
            }
        }
        LetterGrade {
            letter: self.fallback_letter.clone(),
            gpa_points: self.fallback_points.min(self.gpa_cap),
        }
    }


    /// Checks every threshold and point value, then sorts steps highest first.
    pub fn validated(mut self) -> Result<Self, CalcError> {
        let points_ok = |v: f64| v.is_finite() && v >= 0.0;

        if !points_ok(self.gpa_cap) {
            return Err(CalcError::new(
                "bad_params",
                "gpaCap must be a finite number >= 0",
            ));
        }
        if self.fallback_letter.trim().is_empty() {
            return Err(CalcError::new("bad_params", "fallbackLetter must not be empty"));
        }
        if !points_ok(self.fallback_points) {
            return Err(CalcError::new(
                "bad_params",
                "fallbackPoints must be a finite number >= 0",
            ));
        }

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(self.fallback_letter.trim().to_string());
        for (i, step) in self.steps.iter_mut().enumerate() {
            let letter = step.letter.trim().to_string();
            if letter.is_empty() {
                return Err(CalcError::new("bad_params", "step letter must not be empty")
                    .with_details(serde_json::json!({ "index": i })));
            }
            if !seen.insert(letter.clone()) {
                return Err(CalcError::new("bad_params", "duplicate letter in scale")
                    .with_details(serde_json::json!({ "letter": letter })));
            }
            if !step.min_percent.is_finite() || !(0.0..=100.0).contains(&step.min_percent) {
                return Err(
                    CalcError::new("bad_params", "minPercent must be within 0..=100")
                        .with_details(serde_json::json!({ "letter": letter })),
                );
            }
            if !points_ok(step.gpa_points) {
                return Err(
                    CalcError::new("bad_params", "gpaPoints must be a finite number >= 0")
                        .with_details(serde_json::json!({ "letter": letter })),
                );
            }
            step.letter = letter;
        }

        self.fallback_letter = self.fallback_letter.trim().to_string();
        self.steps.sort_by(|a, b| {
            b.min_percent
                .partial_cmp(&a.min_percent)
                .unwrap_or(Ordering::Equal)
        });
        Ok(self)
    }
}

pub fn parse_letter_scale(raw: Option<&serde_json::Value>) -> Result<LetterScale, CalcError> {
    let Some(raw) = raw else {
        return Err(CalcError::new("bad_params", "missing scale"));
    };
    if !raw.is_object() {
        return Err(CalcError::new("bad_params", "scale must be an object"));
    }
    let scale: LetterScale = serde_json::from_value(raw.clone())
        .map_err(|e| CalcError::new("bad_params", format!("invalid scale: {e}")))?;
    scale.validated()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAggregate {
    /// `None` means the category has no usable graded assignment.
    pub percentage: Option<f64>,
    pub graded_count: usize,
    pub points_earned: f64,
    pub points_possible: f64,
}

/// Points-weighted percentage of the graded assignments in one category.
pub fn aggregate_category(assignments: &[Assignment], category_id: &str) -> CategoryAggregate {
    let mut graded_count = 0_usize;
    let mut points_earned = 0.0_f64;
    let mut points_possible = 0.0_f64;

    for a in assignments {
        if a.category_id != category_id {
            continue;
        }
        let Some(grade) = a.grade.as_ref() else {
            continue;
        };
        if !a.points_possible.is_finite() || a.points_possible <= 0.0 {
            continue;
        }
        if !grade.points_earned.is_finite() {
            continue;
        }
        graded_count += 1;
        points_earned += grade.points_earned.max(0.0);
        points_possible += a.points_possible;
    }

    let percentage = if graded_count > 0 && points_possible > 0.0 {
        Some(100.0 * points_earned / points_possible)
    } else {
        None
    };

    CategoryAggregate {
        percentage,
        graded_count,
        points_earned,
        points_possible,
    }
}

fn usable_weight(raw: f64) -> f64 {
    if raw.is_finite() && raw > 0.0 {
        raw
    } else {
        0.0
    }
}

/// Per-category aggregates and weights renormalized over eligible categories.
#[derive(Debug, Clone)]
struct CategoryWeighting {
    aggregates: Vec<CategoryAggregate>,
    effective_weights: Vec<Option<f64>>,
    percent: Option<f64>,
}

fn weigh_categories(categories: &[Category], assignments: &[Assignment]) -> CategoryWeighting {
    let aggregates: Vec<CategoryAggregate> = categories
        .iter()
        .map(|c| aggregate_category(assignments, &c.id))
        .collect();

    let mut sum = 0.0_f64;
    let mut denom = 0.0_f64;
    let mut sum_equal = 0.0_f64;
    let mut denom_equal = 0.0_f64;

    for (c, agg) in categories.iter().zip(&aggregates) {
        let Some(pct) = agg.percentage else {
            continue;
        };
        let w = usable_weight(c.weight);
        if w > 0.0 {
            sum += pct * w;
            denom += w;
        }
        sum_equal += pct;
        denom_equal += 1.0;
    }

    // Zero total weight over eligible categories falls back to equal weighting.
    let (percent, effective_weights) = if denom > 0.0 {
        let weights = categories
            .iter()
            .zip(&aggregates)
            .map(|(c, agg)| agg.percentage.map(|_| usable_weight(c.weight) / denom))
            .collect();
        (Some(sum / denom), weights)
    } else if denom_equal > 0.0 {
        let weights = aggregates
            .iter()
            .map(|agg| agg.percentage.map(|_| 1.0 / denom_equal))
            .collect();
        (Some(sum_equal / denom_equal), weights)
    } else {
        (None, vec![None; aggregates.len()])
    };

    CategoryWeighting {
        aggregates,
        effective_weights,
        percent,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGrade {
    pub class_id: String,
    pub class_name: String,
    /// Rounded to one decimal for display.
    pub current_grade: f64,
    pub letter_grade: String,
    pub gpa_points: f64,
    pub credit_hours: f64,
    pub is_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<String>,
    #[serde(skip)]
    pub exact_grade: f64,
}

/// Returns `None` when no category in the class has a graded assignment;
/// such a class takes no part in GPA math.
pub fn calculate_class_grade(
    class: &Class,
    categories: &[Category],
    assignments: &[Assignment],
    scale: &LetterScale,
) -> Option<ClassGrade> {
    let exact = weigh_categories(categories, assignments).percent?;
    Some(class_grade_from_percent(class, exact, scale))
}

pub fn grade_class_tree(tree: &ClassTree, scale: &LetterScale) -> Option<ClassGrade> {
    calculate_class_grade(&tree.class, &tree.categories, &tree.assignments, scale)
}

/// Extra credit counts, but a class grade never leaves 0..=100.
fn class_grade_from_percent(class: &Class, exact: f64, scale: &LetterScale) -> ClassGrade {
    let exact = clamp_percent(exact);
    let letter = scale.map_percentage(exact);
    ClassGrade {
        class_id: class.id.clone(),
        class_name: class.name.clone(),
        current_grade: round_off_1_decimal(exact),
        letter_grade: letter.letter,
        gpa_points: letter.gpa_points,
        credit_hours: class.credit_hours,
        is_completed: class.is_completed,
        term: class.term.clone(),
        exact_grade: exact,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category_id: String,
    pub name: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Share of the class grade after renormalization, 0..=1.
    pub effective_weight: Option<f64>,
    pub percentage: Option<f64>,
    pub graded_count: usize,
    pub points_earned: f64,
    pub points_possible: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassBreakdown {
    pub class: Class,
    pub grade: Option<ClassGrade>,
    pub categories: Vec<CategoryBreakdown>,
    pub assignments: Vec<Assignment>,
}

pub fn class_breakdown(tree: &ClassTree, scale: &LetterScale) -> ClassBreakdown {
    let weighting = weigh_categories(&tree.categories, &tree.assignments);

    let categories = tree
        .categories
        .iter()
        .zip(weighting.aggregates.iter().zip(&weighting.effective_weights))
        .map(|(c, (agg, eff))| CategoryBreakdown {
            category_id: c.id.clone(),
            name: c.name.clone(),
            weight: c.weight,
            color: c.color.clone(),
            effective_weight: *eff,
            percentage: agg.percentage.map(round_off_1_decimal),
            graded_count: agg.graded_count,
            points_earned: agg.points_earned,
            points_possible: agg.points_possible,
        })
        .collect();

    ClassBreakdown {
        class: tree.class.clone(),
        grade: weighting
            .percent
            .map(|exact| class_grade_from_percent(&tree.class, exact, scale)),
        categories,
        assignments: tree.assignments.clone(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::Grade;

    pub(crate) fn class(id: &str, credit_hours: f64, is_completed: bool) -> Class {
        Class {
            id: id.to_string(),
            name: format!("Class {id}"),
            credit_hours,
            is_completed,
            term: None,
        }
    }

    pub(crate) fn category(id: &str, weight: f64) -> Category {
        Category {
            id: id.to_string(),
            name: id.to_string(),
            weight,
            color: None,
        }
    }

    fn map_percentage_to_letter(percentage: f64) -> LetterGrade {
        LetterScale::default().map_percentage(percentage)
    }

    fn top_letter(scale: &LetterScale) -> &str {
        scale
            .steps
            .first()
            .map(|s| s.letter.as_str())
            .unwrap_or(scale.fallback_letter.as_str())
    }

    pub(crate) fn assignment(
        id: &str,
        category_id: &str,
        points_possible: f64,
        earned: Option<f64>,
    ) -> Assignment {
        Assignment {
            id: id.to_string(),
            name: id.to_string(),
            category_id: category_id.to_string(),
            points_possible,
            due_date: None,
            grade: earned.map(Grade::new),
        }
    }

    #[test]
    fn round_off_is_half_up() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(3.54), 3.5);
        assert_eq!(round_off_1_decimal(3.55), 3.6);
        assert_eq!(round_off_1_decimal(35.6818), 35.7);
    }

    #[test]
    fn letter_thresholds_are_inclusive() {
        assert_eq!(map_percentage_to_letter(90.0).letter, "A-");
        assert_eq!(map_percentage_to_letter(89.99).letter, "B+");
        assert_eq!(map_percentage_to_letter(97.0).letter, "A+");
        assert_eq!(map_percentage_to_letter(59.99).letter, "F");
        assert_eq!(map_percentage_to_letter(60.0).letter, "D-");
    }

    #[test]
    fn a_plus_is_capped_at_four() {
        let g = map_percentage_to_letter(99.0);
        assert_eq!(g.letter, "A+");
        assert_eq!(g.gpa_points, 4.0);

        let uncapped = LetterScale {
            gpa_cap: 4.3,
            ..LetterScale::default()
        };
        assert_eq!(uncapped.map_percentage(99.0).gpa_points, 4.3);
    }

    #[test]
    fn out_of_range_percentages_are_clamped() {
        assert_eq!(map_percentage_to_letter(-15.0).letter, "F");
        assert_eq!(map_percentage_to_letter(140.0).letter, "A+");
        assert_eq!(map_percentage_to_letter(f64::NAN).letter, "F");
        assert_eq!(map_percentage_to_letter(f64::INFINITY).letter, "A+");
    }

    #[test]
    fn validated_sorts_steps_and_rejects_duplicates() {
        let mut scale = LetterScale::default();
        scale.steps.reverse();
        let sorted = scale.validated().expect("valid scale");
        assert_eq!(sorted.steps[0].letter, "A+");
        assert_eq!(sorted.map_percentage(85.0).letter, "B");

        let mut dup = LetterScale::default();
        dup.steps[1].letter = "A+".to_string();
        let e = dup.validated().expect_err("duplicate letter");
        assert_eq!(e.code, "bad_params");

        let mut bad = LetterScale::default();
        bad.steps[0].min_percent = 120.0;
        assert!(bad.validated().is_err());
    }

    #[test]
    fn parse_letter_scale_requires_object() {
        assert!(parse_letter_scale(None).is_err());
        assert!(parse_letter_scale(Some(&serde_json::json!([1, 2]))).is_err());
        let raw = serde_json::json!({
            "steps": [
                { "letter": "P", "minPercent": 50.0, "gpaPoints": 4.0 }
            ],
            "fallbackLetter": "NP",
            "fallbackPoints": 0.0,
            "gpaCap": 4.0
        });
        let scale = parse_letter_scale(Some(&raw)).expect("parse scale");
        assert_eq!(scale.map_percentage(50.0).letter, "P");
        assert_eq!(scale.map_percentage(49.0).letter, "NP");
    }

    #[test]
    fn category_is_points_weighted_not_count_averaged() {
        let assignments = vec![
            assignment("a1", "hw", 10.0, Some(10.0)),
            assignment("a2", "hw", 90.0, Some(0.0)),
        ];
        let agg = aggregate_category(&assignments, "hw");
        assert_eq!(agg.graded_count, 2);
        let pct = agg.percentage.expect("eligible");
        assert!((pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn category_without_grades_is_ineligible() {
        let assignments = vec![
            assignment("a1", "final", 100.0, None),
            assignment("a2", "hw", 10.0, Some(5.0)),
        ];
        let agg = aggregate_category(&assignments, "final");
        assert!(agg.percentage.is_none());
        assert_eq!(agg.graded_count, 0);
    }

    #[test]
    fn category_skips_bad_points_and_clamps_negative_earned() {
        let assignments = vec![
            assignment("a1", "hw", 0.0, Some(5.0)),
            assignment("a2", "hw", -10.0, Some(5.0)),
            assignment("a3", "hw", 20.0, Some(-4.0)),
            assignment("a4", "hw", 20.0, Some(10.0)),
        ];
        let agg = aggregate_category(&assignments, "hw");
        assert_eq!(agg.graded_count, 2);
        assert_eq!(agg.points_possible, 40.0);
        assert!((agg.percentage.expect("eligible") - 25.0).abs() < 1e-9);
    }

    #[test]
    fn full_marks_give_top_letter() {
        let c = class("c1", 3.0, false);
        let cats = vec![category("hw", 30.0), category("exam", 70.0)];
        let assignments = vec![
            assignment("a1", "hw", 10.0, Some(10.0)),
            assignment("a2", "hw", 15.0, Some(15.0)),
            assignment("a3", "exam", 100.0, Some(100.0)),
        ];
        let g = calculate_class_grade(&c, &cats, &assignments, &LetterScale::default())
            .expect("graded");
        assert_eq!(g.current_grade, 100.0);
        assert_eq!(g.letter_grade, top_letter(&LetterScale::default()));
    }

    #[test]
    fn extra_credit_counts_but_class_grade_stays_within_100() {
        let c = class("c1", 3.0, false);
        let scale = LetterScale::default();

        let over = vec![assignment("a1", "hw", 10.0, Some(12.0))];
        let g = calculate_class_grade(&c, &[category("hw", 100.0)], &over, &scale)
            .expect("graded");
        assert_eq!(g.current_grade, 100.0);
        assert_eq!(g.exact_grade, 100.0);
        assert_eq!(g.letter_grade, "A+");

        // 110% homework lifts a 70% exam, evenly weighted, to 90%.
        let cats = vec![category("hw", 50.0), category("exam", 50.0)];
        let mixed = vec![
            assignment("a1", "hw", 10.0, Some(11.0)),
            assignment("a2", "exam", 100.0, Some(70.0)),
        ];
        let g = calculate_class_grade(&c, &cats, &mixed, &scale).expect("graded");
        assert!((g.exact_grade - 90.0).abs() < 1e-9);
        assert_eq!(g.current_grade, 90.0);
    }

    #[test]
    fn ungraded_category_is_renormalized_away() {
        let c = class("c1", 3.0, false);
        let cats = vec![category("hw", 50.0), category("final", 50.0)];
        let assignments = vec![
            assignment("a1", "hw", 20.0, Some(16.0)),
            assignment("a2", "final", 100.0, None),
        ];
        let g = calculate_class_grade(&c, &cats, &assignments, &LetterScale::default())
            .expect("graded");
        assert!((g.exact_grade - 80.0).abs() < 1e-9);
        assert_eq!(g.letter_grade, "B-");
    }

    #[test]
    fn weights_not_summing_to_100_stay_in_range() {
        let c = class("c1", 3.0, false);
        let cats = vec![category("hw", 80.0), category("exam", 80.0)];
        let assignments = vec![
            assignment("a1", "hw", 10.0, Some(10.0)),
            assignment("a2", "exam", 10.0, Some(5.0)),
        ];
        let g = calculate_class_grade(&c, &cats, &assignments, &LetterScale::default())
            .expect("graded");
        assert!((g.exact_grade - 75.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weight_table_falls_back_to_equal_weights() {
        let c = class("c1", 3.0, false);
        let cats = vec![category("hw", 0.0), category("exam", f64::NAN)];
        let assignments = vec![
            assignment("a1", "hw", 10.0, Some(10.0)),
            assignment("a2", "exam", 10.0, Some(6.0)),
        ];
        let g = calculate_class_grade(&c, &cats, &assignments, &LetterScale::default())
            .expect("graded");
        assert!((g.exact_grade - 80.0).abs() < 1e-9);
    }

    #[test]
    fn zero_weight_category_is_excluded_when_others_carry_weight() {
        let c = class("c1", 3.0, false);
        let cats = vec![category("hw", 100.0), category("bonus", 0.0)];
        let assignments = vec![
            assignment("a1", "hw", 10.0, Some(10.0)),
            assignment("a2", "bonus", 10.0, Some(1.0)),
        ];
        let g = calculate_class_grade(&c, &cats, &assignments, &LetterScale::default())
            .expect("graded");
        assert_eq!(g.current_grade, 100.0);
    }

    #[test]
    fn class_without_grades_has_no_class_grade() {
        let c = class("c1", 3.0, false);
        let cats = vec![category("hw", 100.0)];
        let assignments = vec![assignment("a1", "hw", 10.0, None)];
        assert!(calculate_class_grade(&c, &cats, &assignments, &LetterScale::default()).is_none());
    }

    #[test]
    fn letter_uses_full_precision_not_rounded_display() {
        let c = class("c1", 3.0, false);
        let cats = vec![category("hw", 100.0)];
        // 8999 / 10000 = 89.99%
        let assignments = vec![assignment("a1", "hw", 10000.0, Some(8999.0))];
        let g = calculate_class_grade(&c, &cats, &assignments, &LetterScale::default())
            .expect("graded");
        assert_eq!(g.current_grade, 90.0);
        assert_eq!(g.letter_grade, "B+");
        assert_eq!(g.gpa_points, 3.3);
    }

    #[test]
    fn breakdown_reports_effective_weights() {
        let tree = ClassTree {
            class: class("c1", 3.0, false),
            categories: vec![
                category("hw", 20.0),
                category("quiz", 20.0),
                category("final", 60.0),
            ],
            assignments: vec![
                assignment("a1", "hw", 10.0, Some(9.0)),
                assignment("a2", "quiz", 10.0, Some(7.0)),
                assignment("a3", "final", 100.0, None),
            ],
        };
        let b = class_breakdown(&tree, &LetterScale::default());
        assert_eq!(b.categories.len(), 3);
        assert_eq!(b.categories[0].effective_weight, Some(0.5));
        assert_eq!(b.categories[1].effective_weight, Some(0.5));
        assert_eq!(b.categories[2].effective_weight, None);
        assert_eq!(b.categories[2].percentage, None);
        let grade = b.grade.expect("graded");
        assert!((grade.exact_grade - 80.0).abs() < 1e-9);
    }
}
