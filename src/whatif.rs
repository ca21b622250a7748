use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::calc::{self, ClassGrade};
use crate::gpa::{self, GpaCalculation, GradingOptions};
use crate::model::{Assignment, ClassTree, Grade};
use crate::repo::{ClassTreeSource, RepoError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeChange {
    pub assignment_id: String,
    /// Hypothetical percentage, clamped to 0..=100 when applied.
    pub new_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    pub assignment_id: String,
    pub assignment_name: String,
    pub class_id: String,
    pub class_name: String,
    pub new_grade: f64,
    /// Recorded percentage, if the assignment is graded.
    pub current_grade: Option<f64>,
    pub current_points_earned: Option<f64>,
    pub points_earned: f64,
    pub points_possible: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfScenario {
    pub resulting_gpa: f64,
    pub gpa_change: f64,
    pub resulting_semester_gpa: f64,
    pub semester_gpa_change: f64,
    pub class_grades: Vec<ClassGrade>,
    pub applied_changes: Vec<AppliedChange>,
    /// Ids of changes that referenced no known assignment or carried no usable grade.
    pub skipped_changes: Vec<String>,
}

struct Overlay {
    tree_index: usize,
    points_earned: f64,
}

/// Resolves changes against the snapshot. Later changes to the same
/// assignment replace earlier ones.
fn resolve_changes(
    trees: &[ClassTree],
    changes: &[GradeChange],
) -> (HashMap<String, Overlay>, Vec<AppliedChange>, Vec<String>) {
    let mut overlays: HashMap<String, Overlay> = HashMap::new();
    let mut applied: Vec<AppliedChange> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();

    for change in changes {
        if change.new_grade.is_nan() {
            skipped.push(change.assignment_id.clone());
            continue;
        }
        let found = trees.iter().enumerate().find_map(|(i, t)| {
            t.find_assignment(&change.assignment_id).map(|a| (i, t, a))
        });
        let Some((tree_index, tree, assignment)) = found else {
            skipped.push(change.assignment_id.clone());
            continue;
        };
        if !assignment.points_possible.is_finite() || assignment.points_possible <= 0.0 {
            skipped.push(change.assignment_id.clone());
            continue;
        }
        // An orphaned assignment never reaches a category aggregate.
        if !tree.categories.iter().any(|c| c.id == assignment.category_id) {
            skipped.push(change.assignment_id.clone());
            continue;
        }

        let new_grade = change.new_grade.clamp(0.0, 100.0);
        let points_earned = new_grade / 100.0 * assignment.points_possible;
        overlays.insert(
            assignment.id.clone(),
            Overlay {
                tree_index,
                points_earned,
            },
        );

        applied.retain(|c| c.assignment_id != assignment.id);
        applied.push(AppliedChange {
            assignment_id: assignment.id.clone(),
            assignment_name: assignment.name.clone(),
            class_id: tree.class.id.clone(),
            class_name: tree.class.name.clone(),
            new_grade,
            current_grade: assignment
                .grade
                .as_ref()
                .and_then(|g| g.percentage(assignment.points_possible)),
            current_points_earned: assignment.grade.as_ref().map(|g| g.points_earned),
            points_earned,
            points_possible: assignment.points_possible,
        });
    }

    (overlays, applied, skipped)
}

fn overlay_assignments(tree: &ClassTree, overlays: &HashMap<String, Overlay>) -> Vec<Assignment> {
    tree.assignments
        .iter()
        .map(|a| match overlays.get(&a.id) {
            Some(o) => a.with_grade(Grade::new(o.points_earned)),
            None => a.clone(),
        })
        .collect()
}

/// Applies `changes` on top of `trees` without touching them and compares
/// the result with `baseline`, which must come from the same snapshot and
/// options. Only classes hit by a change are regraded.
pub fn what_if_from_trees(
    trees: &[ClassTree],
    baseline: &GpaCalculation,
    changes: &[GradeChange],
    options: &GradingOptions,
) -> WhatIfScenario {
    let (overlays, applied_changes, skipped_changes) = resolve_changes(trees, changes);
    let touched: BTreeSet<usize> = overlays.values().map(|o| o.tree_index).collect();

    let mut class_grades: Vec<ClassGrade> = Vec::with_capacity(trees.len());
    for (i, tree) in trees.iter().enumerate() {
        if touched.contains(&i) {
            let assignments = overlay_assignments(tree, &overlays);
            if let Some(g) = calc::calculate_class_grade(
                &tree.class,
                &tree.categories,
                &assignments,
                &options.scale,
            ) {
                class_grades.push(g);
            }
        } else if let Some(g) = baseline
            .class_grades
            .iter()
            .find(|g| g.class_id == tree.class.id)
        {
            class_grades.push(g.clone());
        }
    }

    let resulting = gpa::aggregate_gpa(class_grades, &options.semester);

    WhatIfScenario {
        resulting_gpa: resulting.current_gpa,
        gpa_change: resulting.current_gpa - baseline.current_gpa,
        resulting_semester_gpa: resulting.semester_gpa,
        semester_gpa_change: resulting.semester_gpa - baseline.semester_gpa,
        class_grades: resulting.class_grades,
        applied_changes,
        skipped_changes,
    }
}

/// Read-only by construction: the only collaborator is a `ClassTreeSource`.
pub fn calculate_what_if_scenario<S>(
    source: &S,
    student_id: &str,
    changes: &[GradeChange],
    options: &GradingOptions,
) -> Result<WhatIfScenario, RepoError>
where
    S: ClassTreeSource + ?Sized,
{
    let trees = source.fetch_class_grade_tree(student_id)?;
    let baseline = gpa::gpa_from_trees(&trees, options);
    let scenario = what_if_from_trees(&trees, &baseline, changes, options);
    tracing::debug!(
        student_id,
        changes = changes.len(),
        skipped = scenario.skipped_changes.len(),
        gpa_change = scenario.gpa_change,
        "computed what-if scenario"
    );
    Ok(scenario)
}
