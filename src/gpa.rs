use serde::{Deserialize, Serialize};

use crate::calc::{self, ClassGrade, LetterScale};
use crate::model::ClassTree;
use crate::repo::{ClassTreeSource, RepoError};

/// Which classes count toward the semester GPA. Chosen explicitly per call;
/// never inferred from the data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "term", rename_all = "camelCase")]
pub enum SemesterScope {
    /// Classes not yet marked completed.
    #[default]
    InProgress,
    /// Classes whose term label equals this one.
    Term(String),
}

impl SemesterScope {
    pub fn includes(&self, grade: &ClassGrade) -> bool {
        match self {
            SemesterScope::InProgress => !grade.is_completed,
            SemesterScope::Term(term) => grade.term.as_deref() == Some(term.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradingOptions {
    pub scale: LetterScale,
    pub semester: SemesterScope,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaCalculation {
    pub current_gpa: f64,
    pub semester_gpa: f64,
    pub total_credit_hours: f64,
    pub semester_credit_hours: f64,
    pub class_grades: Vec<ClassGrade>,
}

fn credit_weight(credit_hours: f64) -> f64 {
    if credit_hours.is_finite() && credit_hours > 0.0 {
        credit_hours
    } else {
        0.0
    }
}

/// Credit-hour weighted mean of GPA points; 0.0 when no credit hours qualify.
pub fn weighted_gpa<'a, I>(grades: I) -> (f64, f64)
where
    I: IntoIterator<Item = &'a ClassGrade>,
{
    let mut points = 0.0_f64;
    let mut hours = 0.0_f64;
    for g in grades {
        let h = credit_weight(g.credit_hours);
        points += g.gpa_points * h;
        hours += h;
    }
    let gpa = if hours > 0.0 { points / hours } else { 0.0 };
    (gpa, hours)
}

pub fn aggregate_gpa(class_grades: Vec<ClassGrade>, semester: &SemesterScope) -> GpaCalculation {
    let (current_gpa, total_credit_hours) = weighted_gpa(&class_grades);
    let (semester_gpa, semester_credit_hours) =
        weighted_gpa(class_grades.iter().filter(|g| semester.includes(g)));

    GpaCalculation {
        current_gpa,
        semester_gpa,
        total_credit_hours,
        semester_credit_hours,
        class_grades,
    }
}

/// Grades every class that has at least one eligible category, in tree order.
pub fn grade_classes(trees: &[ClassTree], scale: &LetterScale) -> Vec<ClassGrade> {
    trees
        .iter()
        .filter_map(|t| calc::grade_class_tree(t, scale))
        .collect()
}

pub fn gpa_from_trees(trees: &[ClassTree], options: &GradingOptions) -> GpaCalculation {
    aggregate_gpa(grade_classes(trees, &options.scale), &options.semester)
}

pub fn calculate_full_gpa<S>(
    source: &S,
    student_id: &str,
    options: &GradingOptions,
) -> Result<GpaCalculation, RepoError>
where
    S: ClassTreeSource + ?Sized,
{
    let trees = source.fetch_class_grade_tree(student_id)?;
    let gpa = gpa_from_trees(&trees, options);
    tracing::debug!(
        student_id,
        classes = trees.len(),
        graded_classes = gpa.class_grades.len(),
        current_gpa = gpa.current_gpa,
        "computed gpa"
    );
    Ok(gpa)
}
