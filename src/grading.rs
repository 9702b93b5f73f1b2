use crate::model::MarkComponents;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label returned when no band applies.
pub const NOT_GRADED: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBand {
    pub label: String,
    pub min: i64,
    pub max: i64,
}

impl GradeBand {
    pub fn new(label: &str, min: i64, max: i64) -> Self {
        Self {
            label: label.to_string(),
            min,
            max,
        }
    }

    fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GradingError {
    #[error("grade scale must contain at least one band")]
    EmptyScale,
    #[error("band '{label}' has min {min} greater than max {max}")]
    InvertedBand { label: String, min: i64, max: i64 },
    #[error("grade label '{0}' appears more than once")]
    DuplicateLabel(String),
    #[error("bands '{lower}' and '{upper}' overlap")]
    Overlap { lower: String, upper: String },
    #[error("no band covers {from}..={to}")]
    Gap { from: i64, to: i64 },
    #[error("grade scale must cover 0..=100, got {min}..={max}")]
    Uncovered { min: i64, max: i64 },
    #[error("maximum for {0} must be greater than 0")]
    NonPositiveMax(&'static str),
    #[error("maximum marks must add up to 100")]
    MaxMarksTotal,
}

/// Ordered, non-overlapping bands covering exactly `0..=100`.
///
/// Display order is the order the bands were given in (best grade first by
/// convention); containment checks do not depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GradeBand>", into = "Vec<GradeBand>")]
pub struct GradeScale {
    bands: Vec<GradeBand>,
}

impl GradeScale {
    pub fn new(bands: Vec<GradeBand>) -> Result<Self, GradingError> {
        if bands.is_empty() {
            return Err(GradingError::EmptyScale);
        }
        for (i, b) in bands.iter().enumerate() {
            if b.min > b.max {
                return Err(GradingError::InvertedBand {
                    label: b.label.clone(),
                    min: b.min,
                    max: b.max,
                });
            }
            if bands[..i].iter().any(|o| o.label == b.label) {
                return Err(GradingError::DuplicateLabel(b.label.clone()));
            }
        }

        let mut sorted: Vec<&GradeBand> = bands.iter().collect();
        sorted.sort_by_key(|b| b.min);
        for pair in sorted.windows(2) {
            let (lower, upper) = (pair[0], pair[1]);
            if upper.min <= lower.max {
                return Err(GradingError::Overlap {
                    lower: lower.label.clone(),
                    upper: upper.label.clone(),
                });
            }
            if upper.min > lower.max + 1 {
                return Err(GradingError::Gap {
                    from: lower.max + 1,
                    to: upper.min - 1,
                });
            }
        }

        let min = sorted[0].min;
        let max = sorted[sorted.len() - 1].max;
        if min != 0 || max != 100 {
            return Err(GradingError::Uncovered { min, max });
        }

        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[GradeBand] {
        &self.bands
    }

    /// Letter grade for a total out of 100. Totals outside the scale get
    /// [`NOT_GRADED`].
    pub fn grade(&self, total: i64) -> &str {
        self.bands
            .iter()
            .find(|b| b.contains(total))
            .map(|b| b.label.as_str())
            .unwrap_or(NOT_GRADED)
    }

    /// Grades a single component by rescaling it to a percentage of `max`.
    ///
    /// The percentage is floored, so 85.5% lands in the band holding 85.
    pub fn component_grade(&self, score: Option<i64>, max: i64) -> &str {
        let Some(score) = score else {
            return NOT_GRADED;
        };
        if score < 0 || max <= 0 {
            return NOT_GRADED;
        }
        // Integer division floors non-negative values exactly.
        self.grade(score.saturating_mul(100) / max)
    }
}

impl Default for GradeScale {
    fn default() -> Self {
        Self {
            bands: vec![
                GradeBand::new("A+", 86, 100),
                GradeBand::new("A", 80, 85),
                GradeBand::new("B+", 75, 79),
                GradeBand::new("B", 70, 74),
                GradeBand::new("C+", 65, 69),
                GradeBand::new("C", 60, 64),
                GradeBand::new("D", 55, 59),
                GradeBand::new("E", 50, 54),
                GradeBand::new("F", 0, 49),
            ],
        }
    }
}

impl TryFrom<Vec<GradeBand>> for GradeScale {
    type Error = GradingError;

    fn try_from(bands: Vec<GradeBand>) -> Result<Self, Self::Error> {
        Self::new(bands)
    }
}

impl From<GradeScale> for Vec<GradeBand> {
    fn from(scale: GradeScale) -> Self {
        scale.bands
    }
}

/// Sum of the three components; a student without a mark totals 0.
pub fn total(mark: Option<&MarkComponents>) -> i64 {
    match mark {
        Some(m) => m
            .cats
            .saturating_add(m.coursework)
            .saturating_add(m.final_exam),
        None => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Cats,
    Coursework,
    FinalExam,
}

impl Component {
    pub fn label(self) -> &'static str {
        match self {
            Component::Cats => "CATs",
            Component::Coursework => "Course Work",
            Component::FinalExam => "Final Exam",
        }
    }

    pub fn score(self, mark: &MarkComponents) -> i64 {
        match self {
            Component::Cats => mark.cats,
            Component::Coursework => mark.coursework,
            Component::FinalExam => mark.final_exam,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} must be between 0 and {max}.", component.label())]
pub struct MarkRangeError {
    pub component: Component,
    pub value: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxMarks {
    pub cats: i64,
    pub coursework: i64,
    pub final_exam: i64,
}

impl Default for MaxMarks {
    fn default() -> Self {
        Self {
            cats: 20,
            coursework: 20,
            final_exam: 60,
        }
    }
}

impl MaxMarks {
    pub fn max_for(&self, component: Component) -> i64 {
        match component {
            Component::Cats => self.cats,
            Component::Coursework => self.coursework,
            Component::FinalExam => self.final_exam,
        }
    }

    /// Checks CATs, coursework and final exam in that order and reports the
    /// first component outside `0..=max`.
    pub fn validate(&self, mark: &MarkComponents) -> Result<(), MarkRangeError> {
        for component in [Component::Cats, Component::Coursework, Component::FinalExam] {
            let value = component.score(mark);
            let max = self.max_for(component);
            if value < 0 || value > max {
                return Err(MarkRangeError {
                    component,
                    value,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Every maximum is positive and together they span the 0..=100 scale.
    fn check(&self) -> Result<(), GradingError> {
        for component in [Component::Cats, Component::Coursework, Component::FinalExam] {
            if self.max_for(component) <= 0 {
                return Err(GradingError::NonPositiveMax(component.label()));
            }
        }
        let sum = self
            .cats
            .checked_add(self.coursework)
            .and_then(|s| s.checked_add(self.final_exam));
        if sum != Some(100) {
            return Err(GradingError::MaxMarksTotal);
        }
        Ok(())
    }
}

/// Grading configuration passed into every grading and validation call.
///
/// Deserializing goes through [`GradingConfig::new`], so saved sections and
/// patches get the same checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", try_from = "GradingConfigFields")]
pub struct GradingConfig {
    pub scale: GradeScale,
    pub max_marks: MaxMarks,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradingConfigFields {
    scale: GradeScale,
    max_marks: MaxMarks,
}

impl GradingConfig {
    pub fn new(scale: GradeScale, max_marks: MaxMarks) -> Result<Self, GradingError> {
        max_marks.check()?;
        Ok(Self { scale, max_marks })
    }
}

impl TryFrom<GradingConfigFields> for GradingConfig {
    type Error = GradingError;

    fn try_from(fields: GradingConfigFields) -> Result<Self, Self::Error> {
        Self::new(fields.scale, fields.max_marks)
    }
}

// ---------------------------------------------------------------------------
// Course statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Analysis {
    #[default]
    Overall,
    Cats,
    Coursework,
    FinalExam,
}

impl Analysis {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "overall" => Some(Self::Overall),
            "cats" => Some(Self::Cats),
            "coursework" => Some(Self::Coursework),
            "finalExam" => Some(Self::FinalExam),
            _ => None,
        }
    }

    fn component(self) -> Option<Component> {
        match self {
            Self::Overall => None,
            Self::Cats => Some(Component::Cats),
            Self::Coursework => Some(Component::Coursework),
            Self::FinalExam => Some(Component::FinalExam),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMark {
    pub total: i64,
    pub grade: String,
}

/// Score and grade shown for one student under the selected analysis.
pub fn score_mark(
    config: &GradingConfig,
    analysis: Analysis,
    mark: Option<&MarkComponents>,
) -> ScoredMark {
    let Some(m) = mark else {
        return ScoredMark {
            total: 0,
            grade: NOT_GRADED.to_string(),
        };
    };
    match analysis.component() {
        None => {
            let t = total(Some(m));
            ScoredMark {
                total: t,
                grade: config.scale.grade(t).to_string(),
            }
        }
        Some(component) => {
            let score = component.score(m);
            ScoredMark {
                total: score,
                grade: config
                    .scale
                    .component_grade(Some(score), config.max_marks.max_for(component))
                    .to_string(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_enrolled: usize,
    pub count_with_marks: usize,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeCount {
    pub grade: String,
    pub count: usize,
}

pub fn summarize<'a, I>(scored: I) -> PerformanceSummary
where
    I: IntoIterator<Item = &'a ScoredMark>,
{
    let mut total_enrolled = 0usize;
    let mut count_with_marks = 0usize;
    let mut sum: i64 = 0;
    for s in scored {
        total_enrolled += 1;
        if s.grade != NOT_GRADED {
            count_with_marks += 1;
            sum = sum.saturating_add(s.total);
        }
    }
    let average_score = if count_with_marks > 0 {
        round_2_decimals(sum as f64 / count_with_marks as f64)
    } else {
        0.0
    };
    PerformanceSummary {
        total_enrolled,
        count_with_marks,
        average_score,
    }
}

/// Count per band in scale order. Every band is listed, ungraded rows are
/// left out.
pub fn distribution<'a, I>(scale: &GradeScale, scored: I) -> Vec<GradeCount>
where
    I: IntoIterator<Item = &'a ScoredMark>,
{
    let mut counts: Vec<GradeCount> = scale
        .bands()
        .iter()
        .map(|b| GradeCount {
            grade: b.label.clone(),
            count: 0,
        })
        .collect();
    for s in scored {
        if let Some(slot) = counts.iter_mut().find(|c| c.grade == s.grade) {
            slot.count += 1;
        }
    }
    counts
}

fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
