use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Defect classes predicted by the recognition model.
///
/// Declaration order matters: it breaks ties during classification and
/// fixes the heatmap label (`index + 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DefectCategory {
    Whiskers,
    Chipping,
    Scratch,
    NoError,
}

impl DefectCategory {
    /// All categories in declaration order.
    pub const ALL: [DefectCategory; 4] = [
        DefectCategory::Whiskers,
        DefectCategory::Chipping,
        DefectCategory::Scratch,
        DefectCategory::NoError,
    ];

    /// Column header used by the recognition output table.
    pub fn column_name(self) -> &'static str {
        match self {
            DefectCategory::Whiskers => "Whiskers",
            DefectCategory::Chipping => "Chipping",
            DefectCategory::Scratch => "Scratch",
            DefectCategory::NoError => "No Error",
        }
    }

    pub fn index(self) -> usize {
        match self {
            DefectCategory::Whiskers => 0,
            DefectCategory::Chipping => 1,
            DefectCategory::Scratch => 2,
            DefectCategory::NoError => 3,
        }
    }

    /// Integer label used for heatmap coloring (1..=4).
    pub fn label(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Pick the category with the highest score.
    ///
    /// `scores` is indexed in declaration order.  Ties resolve to the
    /// earliest category.
    pub fn argmax(scores: &[f64; 4]) -> DefectCategory {
        let mut best = 0;
        for idx in 1..scores.len() {
            if scores[idx] > scores[best] {
                best = idx;
            }
        }
        DefectCategory::ALL[best]
    }
}

/// Normalized frequency of each defect category across a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DefectPrevalence {
    /// Prevalence of whiskers.
    pub whiskers: f64,
    /// Prevalence of chipping.
    pub chipping: f64,
    /// Prevalence of scratches.
    pub scratch: f64,
    /// Prevalence of no errors.
    pub no_error: f64,
}

impl DefectPrevalence {
    /// Build a prevalence from per-category counts (declaration order).
    ///
    /// Returns all zeros when `counts` sums to zero.
    pub fn from_counts(counts: [usize; 4]) -> Self {
        let total: usize = counts.iter().sum();
        if total == 0 {
            return Self::default();
        }
        let share = |n: usize| n as f64 / total as f64;
        Self {
            whiskers: share(counts[0]),
            chipping: share(counts[1]),
            scratch: share(counts[2]),
            no_error: share(counts[3]),
        }
    }

    pub fn get(&self, category: DefectCategory) -> f64 {
        match category {
            DefectCategory::Whiskers => self.whiskers,
            DefectCategory::Chipping => self.chipping,
            DefectCategory::Scratch => self.scratch,
            DefectCategory::NoError => self.no_error,
        }
    }

    pub fn total(&self) -> f64 {
        self.whiskers + self.chipping + self.scratch + self.no_error
    }
}

/// Output record of one completed inference run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisResult {
    /// File containing the data.
    pub file: String,
    /// Prevalence of defects in the image.
    pub defect_prevalence: DefectPrevalence,
}

impl AnalysisResult {
    /// Section definition written as `m_def` into archive documents.
    pub const SECTION_DEF: &'static str = "ifm_types.defect.AnalysisResult";

    pub fn new(file: impl Into<String>, defect_prevalence: DefectPrevalence) -> Self {
        Self {
            file: file.into(),
            defect_prevalence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn argmax_prefers_first_category_on_tie() {
        assert_eq!(
            DefectCategory::argmax(&[0.1, 0.4, 0.4, 0.1]),
            DefectCategory::Chipping
        );
        assert_eq!(
            DefectCategory::argmax(&[0.25, 0.25, 0.25, 0.25]),
            DefectCategory::Whiskers
        );
    }

    #[test]
    fn labels_follow_declaration_order() {
        let labels: Vec<u8> = DefectCategory::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec![1, 2, 3, 4]);
        assert_eq!(DefectCategory::NoError.column_name(), "No Error");
    }

    #[test]
    fn empty_counts_give_zero_prevalence() {
        let p = DefectPrevalence::from_counts([0, 0, 0, 0]);
        assert_eq!(p, DefectPrevalence::default());
        assert_eq!(p.total(), 0.0);
    }

    proptest! {
        #[test]
        fn non_empty_counts_sum_to_one(counts in proptest::array::uniform4(0usize..500)) {
            prop_assume!(counts.iter().sum::<usize>() > 0);
            let p = DefectPrevalence::from_counts(counts);
            prop_assert!((p.total() - 1.0).abs() < 1e-9);
        }
    }
}
