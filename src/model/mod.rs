use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::DprError;

/// Chapters of a bank-ready DPR, in report order.
pub const DEFAULT_CHAPTERS: [&str; 13] = [
    "Executive Summary",
    "Project Introduction & Objective",
    "Promoter/Entrepreneur Profile",
    "Business Model & Project Details",
    "Market Analysis",
    "Location and Site Analysis",
    "Technical Feasibility & Infrastructure",
    "Implementation Schedule & Project Timeline",
    "Financial Projections",
    "SWOT Analysis",
    "Regulatory & Statutory Compliance",
    "Risk Assessment & Mitigation Strategy",
    "Annexures",
];

/// Ordered, immutable list of chapter titles. Non-empty, no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ChapterList(Vec<String>);

impl ChapterList {
    pub fn new<I, S>(titles: I) -> Result<Self, DprError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let titles: Vec<String> = titles.into_iter().map(Into::into).collect();
        if titles.is_empty() {
            return Err(DprError::Config("chapter list is empty".into()));
        }
        for (i, t) in titles.iter().enumerate() {
            if t.trim().is_empty() {
                return Err(DprError::Config(format!("chapter {} has a blank title", i + 1)));
            }
            if titles[..i].contains(t) {
                return Err(DprError::Config(format!("duplicate chapter title: {t}")));
            }
        }
        Ok(Self(titles))
    }

    pub fn dpr_default() -> Self {
        Self(DEFAULT_CHAPTERS.iter().map(|s| s.to_string()).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn title(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ChapterList {
    fn default() -> Self {
        Self::dpr_default()
    }
}

impl TryFrom<Vec<String>> for ChapterList {
    type Error = DprError;

    fn try_from(v: Vec<String>) -> Result<Self, Self::Error> {
        ChapterList::new(v)
    }
}

impl From<ChapterList> for Vec<String> {
    fn from(c: ChapterList) -> Self {
        c.0
    }
}

/// Placeholder key -> user supplied value. Shared by every chapter of a report.
pub type VariableMap = BTreeMap<String, String>;

/// Transient input for regenerating one chapter from feedback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRequest {
    pub original: String,
    pub feedback: String,
}

/// Aggregate root, keyed externally by (user id, idea title).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportProject {
    pub sections: BTreeMap<String, String>,
    pub variables: VariableMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReportProject {
    pub fn draft(&self, title: &str) -> Option<&str> {
        self.sections
            .get(title)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Index of the first chapter without a non-empty draft, or `chapters.len()`.
    pub fn first_gap(&self, chapters: &ChapterList) -> usize {
        chapters
            .iter()
            .position(|t| self.draft(t).is_none())
            .unwrap_or(chapters.len())
    }

    /// Accepted chapters strictly before `index`, in report order.
    pub fn prior_sections<'a>(
        &'a self,
        chapters: &'a ChapterList,
        index: usize,
    ) -> Vec<(&'a str, &'a str)> {
        chapters
            .iter()
            .take(index)
            .filter_map(|t| self.draft(t).map(|d| (t, d)))
            .collect()
    }

    pub fn drafted_count(&self, chapters: &ChapterList) -> usize {
        chapters.iter().filter(|t| self.draft(t).is_some()).count()
    }

    pub fn merge_variables(&mut self, updates: &VariableMap) {
        for (k, v) in updates {
            self.variables.insert(k.clone(), v.clone());
        }
    }
}

/// Row shown in the "my ideas" listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub idea_title: String,
    pub drafted_sections: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters() -> ChapterList {
        ChapterList::new(["A", "B", "C"]).unwrap()
    }

    #[test]
    fn rejects_empty_and_duplicate_lists() {
        assert!(ChapterList::new(Vec::<String>::new()).is_err());
        assert!(ChapterList::new(["A", "A"]).is_err());
        assert!(ChapterList::new(["A", "  "]).is_err());
    }

    #[test]
    fn first_gap_skips_blank_drafts() {
        let mut p = ReportProject::default();
        p.sections.insert("A".into(), "text".into());
        p.sections.insert("B".into(), "   ".into());
        p.sections.insert("C".into(), "more".into());
        assert_eq!(p.first_gap(&chapters()), 1);
        assert_eq!(p.drafted_count(&chapters()), 2);
    }

    #[test]
    fn first_gap_is_len_when_all_drafted() {
        let mut p = ReportProject::default();
        for t in ["A", "B", "C"] {
            p.sections.insert(t.into(), format!("{t} body"));
        }
        assert_eq!(p.first_gap(&chapters()), 3);
    }

    #[test]
    fn prior_sections_are_in_report_order() {
        let mut p = ReportProject::default();
        p.sections.insert("B".into(), "b".into());
        p.sections.insert("A".into(), "a".into());
        p.sections.insert("C".into(), "c".into());
        let ch = chapters();
        let prior = p.prior_sections(&ch, 2);
        assert_eq!(prior, vec![("A", "a"), ("B", "b")]);
    }

    #[test]
    fn chapter_list_deserializes_with_validation() {
        let ok: ChapterList = serde_json::from_str(r#"["One","Two"]"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<ChapterList>("[]").is_err());
    }

    #[test]
    fn default_list_has_thirteen_chapters() {
        let c = ChapterList::default();
        assert_eq!(c.len(), 13);
        assert_eq!(c.title(8), Some("Financial Projections"));
    }
}
