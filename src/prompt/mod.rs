use crate::model::{RevisionRequest, VariableMap};
use crate::wire::BusinessProfile;

/// Inputs for one chapter instruction.
#[derive(Debug, Clone)]
pub struct ChapterPrompt<'a> {
    pub idea: &'a str,
    pub promoter_name: &'a str,
    pub chapter_title: &'a str,
    /// Accepted chapters strictly before the target, in report order.
    pub prior_sections: &'a [(&'a str, &'a str)],
    pub variables: &'a VariableMap,
    pub revision: Option<&'a RevisionRequest>,
    /// Placeholder prefix the model should use for unknown figures.
    pub placeholder_prefix: &'a str,
}

fn writing_rules(prefix: &str) -> String {
    format!(
        r#"Writing Rules:
- Audience: a loan officer at an Indian bank reviewing an MSME application. Write formally and concretely.
- Use realistic figures for India (₹, lakh/crore notation). Keep every number consistent with earlier chapters.
- Where a figure or fact depends on the promoter and is not known, insert a placeholder of the form {prefix}{{Short Key}} instead of inventing it, e.g. {prefix}{{Loan Amount}}. Reuse the same key for the same fact.
- Use Markdown headings, bullet lists and **bold** sparingly. Do not wrap the answer in code fences.
- Output only the chapter body. No preamble, no closing remarks, no follow-up questions."#
    )
}

pub fn system_prompt_section() -> String {
    r#"You are "FIn-Box", an expert business consultant helping an entrepreneur in India build a bank-ready Detailed Project Report (DPR).
You write one chapter at a time. Each chapter must be detailed, professional and suitable for a formal bank loan application."#
        .to_string()
}

/// Instruction text for generating, or revising, one chapter. Pure.
pub fn compose(p: &ChapterPrompt<'_>) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str(&format!("Business idea: \"{}\"\n", p.idea));
    out.push_str(&format!("Promoter: {}\n\n", p.promoter_name));

    if !p.prior_sections.is_empty() {
        out.push_str("Chapters already completed (use them as context and stay consistent):\n");
        for (title, content) in p.prior_sections {
            out.push_str(&format!("### {title}\n{content}\n---\n"));
        }
        out.push('\n');
    }

    let known: Vec<_> = p.variables.iter().filter(|(_, v)| !v.trim().is_empty()).collect();
    if !known.is_empty() {
        out.push_str("Values the promoter has already supplied (use them where relevant):\n");
        for (k, v) in known {
            out.push_str(&format!("- {k} = {v}\n"));
        }
        out.push('\n');
    }

    match p.revision {
        None => {
            out.push_str(&format!(
                "Task: write the \"{}\" chapter of the DPR.\n\n",
                p.chapter_title
            ));
        }
        Some(rev) => {
            out.push_str(&format!(
                "Task: revise the current draft of the \"{}\" chapter in place.\n\n",
                p.chapter_title
            ));
            out.push_str("Current draft:\n<<<\n");
            out.push_str(&rev.original);
            out.push_str("\n>>>\n\n");
            out.push_str("Promoter feedback:\n<<<\n");
            out.push_str(&rev.feedback);
            out.push_str("\n>>>\n\n");
            out.push_str(
                "Apply the feedback to the draft and return the full revised chapter. \
                 Keep what the feedback does not ask to change. \
                 Do not repeat the feedback verbatim and do not comment on the changes.\n\n",
            );
        }
    }

    out.push_str(&writing_rules(p.placeholder_prefix));
    out
}

pub fn elaboration_prompt(idea: &str, promoter_name: &str) -> String {
    format!(
        r#"You are a business consultant creating a detailed profile for a startup idea in India.
The user has provided a basic idea. Elaborate on it by filling in every field of a comprehensive business profile.
This profile will be used to generate a full Detailed Project Report (DPR).

Return EXACTLY ONE JSON object (no markdown, no prose, no code fences) with these string fields:
{{
  "promoterName": string,
  "businessName": string,
  "businessType": string,
  "location": string,
  "detailedProjectDescription": string,
  "targetAudienceAnalysis": string,
  "competitiveLandscape": string,
  "marketingStrategy": string,
  "financialSummary": string,
  "usp": string
}}

Be creative but realistic. Elaborations must be plausible for the Indian market.

User's business idea: "{idea}"
Promoter's name: "{promoter_name}""#
    )
}

fn full_report_schema() -> &'static str {
    r#"{
  "executiveSummary": string,
  "projectIntroduction": string,
  "promoterDetails": string,
  "businessModel": string,
  "marketAnalysis": string,
  "locationAndSite": string,
  "technicalFeasibility": string,
  "implementationSchedule": string,
  "financialProjections": {
    "summaryText": string,
    "projectCost": string,
    "meansOfFinance": string,
    "costBreakdown": [ { "name": string, "value": number } ],
    "yearlyProjections": [ { "year": string, "sales": number, "profit": number } ],
    "profitabilityAnalysis": string,
    "cashFlowStatement": string,
    "loanRepaymentSchedule": string,
    "breakEvenAnalysis": string
  },
  "swotAnalysis": string,
  "regulatoryCompliance": string,
  "riskAssessment": string,
  "annexures": string
}"#
}

pub fn system_prompt_full_report() -> String {
    "You are an expert AI assistant for writing bank-ready Detailed Project Reports for Indian MSMEs.".to_string()
}

pub fn full_report_prompt(profile: &BusinessProfile) -> String {
    let profile_json = serde_json::to_string_pretty(profile).unwrap_or_default();
    format!(
        r#"You have been provided with a detailed, structured business profile. Write the complete DPR based on it.

Return EXACTLY ONE JSON object (no markdown around it, no prose, no code fences) that conforms to:

{schema}

Rules:
- "costBreakdown" and "yearlyProjections" must be JSON arrays with numeric values (3 to 5 years of projections).
- Every other field is a detailed Markdown string.
- All financial data must be plausible for a business of this nature in India.
- Annexures: list the supporting documents that would be attached; do not write the documents.

Detailed business profile:
{profile_json}"#,
        schema = full_report_schema(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base<'a>(
        prior: &'a [(&'a str, &'a str)],
        vars: &'a VariableMap,
        revision: Option<&'a RevisionRequest>,
    ) -> ChapterPrompt<'a> {
        ChapterPrompt {
            idea: "Paper Plate Unit",
            promoter_name: "Asha",
            chapter_title: "Market Analysis",
            prior_sections: prior,
            variables: vars,
            revision,
            placeholder_prefix: "VAR",
        }
    }

    #[test]
    fn generate_mode_names_chapter_and_context() {
        let prior = [("Executive Summary", "A plate unit in Pune.")];
        let vars = VariableMap::new();
        let text = compose(&base(&prior, &vars, None));
        assert!(text.contains("Paper Plate Unit"));
        assert!(text.contains("Promoter: Asha"));
        assert!(text.contains("### Executive Summary\nA plate unit in Pune."));
        assert!(text.contains("write the \"Market Analysis\" chapter"));
        assert!(!text.contains("revise"));
        assert!(text.contains("VAR{Loan Amount}"));
    }

    #[test]
    fn first_chapter_has_no_context_block() {
        let vars = VariableMap::new();
        let text = compose(&base(&[], &vars, None));
        assert!(!text.contains("already completed"));
        assert!(!text.contains("already supplied"));
    }

    #[test]
    fn variables_are_listed_as_hints_only() {
        let mut vars = VariableMap::new();
        vars.insert("Loan Amount".into(), "₹10 lakh".into());
        vars.insert("Unset".into(), String::new());
        let text = compose(&base(&[], &vars, None));
        assert!(text.contains("- Loan Amount = ₹10 lakh"));
        assert!(!text.contains("Unset ="));
    }

    #[test]
    fn revision_mode_carries_draft_and_feedback() {
        let vars = VariableMap::new();
        let rev = RevisionRequest {
            original: "Long draft text.".into(),
            feedback: "make it shorter".into(),
        };
        let text = compose(&base(&[], &vars, Some(&rev)));
        assert!(text.contains("revise the current draft of the \"Market Analysis\" chapter"));
        assert!(text.contains("Long draft text."));
        assert!(text.contains("make it shorter"));
        assert!(text.contains("Do not repeat the feedback verbatim"));
    }

    #[test]
    fn compose_is_deterministic() {
        let vars = VariableMap::new();
        let a = compose(&base(&[], &vars, None));
        let b = compose(&base(&[], &vars, None));
        assert_eq!(a, b);
    }

    #[test]
    fn custom_prefix_is_used() {
        let vars = VariableMap::new();
        let mut p = base(&[], &vars, None);
        p.placeholder_prefix = "TOKEN";
        assert!(compose(&p).contains("TOKEN{Short Key}"));
    }

    #[test]
    fn full_report_prompt_embeds_profile() {
        let profile = BusinessProfile {
            promoter_name: "Asha".into(),
            business_name: "Asha Eco Plates".into(),
            business_type: "Manufacturing".into(),
            location: "Nashik".into(),
            detailed_project_description: "d".into(),
            target_audience_analysis: "t".into(),
            competitive_landscape: "c".into(),
            marketing_strategy: "m".into(),
            financial_summary: "f".into(),
            usp: "u".into(),
        };
        let text = full_report_prompt(&profile);
        assert!(text.contains("\"businessName\": \"Asha Eco Plates\""));
        assert!(text.contains("\"yearlyProjections\""));
    }
}
