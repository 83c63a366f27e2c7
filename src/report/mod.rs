//! One-shot flows: elaborate a bare idea into a [`BusinessProfile`], then ask
//! for the whole DPR as a single structured [`FullReport`].

use tokio_util::sync::CancellationToken;

use crate::errors::DprError;
use crate::model::DEFAULT_CHAPTERS;
use crate::normalize;
use crate::prompt;
use crate::provider::{complete_cancellable, Provider};
use crate::wire::{BusinessProfile, FinancialProjections, FullReport, LlmRequest};

pub struct OneShot<'a> {
    provider: &'a (dyn Provider + Send + Sync),
    cancel: CancellationToken,
    temperature: Option<f32>,
}

impl<'a> OneShot<'a> {
    pub fn new(provider: &'a (dyn Provider + Send + Sync)) -> Self {
        Self {
            provider,
            cancel: CancellationToken::new(),
            temperature: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub async fn elaborate(&self, idea: &str, promoter: &str) -> Result<BusinessProfile, DprError> {
        if idea.trim().is_empty() || promoter.trim().is_empty() {
            return Err(DprError::InvalidState("idea and promoter name are required".into()));
        }
        let req = LlmRequest::new(
            "elaborate",
            "You are a business consultant for Indian MSMEs. Answer with one JSON object.",
            prompt::elaboration_prompt(idea, promoter),
        )
        .json();
        let mut profile: BusinessProfile = self.structured(req).await?;
        if profile.promoter_name.trim().is_empty() {
            profile.promoter_name = promoter.to_string();
        }
        tracing::info!(business = %profile.business_name, "idea elaborated");
        Ok(profile)
    }

    pub async fn full_report(&self, profile: &BusinessProfile) -> Result<FullReport, DprError> {
        let req = LlmRequest::new(
            "full-report",
            prompt::system_prompt_full_report(),
            prompt::full_report_prompt(profile),
        )
        .json();
        let report: FullReport = self.structured(req).await?;
        tracing::info!(
            business = %profile.business_name,
            years = report.financial_projections.yearly_projections.len(),
            "full report generated"
        );
        Ok(report)
    }

    async fn structured<T: serde::de::DeserializeOwned>(&self, mut req: LlmRequest) -> Result<T, DprError> {
        if let Some(t) = self.temperature {
            req = req.with_temperature(t);
        }
        tracing::debug!(stage = %req.stage, prompt_chars = req.user.len(), "requesting structured document");
        let raw = complete_cancellable(self.provider, &req, &self.cancel).await?;
        normalize::normalize_structured(&raw)
    }
}

/// Profile built from the user's own words, used when elaboration is skipped.
pub fn plain_profile(idea: &str, promoter: &str) -> BusinessProfile {
    BusinessProfile {
        promoter_name: promoter.to_string(),
        business_name: idea.to_string(),
        business_type: String::new(),
        location: String::new(),
        detailed_project_description: idea.to_string(),
        target_audience_analysis: String::new(),
        competitive_landscape: String::new(),
        marketing_strategy: String::new(),
        financial_summary: String::new(),
        usp: String::new(),
    }
}

/// The report as (chapter title, Markdown) pairs in the default chapter order.
pub fn sections(report: &FullReport) -> Vec<(String, String)> {
    let bodies = [
        report.executive_summary.clone(),
        report.project_introduction.clone(),
        report.promoter_details.clone(),
        report.business_model.clone(),
        report.market_analysis.clone(),
        report.location_and_site.clone(),
        report.technical_feasibility.clone(),
        report.implementation_schedule.clone(),
        financials_markdown(&report.financial_projections),
        report.swot_analysis.clone(),
        report.regulatory_compliance.clone(),
        report.risk_assessment.clone(),
        report.annexures.clone(),
    ];
    DEFAULT_CHAPTERS
        .iter()
        .zip(bodies)
        .map(|(title, body)| (title.to_string(), body.trim().to_string()))
        .collect()
}

pub fn financials_markdown(f: &FinancialProjections) -> String {
    let mut out = String::new();
    out.push_str(f.summary_text.trim());
    out.push_str("\n\n### Project Cost\n\n");
    out.push_str(f.project_cost.trim());
    out.push_str("\n\n### Means of Finance\n\n");
    out.push_str(f.means_of_finance.trim());

    if !f.cost_breakdown.is_empty() {
        out.push_str("\n\n### Cost Breakdown\n\n| Item | Amount (₹) |\n|---|---:|\n");
        for item in &f.cost_breakdown {
            out.push_str(&format!("| {} | {} |\n", item.name, format_inr(item.value)));
        }
        let total: f64 = f.cost_breakdown.iter().map(|c| c.value).sum();
        out.push_str(&format!("| **Total** | **{}** |", format_inr(total)));
    }

    if !f.yearly_projections.is_empty() {
        out.push_str("\n\n### Yearly Projections\n\n| Year | Sales (₹) | Profit (₹) | Margin |\n|---|---:|---:|---:|\n");
        for y in &f.yearly_projections {
            let margin = if y.sales > 0.0 {
                format!("{:.1}%", y.profit / y.sales * 100.0)
            } else {
                "-".to_string()
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                y.year,
                format_inr(y.sales),
                format_inr(y.profit),
                margin
            ));
        }
        out.truncate(out.trim_end().len());
    }

    for (heading, body) in [
        ("Profitability Analysis", &f.profitability_analysis),
        ("Cash Flow Statement", &f.cash_flow_statement),
        ("Loan Repayment Schedule", &f.loan_repayment_schedule),
        ("Break-even Analysis", &f.break_even_analysis),
    ] {
        out.push_str(&format!("\n\n### {}\n\n{}", heading, body.trim()));
    }
    out
}

/// Whole rupees with Indian digit grouping: 1234567 -> "12,34,567".
pub fn format_inr(value: f64) -> String {
    let rounded = value.round();
    let negative = rounded < 0.0;
    let digits = format!("{:.0}", rounded.abs());
    let grouped = if digits.len() <= 3 {
        digits
    } else {
        let (head, tail) = digits.split_at(digits.len() - 3);
        let mut parts: Vec<&str> = Vec::new();
        let mut rest = head;
        while rest.len() > 2 {
            let (a, b) = rest.split_at(rest.len() - 2);
            parts.push(b);
            rest = a;
        }
        if !rest.is_empty() {
            parts.push(rest);
        }
        parts.reverse();
        format!("{},{}", parts.join(","), tail)
    };
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{CostItem, YearlyProjection};
    use async_trait::async_trait;

    struct Canned(String);

    #[async_trait]
    impl Provider for Canned {
        fn name(&self) -> &str {
            "canned"
        }
        async fn complete(&self, req: &LlmRequest) -> Result<String, DprError> {
            assert!(req.json_mode);
            Ok(self.0.clone())
        }
    }

    fn profile_json() -> String {
        r#"```json
{"promoterName":"","businessName":"Asha Eco Plates","businessType":"Manufacturing",
 "location":"Nashik","detailedProjectDescription":"Areca leaf plates",
 "targetAudienceAnalysis":"Caterers","competitiveLandscape":"Plastic",
 "marketingStrategy":"Distributors","financialSummary":"₹12 lakh","usp":"Compostable"}
```"#
            .to_string()
    }

    #[tokio::test]
    async fn elaborate_parses_fenced_profile_and_fills_promoter() {
        let p = Canned(profile_json());
        let profile = OneShot::new(&p).elaborate("Paper Plate Unit", "Asha").await.unwrap();
        assert_eq!(profile.business_name, "Asha Eco Plates");
        assert_eq!(profile.promoter_name, "Asha");
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let p = Canned("sorry, I cannot help".into());
        let err = OneShot::new(&p)
            .full_report(&plain_profile("Idea", "Asha"))
            .await
            .unwrap_err();
        assert!(matches!(err, DprError::MalformedModelOutput { .. }));
    }

    #[test]
    fn inr_grouping() {
        assert_eq!(format_inr(0.0), "0");
        assert_eq!(format_inr(999.0), "999");
        assert_eq!(format_inr(1000.0), "1,000");
        assert_eq!(format_inr(123456.0), "1,23,456");
        assert_eq!(format_inr(1234567.4), "12,34,567");
        assert_eq!(format_inr(-50000.0), "-50,000");
    }

    #[test]
    fn financials_render_tables() {
        let f = FinancialProjections {
            summary_text: "Summary".into(),
            project_cost: "₹12 lakh".into(),
            means_of_finance: "Loan and equity".into(),
            cost_breakdown: vec![
                CostItem { name: "Machinery".into(), value: 800000.0 },
                CostItem { name: "Working capital".into(), value: 400000.0 },
            ],
            yearly_projections: vec![YearlyProjection { year: "Year 1".into(), sales: 1000000.0, profit: 150000.0 }],
            profitability_analysis: "p".into(),
            cash_flow_statement: "c".into(),
            loan_repayment_schedule: "l".into(),
            break_even_analysis: "b".into(),
        };
        let md = financials_markdown(&f);
        assert!(md.contains("| Machinery | 8,00,000 |"));
        assert!(md.contains("| **Total** | **12,00,000** |"));
        assert!(md.contains("| Year 1 | 10,00,000 | 1,50,000 | 15.0% |"));
        assert!(md.contains("### Break-even Analysis\n\nb"));
    }
}
