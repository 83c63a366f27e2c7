use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// ========================================
/// Provider boundary
/// ========================================

/// Everything a provider adapter needs for one completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Correlates saved artifacts and log lines for one call.
    pub id: Uuid,
    /// Short label for the call site, e.g. "chapter.3" or "full-report".
    pub stage: String,
    pub system: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Ask the provider for a JSON object when it supports that.
    #[serde(default)]
    pub json_mode: bool,
}

impl LlmRequest {
    pub fn new(stage: impl Into<String>, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: stage.into(),
            system: system.into(),
            user: user.into(),
            temperature: None,
            json_mode: false,
        }
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// ========================================
/// Structured documents (one-shot flows)
/// ========================================

/// Rich profile produced from a bare idea, used as input to the full report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
    pub promoter_name: String,
    pub business_name: String,
    pub business_type: String,
    pub location: String,
    pub detailed_project_description: String,
    pub target_audience_analysis: String,
    pub competitive_landscape: String,
    pub marketing_strategy: String,
    pub financial_summary: String,
    pub usp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostItem {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyProjection {
    pub year: String,
    pub sales: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialProjections {
    pub summary_text: String,
    pub project_cost: String,
    pub means_of_finance: String,
    #[serde(default)]
    pub cost_breakdown: Vec<CostItem>,
    #[serde(default)]
    pub yearly_projections: Vec<YearlyProjection>,
    pub profitability_analysis: String,
    pub cash_flow_statement: String,
    pub loan_repayment_schedule: String,
    pub break_even_analysis: String,
}

/// Complete DPR as returned in one structured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullReport {
    pub executive_summary: String,
    pub project_introduction: String,
    pub promoter_details: String,
    pub business_model: String,
    pub market_analysis: String,
    pub location_and_site: String,
    pub technical_feasibility: String,
    pub implementation_schedule: String,
    pub financial_projections: FinancialProjections,
    pub swot_analysis: String,
    pub regulatory_compliance: String,
    pub risk_assessment: String,
    pub annexures: String,
}
