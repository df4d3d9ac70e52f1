use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilingStatus {
    Single,
    #[serde(alias = "marriedJointly", alias = "married_jointly")]
    MarriedJointly,
    #[serde(alias = "marriedSeparately", alias = "married_separately")]
    MarriedSeparately,
    #[serde(alias = "headOfHousehold", alias = "head_of_household")]
    HeadOfHousehold,
}

impl FilingStatus {
    pub fn is_married_separate(self) -> bool {
        self == FilingStatus::MarriedSeparately
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Person {
    /// Age at the end of the tax year.
    pub age: u32,
    pub blind: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relationship {
    Child,
    Stepchild,
    #[serde(alias = "fosterChild", alias = "foster_child")]
    FosterChild,
    Sibling,
    Grandchild,
    Parent,
    #[serde(alias = "otherRelative", alias = "other_relative")]
    OtherRelative,
}

impl Relationship {
    fn is_child_type(self) -> bool {
        matches!(
            self,
            Relationship::Child
                | Relationship::Stepchild
                | Relationship::FosterChild
                | Relationship::Sibling
                | Relationship::Grandchild
        )
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependent {
    pub relationship: Relationship,
    /// Age at the end of the tax year.
    pub age: u32,
    pub months_lived_with_taxpayer: u32,
    #[serde(default)]
    pub is_full_time_student: bool,
    #[serde(default)]
    pub is_permanently_disabled: bool,
    #[serde(default)]
    pub has_ssn: bool,
    /// True when the dependent paid more than half of their own support,
    /// which fails the qualifying-child support test.
    #[serde(default)]
    pub provided_over_half_own_support: bool,
}

impl Dependent {
    pub fn is_qualifying_child(&self) -> bool {
        let age_ok = self.age < 19
            || (self.age < 24 && self.is_full_time_student)
            || self.is_permanently_disabled;
        self.relationship.is_child_type()
            && age_ok
            && self.months_lived_with_taxpayer > 6
            && !self.provided_over_half_own_support
    }

    pub fn qualifies_for_ctc(&self) -> bool {
        self.is_qualifying_child() && self.age < 17 && self.has_ssn
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncomeRecord {
    pub wages: i64,
    /// W-2 box 3 Social Security wages, used to coordinate the SE tax
    /// wage base. Defaults to zero, not to `wages`.
    pub social_security_wages: i64,
    pub interest: i64,
    /// Total ordinary dividends; `qualified_dividends` is the subset taxed
    /// at preferential rates.
    pub ordinary_dividends: i64,
    pub qualified_dividends: i64,
    /// Signed: losses allowed.
    pub capital_gain_short: i64,
    /// Signed: losses allowed.
    pub capital_gain_long: i64,
    /// Signed: losses allowed.
    pub schedule_c_net: i64,
    /// Signed: losses allowed.
    pub k1_ordinary_business: i64,
    /// Signed: losses allowed.
    pub k1_passive: i64,
    /// Signed: losses allowed.
    pub k1_portfolio: i64,
    pub royalties: i64,
    pub guaranteed_payments: i64,
    pub other_income: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdjustmentsRecord {
    pub educator_expenses: i64,
    pub hsa_contributions: i64,
    pub ira_contributions: i64,
    pub covered_by_employer_plan: bool,
    pub student_loan_interest: i64,
    pub self_employed_health_insurance: i64,
    /// AMT preference/adjustment items reported by the caller (private
    /// activity bond interest, incentive stock option spread, and the
    /// like). The engine adds its own deduction add-backs on top.
    pub amt_preference_items: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItemizedRecord {
    pub state_local_income_taxes: i64,
    pub state_local_property_taxes: i64,
    pub mortgage_interest: i64,
    pub charitable_contributions: i64,
    pub medical_expenses: i64,
}

impl ItemizedRecord {
    pub fn salt_paid(&self) -> i64 {
        self.state_local_income_taxes + self.state_local_property_taxes
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PaymentsRecord {
    pub withholding: i64,
    pub estimated_payments: i64,
    pub advance_premium_tax_credit: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QbiBusiness {
    /// Signed: a loss business reduces aggregate QBI.
    pub qualified_business_income: i64,
    #[serde(default)]
    pub w2_wages: i64,
    #[serde(default)]
    pub ubia: i64,
    #[serde(default)]
    pub is_sstb: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QbiRecord {
    pub businesses: Vec<QbiBusiness>,
    /// REIT dividends and PTP income: unconditional 20%, no wage/UBIA or
    /// SSTB limitation.
    pub reit_ptp_dividends: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationStudent {
    pub qualified_expenses: i64,
    /// American Opportunity eligibility (first four years, at least
    /// half-time). Ineligible students fall through to the Lifetime
    /// Learning Credit.
    #[serde(default)]
    pub aotc_eligible: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EducationRecord {
    pub students: Vec<EducationStudent>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForeignIncomeRecord {
    pub foreign_source_income: i64,
    pub foreign_tax_paid: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdoptionRecord {
    pub qualified_expenses: i64,
    /// Special-needs adoptions are allowed the full maximum regardless of
    /// actual expenses.
    pub special_needs: bool,
    pub children: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketplaceRecord {
    pub annual_premiums: i64,
    /// Second-lowest-cost silver plan benchmark premium.
    pub slcsp_premium: i64,
    pub household_income: i64,
    /// Household income as a share of the federal poverty line, in basis
    /// points (250% of FPL = 25000).
    pub fpl_ratio_bps: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DependentCareRecord {
    pub qualifying_persons: u32,
    pub expenses_paid: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetirementSavingsRecord {
    pub primary_contributions: i64,
    pub spouse_contributions: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxpayerInput {
    pub filing_status: FilingStatus,
    pub primary: Person,
    #[serde(default)]
    pub spouse: Option<Person>,
    #[serde(default)]
    pub dependents: Vec<Dependent>,
    #[serde(default)]
    pub income: IncomeRecord,
    #[serde(default)]
    pub adjustments: AdjustmentsRecord,
    #[serde(default)]
    pub itemized: ItemizedRecord,
    #[serde(default)]
    pub force_itemized: bool,
    #[serde(default)]
    pub payments: PaymentsRecord,
    #[serde(default)]
    pub qbi: QbiRecord,
    #[serde(default)]
    pub education: Option<EducationRecord>,
    #[serde(default)]
    pub foreign_income: Option<ForeignIncomeRecord>,
    #[serde(default)]
    pub adoption: Option<AdoptionRecord>,
    #[serde(default)]
    pub marketplace: Option<MarketplaceRecord>,
    #[serde(default)]
    pub dependent_care: Option<DependentCareRecord>,
    #[serde(default)]
    pub retirement_savings: Option<RetirementSavingsRecord>,
    #[serde(default)]
    pub nol_carryforward: i64,
    #[serde(default)]
    pub prior_year_minimum_tax_credit: i64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeductionKind {
    Standard,
    Itemized,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSplit {
    pub non_refundable: i64,
    pub refundable: i64,
}

impl CreditSplit {
    pub fn total(self) -> i64 {
        self.non_refundable + self.refundable
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsBreakdown {
    pub foreign_tax: CreditSplit,
    pub dependent_care: CreditSplit,
    pub education: CreditSplit,
    pub savers: CreditSplit,
    pub child_tax: CreditSplit,
    pub adoption: CreditSplit,
    pub earned_income: CreditSplit,
    pub premium_tax: CreditSplit,
}

impl CreditsBreakdown {
    fn splits(&self) -> [CreditSplit; 8] {
        [
            self.foreign_tax,
            self.dependent_care,
            self.education,
            self.savers,
            self.child_tax,
            self.adoption,
            self.earned_income,
            self.premium_tax,
        ]
    }

    pub fn total_non_refundable(&self) -> i64 {
        self.splits().iter().map(|s| s.non_refundable).sum()
    }

    pub fn total_refundable(&self) -> i64 {
        self.splits().iter().map(|s| s.refundable).sum()
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalTaxes {
    pub self_employment: i64,
    pub net_investment_income: i64,
    pub additional_medicare: i64,
    pub alternative_minimum: i64,
}

impl AdditionalTaxes {
    pub fn total(&self) -> i64 {
        self.self_employment
            + self.net_investment_income
            + self.additional_medicare
            + self.alternative_minimum
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBreakdown {
    pub withholding: i64,
    pub estimated_payments: i64,
    pub advance_premium_tax_credit: i64,
    pub total: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundableCreditsBreakdown {
    pub earned_income: i64,
    pub additional_child_tax: i64,
    pub education: i64,
    pub premium_tax: i64,
    pub other: i64,
    pub total: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOrOweBreakdown {
    pub total_tax: i64,
    pub total_payments: i64,
    pub total_refundable_credits: i64,
    pub refund_or_owe: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub step: String,
    pub form_reference: String,
    pub inputs: serde_json::Value,
    pub result: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FederalResult {
    pub total_income: i64,
    pub agi: i64,
    pub deduction_kind: DeductionKind,
    pub deduction_forced: bool,
    pub deduction_amount: i64,
    pub qbi_deduction: i64,
    pub nol_deduction: i64,
    pub taxable_income_before_qbi: i64,
    pub taxable_income: i64,
    pub ordinary_tax: i64,
    pub preferential_tax: i64,
    pub tax_before_credits: i64,
    pub credits: CreditsBreakdown,
    pub additional_taxes: AdditionalTaxes,
    /// Advance premium tax credit payments in excess of the entitlement,
    /// owed back at reconciliation.
    pub premium_tax_repayment: i64,
    pub total_tax: i64,
    pub payments: PaymentBreakdown,
    pub refundable_credits: RefundableCreditsBreakdown,
    pub refund_or_owe: i64,
    pub refund_breakdown: RefundOrOweBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceRecord>>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Validation,
    IncomeAggregation,
    Adjustments,
    Deductions,
    TaxComputation,
    Surtaxes,
    Credits,
    Reconciliation,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub phase: Phase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

/// Phase-keyed diagnostic collector. Diagnostics are advisory only and
/// never alter the numeric result.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, phase: Phase, code: &'static str, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            code,
            severity: Severity::Warning,
            phase,
            message: message.into(),
            field: None,
            context: None,
        });
    }

    pub fn warn_with_context(
        &mut self,
        phase: Phase,
        code: &'static str,
        message: impl Into<String>,
        context: serde_json::Value,
    ) {
        self.entries.push(Diagnostic {
            code,
            severity: Severity::Warning,
            phase,
            message: message.into(),
            field: None,
            context: Some(context),
        });
    }

    pub fn error_for_field(
        &mut self,
        code: &'static str,
        field: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.entries.push(Diagnostic {
            code,
            severity: Severity::Error,
            phase: Phase::Validation,
            message: message.into(),
            field: Some(field.into()),
            context: None,
        });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[derive(Debug)]
pub struct FederalCalculation {
    pub result: FederalResult,
    pub diagnostics: Vec<Diagnostic>,
}
