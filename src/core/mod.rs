mod credits;
mod engine;
mod money;
mod rules;
mod types;
mod validate;

pub use engine::{
    compute_federal_tax, compute_federal_tax_traced, compute_federal_tax_with_rules,
    compute_federal_tax_with_rules_traced,
};
pub use money::{Rate, dollars};
pub use rules::{TaxBracket, TaxYearRules};
pub use types::{
    AdditionalTaxes, AdjustmentsRecord, AdoptionRecord, CreditSplit, CreditsBreakdown, Dependent,
    DependentCareRecord, Diagnostic, DeductionKind, EducationRecord, EducationStudent,
    Diagnostics, FederalCalculation, FederalResult, FilingStatus, ForeignIncomeRecord, IncomeRecord,
    ItemizedRecord, MarketplaceRecord, PaymentBreakdown, PaymentsRecord, Person, Phase,
    QbiBusiness, QbiRecord, RefundOrOweBreakdown, RefundableCreditsBreakdown, Relationship,
    RetirementSavingsRecord, Severity, TaxpayerInput, TraceRecord,
};
pub use validate::{ValidationReport, validate_input};
