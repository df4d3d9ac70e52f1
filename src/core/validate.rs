use super::types::{Diagnostic, Diagnostics, FilingStatus, Phase, Severity, TaxpayerInput};

/// Outcome of structural input validation. Errors block a calculation;
/// warnings are advisory and the engine will still run.
#[derive(Debug)]
pub struct ValidationReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Structural checks only. Anything economic (phase-outs, caps, loss
/// limits) belongs to the engine, which reports its own diagnostics.
pub fn validate_input(input: &TaxpayerInput) -> ValidationReport {
    let mut diags = Diagnostics::new();

    check_income(input, &mut diags);
    check_household(input, &mut diags);
    check_non_negative_groups(input, &mut diags);

    let (errors, warnings): (Vec<Diagnostic>, Vec<Diagnostic>) = diags
        .into_entries()
        .into_iter()
        .partition(|d| d.severity == Severity::Error);
    ValidationReport { errors, warnings }
}

fn require_non_negative(diags: &mut Diagnostics, field: &str, value: i64) {
    if value < 0 {
        diags.error_for_field(
            "NEGATIVE_AMOUNT",
            field,
            format!("{field} cannot be negative"),
        );
    }
}

fn check_income(input: &TaxpayerInput, diags: &mut Diagnostics) {
    let inc = &input.income;
    // Capital gains, Schedule C, and K-1 amounts are signed; everything
    // else is a gross amount.
    require_non_negative(diags, "income.wages", inc.wages);
    require_non_negative(diags, "income.socialSecurityWages", inc.social_security_wages);
    require_non_negative(diags, "income.interest", inc.interest);
    require_non_negative(diags, "income.ordinaryDividends", inc.ordinary_dividends);
    require_non_negative(diags, "income.qualifiedDividends", inc.qualified_dividends);
    require_non_negative(diags, "income.royalties", inc.royalties);
    require_non_negative(diags, "income.guaranteedPayments", inc.guaranteed_payments);
    require_non_negative(diags, "income.otherIncome", inc.other_income);

    if inc.qualified_dividends > inc.ordinary_dividends {
        diags.error_for_field(
            "QUALIFIED_EXCEEDS_ORDINARY",
            "income.qualifiedDividends",
            "Qualified dividends cannot exceed total ordinary dividends",
        );
    }
}

fn check_household(input: &TaxpayerInput, diags: &mut Diagnostics) {
    match input.filing_status {
        FilingStatus::MarriedJointly if input.spouse.is_none() => {
            diags.warn(
                Phase::Validation,
                "JOINT_WITHOUT_SPOUSE",
                "Married filing jointly without spouse details; age and blindness add-ons assume neither applies",
            );
        }
        FilingStatus::Single | FilingStatus::HeadOfHousehold if input.spouse.is_some() => {
            diags.warn(
                Phase::Validation,
                "SPOUSE_IGNORED",
                "Spouse details are ignored for this filing status",
            );
        }
        _ => {}
    }

    for (idx, dependent) in input.dependents.iter().enumerate() {
        if dependent.months_lived_with_taxpayer > 12 {
            diags.error_for_field(
                "INVALID_MONTHS",
                format!("dependents[{idx}].monthsLivedWithTaxpayer"),
                "Months lived with taxpayer cannot exceed 12",
            );
        }
    }
}

fn check_non_negative_groups(input: &TaxpayerInput, diags: &mut Diagnostics) {
    let adj = &input.adjustments;
    require_non_negative(diags, "adjustments.educatorExpenses", adj.educator_expenses);
    require_non_negative(diags, "adjustments.hsaContributions", adj.hsa_contributions);
    require_non_negative(diags, "adjustments.iraContributions", adj.ira_contributions);
    require_non_negative(
        diags,
        "adjustments.studentLoanInterest",
        adj.student_loan_interest,
    );
    require_non_negative(
        diags,
        "adjustments.selfEmployedHealthInsurance",
        adj.self_employed_health_insurance,
    );
    require_non_negative(
        diags,
        "adjustments.amtPreferenceItems",
        adj.amt_preference_items,
    );

    let item = &input.itemized;
    require_non_negative(
        diags,
        "itemized.stateLocalIncomeTaxes",
        item.state_local_income_taxes,
    );
    require_non_negative(
        diags,
        "itemized.stateLocalPropertyTaxes",
        item.state_local_property_taxes,
    );
    require_non_negative(diags, "itemized.mortgageInterest", item.mortgage_interest);
    require_non_negative(
        diags,
        "itemized.charitableContributions",
        item.charitable_contributions,
    );
    require_non_negative(diags, "itemized.medicalExpenses", item.medical_expenses);

    let pay = &input.payments;
    require_non_negative(diags, "payments.withholding", pay.withholding);
    require_non_negative(diags, "payments.estimatedPayments", pay.estimated_payments);
    require_non_negative(
        diags,
        "payments.advancePremiumTaxCredit",
        pay.advance_premium_tax_credit,
    );

    require_non_negative(diags, "nolCarryforward", input.nol_carryforward);
    require_non_negative(
        diags,
        "priorYearMinimumTaxCredit",
        input.prior_year_minimum_tax_credit,
    );

    for (idx, business) in input.qbi.businesses.iter().enumerate() {
        require_non_negative(diags, &format!("qbi.businesses[{idx}].w2Wages"), business.w2_wages);
        require_non_negative(diags, &format!("qbi.businesses[{idx}].ubia"), business.ubia);
    }
    require_non_negative(diags, "qbi.reitPtpDividends", input.qbi.reit_ptp_dividends);

    if let Some(education) = &input.education {
        for (idx, student) in education.students.iter().enumerate() {
            require_non_negative(
                diags,
                &format!("education.students[{idx}].qualifiedExpenses"),
                student.qualified_expenses,
            );
        }
    }
    if let Some(foreign) = &input.foreign_income {
        require_non_negative(
            diags,
            "foreignIncome.foreignSourceIncome",
            foreign.foreign_source_income,
        );
        require_non_negative(diags, "foreignIncome.foreignTaxPaid", foreign.foreign_tax_paid);
    }
    if let Some(adoption) = &input.adoption {
        require_non_negative(
            diags,
            "adoption.qualifiedExpenses",
            adoption.qualified_expenses,
        );
    }
    if let Some(marketplace) = &input.marketplace {
        require_non_negative(diags, "marketplace.annualPremiums", marketplace.annual_premiums);
        require_non_negative(diags, "marketplace.slcspPremium", marketplace.slcsp_premium);
        require_non_negative(
            diags,
            "marketplace.householdIncome",
            marketplace.household_income,
        );
        require_non_negative(diags, "marketplace.fplRatioBps", marketplace.fpl_ratio_bps);
        if marketplace.slcsp_premium > 0 && marketplace.fpl_ratio_bps == 0 {
            diags.warn(
                Phase::Validation,
                "MARKETPLACE_FPL_MISSING",
                "Marketplace coverage without a poverty-line ratio; no premium tax credit will be computed",
            );
        }
    }
    if let Some(care) = &input.dependent_care {
        require_non_negative(diags, "dependentCare.expensesPaid", care.expenses_paid);
    }
    if let Some(savings) = &input.retirement_savings {
        require_non_negative(
            diags,
            "retirementSavings.primaryContributions",
            savings.primary_contributions,
        );
        require_non_negative(
            diags,
            "retirementSavings.spouseContributions",
            savings.spouse_contributions,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::super::money::dollars;
    use super::super::types::{Dependent, MarketplaceRecord, Person, Relationship};
    use super::*;

    fn minimal_input(status: FilingStatus) -> TaxpayerInput {
        TaxpayerInput {
            filing_status: status,
            primary: Person {
                age: 40,
                blind: false,
            },
            spouse: None,
            dependents: Vec::new(),
            income: Default::default(),
            adjustments: Default::default(),
            itemized: Default::default(),
            force_itemized: false,
            payments: Default::default(),
            qbi: Default::default(),
            education: None,
            foreign_income: None,
            adoption: None,
            marketplace: None,
            dependent_care: None,
            retirement_savings: None,
            nol_carryforward: 0,
            prior_year_minimum_tax_credit: 0,
        }
    }

    #[test]
    fn clean_input_is_valid() {
        let mut input = minimal_input(FilingStatus::Single);
        input.income.wages = dollars(50_000);
        let report = validate_input(&input);
        assert!(report.is_valid());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn negative_wages_is_an_error() {
        let mut input = minimal_input(FilingStatus::Single);
        input.income.wages = -1;
        let report = validate_input(&input);
        assert!(!report.is_valid());
        assert_eq!(report.errors[0].field.as_deref(), Some("income.wages"));
    }

    #[test]
    fn negative_capital_loss_is_allowed() {
        let mut input = minimal_input(FilingStatus::Single);
        input.income.capital_gain_short = -dollars(20_000);
        input.income.schedule_c_net = -dollars(5_000);
        assert!(validate_input(&input).is_valid());
    }

    #[test]
    fn qualified_dividends_cannot_exceed_ordinary() {
        let mut input = minimal_input(FilingStatus::Single);
        input.income.ordinary_dividends = dollars(1_000);
        input.income.qualified_dividends = dollars(1_500);
        let report = validate_input(&input);
        assert!(
            report
                .errors
                .iter()
                .any(|d| d.code == "QUALIFIED_EXCEEDS_ORDINARY")
        );
    }

    #[test]
    fn dependent_months_over_twelve_is_an_error() {
        let mut input = minimal_input(FilingStatus::Single);
        input.dependents.push(Dependent {
            relationship: Relationship::Child,
            age: 5,
            months_lived_with_taxpayer: 13,
            is_full_time_student: false,
            is_permanently_disabled: false,
            has_ssn: true,
            provided_over_half_own_support: false,
        });
        let report = validate_input(&input);
        assert!(report.errors.iter().any(|d| d.code == "INVALID_MONTHS"));
        assert_eq!(
            report.errors[0].field.as_deref(),
            Some("dependents[0].monthsLivedWithTaxpayer")
        );
    }

    #[test]
    fn joint_without_spouse_warns_but_passes() {
        let input = minimal_input(FilingStatus::MarriedJointly);
        let report = validate_input(&input);
        assert!(report.is_valid());
        assert!(
            report
                .warnings
                .iter()
                .any(|d| d.code == "JOINT_WITHOUT_SPOUSE")
        );
    }

    #[test]
    fn spouse_on_single_return_warns() {
        let mut input = minimal_input(FilingStatus::Single);
        input.spouse = Some(Person {
            age: 40,
            blind: false,
        });
        let report = validate_input(&input);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|d| d.code == "SPOUSE_IGNORED"));
    }

    #[test]
    fn marketplace_without_fpl_ratio_warns() {
        let mut input = minimal_input(FilingStatus::Single);
        input.marketplace = Some(MarketplaceRecord {
            annual_premiums: dollars(4_000),
            slcsp_premium: dollars(5_000),
            household_income: dollars(30_000),
            fpl_ratio_bps: 0,
        });
        let report = validate_input(&input);
        assert!(report.is_valid());
        assert!(
            report
                .warnings
                .iter()
                .any(|d| d.code == "MARKETPLACE_FPL_MISSING")
        );
    }

    #[test]
    fn negative_optional_sections_are_errors() {
        let mut input = minimal_input(FilingStatus::Single);
        input.nol_carryforward = -1;
        input.qbi.reit_ptp_dividends = -dollars(100);
        let report = validate_input(&input);
        assert_eq!(report.errors.len(), 2);
    }
}
