use serde_json::json;

use super::money::{Rate, max0, multiply_cents, range_position_bps, range_remaining_bps};
use super::rules::TaxYearRules;
use super::types::{
    CreditSplit, CreditsBreakdown, Diagnostics, FilingStatus, Phase, TaxpayerInput,
};

pub(crate) struct CreditContext<'a> {
    pub input: &'a TaxpayerInput,
    pub rules: &'a TaxYearRules,
    pub agi: i64,
    pub magi: i64,
    pub taxable_income: i64,
    pub tax_before_credits: i64,
    pub earned_income: i64,
    pub investment_income: i64,
}

/// One credit in the ordered stack. `remaining_liability` is the tax left
/// after every earlier non-refundable credit; implementations must clamp
/// their non-refundable part to it. Refundable parts are independent of
/// liability by definition.
trait CreditCalculator {
    fn compute(
        &self,
        ctx: &CreditContext,
        remaining_liability: i64,
        diags: &mut Diagnostics,
    ) -> CreditSplit;

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit;
}

/// Applies the credit stack in its fixed statutory order. Order matters:
/// every non-refundable credit consumes remaining liability before the
/// next one is limited.
pub(crate) fn apply_credit_stack(ctx: &CreditContext, diags: &mut Diagnostics) -> CreditsBreakdown {
    let stack: [&dyn CreditCalculator; 8] = [
        &ForeignTaxCredit,
        &DependentCareCredit,
        &EducationCredits,
        &SaversCredit,
        &ChildTaxCredit,
        &AdoptionCredit,
        &EarnedIncomeCredit,
        &PremiumTaxCredit,
    ];

    let mut out = CreditsBreakdown::default();
    let mut remaining = max0(ctx.tax_before_credits);
    for calculator in stack {
        let mut split = calculator.compute(ctx, remaining, diags);
        split.non_refundable = split.non_refundable.clamp(0, remaining);
        split.refundable = max0(split.refundable);
        remaining -= split.non_refundable;
        *calculator.slot(&mut out) = split;
    }
    out
}

fn ceil_div(amount: i64, step: i64) -> i64 {
    if amount <= 0 || step <= 0 {
        return 0;
    }
    (amount + step - 1) / step
}

struct ForeignTaxCredit;

impl CreditCalculator for ForeignTaxCredit {
    fn compute(
        &self,
        ctx: &CreditContext,
        remaining_liability: i64,
        diags: &mut Diagnostics,
    ) -> CreditSplit {
        let Some(foreign) = &ctx.input.foreign_income else {
            return CreditSplit::default();
        };
        if foreign.foreign_tax_paid <= 0 {
            return CreditSplit::default();
        }

        // Limited to the share of US tax attributable to foreign-source
        // income.
        let limit = if ctx.taxable_income <= 0 {
            0
        } else {
            let foreign_share = foreign
                .foreign_source_income
                .clamp(0, ctx.taxable_income);
            ((ctx.tax_before_credits as i128 * foreign_share as i128)
                / ctx.taxable_income as i128) as i64
        };
        if limit < foreign.foreign_tax_paid {
            diags.warn_with_context(
                Phase::Credits,
                "FTC_LIMITED",
                "Foreign tax credit limited to US tax on foreign-source income",
                json!({ "paid": foreign.foreign_tax_paid, "limit": limit }),
            );
        }

        CreditSplit {
            non_refundable: foreign.foreign_tax_paid.min(limit).min(remaining_liability),
            refundable: 0,
        }
    }

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit {
        &mut out.foreign_tax
    }
}

struct DependentCareCredit;

impl CreditCalculator for DependentCareCredit {
    fn compute(
        &self,
        ctx: &CreditContext,
        remaining_liability: i64,
        _diags: &mut Diagnostics,
    ) -> CreditSplit {
        let Some(care) = &ctx.input.dependent_care else {
            return CreditSplit::default();
        };
        if care.qualifying_persons == 0 || care.expenses_paid <= 0 {
            return CreditSplit::default();
        }

        let rules = ctx.rules;
        let expense_cap = if care.qualifying_persons == 1 {
            rules.dependent_care_expense_cap_one
        } else {
            rules.dependent_care_expense_cap_many
        };
        let allowed = care
            .expenses_paid
            .min(expense_cap)
            .min(max0(ctx.earned_income));

        // 35% sliding to 20%: one point per $2,000 (or fraction) of AGI
        // over the step start.
        let steps = ceil_div(
            max0(ctx.agi - rules.dependent_care_agi_step_start),
            rules.dependent_care_agi_step,
        );
        let rate_bps = (rules.dependent_care_top_rate.bps() - steps * 100)
            .max(rules.dependent_care_floor_rate.bps());

        CreditSplit {
            non_refundable: multiply_cents(allowed, Rate::from_bps(rate_bps))
                .min(remaining_liability),
            refundable: 0,
        }
    }

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit {
        &mut out.dependent_care
    }
}

struct EducationCredits;

impl CreditCalculator for EducationCredits {
    fn compute(
        &self,
        ctx: &CreditContext,
        remaining_liability: i64,
        diags: &mut Diagnostics,
    ) -> CreditSplit {
        let Some(education) = &ctx.input.education else {
            return CreditSplit::default();
        };
        if education.students.is_empty() {
            return CreditSplit::default();
        }
        if ctx.input.filing_status.is_married_separate() {
            diags.warn(
                Phase::Credits,
                "EDUCATION_MFS",
                "Education credits are not available when married filing separately",
            );
            return CreditSplit::default();
        }

        let rules = ctx.rules;
        let (start, end) = rules.education_phase_out(ctx.input.filing_status);
        let share = range_remaining_bps(ctx.magi, start, end);
        if share.is_zero() {
            diags.warn(
                Phase::Credits,
                "EDUCATION_PHASED_OUT",
                "Education credits fully phased out at this MAGI",
            );
            return CreditSplit::default();
        }

        let mut aotc_total = 0_i64;
        let mut llc_expenses = 0_i64;
        for student in &education.students {
            let expenses = max0(student.qualified_expenses);
            if student.aotc_eligible {
                let full = expenses.min(rules.aotc_full_expense_cap);
                let partial = multiply_cents(
                    max0(expenses - rules.aotc_full_expense_cap).min(rules.aotc_partial_expense_cap),
                    rules.aotc_partial_rate,
                );
                aotc_total += full + partial;
            } else {
                llc_expenses += expenses;
            }
        }

        let aotc = multiply_cents(aotc_total, share);
        let llc = multiply_cents(
            multiply_cents(llc_expenses.min(rules.llc_expense_cap), rules.llc_rate),
            share,
        );

        let refundable = multiply_cents(aotc, rules.aotc_refundable_rate);
        let non_refundable = (aotc - refundable + llc).min(remaining_liability);
        CreditSplit {
            non_refundable,
            refundable,
        }
    }

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit {
        &mut out.education
    }
}

struct SaversCredit;

impl CreditCalculator for SaversCredit {
    fn compute(
        &self,
        ctx: &CreditContext,
        remaining_liability: i64,
        _diags: &mut Diagnostics,
    ) -> CreditSplit {
        let Some(savings) = &ctx.input.retirement_savings else {
            return CreditSplit::default();
        };

        let rules = ctx.rules;
        let mut contributions = savings
            .primary_contributions
            .clamp(0, rules.savers_contribution_cap);
        if ctx.input.filing_status == FilingStatus::MarriedJointly {
            contributions += savings
                .spouse_contributions
                .clamp(0, rules.savers_contribution_cap);
        }
        if contributions == 0 {
            return CreditSplit::default();
        }

        let rate = rules
            .savers_tiers(ctx.input.filing_status)
            .iter()
            .find(|tier| ctx.agi <= tier.agi_ceiling)
            .map(|tier| tier.rate)
            .unwrap_or(Rate::ZERO);

        CreditSplit {
            non_refundable: multiply_cents(contributions, rate).min(remaining_liability),
            refundable: 0,
        }
    }

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit {
        &mut out.savers
    }
}

struct ChildTaxCredit;

impl CreditCalculator for ChildTaxCredit {
    fn compute(
        &self,
        ctx: &CreditContext,
        remaining_liability: i64,
        diags: &mut Diagnostics,
    ) -> CreditSplit {
        let rules = ctx.rules;
        let mut qualifying = 0_i64;
        for dependent in &ctx.input.dependents {
            if dependent.qualifies_for_ctc() {
                qualifying += 1;
            } else if dependent.is_qualifying_child() && dependent.age >= 17 {
                diags.warn_with_context(
                    Phase::Credits,
                    "CTC_CHILD_TOO_OLD",
                    "Dependent aged 17 or older does not qualify for the child tax credit",
                    json!({ "age": dependent.age }),
                );
            }
        }
        if qualifying == 0 {
            return CreditSplit::default();
        }

        let full_entitlement = rules.ctc_per_child * qualifying;
        let phase_out_start = rules.ctc_phase_out_start_for(ctx.input.filing_status);
        let steps = ceil_div(max0(ctx.agi - phase_out_start), rules.ctc_phase_out_step);
        let reduction = steps * rules.ctc_phase_out_per_step;
        let entitlement = max0(full_entitlement - reduction);
        if reduction > 0 {
            if entitlement == 0 {
                diags.warn(
                    Phase::Credits,
                    "CTC_PHASED_OUT",
                    "Child tax credit fully phased out at this AGI",
                );
            } else {
                diags.warn_with_context(
                    Phase::Credits,
                    "CTC_PHASE_OUT_ENGAGED",
                    "Child tax credit reduced by the AGI phase-out",
                    json!({ "reduction": reduction }),
                );
            }
        }

        let non_refundable = entitlement.min(remaining_liability);
        // Unused entitlement spills into the refundable additional child
        // tax credit, limited by the per-child cap and the earned-income
        // phase-in.
        let leftover = entitlement - non_refundable;
        let refundable_cap = rules.ctc_refundable_cap * qualifying;
        let phase_in = multiply_cents(
            max0(ctx.earned_income - rules.actc_earned_income_floor),
            rules.actc_phase_in_rate,
        );
        let refundable = leftover.min(refundable_cap).min(phase_in);

        CreditSplit {
            non_refundable,
            refundable,
        }
    }

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit {
        &mut out.child_tax
    }
}

struct AdoptionCredit;

impl CreditCalculator for AdoptionCredit {
    fn compute(
        &self,
        ctx: &CreditContext,
        remaining_liability: i64,
        diags: &mut Diagnostics,
    ) -> CreditSplit {
        let Some(adoption) = &ctx.input.adoption else {
            return CreditSplit::default();
        };
        if adoption.children == 0 {
            return CreditSplit::default();
        }

        let rules = ctx.rules;
        let ceiling = rules.adoption_credit_max * adoption.children as i64;
        let allowed = if adoption.special_needs {
            // Special-needs adoptions get the full maximum regardless of
            // actual expenses.
            ceiling
        } else {
            max0(adoption.qualified_expenses).min(ceiling)
        };
        if allowed == 0 {
            return CreditSplit::default();
        }

        let share = range_remaining_bps(
            ctx.magi,
            rules.adoption_phase_out_start,
            rules.adoption_phase_out_end,
        );
        if share.is_zero() {
            diags.warn(
                Phase::Credits,
                "ADOPTION_PHASED_OUT",
                "Adoption credit fully phased out at this MAGI",
            );
            return CreditSplit::default();
        }

        CreditSplit {
            non_refundable: multiply_cents(allowed, share).min(remaining_liability),
            refundable: 0,
        }
    }

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit {
        &mut out.adoption
    }
}

struct EarnedIncomeCredit;

impl CreditCalculator for EarnedIncomeCredit {
    fn compute(
        &self,
        ctx: &CreditContext,
        _remaining_liability: i64,
        diags: &mut Diagnostics,
    ) -> CreditSplit {
        let rules = ctx.rules;
        if ctx.investment_income > rules.eitc_investment_income_limit {
            diags.warn_with_context(
                Phase::Credits,
                "EITC_INVESTMENT_DISQUALIFIED",
                "Investment income above the statutory limit disqualifies the EITC",
                json!({
                    "investmentIncome": ctx.investment_income,
                    "limit": rules.eitc_investment_income_limit,
                    "disqualified": true,
                }),
            );
            return CreditSplit::default();
        }
        if ctx.input.filing_status.is_married_separate() {
            diags.warn(
                Phase::Credits,
                "EITC_MFS",
                "Married-filing-separately filers are not eligible for the EITC",
            );
            return CreditSplit::default();
        }

        let qualifying_children = ctx
            .input
            .dependents
            .iter()
            .filter(|d| d.is_qualifying_child())
            .count();
        if qualifying_children == 0 && !(25..=64).contains(&ctx.input.primary.age) {
            diags.warn(
                Phase::Credits,
                "EITC_AGE",
                "Childless EITC requires the filer to be between 25 and 64",
            );
            return CreditSplit::default();
        }

        let row = rules.eitc_row(qualifying_children);
        let phase_in_base = ctx.earned_income.min(row.earned_income_amount);
        let base = multiply_cents(phase_in_base, row.phase_in_rate).min(row.max_credit);

        let phase_out_start = if ctx.input.filing_status == FilingStatus::MarriedJointly {
            row.phase_out_start_joint
        } else {
            row.phase_out_start
        };
        // Phase-out compares against the larger of AGI and earned income.
        let comparison = ctx.agi.max(ctx.earned_income);
        let reduction = multiply_cents(max0(comparison - phase_out_start), row.phase_out_rate);
        let credit = max0(base - reduction);
        if base > 0 && credit == 0 {
            diags.warn(
                Phase::Credits,
                "EITC_PHASED_OUT",
                "EITC fully phased out at this income level",
            );
        }

        CreditSplit {
            non_refundable: 0,
            refundable: credit,
        }
    }

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit {
        &mut out.earned_income
    }
}

struct PremiumTaxCredit;

impl CreditCalculator for PremiumTaxCredit {
    fn compute(
        &self,
        ctx: &CreditContext,
        _remaining_liability: i64,
        diags: &mut Diagnostics,
    ) -> CreditSplit {
        let Some(marketplace) = &ctx.input.marketplace else {
            return CreditSplit::default();
        };
        if marketplace.slcsp_premium <= 0 || marketplace.household_income <= 0 {
            return CreditSplit::default();
        }
        if ctx.input.filing_status.is_married_separate() {
            diags.warn(
                Phase::Credits,
                "PTC_MFS",
                "Married-filing-separately filers are generally ineligible for the premium tax credit",
            );
            return CreditSplit::default();
        }

        // Advance payments already sit in the payment totals; only the
        // remainder of the entitlement is paid out as a credit here.
        let entitlement = premium_tax_entitlement(ctx);
        CreditSplit {
            non_refundable: 0,
            refundable: max0(entitlement - ctx.input.payments.advance_premium_tax_credit),
        }
    }

    fn slot<'b>(&self, out: &'b mut CreditsBreakdown) -> &'b mut CreditSplit {
        &mut out.premium_tax
    }
}

/// Premium tax credit entitlement before advance payments are netted.
/// Zero when the filer is ineligible or the marketplace data is unusable.
fn premium_tax_entitlement(ctx: &CreditContext) -> i64 {
    let Some(marketplace) = &ctx.input.marketplace else {
        return 0;
    };
    if marketplace.slcsp_premium <= 0 || marketplace.household_income <= 0 {
        return 0;
    }
    if ctx.input.filing_status.is_married_separate() {
        return 0;
    }
    let rate = applicable_percentage(ctx.rules, marketplace.fpl_ratio_bps);
    let expected_contribution = multiply_cents(marketplace.household_income, rate);
    max0(marketplace.slcsp_premium - expected_contribution).min(max0(marketplace.annual_premiums))
}

/// Advance premium tax credit payments in excess of the entitlement are
/// owed back at reconciliation.
pub(crate) fn advance_premium_repayment(ctx: &CreditContext) -> i64 {
    max0(ctx.input.payments.advance_premium_tax_credit - premium_tax_entitlement(ctx))
}

/// Linear interpolation inside the applicable-percentage table row that
/// contains the FPL ratio.
fn applicable_percentage(rules: &TaxYearRules, fpl_ratio_bps: i64) -> Rate {
    let ratio = max0(fpl_ratio_bps);
    for row in &rules.ptc_applicable_table {
        if ratio >= row.fpl_floor_bps && ratio < row.fpl_ceiling_bps {
            let position = range_position_bps(ratio, row.fpl_floor_bps, row.fpl_ceiling_bps);
            let spread = row.rate_at_ceiling.bps() - row.rate_at_floor.bps();
            let interpolated =
                row.rate_at_floor.bps() + (spread as i128 * position.bps() as i128 / 10_000) as i64;
            return Rate::from_bps(interpolated);
        }
    }
    rules
        .ptc_applicable_table
        .last()
        .map(|row| row.rate_at_ceiling)
        .unwrap_or(Rate::ZERO)
}

#[cfg(test)]
mod tests {
    use super::super::money::dollars;
    use super::super::types::{
        AdoptionRecord, Dependent, DependentCareRecord, EducationRecord, EducationStudent,
        ForeignIncomeRecord, IncomeRecord, MarketplaceRecord, Person, Relationship,
        RetirementSavingsRecord,
    };
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn child(age: u32) -> Dependent {
        Dependent {
            relationship: Relationship::Child,
            age,
            months_lived_with_taxpayer: 12,
            is_full_time_student: false,
            is_permanently_disabled: false,
            has_ssn: true,
            provided_over_half_own_support: false,
        }
    }

    fn base_input(status: FilingStatus) -> TaxpayerInput {
        TaxpayerInput {
            filing_status: status,
            primary: Person {
                age: 40,
                blind: false,
            },
            spouse: None,
            dependents: Vec::new(),
            income: IncomeRecord::default(),
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

    fn context<'a>(
        input: &'a TaxpayerInput,
        rules: &'a TaxYearRules,
        agi: i64,
        tax_before_credits: i64,
        earned_income: i64,
    ) -> CreditContext<'a> {
        CreditContext {
            input,
            rules,
            agi,
            magi: agi,
            taxable_income: max0(agi - dollars(14_600)),
            tax_before_credits,
            earned_income,
            investment_income: 0,
        }
    }

    #[test]
    fn ctc_two_children_no_phase_out() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::MarriedJointly);
        input.dependents = vec![child(5), child(9)];
        let ctx = context(&input, &rules, dollars(85_000), dollars(6_000), dollars(85_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.child_tax.total(), dollars(4_000));
    }

    #[test]
    fn ctc_phase_out_engaged_but_not_exhausted() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.dependents = vec![child(10)];
        let ctx = context(
            &input,
            &rules,
            dollars(215_000),
            dollars(40_000),
            dollars(215_000),
        );
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        // $15,000 over the threshold: 15 steps of $50 = $750 reduction.
        assert_eq!(credits.child_tax.total(), dollars(1_250));
        assert!(credits.child_tax.total() > 0);
        assert!(credits.child_tax.total() < rules.ctc_per_child);
        assert!(
            diags
                .entries()
                .iter()
                .any(|d| d.code == "CTC_PHASE_OUT_ENGAGED")
        );
    }

    #[test]
    fn ctc_spills_into_refundable_actc_when_liability_is_low() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.dependents = vec![child(3)];
        let ctx = context(&input, &rules, dollars(25_000), dollars(500), dollars(25_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.child_tax.non_refundable, dollars(500));
        // Leftover $1,500 is within both the $1,700 cap and the earned
        // income phase-in.
        assert_eq!(credits.child_tax.refundable, dollars(1_500));
    }

    #[test]
    fn ctc_seventeen_year_old_warns() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.dependents = vec![child(17)];
        let ctx = context(&input, &rules, dollars(50_000), dollars(4_000), dollars(50_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.child_tax.total(), 0);
        assert!(diags.entries().iter().any(|d| d.code == "CTC_CHILD_TOO_OLD"));
    }

    #[test]
    fn eitc_investment_income_disqualifies() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.dependents = vec![child(4)];
        let mut ctx = context(&input, &rules, dollars(20_000), 0, dollars(20_000));
        ctx.investment_income = rules.eitc_investment_income_limit + 1;
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.earned_income.total(), 0);
        assert!(
            diags
                .entries()
                .iter()
                .any(|d| d.code == "EITC_INVESTMENT_DISQUALIFIED")
        );
    }

    #[test]
    fn eitc_plateau_pays_maximum() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.dependents = vec![child(4), child(7)];
        // Earned income on the plateau: above the phase-in amount, below
        // the phase-out start.
        let ctx = context(&input, &rules, dollars(20_000), 0, dollars(20_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.earned_income.refundable, dollars(6_960));
    }

    #[test]
    fn eitc_uses_larger_of_agi_and_earned_income() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.dependents = vec![child(4)];
        let low = context(&input, &rules, dollars(20_000), 0, dollars(20_000));
        let high_agi = context(&input, &rules, dollars(35_000), 0, dollars(20_000));
        let mut diags = Diagnostics::new();
        let low_credit = apply_credit_stack(&low, &mut diags).earned_income.refundable;
        let high_credit = apply_credit_stack(&high_agi, &mut diags)
            .earned_income
            .refundable;
        assert!(high_credit < low_credit);
    }

    #[test]
    fn eitc_childless_age_window() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.primary.age = 22;
        let ctx = context(&input, &rules, dollars(9_000), 0, dollars(9_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.earned_income.total(), 0);
        assert!(diags.entries().iter().any(|d| d.code == "EITC_AGE"));
    }

    #[test]
    fn foreign_tax_credit_limited_by_us_tax_share() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.foreign_income = Some(ForeignIncomeRecord {
            foreign_source_income: dollars(10_000),
            foreign_tax_paid: dollars(5_000),
        });
        // US tax of $8,000 on $50,000 taxable: limit is 8000 * 10/50.
        let mut ctx = context(&input, &rules, dollars(64_600), dollars(8_000), 0);
        ctx.taxable_income = dollars(50_000);
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.foreign_tax.non_refundable, dollars(1_600));
        assert!(diags.entries().iter().any(|d| d.code == "FTC_LIMITED"));
    }

    #[test]
    fn dependent_care_rate_slides_with_agi() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.dependent_care = Some(DependentCareRecord {
            qualifying_persons: 1,
            expenses_paid: dollars(3_000),
        });
        let low = context(&input, &rules, dollars(14_000), dollars(5_000), dollars(14_000));
        let high = context(&input, &rules, dollars(60_000), dollars(5_000), dollars(60_000));
        let mut diags = Diagnostics::new();
        let low_credit = apply_credit_stack(&low, &mut diags)
            .dependent_care
            .non_refundable;
        let high_credit = apply_credit_stack(&high, &mut diags)
            .dependent_care
            .non_refundable;
        // 35% at the bottom of the slide, floor of 20% at the top.
        assert_eq!(low_credit, dollars(1_050));
        assert_eq!(high_credit, dollars(600));
    }

    #[test]
    fn education_mfs_is_ineligible() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::MarriedSeparately);
        input.education = Some(EducationRecord {
            students: vec![EducationStudent {
                qualified_expenses: dollars(4_000),
                aotc_eligible: true,
            }],
        });
        let ctx = context(&input, &rules, dollars(40_000), dollars(3_000), dollars(40_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.education.total(), 0);
        assert!(diags.entries().iter().any(|d| d.code == "EDUCATION_MFS"));
    }

    #[test]
    fn aotc_splits_forty_percent_refundable() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.education = Some(EducationRecord {
            students: vec![EducationStudent {
                qualified_expenses: dollars(4_000),
                aotc_eligible: true,
            }],
        });
        let ctx = context(&input, &rules, dollars(50_000), dollars(4_000), dollars(50_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        // $2,000 + 25% of $2,000 = $2,500 total, $1,000 refundable.
        assert_eq!(credits.education.refundable, dollars(1_000));
        assert_eq!(credits.education.non_refundable, dollars(1_500));
    }

    #[test]
    fn savers_credit_tier_rates() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.retirement_savings = Some(RetirementSavingsRecord {
            primary_contributions: dollars(2_000),
            spouse_contributions: 0,
        });
        let mut diags = Diagnostics::new();
        let low = context(&input, &rules, dollars(20_000), dollars(2_000), dollars(20_000));
        assert_eq!(
            apply_credit_stack(&low, &mut diags).savers.non_refundable,
            dollars(1_000)
        );
        let mid = context(&input, &rules, dollars(24_000), dollars(2_000), dollars(24_000));
        assert_eq!(
            apply_credit_stack(&mid, &mut diags).savers.non_refundable,
            dollars(400)
        );
        let over = context(&input, &rules, dollars(40_000), dollars(2_000), dollars(40_000));
        assert_eq!(
            apply_credit_stack(&over, &mut diags).savers.non_refundable,
            0
        );
    }

    #[test]
    fn adoption_special_needs_gets_full_maximum() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::MarriedJointly);
        input.adoption = Some(AdoptionRecord {
            qualified_expenses: dollars(1_000),
            special_needs: true,
            children: 1,
        });
        let ctx = context(
            &input,
            &rules,
            dollars(100_000),
            dollars(20_000),
            dollars(100_000),
        );
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.adoption.non_refundable, rules.adoption_credit_max);
    }

    #[test]
    fn ptc_interpolates_applicable_percentage() {
        let rules = TaxYearRules::year_2024();
        // Exactly 250% FPL: 4% applicable percentage.
        assert_eq!(applicable_percentage(&rules, 25_000), Rate::from_percent(4));
        // Midway between 200% and 250%: 3%.
        assert_eq!(applicable_percentage(&rules, 22_500), Rate::from_percent(3));
        // Below 150%: zero.
        assert_eq!(applicable_percentage(&rules, 12_000), Rate::ZERO);
        // Above 400%: capped at 8.5%.
        assert_eq!(applicable_percentage(&rules, 55_000), Rate::from_bps(850));
    }

    #[test]
    fn ptc_credit_capped_by_premiums_paid() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.marketplace = Some(MarketplaceRecord {
            annual_premiums: dollars(4_000),
            slcsp_premium: dollars(7_000),
            household_income: dollars(30_000),
            fpl_ratio_bps: 20_000,
        });
        let ctx = context(&input, &rules, dollars(30_000), dollars(1_000), dollars(30_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        // Expected contribution 2% of $30,000 = $600; benchmark gap is
        // $6,400 but only $4,000 of premiums were paid.
        assert_eq!(credits.premium_tax.refundable, dollars(4_000));
    }

    #[test]
    fn advance_payments_reduce_the_refundable_credit() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        input.marketplace = Some(MarketplaceRecord {
            annual_premiums: dollars(4_000),
            slcsp_premium: dollars(7_000),
            household_income: dollars(30_000),
            fpl_ratio_bps: 20_000,
        });

        // Entitlement is $4,000; a fully-advanced credit leaves nothing
        // to pay out at filing.
        input.payments.advance_premium_tax_credit = dollars(4_000);
        let ctx = context(&input, &rules, dollars(30_000), dollars(1_000), dollars(30_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.premium_tax.refundable, 0);
        assert_eq!(advance_premium_repayment(&ctx), 0);

        // A partial advance pays out the remainder.
        input.payments.advance_premium_tax_credit = dollars(1_000);
        let ctx = context(&input, &rules, dollars(30_000), dollars(1_000), dollars(30_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.premium_tax.refundable, dollars(3_000));
        assert_eq!(advance_premium_repayment(&ctx), 0);
    }

    #[test]
    fn advance_beyond_the_entitlement_is_a_repayment() {
        let rules = TaxYearRules::year_2024();
        let mut input = base_input(FilingStatus::Single);
        // 450% FPL on $100,000: the 8.5% expected contribution swamps the
        // benchmark, so the entitlement is zero.
        input.marketplace = Some(MarketplaceRecord {
            annual_premiums: dollars(4_000),
            slcsp_premium: dollars(3_000),
            household_income: dollars(100_000),
            fpl_ratio_bps: 45_000,
        });
        input.payments.advance_premium_tax_credit = dollars(5_000);
        let ctx = context(&input, &rules, dollars(100_000), dollars(14_000), dollars(100_000));
        let mut diags = Diagnostics::new();
        let credits = apply_credit_stack(&ctx, &mut diags);
        assert_eq!(credits.premium_tax.refundable, 0);
        assert_eq!(advance_premium_repayment(&ctx), dollars(5_000));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn non_refundable_credits_never_exceed_liability(
            agi_dollars in 0_i64..400_000,
            tax_dollars in 0_i64..80_000,
            kids in 0_u32..4,
        ) {
            let rules = TaxYearRules::year_2024();
            let mut input = base_input(FilingStatus::Single);
            input.dependents = (0..kids).map(|i| child(2 + i)).collect();
            input.retirement_savings = Some(RetirementSavingsRecord {
                primary_contributions: dollars(2_000),
                spouse_contributions: 0,
            });
            input.dependent_care = Some(DependentCareRecord {
                qualifying_persons: kids,
                expenses_paid: dollars(4_000),
            });
            let ctx = context(
                &input,
                &rules,
                dollars(agi_dollars),
                dollars(tax_dollars),
                dollars(agi_dollars),
            );
            let mut diags = Diagnostics::new();
            let credits = apply_credit_stack(&ctx, &mut diags);
            prop_assert!(credits.total_non_refundable() <= dollars(tax_dollars));
            prop_assert!(credits.total_non_refundable() >= 0);
            prop_assert!(credits.total_refundable() >= 0);
        }
    }
}
