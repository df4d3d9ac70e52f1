use serde_json::json;

use super::credits::{CreditContext, advance_premium_repayment, apply_credit_stack};
use super::money::{Rate, add_cents, max0, multiply_cents, range_position_bps, subtract_cents};
use super::rules::{TaxYearRules, bracket_tax, stacked_bracket_tax};
use super::types::{
    AdditionalTaxes, DeductionKind, Diagnostics, FederalCalculation, FederalResult, FilingStatus,
    PaymentBreakdown, Phase, RefundOrOweBreakdown, RefundableCreditsBreakdown, TaxpayerInput,
    TraceRecord,
};

pub fn compute_federal_tax(input: &TaxpayerInput) -> FederalCalculation {
    compute_federal_tax_with_rules(input, &TaxYearRules::year_2024())
}

pub fn compute_federal_tax_traced(input: &TaxpayerInput) -> FederalCalculation {
    compute_federal_tax_with_rules_traced(input, &TaxYearRules::year_2024())
}

pub fn compute_federal_tax_with_rules(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
) -> FederalCalculation {
    run_pipeline(input, rules, None)
}

pub fn compute_federal_tax_with_rules_traced(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
) -> FederalCalculation {
    let mut trace = Vec::new();
    let mut calc = run_pipeline(input, rules, Some(&mut trace));
    calc.result.trace = Some(trace);
    calc
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IncomeTotals {
    pub net_capital: i64,
    /// Qualified dividends plus the positive net long-term gain that
    /// survives short-term netting. Taxed at preferential rates.
    pub preferential_income: i64,
    pub net_investment_income: i64,
    pub total_income_unlimited: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SelfEmploymentTax {
    pub net_earnings: i64,
    pub social_security_portion: i64,
    pub medicare_portion: i64,
    pub total: i64,
    pub deduction: i64,
}

#[derive(Debug, Clone, Copy)]
struct AgiResult {
    total_income: i64,
    agi: i64,
}

#[derive(Debug, Clone, Copy)]
struct DeductionResult {
    kind: DeductionKind,
    forced: bool,
    amount: i64,
    salt_deducted: i64,
    qbi_deduction: i64,
    nol_deduction: i64,
    taxable_income_before_qbi: i64,
    taxable_income: i64,
}

fn run_pipeline(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    mut trace: Option<&mut Vec<TraceRecord>>,
) -> FederalCalculation {
    let mut diags = Diagnostics::new();

    let income = aggregate_income(input);
    push_trace(
        trace.as_deref_mut(),
        "totalIncome",
        "Form 1040 line 9",
        json!({
            "wages": input.income.wages,
            "interest": input.income.interest,
            "ordinaryDividends": input.income.ordinary_dividends,
            "netCapital": income.net_capital,
            "scheduleCNet": input.income.schedule_c_net,
        }),
        income.total_income_unlimited,
    );

    // SE tax runs before AGI is finalized: half of it is an adjustment,
    // even though the tax itself is reported with the additional taxes.
    let se = self_employment_tax(input, rules, &mut diags);
    push_trace(
        trace.as_deref_mut(),
        "selfEmploymentTax",
        "Schedule SE",
        json!({
            "netEarnings": se.net_earnings,
            "socialSecurity": se.social_security_portion,
            "medicare": se.medicare_portion,
        }),
        se.total,
    );

    let agi = adjusted_gross_income(input, rules, &income, &se, &mut diags);
    push_trace(
        trace.as_deref_mut(),
        "agi",
        "Form 1040 line 11",
        json!({ "totalIncome": agi.total_income, "seTaxDeduction": se.deduction }),
        agi.agi,
    );

    let deduction = select_deductions(input, rules, &income, agi.agi, &mut diags);
    push_trace(
        trace.as_deref_mut(),
        "taxableIncome",
        "Form 1040 line 15",
        json!({
            "deductionKind": deduction.kind,
            "deductionAmount": deduction.amount,
            "qbiDeduction": deduction.qbi_deduction,
            "nolDeduction": deduction.nol_deduction,
        }),
        deduction.taxable_income,
    );

    let (ordinary_tax, preferential_tax) =
        regular_tax(input, rules, &income, deduction.taxable_income);
    let tax_before_credits = add_cents(ordinary_tax, preferential_tax);
    push_trace(
        trace.as_deref_mut(),
        "taxBeforeCredits",
        "Form 1040 line 16",
        json!({ "ordinaryTax": ordinary_tax, "preferentialTax": preferential_tax }),
        tax_before_credits,
    );

    let amt = alternative_minimum_tax(input, rules, &deduction, tax_before_credits, &mut diags);
    push_trace(
        trace.as_deref_mut(),
        "alternativeMinimumTax",
        "Form 6251",
        json!({ "taxableIncome": deduction.taxable_income }),
        amt,
    );

    let additional_medicare = additional_medicare_tax(input, rules, &se);
    let niit = net_investment_income_tax(input, rules, &income, agi.agi, &mut diags);
    push_trace(
        trace.as_deref_mut(),
        "netInvestmentIncomeTax",
        "Form 8960",
        json!({ "netInvestmentIncome": income.net_investment_income }),
        niit,
    );

    let additional_taxes = AdditionalTaxes {
        self_employment: se.total,
        net_investment_income: niit,
        additional_medicare,
        alternative_minimum: amt,
    };

    let earned_income = earned_income_for_credits(input, &se);
    let ctx = CreditContext {
        input,
        rules,
        agi: agi.agi,
        magi: agi.agi,
        taxable_income: deduction.taxable_income,
        tax_before_credits,
        earned_income,
        investment_income: income.net_investment_income,
    };
    let credits = apply_credit_stack(&ctx, &mut diags);
    push_trace(
        trace.as_deref_mut(),
        "credits",
        "Schedule 3 / Schedule 8812",
        json!({
            "nonRefundable": credits.total_non_refundable(),
            "refundable": credits.total_refundable(),
        }),
        credits.total_non_refundable() + credits.total_refundable(),
    );

    // Advance premium credit payments beyond the entitlement come back
    // as a repayment line on top of the tax.
    let premium_tax_repayment = advance_premium_repayment(&ctx);
    if premium_tax_repayment > 0 {
        diags.warn_with_context(
            Phase::Reconciliation,
            "PTC_ADVANCE_REPAYMENT",
            "Advance premium tax credit payments exceed the entitlement and are owed back",
            json!({ "repayment": premium_tax_repayment }),
        );
    }

    let total_tax = max0(
        tax_before_credits + additional_taxes.total() + premium_tax_repayment
            - credits.total_non_refundable(),
    );
    let payments = PaymentBreakdown {
        withholding: input.payments.withholding,
        estimated_payments: input.payments.estimated_payments,
        advance_premium_tax_credit: input.payments.advance_premium_tax_credit,
        total: input.payments.withholding
            + input.payments.estimated_payments
            + input.payments.advance_premium_tax_credit,
    };
    let refundable_credits = RefundableCreditsBreakdown {
        earned_income: credits.earned_income.refundable,
        additional_child_tax: credits.child_tax.refundable,
        education: credits.education.refundable,
        premium_tax: credits.premium_tax.refundable,
        other: credits.foreign_tax.refundable
            + credits.dependent_care.refundable
            + credits.savers.refundable
            + credits.adoption.refundable,
        total: credits.total_refundable(),
    };
    let refund_or_owe = payments.total + refundable_credits.total - total_tax;
    push_trace(
        trace.as_deref_mut(),
        "refundOrOwe",
        "Form 1040 lines 33-37",
        json!({
            "totalTax": total_tax,
            "totalPayments": payments.total,
            "refundableCredits": refundable_credits.total,
            "premiumTaxRepayment": premium_tax_repayment,
        }),
        refund_or_owe,
    );

    let total_payments = payments.total;
    let result = FederalResult {
        total_income: agi.total_income,
        agi: agi.agi,
        deduction_kind: deduction.kind,
        deduction_forced: deduction.forced,
        deduction_amount: deduction.amount,
        qbi_deduction: deduction.qbi_deduction,
        nol_deduction: deduction.nol_deduction,
        taxable_income_before_qbi: deduction.taxable_income_before_qbi,
        taxable_income: deduction.taxable_income,
        ordinary_tax,
        preferential_tax,
        tax_before_credits,
        credits,
        additional_taxes,
        premium_tax_repayment,
        total_tax,
        payments,
        refund_breakdown: RefundOrOweBreakdown {
            total_tax,
            total_payments,
            total_refundable_credits: refundable_credits.total,
            refund_or_owe,
        },
        refundable_credits,
        refund_or_owe,
        trace: None,
    };

    FederalCalculation {
        result,
        diagnostics: diags.into_entries(),
    }
}

fn push_trace(
    trace: Option<&mut Vec<TraceRecord>>,
    step: &str,
    form_reference: &str,
    inputs: serde_json::Value,
    result: i64,
) {
    if let Some(rows) = trace {
        rows.push(TraceRecord {
            step: step.to_string(),
            form_reference: form_reference.to_string(),
            inputs,
            result,
        });
    }
}

pub(crate) fn aggregate_income(input: &TaxpayerInput) -> IncomeTotals {
    let inc = &input.income;
    let net_capital = inc.capital_gain_short + inc.capital_gain_long;

    // Short-term losses eat into the long-term gain before anything is
    // taxed preferentially; a long-term loss leaves nothing preferential.
    let net_long_after_netting = if inc.capital_gain_long <= 0 {
        0
    } else if inc.capital_gain_short < 0 {
        max0(inc.capital_gain_long + inc.capital_gain_short)
    } else {
        inc.capital_gain_long
    };
    let preferential_income = inc.qualified_dividends + net_long_after_netting;

    let k1_total = inc.k1_ordinary_business + inc.k1_passive + inc.k1_portfolio;
    let other_total = inc.royalties + inc.guaranteed_payments + inc.other_income;
    let total_income_unlimited = inc.wages
        + inc.interest
        + inc.ordinary_dividends
        + net_capital
        + inc.schedule_c_net
        + k1_total
        + other_total;

    let net_investment_income = max0(
        inc.interest
            + inc.ordinary_dividends
            + max0(net_capital)
            + inc.k1_passive
            + inc.k1_portfolio
            + inc.royalties,
    );

    IncomeTotals {
        net_capital,
        preferential_income,
        net_investment_income,
        total_income_unlimited,
    }
}

pub(crate) fn self_employment_tax(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    diags: &mut Diagnostics,
) -> SelfEmploymentTax {
    // Guaranteed partner payments are SE income alongside Schedule C; a
    // Schedule C loss offsets them.
    let se_base = max0(input.income.schedule_c_net + input.income.guaranteed_payments);
    let net_earnings = multiply_cents(se_base, rules.se_net_earnings_factor);
    if net_earnings < rules.se_minimum_net_earnings {
        return SelfEmploymentTax::default();
    }

    let ss_base_remaining = max0(rules.social_security_wage_base - input.income.social_security_wages);
    let ss_taxable = net_earnings.min(ss_base_remaining);
    if ss_taxable < net_earnings {
        diags.warn_with_context(
            Phase::Surtaxes,
            "SE_WAGE_BASE_REACHED",
            "Social Security wage base reached; the 12.4% portion is capped",
            json!({ "wageBase": rules.social_security_wage_base }),
        );
    }

    let social_security_portion = multiply_cents(ss_taxable, rules.se_social_security_rate);
    let medicare_portion = multiply_cents(net_earnings, rules.se_medicare_rate);
    let total = add_cents(social_security_portion, medicare_portion);
    let deduction = multiply_cents(total, rules.se_deduction_rate);

    SelfEmploymentTax {
        net_earnings,
        social_security_portion,
        medicare_portion,
        total,
        deduction,
    }
}

fn adjusted_gross_income(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    income: &IncomeTotals,
    se: &SelfEmploymentTax,
    diags: &mut Diagnostics,
) -> AgiResult {
    let adj = &input.adjustments;

    // The aggregator sums signed capital amounts untouched; the statutory
    // loss limit is applied here when total income is assembled.
    let loss_limit = rules.capital_loss_limit_for(input.filing_status);
    let capital_adjustment = if income.net_capital < -loss_limit {
        let disallowed = -income.net_capital - loss_limit;
        diags.warn_with_context(
            Phase::Deductions,
            "CAPITAL_LOSS_LIMITED",
            format!(
                "Net capital loss limited to {} cents this year; {} cents carry forward",
                loss_limit, disallowed
            ),
            json!({ "disallowed": disallowed }),
        );
        disallowed
    } else {
        0
    };
    let total_income = income.total_income_unlimited + capital_adjustment;

    let educator_cap_people = if input.filing_status == FilingStatus::MarriedJointly
        && input.spouse.is_some()
    {
        2
    } else {
        1
    };
    let educator = adj
        .educator_expenses
        .min(rules.educator_expense_cap * educator_cap_people);

    let se_health = adj
        .self_employed_health_insurance
        .min(max0(input.income.schedule_c_net - se.deduction));
    if se_health < adj.self_employed_health_insurance {
        diags.warn(
            Phase::Adjustments,
            "SE_HEALTH_LIMITED",
            "Self-employed health insurance deduction limited to net self-employment profit",
        );
    }

    let fixed_adjustments = educator + adj.hsa_contributions + se_health + se.deduction;
    let agi_before_ira = total_income - fixed_adjustments;

    let ira_deduction = if adj.ira_contributions <= 0 {
        0
    } else if adj.covered_by_employer_plan {
        let (start, end) = rules.ira_phase_out(input.filing_status);
        let position = range_position_bps(agi_before_ira, start, end);
        let allowed = adj.ira_contributions
            - multiply_cents(adj.ira_contributions, position);
        if allowed < adj.ira_contributions {
            diags.warn(
                Phase::Adjustments,
                "IRA_DEDUCTION_PHASED",
                "Traditional IRA deduction reduced by the employer-plan phase-out",
            );
        }
        allowed
    } else {
        adj.ira_contributions
    };

    let agi_before_student_loan = agi_before_ira - ira_deduction;
    let student_loan_deduction = if adj.student_loan_interest <= 0 {
        0
    } else if input.filing_status.is_married_separate() {
        diags.warn(
            Phase::Adjustments,
            "STUDENT_LOAN_MFS",
            "Married-filing-separately filers cannot deduct student loan interest",
        );
        0
    } else {
        let capped = adj.student_loan_interest.min(rules.student_loan_interest_cap);
        let (start, end) = rules.student_loan_phase_out(input.filing_status);
        let position = range_position_bps(agi_before_student_loan, start, end);
        let allowed = capped - multiply_cents(capped, position);
        if allowed < capped {
            diags.warn(
                Phase::Adjustments,
                "STUDENT_LOAN_PHASED",
                "Student loan interest deduction reduced by the MAGI phase-out",
            );
        }
        allowed
    };

    AgiResult {
        total_income,
        agi: agi_before_student_loan - student_loan_deduction,
    }
}

fn standard_deduction(input: &TaxpayerInput, rules: &TaxYearRules) -> i64 {
    let mut addons = 0_i64;
    if input.primary.age >= 65 {
        addons += 1;
    }
    if input.primary.blind {
        addons += 1;
    }
    if let Some(spouse) = &input.spouse {
        if input.filing_status == FilingStatus::MarriedJointly {
            if spouse.age >= 65 {
                addons += 1;
            }
            if spouse.blind {
                addons += 1;
            }
        }
    }
    rules.standard_deduction(input.filing_status) + addons * rules.standard_addon(input.filing_status)
}

fn itemized_deduction(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    agi: i64,
    diags: &mut Diagnostics,
) -> (i64, i64) {
    let item = &input.itemized;
    let salt_paid = item.salt_paid();
    let salt_cap = rules.salt_cap_for(input.filing_status);
    let salt = salt_paid.min(salt_cap);
    if salt_paid > salt_cap {
        diags.warn_with_context(
            Phase::Deductions,
            "SALT_CAPPED",
            "State and local taxes paid exceed the deduction cap",
            json!({ "paid": salt_paid, "cap": salt_cap }),
        );
    }

    let medical_floor = multiply_cents(max0(agi), rules.medical_agi_floor);
    let medical = max0(item.medical_expenses - medical_floor);

    let total = salt + medical + item.mortgage_interest + item.charitable_contributions;
    (total, salt)
}

fn select_deductions(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    income: &IncomeTotals,
    agi: i64,
    diags: &mut Diagnostics,
) -> DeductionResult {
    let standard = standard_deduction(input, rules);
    let (itemized, salt_deducted) = itemized_deduction(input, rules, agi, diags);

    let (kind, amount, forced) = if input.force_itemized {
        if itemized < standard {
            diags.warn(
                Phase::Deductions,
                "ITEMIZED_FORCED_SMALLER",
                "Itemizing was forced although the standard deduction is larger",
            );
        }
        (DeductionKind::Itemized, itemized, true)
    } else if itemized > standard {
        (DeductionKind::Itemized, itemized, false)
    } else {
        (DeductionKind::Standard, standard, false)
    };

    let taxable_income_before_qbi = max0(agi - amount);
    let qbi = qbi_deduction(
        input,
        rules,
        taxable_income_before_qbi,
        income.preferential_income,
        diags,
    );

    let nol = input
        .nol_carryforward
        .min(max0(taxable_income_before_qbi - qbi));
    let taxable_income = max0(taxable_income_before_qbi - qbi - nol);

    DeductionResult {
        kind,
        forced,
        amount,
        salt_deducted: if kind == DeductionKind::Itemized {
            salt_deducted
        } else {
            0
        },
        qbi_deduction: qbi,
        nol_deduction: nol,
        taxable_income_before_qbi,
        taxable_income,
    }
}

/// Three-regime QBI policy: flat 20% below the threshold, blended
/// wage/UBIA limitation through the phase-in range (with pro-rata SSTB
/// disallowance), full limitation and total SSTB disallowance above it.
fn qbi_deduction(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    taxable_income_before_qbi: i64,
    preferential_income: i64,
    diags: &mut Diagnostics,
) -> i64 {
    if input.qbi.businesses.is_empty() && input.qbi.reit_ptp_dividends <= 0 {
        return 0;
    }

    let (threshold, range) = rules.qbi_threshold_for(input.filing_status);
    let position = range_position_bps(taxable_income_before_qbi, threshold, threshold + range);
    let sstb_share = Rate::from_bps(10_000 - position.bps());

    let mut aggregate = 0_i64;
    for business in &input.qbi.businesses {
        let qbi = business.qualified_business_income;
        if qbi <= 0 {
            // Losses pass through unlimited and reduce the aggregate.
            aggregate += multiply_cents(qbi, rules.qbi_rate);
            continue;
        }

        if business.is_sstb && position.bps() >= 10_000 {
            diags.warn(
                Phase::Deductions,
                "QBI_SSTB_DISALLOWED",
                "SSTB income fully disallowed above the QBI phase-in range",
            );
            continue;
        }

        let (eff_qbi, eff_wages, eff_ubia) = if business.is_sstb {
            (
                multiply_cents(qbi, sstb_share),
                multiply_cents(business.w2_wages, sstb_share),
                multiply_cents(business.ubia, sstb_share),
            )
        } else {
            (qbi, business.w2_wages, business.ubia)
        };

        let tentative = multiply_cents(eff_qbi, rules.qbi_rate);
        let wage_limit = multiply_cents(eff_wages, rules.qbi_wage_rate).max(
            multiply_cents(eff_wages, rules.qbi_wage_ubia_wage_rate)
                + multiply_cents(eff_ubia, rules.qbi_ubia_rate),
        );

        let component = if position.bps() == 0 {
            tentative
        } else if position.bps() >= 10_000 {
            tentative.min(wage_limit)
        } else {
            // Phase-in blend: only the phased-in share of the excess over
            // the wage/UBIA limit is lost.
            let excess = max0(tentative - wage_limit);
            tentative - multiply_cents(excess, position)
        };
        aggregate += component;
    }

    aggregate += multiply_cents(max0(input.qbi.reit_ptp_dividends), rules.qbi_rate);

    if aggregate < 0 {
        diags.warn(
            Phase::Deductions,
            "QBI_NET_LOSS",
            "Aggregate qualified business income is a loss; no deduction this year",
        );
        return 0;
    }

    let overall_cap = multiply_cents(
        max0(taxable_income_before_qbi - preferential_income),
        rules.qbi_rate,
    );
    if aggregate > overall_cap {
        diags.warn(
            Phase::Deductions,
            "QBI_OVERALL_CAP",
            "QBI deduction limited to 20% of taxable income less net capital gains",
        );
    }
    aggregate.min(overall_cap)
}

/// Ordinary bracket stacking plus the statutory preferential-rate
/// stacking rule: the 0/15/20 thresholds are evaluated against cumulative
/// income, so ordinary income can fill or overflow a preferential bracket.
fn regular_tax(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    income: &IncomeTotals,
    taxable_income: i64,
) -> (i64, i64) {
    let preferential_part = max0(income.preferential_income).min(taxable_income);
    let ordinary_part = taxable_income - preferential_part;

    let ordinary_tax = bracket_tax(ordinary_part, rules.ordinary_brackets(input.filing_status));
    let preferential_tax = stacked_bracket_tax(
        ordinary_part,
        preferential_part,
        rules.preferential_brackets(input.filing_status),
    );
    (ordinary_tax, preferential_tax)
}

fn alternative_minimum_tax(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    deduction: &DeductionResult,
    regular_tax_for_comparison: i64,
    diags: &mut Diagnostics,
) -> i64 {
    // AMTI: start from taxable income and add back the deductions AMT
    // does not allow, plus the caller-reported preference items.
    let deduction_addback = match deduction.kind {
        DeductionKind::Standard => deduction.amount,
        DeductionKind::Itemized => deduction.salt_deducted,
    };
    let amti = deduction.taxable_income
        + deduction_addback
        + input.adjustments.amt_preference_items;

    let exemption_base = rules.amt_exemption(input.filing_status);
    let phase_out_start = rules.amt_phase_out_start(input.filing_status);
    let exemption = max0(
        exemption_base - multiply_cents(max0(amti - phase_out_start), rules.amt_phase_out_rate),
    );

    let amt_base = max0(amti - exemption);
    let tentative_minimum_tax = bracket_tax(amt_base, rules.amt_bracket_schedule(input.filing_status));

    let mut amt = max0(tentative_minimum_tax - regular_tax_for_comparison);
    if amt > 0 && input.prior_year_minimum_tax_credit > 0 {
        let used = amt.min(input.prior_year_minimum_tax_credit);
        amt -= used;
    }
    if amt > 0 {
        diags.warn_with_context(
            Phase::TaxComputation,
            "AMT_APPLIES",
            "Tentative minimum tax exceeds regular tax; AMT owed",
            json!({ "tentativeMinimumTax": tentative_minimum_tax }),
        );
    }
    amt
}

fn additional_medicare_tax(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    se: &SelfEmploymentTax,
) -> i64 {
    let medicare_base = input.income.wages + se.net_earnings;
    let threshold = rules.additional_medicare_threshold(input.filing_status);
    multiply_cents(max0(medicare_base - threshold), rules.additional_medicare_rate)
}

fn net_investment_income_tax(
    input: &TaxpayerInput,
    rules: &TaxYearRules,
    income: &IncomeTotals,
    magi: i64,
    diags: &mut Diagnostics,
) -> i64 {
    let threshold = rules.niit_threshold(input.filing_status);
    let excess_magi = max0(magi - threshold);
    let base = income.net_investment_income.min(excess_magi);
    let tax = multiply_cents(base, rules.niit_rate);
    if tax > 0 {
        diags.warn(
            Phase::Surtaxes,
            "NIIT_APPLIES",
            "Net investment income tax applies above the MAGI threshold",
        );
    }
    tax
}

/// Earned income for EITC/ACTC purposes: wages plus net SE earnings less
/// the half-SE-tax adjustment.
pub(crate) fn earned_income_for_credits(input: &TaxpayerInput, se: &SelfEmploymentTax) -> i64 {
    max0(input.income.wages + subtract_cents(se.net_earnings, se.deduction))
}
