use serde::Serialize;

use super::money::{Rate, dollars, max0, multiply_cents, subtract_cents};
use super::types::FilingStatus;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    pub lower: i64,
    /// `None` marks the open-ended top bracket.
    pub upper: Option<i64>,
    pub rate: Rate,
}

const fn bracket(lower: i64, upper: i64, rate_bps: i64) -> TaxBracket {
    TaxBracket {
        lower,
        upper: Some(upper),
        rate: Rate::from_bps(rate_bps),
    }
}

const fn top_bracket(lower: i64, rate_bps: i64) -> TaxBracket {
    TaxBracket {
        lower,
        upper: None,
        rate: Rate::from_bps(rate_bps),
    }
}

/// Pure marginal-rate stacking. Assumes the bracket list is sorted,
/// non-overlapping, and gap-free; validating the table is the rules
/// loader's job, not this evaluator's.
pub fn bracket_tax(taxable: i64, brackets: &[TaxBracket]) -> i64 {
    let taxable = max0(taxable);
    let mut tax = 0_i64;
    for b in brackets {
        if taxable <= b.lower {
            break;
        }
        let ceiling = b.upper.unwrap_or(i64::MAX);
        let slice = max0(taxable.min(ceiling) - b.lower);
        tax += multiply_cents(slice, b.rate);
    }
    tax
}

/// Marginal tax on a slice of income stacked on top of income already
/// occupying the lower brackets. The statutory preferential-rate rule:
/// thresholds are evaluated against cumulative income, not in isolation.
pub fn stacked_bracket_tax(base_income: i64, slice: i64, brackets: &[TaxBracket]) -> i64 {
    let base = max0(base_income);
    let top = base + max0(slice);
    subtract_cents(bracket_tax(top, brackets), bracket_tax(base, brackets))
}

#[derive(Clone, Debug)]
pub struct EitcTableRow {
    /// Keyed by qualifying-child count; the last row covers 3+.
    pub phase_in_rate: Rate,
    pub earned_income_amount: i64,
    pub max_credit: i64,
    pub phase_out_rate: Rate,
    pub phase_out_start: i64,
    pub phase_out_start_joint: i64,
}

#[derive(Copy, Clone, Debug)]
pub struct PtcApplicableRow {
    pub fpl_floor_bps: i64,
    pub fpl_ceiling_bps: i64,
    pub rate_at_floor: Rate,
    pub rate_at_ceiling: Rate,
}

#[derive(Copy, Clone, Debug)]
pub struct SaversTier {
    pub agi_ceiling: i64,
    pub rate: Rate,
}

/// Every statutory constant for one tax year. Constructed once per
/// calculation request; the engine never caches one process-wide.
#[derive(Clone, Debug)]
pub struct TaxYearRules {
    pub year: u32,

    pub ordinary_single: Vec<TaxBracket>,
    pub ordinary_joint: Vec<TaxBracket>,
    pub ordinary_separate: Vec<TaxBracket>,
    pub ordinary_head: Vec<TaxBracket>,

    pub preferential_single: Vec<TaxBracket>,
    pub preferential_joint: Vec<TaxBracket>,
    pub preferential_separate: Vec<TaxBracket>,
    pub preferential_head: Vec<TaxBracket>,

    pub amt_brackets: Vec<TaxBracket>,
    pub amt_brackets_separate: Vec<TaxBracket>,
    pub amt_exemption_single: i64,
    pub amt_exemption_joint: i64,
    pub amt_exemption_separate: i64,
    pub amt_exemption_head: i64,
    pub amt_phase_out_start_single: i64,
    pub amt_phase_out_start_joint: i64,
    pub amt_phase_out_start_separate: i64,
    pub amt_phase_out_start_head: i64,
    pub amt_phase_out_rate: Rate,

    pub standard_deduction_single: i64,
    pub standard_deduction_joint: i64,
    pub standard_deduction_separate: i64,
    pub standard_deduction_head: i64,
    pub standard_addon_unmarried: i64,
    pub standard_addon_married: i64,

    pub salt_cap: i64,
    pub salt_cap_separate: i64,
    pub medical_agi_floor: Rate,
    pub capital_loss_limit: i64,
    pub capital_loss_limit_separate: i64,

    pub educator_expense_cap: i64,
    pub student_loan_interest_cap: i64,
    pub student_loan_phase_out_start: i64,
    pub student_loan_phase_out_end: i64,
    pub student_loan_phase_out_start_joint: i64,
    pub student_loan_phase_out_end_joint: i64,
    pub ira_phase_out_start: i64,
    pub ira_phase_out_end: i64,
    pub ira_phase_out_start_joint: i64,
    pub ira_phase_out_end_joint: i64,

    pub qbi_rate: Rate,
    pub qbi_threshold: i64,
    pub qbi_threshold_joint: i64,
    pub qbi_phase_in_range: i64,
    pub qbi_phase_in_range_joint: i64,
    pub qbi_wage_rate: Rate,
    pub qbi_wage_ubia_wage_rate: Rate,
    pub qbi_ubia_rate: Rate,

    pub se_net_earnings_factor: Rate,
    /// No SE tax at all below this level of net earnings.
    pub se_minimum_net_earnings: i64,
    pub se_social_security_rate: Rate,
    pub se_medicare_rate: Rate,
    pub social_security_wage_base: i64,
    pub se_deduction_rate: Rate,

    pub additional_medicare_rate: Rate,
    pub additional_medicare_threshold_single: i64,
    pub additional_medicare_threshold_joint: i64,
    pub additional_medicare_threshold_separate: i64,
    pub niit_rate: Rate,
    pub niit_threshold_single: i64,
    pub niit_threshold_joint: i64,
    pub niit_threshold_separate: i64,

    pub ctc_per_child: i64,
    pub ctc_refundable_cap: i64,
    pub ctc_phase_out_start: i64,
    pub ctc_phase_out_start_joint: i64,
    pub ctc_phase_out_step: i64,
    pub ctc_phase_out_per_step: i64,
    pub actc_earned_income_floor: i64,
    pub actc_phase_in_rate: Rate,

    pub eitc_investment_income_limit: i64,
    pub eitc_table: Vec<EitcTableRow>,

    pub aotc_full_expense_cap: i64,
    pub aotc_partial_expense_cap: i64,
    pub aotc_partial_rate: Rate,
    pub aotc_refundable_rate: Rate,
    pub llc_expense_cap: i64,
    pub llc_rate: Rate,
    pub education_phase_out_start: i64,
    pub education_phase_out_end: i64,
    pub education_phase_out_start_joint: i64,
    pub education_phase_out_end_joint: i64,

    pub savers_contribution_cap: i64,
    pub savers_tiers_single: Vec<SaversTier>,
    pub savers_tiers_joint: Vec<SaversTier>,
    pub savers_tiers_head: Vec<SaversTier>,

    pub dependent_care_expense_cap_one: i64,
    pub dependent_care_expense_cap_many: i64,
    pub dependent_care_top_rate: Rate,
    pub dependent_care_floor_rate: Rate,
    pub dependent_care_agi_step_start: i64,
    pub dependent_care_agi_step: i64,

    pub adoption_credit_max: i64,
    pub adoption_phase_out_start: i64,
    pub adoption_phase_out_end: i64,

    pub ptc_applicable_table: Vec<PtcApplicableRow>,
}

impl TaxYearRules {
    pub fn ordinary_brackets(&self, status: FilingStatus) -> &[TaxBracket] {
        match status {
            FilingStatus::Single => &self.ordinary_single,
            FilingStatus::MarriedJointly => &self.ordinary_joint,
            FilingStatus::MarriedSeparately => &self.ordinary_separate,
            FilingStatus::HeadOfHousehold => &self.ordinary_head,
        }
    }

    pub fn preferential_brackets(&self, status: FilingStatus) -> &[TaxBracket] {
        match status {
            FilingStatus::Single => &self.preferential_single,
            FilingStatus::MarriedJointly => &self.preferential_joint,
            FilingStatus::MarriedSeparately => &self.preferential_separate,
            FilingStatus::HeadOfHousehold => &self.preferential_head,
        }
    }

    pub fn amt_bracket_schedule(&self, status: FilingStatus) -> &[TaxBracket] {
        if status.is_married_separate() {
            &self.amt_brackets_separate
        } else {
            &self.amt_brackets
        }
    }

    pub fn amt_exemption(&self, status: FilingStatus) -> i64 {
        match status {
            FilingStatus::Single => self.amt_exemption_single,
            FilingStatus::MarriedJointly => self.amt_exemption_joint,
            FilingStatus::MarriedSeparately => self.amt_exemption_separate,
            FilingStatus::HeadOfHousehold => self.amt_exemption_head,
        }
    }

    pub fn amt_phase_out_start(&self, status: FilingStatus) -> i64 {
        match status {
            FilingStatus::Single => self.amt_phase_out_start_single,
            FilingStatus::MarriedJointly => self.amt_phase_out_start_joint,
            FilingStatus::MarriedSeparately => self.amt_phase_out_start_separate,
            FilingStatus::HeadOfHousehold => self.amt_phase_out_start_head,
        }
    }

    pub fn standard_deduction(&self, status: FilingStatus) -> i64 {
        match status {
            FilingStatus::Single => self.standard_deduction_single,
            FilingStatus::MarriedJointly => self.standard_deduction_joint,
            FilingStatus::MarriedSeparately => self.standard_deduction_separate,
            FilingStatus::HeadOfHousehold => self.standard_deduction_head,
        }
    }

    pub fn standard_addon(&self, status: FilingStatus) -> i64 {
        match status {
            FilingStatus::MarriedJointly | FilingStatus::MarriedSeparately => {
                self.standard_addon_married
            }
            FilingStatus::Single | FilingStatus::HeadOfHousehold => self.standard_addon_unmarried,
        }
    }

    pub fn salt_cap_for(&self, status: FilingStatus) -> i64 {
        if status.is_married_separate() {
            self.salt_cap_separate
        } else {
            self.salt_cap
        }
    }

    pub fn capital_loss_limit_for(&self, status: FilingStatus) -> i64 {
        if status.is_married_separate() {
            self.capital_loss_limit_separate
        } else {
            self.capital_loss_limit
        }
    }

    pub fn qbi_threshold_for(&self, status: FilingStatus) -> (i64, i64) {
        match status {
            FilingStatus::MarriedJointly => (self.qbi_threshold_joint, self.qbi_phase_in_range_joint),
            _ => (self.qbi_threshold, self.qbi_phase_in_range),
        }
    }

    pub fn additional_medicare_threshold(&self, status: FilingStatus) -> i64 {
        match status {
            FilingStatus::MarriedJointly => self.additional_medicare_threshold_joint,
            FilingStatus::MarriedSeparately => self.additional_medicare_threshold_separate,
            _ => self.additional_medicare_threshold_single,
        }
    }

    pub fn niit_threshold(&self, status: FilingStatus) -> i64 {
        match status {
            FilingStatus::MarriedJointly => self.niit_threshold_joint,
            FilingStatus::MarriedSeparately => self.niit_threshold_separate,
            _ => self.niit_threshold_single,
        }
    }

    pub fn ctc_phase_out_start_for(&self, status: FilingStatus) -> i64 {
        if status == FilingStatus::MarriedJointly {
            self.ctc_phase_out_start_joint
        } else {
            self.ctc_phase_out_start
        }
    }

    pub fn savers_tiers(&self, status: FilingStatus) -> &[SaversTier] {
        match status {
            FilingStatus::MarriedJointly => &self.savers_tiers_joint,
            FilingStatus::HeadOfHousehold => &self.savers_tiers_head,
            _ => &self.savers_tiers_single,
        }
    }

    pub fn education_phase_out(&self, status: FilingStatus) -> (i64, i64) {
        if status == FilingStatus::MarriedJointly {
            (
                self.education_phase_out_start_joint,
                self.education_phase_out_end_joint,
            )
        } else {
            (self.education_phase_out_start, self.education_phase_out_end)
        }
    }

    pub fn student_loan_phase_out(&self, status: FilingStatus) -> (i64, i64) {
        if status == FilingStatus::MarriedJointly {
            (
                self.student_loan_phase_out_start_joint,
                self.student_loan_phase_out_end_joint,
            )
        } else {
            (
                self.student_loan_phase_out_start,
                self.student_loan_phase_out_end,
            )
        }
    }

    pub fn ira_phase_out(&self, status: FilingStatus) -> (i64, i64) {
        if status == FilingStatus::MarriedJointly {
            (self.ira_phase_out_start_joint, self.ira_phase_out_end_joint)
        } else {
            (self.ira_phase_out_start, self.ira_phase_out_end)
        }
    }

    pub fn eitc_row(&self, qualifying_children: usize) -> &EitcTableRow {
        let idx = qualifying_children.min(self.eitc_table.len() - 1);
        &self.eitc_table[idx]
    }

    /// Tax year 2024 statutory tables.
    pub fn year_2024() -> Self {
        TaxYearRules {
            year: 2024,

            ordinary_single: vec![
                bracket(0, dollars(11_600), 1_000),
                bracket(dollars(11_600), dollars(47_150), 1_200),
                bracket(dollars(47_150), dollars(100_525), 2_200),
                bracket(dollars(100_525), dollars(191_950), 2_400),
                bracket(dollars(191_950), dollars(243_725), 3_200),
                bracket(dollars(243_725), dollars(609_350), 3_500),
                top_bracket(dollars(609_350), 3_700),
            ],
            ordinary_joint: vec![
                bracket(0, dollars(23_200), 1_000),
                bracket(dollars(23_200), dollars(94_300), 1_200),
                bracket(dollars(94_300), dollars(201_050), 2_200),
                bracket(dollars(201_050), dollars(383_900), 2_400),
                bracket(dollars(383_900), dollars(487_450), 3_200),
                bracket(dollars(487_450), dollars(731_200), 3_500),
                top_bracket(dollars(731_200), 3_700),
            ],
            ordinary_separate: vec![
                bracket(0, dollars(11_600), 1_000),
                bracket(dollars(11_600), dollars(47_150), 1_200),
                bracket(dollars(47_150), dollars(100_525), 2_200),
                bracket(dollars(100_525), dollars(191_950), 2_400),
                bracket(dollars(191_950), dollars(243_725), 3_200),
                bracket(dollars(243_725), dollars(365_600), 3_500),
                top_bracket(dollars(365_600), 3_700),
            ],
            ordinary_head: vec![
                bracket(0, dollars(16_550), 1_000),
                bracket(dollars(16_550), dollars(63_100), 1_200),
                bracket(dollars(63_100), dollars(100_500), 2_200),
                bracket(dollars(100_500), dollars(191_950), 2_400),
                bracket(dollars(191_950), dollars(243_700), 3_200),
                bracket(dollars(243_700), dollars(609_350), 3_500),
                top_bracket(dollars(609_350), 3_700),
            ],

            preferential_single: vec![
                bracket(0, dollars(47_025), 0),
                bracket(dollars(47_025), dollars(518_900), 1_500),
                top_bracket(dollars(518_900), 2_000),
            ],
            preferential_joint: vec![
                bracket(0, dollars(94_050), 0),
                bracket(dollars(94_050), dollars(583_750), 1_500),
                top_bracket(dollars(583_750), 2_000),
            ],
            preferential_separate: vec![
                bracket(0, dollars(47_025), 0),
                bracket(dollars(47_025), dollars(291_850), 1_500),
                top_bracket(dollars(291_850), 2_000),
            ],
            preferential_head: vec![
                bracket(0, dollars(63_000), 0),
                bracket(dollars(63_000), dollars(551_350), 1_500),
                top_bracket(dollars(551_350), 2_000),
            ],

            amt_brackets: vec![
                bracket(0, dollars(232_600), 2_600),
                top_bracket(dollars(232_600), 2_800),
            ],
            amt_brackets_separate: vec![
                bracket(0, dollars(116_300), 2_600),
                top_bracket(dollars(116_300), 2_800),
            ],
            amt_exemption_single: dollars(85_700),
            amt_exemption_joint: dollars(133_300),
            amt_exemption_separate: dollars(66_650),
            amt_exemption_head: dollars(85_700),
            amt_phase_out_start_single: dollars(609_350),
            amt_phase_out_start_joint: dollars(1_218_700),
            amt_phase_out_start_separate: dollars(609_350),
            amt_phase_out_start_head: dollars(609_350),
            amt_phase_out_rate: Rate::from_percent(25),

            standard_deduction_single: dollars(14_600),
            standard_deduction_joint: dollars(29_200),
            standard_deduction_separate: dollars(14_600),
            standard_deduction_head: dollars(21_900),
            standard_addon_unmarried: dollars(1_950),
            standard_addon_married: dollars(1_550),

            salt_cap: dollars(10_000),
            salt_cap_separate: dollars(5_000),
            medical_agi_floor: Rate::from_bps(750),
            capital_loss_limit: dollars(3_000),
            capital_loss_limit_separate: dollars(1_500),

            educator_expense_cap: dollars(300),
            student_loan_interest_cap: dollars(2_500),
            student_loan_phase_out_start: dollars(80_000),
            student_loan_phase_out_end: dollars(95_000),
            student_loan_phase_out_start_joint: dollars(165_000),
            student_loan_phase_out_end_joint: dollars(195_000),
            ira_phase_out_start: dollars(77_000),
            ira_phase_out_end: dollars(87_000),
            ira_phase_out_start_joint: dollars(123_000),
            ira_phase_out_end_joint: dollars(143_000),

            qbi_rate: Rate::from_percent(20),
            qbi_threshold: dollars(191_950),
            qbi_threshold_joint: dollars(383_900),
            qbi_phase_in_range: dollars(50_000),
            qbi_phase_in_range_joint: dollars(100_000),
            qbi_wage_rate: Rate::from_percent(50),
            qbi_wage_ubia_wage_rate: Rate::from_percent(25),
            qbi_ubia_rate: Rate::from_bps(250),

            se_net_earnings_factor: Rate::from_bps(9_235),
            se_minimum_net_earnings: dollars(400),
            se_social_security_rate: Rate::from_bps(1_240),
            se_medicare_rate: Rate::from_bps(290),
            social_security_wage_base: dollars(168_600),
            se_deduction_rate: Rate::from_percent(50),

            additional_medicare_rate: Rate::from_bps(90),
            additional_medicare_threshold_single: dollars(200_000),
            additional_medicare_threshold_joint: dollars(250_000),
            additional_medicare_threshold_separate: dollars(125_000),
            niit_rate: Rate::from_bps(380),
            niit_threshold_single: dollars(200_000),
            niit_threshold_joint: dollars(250_000),
            niit_threshold_separate: dollars(125_000),

            ctc_per_child: dollars(2_000),
            ctc_refundable_cap: dollars(1_700),
            ctc_phase_out_start: dollars(200_000),
            ctc_phase_out_start_joint: dollars(400_000),
            ctc_phase_out_step: dollars(1_000),
            ctc_phase_out_per_step: dollars(50),
            actc_earned_income_floor: dollars(2_500),
            actc_phase_in_rate: Rate::from_percent(15),

            eitc_investment_income_limit: dollars(11_600),
            eitc_table: vec![
                EitcTableRow {
                    phase_in_rate: Rate::from_bps(765),
                    earned_income_amount: dollars(8_260),
                    max_credit: dollars(632),
                    phase_out_rate: Rate::from_bps(765),
                    phase_out_start: dollars(10_330),
                    phase_out_start_joint: dollars(17_250),
                },
                EitcTableRow {
                    phase_in_rate: Rate::from_percent(34),
                    earned_income_amount: dollars(12_390),
                    max_credit: dollars(4_213),
                    phase_out_rate: Rate::from_bps(1_598),
                    phase_out_start: dollars(22_720),
                    phase_out_start_joint: dollars(29_640),
                },
                EitcTableRow {
                    phase_in_rate: Rate::from_percent(40),
                    earned_income_amount: dollars(17_400),
                    max_credit: dollars(6_960),
                    phase_out_rate: Rate::from_bps(2_106),
                    phase_out_start: dollars(22_720),
                    phase_out_start_joint: dollars(29_640),
                },
                EitcTableRow {
                    phase_in_rate: Rate::from_percent(45),
                    earned_income_amount: dollars(17_400),
                    max_credit: dollars(7_830),
                    phase_out_rate: Rate::from_bps(2_106),
                    phase_out_start: dollars(22_720),
                    phase_out_start_joint: dollars(29_640),
                },
            ],

            aotc_full_expense_cap: dollars(2_000),
            aotc_partial_expense_cap: dollars(2_000),
            aotc_partial_rate: Rate::from_percent(25),
            aotc_refundable_rate: Rate::from_percent(40),
            llc_expense_cap: dollars(10_000),
            llc_rate: Rate::from_percent(20),
            education_phase_out_start: dollars(80_000),
            education_phase_out_end: dollars(90_000),
            education_phase_out_start_joint: dollars(160_000),
            education_phase_out_end_joint: dollars(180_000),

            savers_contribution_cap: dollars(2_000),
            savers_tiers_single: vec![
                SaversTier {
                    agi_ceiling: dollars(23_000),
                    rate: Rate::from_percent(50),
                },
                SaversTier {
                    agi_ceiling: dollars(25_000),
                    rate: Rate::from_percent(20),
                },
                SaversTier {
                    agi_ceiling: dollars(38_250),
                    rate: Rate::from_percent(10),
                },
            ],
            savers_tiers_joint: vec![
                SaversTier {
                    agi_ceiling: dollars(46_000),
                    rate: Rate::from_percent(50),
                },
                SaversTier {
                    agi_ceiling: dollars(50_000),
                    rate: Rate::from_percent(20),
                },
                SaversTier {
                    agi_ceiling: dollars(76_500),
                    rate: Rate::from_percent(10),
                },
            ],
            savers_tiers_head: vec![
                SaversTier {
                    agi_ceiling: dollars(34_500),
                    rate: Rate::from_percent(50),
                },
                SaversTier {
                    agi_ceiling: dollars(37_500),
                    rate: Rate::from_percent(20),
                },
                SaversTier {
                    agi_ceiling: dollars(57_375),
                    rate: Rate::from_percent(10),
                },
            ],

            dependent_care_expense_cap_one: dollars(3_000),
            dependent_care_expense_cap_many: dollars(6_000),
            dependent_care_top_rate: Rate::from_percent(35),
            dependent_care_floor_rate: Rate::from_percent(20),
            dependent_care_agi_step_start: dollars(15_000),
            dependent_care_agi_step: dollars(2_000),

            adoption_credit_max: dollars(16_810),
            adoption_phase_out_start: dollars(252_150),
            adoption_phase_out_end: dollars(292_150),

            ptc_applicable_table: vec![
                PtcApplicableRow {
                    fpl_floor_bps: 0,
                    fpl_ceiling_bps: 15_000,
                    rate_at_floor: Rate::ZERO,
                    rate_at_ceiling: Rate::ZERO,
                },
                PtcApplicableRow {
                    fpl_floor_bps: 15_000,
                    fpl_ceiling_bps: 20_000,
                    rate_at_floor: Rate::ZERO,
                    rate_at_ceiling: Rate::from_percent(2),
                },
                PtcApplicableRow {
                    fpl_floor_bps: 20_000,
                    fpl_ceiling_bps: 25_000,
                    rate_at_floor: Rate::from_percent(2),
                    rate_at_ceiling: Rate::from_percent(4),
                },
                PtcApplicableRow {
                    fpl_floor_bps: 25_000,
                    fpl_ceiling_bps: 30_000,
                    rate_at_floor: Rate::from_percent(4),
                    rate_at_ceiling: Rate::from_percent(6),
                },
                PtcApplicableRow {
                    fpl_floor_bps: 30_000,
                    fpl_ceiling_bps: 40_000,
                    rate_at_floor: Rate::from_percent(6),
                    rate_at_ceiling: Rate::from_bps(850),
                },
                PtcApplicableRow {
                    fpl_floor_bps: 40_000,
                    fpl_ceiling_bps: i64::MAX,
                    rate_at_floor: Rate::from_bps(850),
                    rate_at_ceiling: Rate::from_bps(850),
                },
            ],
        }
    }
}
