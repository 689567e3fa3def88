//! Amortization schedule generation.
//!
//! Partitions a total receivable amount into per-installment values and due
//! dates. Amounts are split evenly at 2 decimal places using round-half-to-even;
//! the rounding remainder is absorbed by the final installment so the schedule
//! always sums to the total exactly.

use crate::models::PaymentType;
use chrono::{Months, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};

/// One generated schedule line. Numbers are 1-indexed and contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledInstallment {
    pub number: u32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

/// Generate the installment schedule for a plan.
///
/// Pure over its documented domain: `total_amount > 0` and `count >= 1` are
/// caller-validated preconditions. The anchor is "today" at the call site and
/// is explicit so the date rules stay deterministic.
pub fn generate(
    total_amount: Decimal,
    count: u32,
    payment_type: PaymentType,
    anchor: NaiveDate,
) -> Vec<ScheduledInstallment> {
    let base = (total_amount / Decimal::from(count))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    let last = (total_amount - base * Decimal::from(count - 1))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);

    (1..=count)
        .map(|number| ScheduledInstallment {
            number,
            amount: if number == count { last } else { base },
            due_date: due_date_for(payment_type, anchor, number),
        })
        .collect()
}

/// Due date of installment `number` (1-indexed) under the plan's payment type.
///
/// Mensal and Entrada fall one month after the anchor per installment; Anual
/// steps in whole years; Financiamento starts on the anchor itself. Any other
/// type follows the monthly rule. End-of-month days clamp to the shorter month.
pub fn due_date_for(payment_type: PaymentType, anchor: NaiveDate, number: u32) -> NaiveDate {
    match payment_type {
        PaymentType::Anual => anchor + Months::new(12 * number),
        PaymentType::Financiamento => anchor + Months::new(number - 1),
        _ => anchor + Months::new(number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(dec!(100.00), 3, vec![dec!(33.33), dec!(33.33), dec!(33.34)])]
    #[case(dec!(100.01), 2, vec![dec!(50.00), dec!(50.01)])]
    #[case(dec!(0.05), 2, vec![dec!(0.02), dec!(0.03)])]
    #[case(dec!(10.00), 4, vec![dec!(2.50), dec!(2.50), dec!(2.50), dec!(2.50)])]
    #[case(dec!(100.00), 1, vec![dec!(100.00)])]
    fn amounts_split_with_remainder_on_last(
        #[case] total: Decimal,
        #[case] count: u32,
        #[case] expected: Vec<Decimal>,
    ) {
        let schedule = generate(total, count, PaymentType::Mensal, date(2024, 1, 15));
        let amounts: Vec<Decimal> = schedule.iter().map(|s| s.amount).collect();
        assert_eq!(amounts, expected);
    }

    #[test]
    fn uneven_split_keeps_exact_total() {
        let schedule = generate(dec!(100.00), 7, PaymentType::Mensal, date(2024, 1, 15));
        assert_eq!(schedule[0].amount, dec!(14.29));
        assert_eq!(schedule[6].amount, dec!(14.26));
        let sum: Decimal = schedule.iter().map(|s| s.amount).sum();
        assert_eq!(sum, dec!(100.00));
    }

    #[test]
    fn sum_always_equals_total() {
        let totals = [
            dec!(0.05),
            dec!(1.00),
            dec!(99.99),
            dec!(100.00),
            dec!(123.45),
            dec!(350000.00),
            dec!(1047.31),
        ];
        for total in totals {
            for count in [1u32, 2, 3, 7, 12, 20] {
                let schedule = generate(total, count, PaymentType::Mensal, date(2024, 6, 1));
                let sum: Decimal = schedule.iter().map(|s| s.amount).sum();
                assert_eq!(sum, total, "total {} count {}", total, count);
            }
        }
    }

    #[test]
    fn sequence_numbers_are_contiguous() {
        let schedule = generate(dec!(500.00), 12, PaymentType::Anual, date(2024, 1, 15));
        let numbers: Vec<u32> = schedule.iter().map(|s| s.number).collect();
        assert_eq!(numbers, (1..=12).collect::<Vec<u32>>());
    }

    #[test]
    fn monthly_due_dates_step_from_anchor() {
        let schedule = generate(dec!(300.00), 3, PaymentType::Mensal, date(2024, 1, 15));
        let dates: Vec<NaiveDate> = schedule.iter().map(|s| s.due_date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 2, 15), date(2024, 3, 15), date(2024, 4, 15)]
        );
    }

    #[test]
    fn financing_first_installment_is_due_on_anchor() {
        let schedule = generate(dec!(300.00), 3, PaymentType::Financiamento, date(2024, 1, 15));
        let dates: Vec<NaiveDate> = schedule.iter().map(|s| s.due_date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 15), date(2024, 2, 15), date(2024, 3, 15)]
        );
    }

    #[test]
    fn annual_due_dates_step_in_years() {
        let schedule = generate(dec!(200.00), 2, PaymentType::Anual, date(2024, 1, 15));
        let dates: Vec<NaiveDate> = schedule.iter().map(|s| s.due_date).collect();
        assert_eq!(dates, vec![date(2025, 1, 15), date(2026, 1, 15)]);
    }

    #[rstest]
    #[case(PaymentType::Entrada)]
    #[case(PaymentType::Investimento)]
    #[case(PaymentType::Outros)]
    fn other_types_follow_monthly_rule(#[case] payment_type: PaymentType) {
        assert_eq!(
            due_date_for(payment_type, date(2024, 1, 15), 2),
            date(2024, 3, 15)
        );
    }

    #[test]
    fn single_installment_due_one_month_out() {
        let schedule = generate(dec!(1500.00), 1, PaymentType::Mensal, date(2024, 1, 15));
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].amount, dec!(1500.00));
        assert_eq!(schedule[0].due_date, date(2024, 2, 15));

        let financed = generate(dec!(1500.00), 1, PaymentType::Financiamento, date(2024, 1, 15));
        assert_eq!(financed[0].due_date, date(2024, 1, 15));
    }

    #[test]
    fn month_end_anchors_clamp() {
        let schedule = generate(dec!(300.00), 3, PaymentType::Mensal, date(2024, 1, 31));
        let dates: Vec<NaiveDate> = schedule.iter().map(|s| s.due_date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]
        );
    }
}
