//! Randomised checks of the filter and exposure invariants.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use riskblocs_analytics::{FilterCriteria, NumericRange, cap_balances, concentrations};
use riskblocs_types::{ExposureDimension, LoanField, LoanRecord};
use rust_decimal::Decimal;

const REGIONS: [&str; 4] = ["North", "South", "East", "West"];

fn random_pool(rng: &mut StdRng, n: usize) -> Vec<LoanRecord> {
    (0..n)
        .map(|i| {
            let mut loan = LoanRecord::dummy(
                &format!("L{i}"),
                rng.gen_range(1_000..500_000),
                rng.gen_range(50..900),
            )
            .with_region(REGIONS[rng.gen_range(0..REGIONS.len())]);
            if rng.gen_bool(0.8) {
                loan.ltv = Some(Decimal::new(rng.gen_range(100..1_200), 1));
            }
            if rng.gen_bool(0.3) {
                loan.remaining_term_months = None;
            }
            loan
        })
        .collect()
}

fn random_range(rng: &mut StdRng, lo: i64, hi: i64) -> NumericRange {
    let a = rng.gen_range(lo..hi);
    let b = rng.gen_range(lo..hi);
    let (min, max) = (a.min(b), a.max(b));
    NumericRange::new(
        rng.gen_bool(0.7).then(|| Decimal::from(min)),
        rng.gen_bool(0.7).then(|| Decimal::from(max)),
    )
}

fn in_range(range: &NumericRange, value: Option<Decimal>) -> bool {
    if !range.is_active() {
        return true;
    }
    let Some(v) = value else { return false };
    range.min.is_none_or(|m| m <= v) && range.max.is_none_or(|m| v <= m)
}

#[test]
fn filter_is_exact_conjunction() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let pool = random_pool(&mut rng, 60);
        let balance = random_range(&mut rng, 0, 500_000);
        let ltv = random_range(&mut rng, 10, 120);
        let term = random_range(&mut rng, 0, 200);
        let regions: Vec<&str> = REGIONS.iter().copied().filter(|_| rng.gen_bool(0.5)).collect();

        let criteria = FilterCriteria::new()
            .with_range(LoanField::CurrentBalance, balance)
            .and_then(|c| c.with_range(LoanField::Ltv, ltv))
            .and_then(|c| c.with_range(LoanField::RemainingTerm, term))
            .unwrap()
            .with_regions(regions.iter());

        let expected: Vec<&str> = pool
            .iter()
            .filter(|l| {
                in_range(&balance, Some(l.current_balance))
                    && in_range(&ltv, l.ltv)
                    && in_range(&term, l.remaining_term_months.map(Decimal::from))
                    && (regions.is_empty()
                        || regions.iter().any(|r| l.region.as_deref() == Some(*r)))
            })
            .map(|l| l.loan_id.as_str())
            .collect();

        let got = criteria.apply(&pool);
        let got: Vec<&str> = got.iter().map(|l| l.loan_id.as_str()).collect();
        assert_eq!(got, expected);
    }
}

#[test]
fn filters_compose_by_intersection() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let pool = random_pool(&mut rng, 40);
        let by_balance = FilterCriteria::new()
            .with_range(LoanField::CurrentBalance, random_range(&mut rng, 0, 500_000))
            .unwrap();
        let by_rate = FilterCriteria::new()
            .with_range(LoanField::InterestRate, random_range(&mut rng, 0, 10))
            .unwrap();

        let mut both = by_balance.clone();
        both.interest_rate = by_rate.interest_rate;

        let sequential = by_rate.apply(&by_balance.apply(&pool));
        assert_eq!(both.apply(&pool), sequential);
    }
}

#[test]
fn cap_never_raises_a_balance_and_bounds_concentration() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let pool = random_pool(&mut rng, 30);
        let cap = Decimal::from(rng.gen_range(1_000..300_000));
        let capped = cap_balances(&pool, cap).unwrap();
        for (before, after) in pool.iter().zip(&capped) {
            assert!(after.current_balance <= before.current_balance);
            assert!(after.current_balance <= cap);
            assert_eq!(after.loan_id, before.loan_id);
        }
        let rows = concentrations(&capped, ExposureDimension::Borrower);
        assert_eq!(rows.len(), pool.len());
    }
}
