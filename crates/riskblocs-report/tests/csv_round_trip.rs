//! Export/import fidelity for hostile text values.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use riskblocs_report::{LOAN_EXPORT_HEADERS, export_loans, import_loans};
use riskblocs_types::LoanRecord;
use rust_decimal::Decimal;

const ALPHABET: &[char] = &['a', 'Z', '7', ' ', ',', '"', '\n', '\r', ';', '\'', 'é', '€'];

fn awkward_text(rng: &mut StdRng) -> String {
    let len = rng.gen_range(1..12);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

fn random_loan(rng: &mut StdRng, i: usize) -> LoanRecord {
    let mut loan = LoanRecord::dummy(
        &format!("{i}-{}", awkward_text(rng)),
        rng.gen_range(1..2_000_000),
        rng.gen_range(1..1_500),
    );
    loan.borrower_id = rng.gen_bool(0.5).then(|| awkward_text(rng));
    loan.region = rng.gen_bool(0.8).then(|| awkward_text(rng));
    loan.asset_class = rng.gen_bool(0.8).then(|| awkward_text(rng));
    loan.ltv = rng
        .gen_bool(0.5)
        .then(|| Decimal::new(rng.gen_range(0..15_000), 2));
    loan.remaining_term_months = rng.gen_bool(0.7).then(|| rng.gen_range(1..480));
    loan
}

#[test]
fn hostile_text_round_trips() {
    let mut rng = StdRng::seed_from_u64(4180);
    for _ in 0..50 {
        let n = rng.gen_range(0..40);
        let loans: Vec<LoanRecord> = (0..n).map(|i| random_loan(&mut rng, i)).collect();

        let text = export_loans(&loans).unwrap();
        assert!(text.starts_with(&LOAN_EXPORT_HEADERS.join(",")));

        let mut reader = csv::ReaderBuilder::new().from_reader(text.as_bytes());
        assert_eq!(reader.records().count(), n, "one record per loan");

        assert_eq!(import_loans(&text).unwrap(), loans);
    }
}

#[test]
fn export_of_nothing_is_header_only() {
    let text = export_loans(&[]).unwrap();
    assert_eq!(text, format!("{}\r\n", LOAN_EXPORT_HEADERS.join(",")));
    assert!(import_loans(&text).unwrap().is_empty());
}
