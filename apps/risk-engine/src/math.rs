//! Statistical math utilities over `Decimal` series.

use rust_decimal::Decimal;

/// Convergence tolerance for Newton iteration.
const TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 12); // 1e-12
const TWO: Decimal = Decimal::TWO;

/// Calculate mean of a slice of decimals.
#[must_use]
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().sum();
    Some(sum / Decimal::from(values.len() as u64))
}

/// Calculate sample standard deviation of a slice of decimals.
#[must_use]
pub fn std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }

    let avg = mean(values)?;
    let variance_sum: Decimal = values.iter().map(|v| (*v - avg) * (*v - avg)).sum();
    let variance = variance_sum / Decimal::from((values.len() - 1) as u64);

    sqrt_decimal(variance)
}

/// Approximate square root using Newton's method.
#[must_use]
pub fn sqrt_decimal(value: Decimal) -> Option<Decimal> {
    if value < Decimal::ZERO {
        return None;
    }
    if value == Decimal::ZERO {
        return Some(Decimal::ZERO);
    }

    let mut guess = value / TWO;
    if guess == Decimal::ZERO {
        guess = value;
    }

    for _ in 0..50 {
        let next = (guess + value / guess) / TWO;
        if (next - guess).abs() < TOLERANCE {
            return Some(next);
        }
        guess = next;
    }

    Some(guess)
}

/// Annualization factor for daily observations: sqrt(252).
#[must_use]
pub fn sqrt_252() -> Decimal {
    // 252 trading days; sqrt always converges for positive input.
    sqrt_decimal(Decimal::from(252_u64)).unwrap_or(Decimal::ONE)
}
