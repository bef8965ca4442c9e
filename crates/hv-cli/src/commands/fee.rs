use anyhow::Result;
use hv_types::{Amount, FeePolicy};

use crate::output;

pub fn run(note_amount: &str, amount: &str, divisor: u64, minimum: u64) -> Result<()> {
    let policy = FeePolicy::new(divisor, minimum);
    let note_amount = Amount::parse_decimal(note_amount)?;
    let amount = Amount::parse_decimal(amount)?;
    let preview = preview(&policy, note_amount.units, amount.units);

    if output::is_json() {
        output::json_output(serde_json::json!({
            "fee": Amount::new(preview.fee),
            "change": preview.change.map(Amount::new),
            "max_withdrawal": Amount::new(preview.max_withdrawal),
        }))?;
        return Ok(());
    }

    output::label("fee", &Amount::new(preview.fee).display);
    output::label("max withdrawal", &Amount::new(preview.max_withdrawal).display);
    match preview.change {
        Some(change) => output::label("change", &Amount::new(change).display),
        None => output::warn(&format!(
            "note too small: at most {} can be withdrawn",
            Amount::new(preview.max_withdrawal).display
        )),
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct Preview {
    fee: u64,
    change: Option<u64>,
    max_withdrawal: u64,
}

fn preview(policy: &FeePolicy, note_amount: u64, amount: u64) -> Preview {
    let fee = policy.fee(amount);
    Preview {
        fee,
        change: note_amount
            .checked_sub(amount)
            .and_then(|rest| rest.checked_sub(fee)),
        max_withdrawal: note_amount.saturating_sub(policy.fee(note_amount)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_fee_preview() {
        let policy = FeePolicy::new(0, 15_300);
        assert_eq!(
            preview(&policy, 600_000, 500_000),
            Preview {
                fee: 15_300,
                change: Some(84_700),
                max_withdrawal: 584_700
            }
        );
        assert_eq!(preview(&policy, 600_000, 590_000).change, None);
    }
}
