use anyhow::Result;
use hv_types::{Amount, Note};

use crate::output;

pub fn inspect(text: &str) -> Result<()> {
    let note = Note::from_text(text).map_err(|e| {
        output::fail_with_hint(&e.to_string(), "a note is the hex string shown after a deposit")
    })?;
    let amount = Amount::new(note.amount);
    let commitment = hex::encode(hv_mimc::commitment(&note));
    let nullifier = hex::encode(hv_mimc::nullifier(&note));

    if output::is_json() {
        output::json_output(serde_json::json!({
            "amount": amount,
            "commitment": commitment,
            "nullifier": nullifier,
        }))?;
    } else {
        output::label("amount", &amount.display);
        output::label("commitment", &commitment);
        output::label("nullifier", &nullifier);
    }
    Ok(())
}

pub fn new(amount: &str) -> Result<()> {
    let amount = Amount::parse_decimal(amount)?;
    let note = Note::generate(amount.units)?;
    let text = note.text();

    if output::is_json() {
        output::json_output(serde_json::json!({
            "amount": amount,
            "note": text,
            "commitment": hex::encode(hv_mimc::commitment(&note)),
        }))?;
    } else {
        output::label("amount", &amount.display);
        output::warn("anyone holding this text can spend the note");
        println!("{text}");
    }
    Ok(())
}
