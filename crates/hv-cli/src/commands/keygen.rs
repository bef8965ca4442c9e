use std::path::Path;

use anyhow::{Context, Result};
use hv_vault::VaultKeypair;

use crate::output;

pub fn run(out: &Path, force: bool) -> Result<()> {
    if out.exists() && !force {
        return Err(output::fail_with_hint(
            &format!("{} already exists", out.display()),
            "pass --force to replace it; notes sealed to the old key stay readable only with the old secret",
        ));
    }

    let keys = VaultKeypair::generate()?;
    std::fs::write(out, keys.public)
        .with_context(|| format!("writing {}", out.display()))?;
    let secret = keys.secret.to_hex();
    let public = hex::encode(keys.public);

    if output::is_json() {
        output::json_output(serde_json::json!({
            "public_key_path": out.display().to_string(),
            "public_key": public,
            "secret_key": secret.as_str(),
        }))?;
    } else {
        output::success(&format!("public key written to {}", out.display()));
        output::label("public_key", &public);
        output::warn("store the secret below offline; it is not saved anywhere");
        println!("{}", secret.as_str());
    }
    Ok(())
}
