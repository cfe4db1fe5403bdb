use anyhow::Context;

use seiva_adapters::registry::supported_minors;
use seiva_config::SeivaConfig;

/// Validate the loaded configuration: institution entries convert cleanly,
/// declared versions have adapters, and each password env var is set.
pub fn handle(config: &SeivaConfig) -> anyhow::Result<()> {
    let institutions = config
        .institution_configs()
        .context("invalid institution configuration")?;

    if institutions.is_empty() {
        println!("no institutions configured");
        return Ok(());
    }

    let mut problems = 0_u32;
    for (institution, entry) in institutions.iter().zip(&config.institutions) {
        let version_ok = supported_minors(institution.version.family)
            .contains(&institution.version.minor);
        let password_ok = std::env::var(&entry.password_env).is_ok_and(|v| !v.is_empty());

        let mut notes = Vec::new();
        if !version_ok {
            notes.push(format!("unsupported version {}", institution.version));
        }
        if !password_ok {
            notes.push(format!("{} is not set", entry.password_env));
        }
        problems += u32::try_from(notes.len()).unwrap_or(u32::MAX);

        let status = if notes.is_empty() {
            "ok".to_string()
        } else {
            notes.join("; ")
        };
        println!(
            "{:<12} {:<8} {:<40} {}",
            institution.id, institution.version, institution.base_url, status
        );
    }

    if problems > 0 {
        anyhow::bail!("configuration has {problems} problem(s)");
    }
    println!("{} institution(s) configured", institutions.len());
    Ok(())
}
