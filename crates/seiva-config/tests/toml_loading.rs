//! Prove a project-local `.seiva/config.toml` flows through figment.

use figment::Jail;
use seiva_config::SeivaConfig;
use seiva_core::VersionFamily;

#[test]
fn project_toml_populates_sections_and_institutions() {
    Jail::expect_with(|jail| {
        jail.create_dir(".seiva")?;
        jail.create_file(
            ".seiva/config.toml",
            r#"
            [http]
            timeout_secs = 10
            user_agent = "seiva-test/0.0"

            [orchestrator]
            max_concurrent_jobs = 2
            max_pages = 5

            [[institutions]]
            id = "trf1"
            name = "TRF1"
            base_url = "https://sei.trf1.jus.br"
            version = "4.2"
            account = "svc"
            password_env = "SEIVA_TRF1_PASSWORD"

            [[institutions]]
            id = "ufmg"
            base_url = "https://sei.ufmg.br"
            version = "2.6"
            account = "robo"
            password_env = "SEIVA_UFMG_PASSWORD"
            "#,
        )?;

        let config: SeivaConfig = SeivaConfig::figment().extract()?;
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.orchestrator.max_concurrent_jobs, 2);
        assert_eq!(config.orchestrator.max_pages, 5);
        // untouched section keeps its default
        assert_eq!(config.session.ttl_minutes, 25);

        let institutions = config.institution_configs().expect("valid entries");
        assert_eq!(institutions.len(), 2);
        assert_eq!(institutions[0].version.family, VersionFamily::V4);
        assert_eq!(institutions[1].version.family, VersionFamily::V2);
        assert_eq!(institutions[1].name, "ufmg");
        Ok(())
    });
}

#[test]
fn duplicate_institution_ids_are_rejected() {
    Jail::expect_with(|jail| {
        jail.create_dir(".seiva")?;
        jail.create_file(
            ".seiva/config.toml",
            r#"
            [[institutions]]
            id = "trf1"
            base_url = "https://a"
            version = "4.0"
            account = "x"
            password_env = "A"

            [[institutions]]
            id = "trf1"
            base_url = "https://b"
            version = "4.1"
            account = "y"
            password_env = "B"
            "#,
        )?;

        let config: SeivaConfig = SeivaConfig::figment().extract()?;
        let err = config.institution_configs().unwrap_err();
        assert!(err.to_string().contains("duplicate institution id"));
        Ok(())
    });
}
