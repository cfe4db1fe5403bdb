use anyhow::Context;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

use seiva_adapters::AdapterResolver;
use seiva_config::SeivaConfig;

use crate::cli::DocumentArgs;

pub async fn handle(args: DocumentArgs, config: &SeivaConfig) -> anyhow::Result<()> {
    let institutions = config
        .institution_configs()
        .context("invalid institution configuration")?;
    let institution = institutions
        .into_iter()
        .find(|i| i.id == args.institution)
        .with_context(|| format!("unknown institution id: {}", args.institution))?;

    let registry = crate::commands::build_registry(config);
    let adapter = registry.resolve(&institution.version)?;
    let sessions = crate::commands::session_manager(config);

    let session = sessions.acquire(adapter.clone(), &institution).await?;
    let content = adapter
        .fetch_document_content(&session, &args.content_ref)
        .await?;

    if let Some(path) = &args.output {
        let mut file = tokio::fs::File::create(path)
            .await
            .with_context(|| format!("cannot create {}", path.display()))?;
        let mut stream = content.into_stream();
        let mut written = 0_u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        info!(path = %path.display(), bytes = written, "document written");
    } else {
        let bytes = content.collect().await?;
        tokio::io::stdout().write_all(&bytes).await?;
    }

    sessions.logout_all().await;
    Ok(())
}
