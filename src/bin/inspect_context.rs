//! Print the context bundle the engine would hand to the generation backend.
//!
//! Usage: `inspect_context <service> [summary|blast-radius]`

use anyhow::{bail, Context, Result};
use tracing::info;

use slo_context::generation::{render_context, InlinePolicy};
use slo_context::{ContextMode, Settings, SloAdvisor};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let mut args = std::env::args().skip(1);
    let service = args.next().context("usage: inspect_context <service> [summary|blast-radius]")?;
    let mode = match args.next().as_deref() {
        None | Some("summary") => ContextMode::Summary,
        Some("blast-radius") | Some("blast_radius") => ContextMode::BlastRadius,
        Some(other) => bail!("unknown mode '{}', expected summary or blast-radius", other),
    };

    let settings = Settings::from_env()?;
    let advisor = SloAdvisor::from_settings(&settings).await?;

    info!(service = %service, mode = %mode, "composing context");
    let bundle = advisor.composer().compose(&service, mode).await?;

    println!("{}", render_context(&bundle, &InlinePolicy::default()));
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}
