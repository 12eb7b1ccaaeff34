use std::sync::Arc;

use anyhow::{Result, bail};
use tessera_core::impls::ReqwestSession;

mod cli;
mod logging;
mod manifest;
mod ops;
mod sync;

use crate::cli::Command;
use crate::manifest::Manifest;

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("tessera error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    match args.command {
        Command::Sync(sync_args) => {
            let session = Arc::new(ReqwestSession::new()?);
            let summary = sync::run_sync(&sync_args, session).await?;
            // stdout carries only the report; logs are on stderr
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if let Some(error) = &summary.error {
                bail!("sync did not complete: {error}");
            }
        }
        Command::Check { manifest } => {
            let manifest = Manifest::load(&manifest)?;
            for (i, bundle) in manifest.install_order()?.iter().enumerate() {
                println!(
                    "{:>3}. {}@{} depends_on={:?}",
                    i + 1,
                    bundle.name,
                    bundle.version,
                    bundle.depends_on
                );
            }
        }
    }
    Ok(())
}
