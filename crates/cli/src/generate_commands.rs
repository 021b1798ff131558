use {
    anyhow::Result,
    gqlbus_codegen::{ScaffoldOutcome, emit_server_main},
    tracing::info,
};

use crate::project::ProjectConfig;

/// Generate bindings for every configured client, or only `clients`.
pub async fn generate(
    config_path: Option<&std::path::Path>,
    clients: &[String],
) -> Result<()> {
    let project = ProjectConfig::load(config_path)?;
    let generator = project.generator(clients)?;
    let report = generator.generate().await?;

    for client in &report.clients {
        println!(
            "{}: {} operation(s) -> {} ({} written, {} unchanged)",
            client.service,
            client.operations,
            client.output_dir.display(),
            client.written.len(),
            client.unchanged.len()
        );
        for path in &client.pruned {
            println!("  pruned {}", path.display());
        }
        for path in &client.stale {
            println!("  stale  {} (kept, set `stale = \"prune\"` to remove)", path.display());
        }
    }
    info!(files = report.files_written(), "generation finished");
    Ok(())
}

/// Write the server entrypoint described by the `[server]` section.
pub fn init_server(
    config_path: Option<&std::path::Path>,
    output: Option<std::path::PathBuf>,
) -> Result<()> {
    let project = ProjectConfig::load(config_path)?;
    let mut scaffold = project.scaffold()?;
    if let Some(output) = output {
        scaffold.output = output;
    }
    match emit_server_main(&scaffold)? {
        ScaffoldOutcome::Written => println!("wrote {}", scaffold.output.display()),
        ScaffoldOutcome::Skipped => {
            println!("{} already exists, left untouched", scaffold.output.display());
        },
    }
    Ok(())
}
