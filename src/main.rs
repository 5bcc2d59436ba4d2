//! eav-patch: validate, inspect and dry-run attribute patch manifests.
//!
//! Usage:
//!   eav-patch validate demos/my_attribute.yaml
//!   eav-patch settings demos/my_attribute.yaml
//!   eav-patch plan demos/color_options.yaml --format json
//!   eav-patch plan demos/my_attribute.yaml --revert
//!
//! Log filter comes from EAV_PATCH_LOG (default: info). A `.env` file is
//! honoured.

mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use eav_patch_core::memory::InMemoryEav;
use eav_patch_core::{validate, DataPatch, EavPorts, PatchManifest, RevertablePatch};

use crate::report::PlanReport;

#[derive(Parser)]
#[command(name = "eav-patch")]
#[command(about = "Declarative EAV attribute patches")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a manifest without touching any engine
    Validate {
        /// Patch manifest (YAML)
        manifest: PathBuf,
    },

    /// Print the property map sent to the schema engine
    Settings {
        manifest: PathBuf,
    },

    /// Apply the patch to a fresh in-memory engine and report the result
    Plan {
        manifest: PathBuf,

        /// Revert after applying
        #[arg(long)]
        revert: bool,

        /// Output format: text, json
        #[arg(long, default_value = "text", env = "EAV_PATCH_FORMAT")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("EAV_PATCH_LOG")
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let output = run(cli.command).await?;
    print!("{output}");
    Ok(())
}

async fn run(command: Command) -> Result<String> {
    match command {
        Command::Validate { manifest } => {
            let manifest = load(&manifest)?;
            check(&manifest)?;
            Ok(format!(
                "{}: attribute {} is valid\n",
                manifest.patch.name, manifest.attribute.code
            ))
        }
        Command::Settings { manifest } => {
            let manifest = load(&manifest)?;
            let settings = manifest.attribute.to_settings();
            Ok(format!("{}\n", serde_json::to_string_pretty(&settings)?))
        }
        Command::Plan {
            manifest,
            revert,
            format,
        } => {
            let manifest = load(&manifest)?;
            let report = plan(manifest, revert).await?;
            match format.as_str() {
                "json" => Ok(format!("{}\n", serde_json::to_string_pretty(&report)?)),
                "text" => Ok(report.render_text()),
                other => bail!("unknown output format: {other} (expected text or json)"),
            }
        }
    }
}

fn load(path: &Path) -> Result<PatchManifest> {
    PatchManifest::load(path).with_context(|| format!("loading manifest {}", path.display()))
}

/// Static checks: the pre-flight validator plus the option input gate, which
/// the provisioner would otherwise only hit after creating the attribute.
fn check(manifest: &PatchManifest) -> Result<()> {
    let def = &manifest.attribute;
    validate(def).with_context(|| format!("attribute {}", def.code))?;

    if def.has_options() && !def.input_type.accepts_options() {
        bail!(
            "attribute {}: input \"{}\" is not compatible with options",
            def.code,
            def.input_type
        );
    }
    if def.has_options() && def.models.source_model.is_some() {
        bail!(
            "attribute {}: options cannot be declared together with a source model",
            def.code
        );
    }
    Ok(())
}

async fn plan(manifest: PatchManifest, revert: bool) -> Result<PlanReport> {
    let def = &manifest.attribute;
    let mut engine =
        InMemoryEav::new().with_entity_type(&def.entity_type, "Default", &["General"]);
    if let Some(set_name) = def.attribute_set_name.as_deref().filter(|n| *n != "Default") {
        engine = engine.with_attribute_set(&def.entity_type, set_name);
    }
    let eav = Arc::new(engine);

    let fingerprint = def.fingerprint()?;
    let patch = manifest.into_patch(EavPorts::from_engine(eav.clone()));

    tracing::info!(patch = %patch.name(), "planning against in-memory engine");
    let handle = patch
        .apply_attribute()
        .await
        .with_context(|| format!("applying {}", patch.name()))?;

    if revert {
        patch
            .revert()
            .await
            .with_context(|| format!("reverting {}", patch.name()))?;
    }

    let snapshot = eav.snapshot().await;
    Ok(PlanReport::from_snapshot(
        patch.name().to_string(),
        patch.aliases(),
        patch.dependencies(),
        fingerprint,
        handle,
        revert,
        &snapshot,
    ))
}
