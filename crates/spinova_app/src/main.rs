mod cli;
mod effects;
mod logging;
mod session;

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use engine_logging::{engine_info, engine_warn};
use serde_json::Value;
use spinova_core::{parse_batch_input, ErrorKind, FormatRegistry};
use spinova_engine::{build_registry, Controller, JsonPluginStore, SettingsStore, YtDlpExtractor};

use crate::cli::{Cli, Command, PluginAction};
use crate::effects::EffectRunner;
use crate::session::{Outcome, Request};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.verbose, cli.log_file.as_deref());

    let mut settings = SettingsStore::load(&cli.config);
    let registry = load_registry(&cli.config, &cli.plugins, &settings);

    match cli.command {
        Command::Download {
            url,
            format,
            output,
        } => {
            let outcome = download(&settings, registry, format, output, Request::Single(url))?;
            finish(outcome)
        }
        Command::Batch {
            csv,
            format,
            output,
        } => {
            let file = File::open(&csv)
                .with_context(|| format!("Failed to open batch file {}", csv.display()))?;
            let urls = parse_batch_input(file)
                .with_context(|| format!("Failed to read batch file {}", csv.display()))?;
            engine_info!("Loaded {} URLs from {}", urls.len(), csv.display());
            let outcome = download(&settings, registry, format, output, Request::Batch(urls))?;
            finish(outcome)
        }
        Command::Formats => {
            for (name, selector) in registry.all_formats() {
                println!("{name}\t{selector}");
            }
            Ok(())
        }
        Command::Plugins { action } => plugins(action, &registry, &mut settings),
        Command::SetOutput { dir } => {
            settings
                .set("output_dir", Value::String(dir.to_string_lossy().into_owned()))
                .context("Failed to update output directory")?;
            settings.save().context("Failed to save settings")?;
            println!("Output directory set to {}", dir.display());
            Ok(())
        }
        Command::SetFfmpeg { path } => {
            settings
                .set("ffmpeg_path", Value::String(path.to_string_lossy().into_owned()))
                .context("Failed to update ffmpeg path")?;
            settings.save().context("Failed to save settings")?;
            println!("ffmpeg location set to {}", path.display());
            Ok(())
        }
    }
}

fn load_registry(config: &Path, plugin_dir: &Path, settings: &SettingsStore) -> FormatRegistry {
    let config_dir = match config.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let store = JsonPluginStore::new(config_dir.join("plugin_config.json"));
    let enabled: BTreeSet<String> = store
        .load()
        .unwrap_or_else(|| settings.settings().enabled_plugins.iter().cloned().collect());
    let registry = build_registry(plugin_dir, Vec::new(), enabled, Box::new(store));
    for warning in registry.warnings() {
        engine_warn!("{}: {}", ErrorKind::RegistryLoadWarning, warning);
    }
    registry
}

fn download(
    settings: &SettingsStore,
    registry: FormatRegistry,
    format: Option<String>,
    output: Option<PathBuf>,
    request: Request,
) -> Result<Outcome> {
    let format_name = match format {
        Some(name) => {
            if !registry.format_names().contains(&name) {
                bail!("Unknown format {name:?}; see `spinova formats`");
            }
            name
        }
        None => registry
            .format_names()
            .into_iter()
            .next()
            .context("No formats available")?,
    };
    let settings = settings.settings();
    let output_dir = output.unwrap_or_else(|| settings.output_dir.clone());

    let extractor = Arc::new(YtDlpExtractor::locate());
    let controller = Controller::new(extractor, settings.controller_settings())
        .context("Failed to start the download controller")?;
    let runner = EffectRunner::new(controller, registry, output_dir, settings.engine_options());
    println!("Type `c` and Enter to cancel.");
    Ok(session::run(runner, format_name, request))
}

fn finish(outcome: Outcome) -> Result<()> {
    if !outcome.started {
        bail!("{}", outcome.view.status);
    }
    if outcome.failed {
        bail!(
            "Finished with errors ({} succeeded, {} failed)",
            outcome.view.success_count,
            outcome.view.error_count
        );
    }
    Ok(())
}

fn plugins(
    action: PluginAction,
    registry: &FormatRegistry,
    settings: &mut SettingsStore,
) -> Result<()> {
    let known = |name: &str| registry.plugins().iter().any(|plugin| plugin.name == name);
    match action {
        PluginAction::List => {
            if registry.plugins().is_empty() {
                println!("No plugins found.");
            }
            for plugin in registry.plugins() {
                let state = if registry.is_plugin_active(&plugin.name) {
                    "enabled"
                } else {
                    "disabled"
                };
                println!(
                    "{} {} [{}] {} format(s) {}",
                    plugin.name,
                    plugin.version,
                    state,
                    plugin.contributed_formats.len(),
                    plugin.description
                );
            }
            return Ok(());
        }
        PluginAction::Enable { name } => {
            if !known(&name) {
                bail!("No plugin named {name:?}");
            }
            registry
                .set_enabled(&name, true)
                .context("Failed to enable plugin")?;
            println!("Enabled {name}");
        }
        PluginAction::Disable { name } => {
            if !known(&name) {
                bail!("No plugin named {name:?}");
            }
            // An empty enabled set means every plugin is on; spell out the
            // others before dropping this one.
            if registry.enabled_plugins().is_empty() {
                for plugin in registry.plugins().iter().filter(|p| p.name != name) {
                    registry
                        .set_enabled(&plugin.name, true)
                        .context("Failed to update enabled plugins")?;
                }
            }
            registry
                .set_enabled(&name, false)
                .context("Failed to disable plugin")?;
            if registry.enabled_plugins().is_empty() {
                println!("{name} was the only plugin; an empty list keeps all plugins enabled.");
            } else {
                println!("Disabled {name}");
            }
        }
    }
    settings.settings_mut().enabled_plugins = registry.enabled_plugins().into_iter().collect();
    settings.save().context("Failed to save settings")?;
    Ok(())
}
