//! Application bootstrap.
//!
//! Boot order follows the config-before-logging chain the tool needs:
//! read the global flags (first parser pass, errors ignored), merge the
//! config files they name, resolve the effective log level, open the
//! cache and state paths, populate the extension registry, and only then
//! parse the full dynamic command tree and dispatch.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, reload};

use steward_kit::{
    CheckpointManager, DiskCache, DispatchError, ExtensionPoint, ExtensionRegistry, Node, Services,
    UserPaths, settings,
};

use crate::commands;
use crate::plugins;

pub const PROGRAM: &str = "steward";

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

pub fn run() -> ExitCode {
    let filter = init_tracing();
    match execute(filter, std::env::args_os().collect()) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{PROGRAM}: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Installs the subscriber with a placeholder WARN filter; the real level
/// is known only after the config files are merged, so the filter is
/// swapped through the reload handle once settings are in.
fn init_tracing() -> FilterHandle {
    let (filter, handle) = reload::Layer::new(EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    handle
}

fn execute(filter: FilterHandle, argv: Vec<OsString>) -> Result<ExitCode> {
    let globals = base_command()
        .ignore_errors(true)
        .get_matches_from(argv.clone());
    let verbose = globals.get_count("verbose");
    let quiet = globals.get_count("quiet");

    let paths = UserPaths::new(PROGRAM);
    let settings_store = Arc::new(settings::load_settings(&config_files(&paths, &globals)?));

    let level = settings::resolve_log_level(&settings_store, verbose, quiet);
    if let Err(error) = filter.modify(|current| *current = EnvFilter::new(level.to_string())) {
        warn!(%error, "could not adjust log level");
    }

    let cache = Arc::new(DiskCache::new(paths.cache_dir()?));
    let services = Services::new(settings_store, cache);
    let checkpoints = Arc::new(CheckpointManager::new(paths.state_file()?));

    let forced_plugins: Vec<String> = globals
        .get_many::<String>("plugins")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let registry = build_registry(&services, &checkpoints, &paths, &forced_plugins)?;

    let roots = command_roots(&registry, &services);
    let cli = commands::build_cli(base_command(), &roots);
    let matches = match cli.try_get_matches_from(argv) {
        Ok(matches) => matches,
        Err(error) => return Ok(finish_clap_error(error)),
    };

    let Some((name, sub_matches)) = matches.subcommand() else {
        let _ = commands::build_cli(base_command(), &roots).print_help();
        return Ok(ExitCode::SUCCESS);
    };
    let Some(root) = roots.get(name) else {
        anyhow::bail!("no such command: {name}");
    };

    Ok(dispatch_command(name, root, sub_matches))
}

fn dispatch_command(name: &str, root: &Node, matches: &ArgMatches) -> ExitCode {
    let (selectors, raw) = commands::collect_invocation(root, matches);
    let selector_refs: Vec<&str> = selectors.iter().map(String::as_str).collect();
    match root.dispatch(&selector_refs, &raw) {
        Ok(outcome) => {
            commands::render_outcome(&outcome);
            ExitCode::SUCCESS
        }
        Err(DispatchError::Binding(binding)) => {
            eprintln!("{PROGRAM} {name}: {binding}");
            ExitCode::from(2)
        }
        Err(DispatchError::Handler(failure)) => {
            eprintln!("{PROGRAM} {name}: {failure:#}");
            ExitCode::FAILURE
        }
    }
}

/// The default per-user config file plus any `--config-files` extras, in
/// merge order.
fn config_files(paths: &UserPaths, globals: &ArgMatches) -> Result<Vec<PathBuf>> {
    let mut files = vec![paths.default_config_file()?];
    if let Some(extra) = globals.get_many::<String>("config-files") {
        files.extend(extra.map(PathBuf::from));
    }
    Ok(files)
}

/// Declares all extension points and registers the compiled-in
/// extensions: plugins gated by `plugin.<name>.enabled` (or forced from
/// the command line), then the built-in commands. Any registration error
/// here is a packaging bug and aborts startup.
fn build_registry(
    services: &Services,
    checkpoints: &Arc<CheckpointManager>,
    paths: &UserPaths,
    forced_plugins: &[String],
) -> Result<ExtensionRegistry> {
    let mut registry = ExtensionRegistry::new();
    for point in ExtensionPoint::ALL {
        registry.register_extension_point(point)?;
    }

    for plugin in plugins::BUILTIN_PLUGINS {
        let forced = forced_plugins.iter().any(|name| name == plugin.name);
        let enabled = services
            .settings
            .get_bool(&format!("plugin.{}.enabled", plugin.name))
            .unwrap_or(false);
        if forced || enabled {
            (plugin.register)(&mut registry)
                .with_context(|| format!("registering plugin {}", plugin.name))?;
        }
    }

    commands::cron::register(&mut registry, services, checkpoints)?;
    commands::config::register(&mut registry, paths)?;
    commands::serve::register(&mut registry, services)?;
    Ok(registry)
}

/// Instantiates every Command extension into its applet tree.
fn command_roots(registry: &ExtensionRegistry, services: &Services) -> BTreeMap<String, Node> {
    registry
        .get_extensions_for(ExtensionPoint::Command, services)
        .into_iter()
        .filter_map(|(name, extension)| extension.into_applet().map(|node| (name, node)))
        .collect()
}

fn finish_clap_error(error: clap::Error) -> ExitCode {
    use clap::error::ErrorKind;
    let code = match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
        _ => ExitCode::from(2),
    };
    let _ = error.print();
    code
}

fn base_command() -> Command {
    Command::new(PROGRAM)
        .about("Personal automation butler: commands, scheduled tasks and an HTTP API over one extension core")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Raise the log level one step per use"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::Count)
                .global(true)
                .help("Lower the log level one step per use"),
        )
        .arg(
            Arg::new("config-files")
                .long("config-files")
                .action(ArgAction::Append)
                .value_name("PATH")
                .help("Extra config files merged over the defaults, in order"),
        )
        .arg(
            Arg::new("plugins")
                .long("plugins")
                .action(ArgAction::Append)
                .value_name("NAME")
                .help("Load a plugin even if not enabled in settings"),
        )
}
