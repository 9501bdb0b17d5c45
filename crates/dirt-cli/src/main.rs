//! Binary entry point: CLI parsing, logging setup, and the three execution
//! modes a `dirt` invocation can take (run, `--stop`, `--shell`) plus the
//! internal child re-exec path (`--__run-child`) the supervisor drives.

mod app_registry;
mod demos;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dirt_core::{Args as CallArgs, KwArgs, ProtocolRegistry, Value};
use dirt_host::{DEFAULT_KILL_TIMEOUT, MockRegistry, Settings, Supervisor, exit_code, stop_pidfile, write_pidfile};
use dirt_rpc::{Edge, EdgeConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_registry::AppRegistry;

/// Internal flag the supervisor uses to re-exec this binary as one app's
/// child process (spec §6 process model note). Hidden from `--help` since
/// it is never meant to be typed by a person.
const RUN_CHILD_FLAG: &str = "--__run-child";

#[derive(Parser, Debug)]
#[command(name = "dirt", about = "Multi-application RPC service host")]
struct Cli {
    #[arg(short = 'c', long, default_value = "dirt.toml")]
    config: PathBuf,

    #[arg(long = "list-apps")]
    list_apps: bool,

    #[arg(long)]
    shell: Option<String>,

    #[arg(long)]
    stop: bool,

    #[arg(long = "__run-child", hide = true)]
    run_child: Option<String>,

    /// Apps to start (run mode) or stop (`--stop` mode). Empty means "every
    /// app in the settings document."
    app_names: Vec<String>,
}

fn install_logging(settings: &Settings) {
    let directive = settings
        .logging
        .as_ref()
        .and_then(|v| v.as_str())
        .unwrap_or("info")
        .to_string();
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(path: &PathBuf) -> dirt_core::Result<Settings> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| dirt_core::DirtError::configuration(format!("failed to read {}: {e}", path.display())))?;
    Settings::from_toml_str(&text)
}

fn build_registries() -> (Arc<ProtocolRegistry>, AppRegistry, MockRegistry) {
    let registry = Arc::new(ProtocolRegistry::new());
    dirt_rpc::native::register(&registry, dirt_core::default_codec());
    let apps = AppRegistry::new();
    demos::register(&apps);
    let mocks = MockRegistry::new();
    demos::register_mocks(&mocks);
    (registry, apps, mocks)
}

fn main() {
    let cli = Cli::parse();

    let settings = match load_settings(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("dirt: {err}");
            std::process::exit(exit_code::ERROR);
        }
    };
    install_logging(&settings);

    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    let code = runtime.block_on(run(cli, settings));
    std::process::exit(code);
}

async fn run(cli: Cli, settings: Settings) -> i32 {
    if cli.list_apps {
        let mut names: Vec<&String> = settings.apps.keys().collect();
        names.sort();
        for name in names {
            println!("{name}");
        }
        return exit_code::NORMAL;
    }

    if let Some(app_name) = &cli.run_child {
        return run_child(app_name, settings).await;
    }

    if cli.stop {
        return run_stop(&cli, &settings).await;
    }

    if let Some(app_name) = &cli.shell {
        return run_shell(app_name, settings).await;
    }

    run_supervisor(&cli, settings).await
}

fn target_names<'a>(cli_names: &'a [String], settings: &'a Settings) -> Vec<String> {
    if cli_names.is_empty() {
        settings.apps.keys().cloned().collect()
    } else {
        cli_names.to_vec()
    }
}

async fn run_supervisor(cli: &Cli, settings: Settings) -> i32 {
    let names = target_names(&cli.app_names, &settings);
    if names.is_empty() {
        error!("no apps named on the command line and none declared in settings");
        return exit_code::ERROR;
    }

    let registry = Arc::new(ProtocolRegistry::new());
    dirt_rpc::native::register(&registry, dirt_core::default_codec());
    let mocks = MockRegistry::new();
    demos::register_mocks(&mocks);

    let supervisor = match Supervisor::new(settings, registry, mocks, RUN_CHILD_FLAG) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!(%err, "failed to initialise supervisor");
            return exit_code::ERROR;
        }
    };

    match supervisor.run_many(&names).await {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "supervisor run failed");
            exit_code::ERROR
        }
    }
}

/// The child side of the re-exec (spec §6): builds this app's own API
/// object, binds a native server if `bind` is configured, and runs until a
/// signal asks it to stop.
async fn run_child(app_name: &str, settings: Settings) -> i32 {
    let (registry, apps, mocks) = build_registries();
    let app_settings = match settings.app(app_name) {
        Ok(app_settings) => app_settings.clone(),
        Err(err) => {
            error!(%err, app = app_name, "unknown app");
            return exit_code::ERROR;
        }
    };

    let pidfile_path = settings.pidfile_path(app_name);
    if let Some(path) = &pidfile_path {
        if let Err(err) = write_pidfile(path, std::process::id()) {
            error!(%err, "failed to write pid file");
            return exit_code::ERROR;
        }
    }

    let supervisor = match Supervisor::new(settings, registry.clone(), mocks, RUN_CHILD_FLAG) {
        Ok(supervisor) => Arc::new(supervisor),
        Err(err) => {
            error!(%err, "failed to initialise supervisor");
            return exit_code::ERROR;
        }
    };

    let api = match apps.build(&app_settings.app_class, supervisor.clone()) {
        Ok(api) => api,
        Err(err) => {
            error!(%err, "failed to build app");
            return exit_code::ERROR;
        }
    };

    let edge = Arc::new(Edge::new(api, EdgeConfig::default()));
    let (shutdown_handle, shutdown_signal) = dirt_core::ShutdownHandle::new();

    let serve = async move {
        match &app_settings.bind {
            Some(bind) => {
                let address = match dirt_core::RemoteAddress::parse(bind) {
                    Ok(address) => address,
                    Err(err) => return Err(err),
                };
                let server = registry.server_for(address.scheme())?;
                server.serve(&address, edge.clone(), shutdown_signal).await
            }
            None => {
                // No bind address: this app only ever answers other apps
                // that address it directly is not possible, but it can
                // still exist purely as a caller of its siblings. Just wait
                // for shutdown.
                let mut shutdown_signal = shutdown_signal;
                shutdown_signal.recv().await;
                Ok(())
            }
        }
    };

    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(err) => {
            error!(%err, "failed to install SIGTERM handler");
            return exit_code::ERROR;
        }
    };

    let code = tokio::select! {
        result = serve => match result {
            Ok(()) => exit_code::NORMAL,
            Err(err) => {
                error!(%err, "app server loop failed");
                exit_code::ERROR
            }
        },
        _ = sigterm.recv() => {
            info!(app = app_name, "received SIGTERM, stopping cleanly");
            shutdown_handle.trigger();
            exit_code::STOPPED_CLEANLY
        }
        _ = tokio::signal::ctrl_c() => {
            info!(app = app_name, "interrupted");
            shutdown_handle.trigger();
            exit_code::INTERRUPTED
        }
    };

    if let Some(path) = &pidfile_path {
        let _ = std::fs::remove_file(path);
    }
    code
}

async fn run_stop(cli: &Cli, settings: &Settings) -> i32 {
    let names = target_names(&cli.app_names, settings);
    let mut any_error = false;
    for name in &names {
        let Some(path) = settings.pidfile_path(name) else {
            warn!(app = name.as_str(), "no DIRT_APP_PIDFILE configured, cannot stop");
            any_error = true;
            continue;
        };
        match stop_pidfile(&path, DEFAULT_KILL_TIMEOUT).await {
            Ok(true) => info!(app = name.as_str(), "stopped"),
            Ok(false) => info!(app = name.as_str(), "doesn't appear to be running"),
            Err(err) => {
                error!(app = name.as_str(), %err, "failed to stop");
                any_error = true;
            }
        }
    }
    if any_error { exit_code::ERROR } else { exit_code::NORMAL }
}

/// A minimal line-based REPL against one app's resolved API (spec §6 "a
/// minimal interactive shell"). Each line is `method [json-array-of-args]`;
/// bare `exit`/`quit` ends the session.
async fn run_shell(app_name: &str, settings: Settings) -> i32 {
    let registry = Arc::new(ProtocolRegistry::new());
    dirt_rpc::native::register(&registry, dirt_core::default_codec());
    let mocks = MockRegistry::new();
    demos::register_mocks(&mocks);

    let supervisor = match Supervisor::new(settings, registry, mocks, RUN_CHILD_FLAG) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!(%err, "failed to initialise supervisor");
            return exit_code::ERROR;
        }
    };

    let handle = match supervisor.get_api(app_name).await {
        Ok(handle) => handle,
        Err(err) => {
            error!(%err, app = app_name, "failed to resolve app");
            return exit_code::ERROR;
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!(%err, "failed to read from stdin");
                return exit_code::ERROR;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let (method, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let args: CallArgs = if rest.trim().is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str::<Value>(rest.trim()) {
                Ok(Value::Array(items)) => items,
                Ok(other) => vec![other],
                Err(err) => {
                    println!("error: invalid arguments: {err}");
                    continue;
                }
            }
        };

        match handle.call(method, args, KwArgs::new()).await {
            Ok(value) => println!("{value}"),
            Err(err) => println!("error: {err}"),
        }
    }

    exit_code::NORMAL
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_cli() -> Cli {
        Cli {
            config: PathBuf::from("dirt.toml"),
            list_apps: false,
            shell: None,
            stop: false,
            run_child: None,
            app_names: Vec::new(),
        }
    }

    #[test]
    fn target_names_falls_back_to_every_declared_app() {
        let settings = Settings::from_toml_str(
            r#"
            [apps.first]
            app_class = "demos::First"
            [apps.second]
            app_class = "demos::Second"
            "#,
        )
        .unwrap();
        let mut names = target_names(&[], &settings);
        names.sort();
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn target_names_honours_explicit_names() {
        let settings = Settings::from_toml_str("").unwrap();
        let requested = vec!["second".to_string()];
        assert_eq!(target_names(&requested, &settings), requested);
    }

    /// Scenario S6: `--stop` with no PID file configured/present exits 0 and
    /// never mistakes "nothing to stop" for an error.
    #[tokio::test]
    async fn stop_with_no_pidfile_anywhere_exits_cleanly() {
        let settings = Settings::from_toml_str(
            r#"
            DIRT_APP_PIDFILE = "/tmp/dirt-cli-test-does-not-exist-{app_name}.pid"

            [apps.first]
            app_class = "demos::First"
            "#,
        )
        .unwrap();
        let cli = empty_cli();
        let code = run_stop(&cli, &settings).await;
        assert_eq!(code, exit_code::NORMAL);
    }

    #[tokio::test]
    async fn stop_without_a_configured_pidfile_template_is_an_error() {
        let settings = Settings::from_toml_str(
            r#"
            [apps.first]
            app_class = "demos::First"
            "#,
        )
        .unwrap();
        let cli = empty_cli();
        let code = run_stop(&cli, &settings).await;
        assert_eq!(code, exit_code::ERROR);
    }
}
