//! Supervisor / runner (spec §4.8 / C8): one OS process per declared app,
//! child reaping, SIGTERM cascade on a bad exit, and `get_api` resolution
//! with liveness probing and mock fallback.

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dirt_core::{Api, ApiOutcome, Args, CallOutcome, DirtError, KwArgs, ProtocolRegistry, RemoteAddress, Result, Value};
use dirt_rpc::Proxy;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::net::TcpStream;
use tokio::process::Child;
use tracing::{info, warn};

use crate::mock::MockRegistry;
use crate::settings::Settings;

/// Exit codes the spec assigns meaning to (§4.8).
pub mod exit_code {
    pub const NORMAL: i32 = 0;
    pub const ERROR: i32 = 1;
    pub const INTERRUPTED: i32 = 4;
    pub const STOPPED_CLEANLY: i32 = 99;
}

/// A resolved `get_api(name)` result — either a wire proxy to a live peer
/// or a local mock standing in for one that isn't reachable (spec §4.8).
pub enum ApiHandle {
    Live(Proxy),
    Mock(Arc<dyn Api>),
}

impl ApiHandle {
    /// Convenience call for non-streaming methods — the common case for
    /// apps talking to each other's ordinary APIs.
    pub async fn call(&self, method: &str, args: Args, kwargs: KwArgs) -> Result<Value> {
        match self {
            ApiHandle::Live(proxy) => match proxy.attr(method).invoke(args, kwargs).await? {
                CallOutcome::Value(value) => Ok(value),
                CallOutcome::Stream(_) => Err(DirtError::protocol("ApiHandle::call does not support streaming results")),
            },
            ApiHandle::Mock(api) => match api.invoke(method, args, kwargs).await? {
                ApiOutcome::Value(value) => Ok(value),
                ApiOutcome::Stream(_) => Err(DirtError::protocol("ApiHandle::call does not support streaming results")),
            },
        }
    }
}

pub struct Supervisor {
    settings: Settings,
    registry: Arc<ProtocolRegistry>,
    mocks: MockRegistry,
    known_live: DashMap<String, ()>,
    exe_path: PathBuf,
    /// The argv flag used to re-exec this binary as a named app's child
    /// (e.g. `--dirt-child-app`). Owned by the CLI layer that knows its own
    /// argument grammar.
    child_flag: String,
}

impl Supervisor {
    pub fn new(settings: Settings, registry: Arc<ProtocolRegistry>, mocks: MockRegistry, child_flag: impl Into<String>) -> std::io::Result<Self> {
        Ok(Self {
            settings,
            registry,
            mocks,
            known_live: DashMap::new(),
            exe_path: std::env::current_exe()?,
            child_flag: child_flag.into(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn spawn_child(&self, app_name: &str) -> std::io::Result<Child> {
        let mut cmd = tokio::process::Command::new(&self.exe_path);
        cmd.arg(&self.child_flag).arg(app_name);
        // New process group per child (spec: "assigns each child its own
        // process group via setsid equivalent"), so a cascade SIGTERM can
        // target each one independently of the supervisor's own group.
        cmd.process_group(0);
        cmd.kill_on_drop(true);
        cmd.spawn()
    }

    /// Forks one child per name, waits for any to exit, and cascades
    /// SIGTERM to the rest on a non-sentinel bad exit (Testable Property 8).
    /// Returns the propagated exit code.
    ///
    /// Each child's `wait()` runs on its own spawned task rather than being
    /// raced in place — `Child::wait` takes `&mut self`, and racing several
    /// borrowed waits against the same map would mean holding overlapping
    /// mutable borrows of it. Owning the child per-task sidesteps that.
    pub async fn run_many(&self, names: &[String]) -> Result<i32> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(String, std::process::ExitStatus)>();
        let mut pids: HashMap<String, u32> = HashMap::new();
        let mut remaining = names.len();

        for name in names {
            let mut child = self
                .spawn_child(name)
                .map_err(|e| DirtError::configuration(format!("failed to start app `{name}`: {e}")))?;
            let pid = child
                .id()
                .ok_or_else(|| DirtError::configuration(format!("app `{name}` exited before it could be observed")))?;
            info!(app = name.as_str(), pid, "started app");
            pids.insert(name.clone(), pid);
            self.known_live.insert(name.clone(), ());

            let tx = tx.clone();
            let name = name.clone();
            tokio::spawn(async move {
                let status = child
                    .wait()
                    .await
                    .unwrap_or_else(|_| std::process::ExitStatus::from_raw(exit_code::ERROR << 8));
                let _ = tx.send((name, status));
            });
        }
        drop(tx);

        let exit_code = loop {
            if remaining == 0 {
                break exit_code::NORMAL;
            }
            let Some((finished_name, status)) = rx.recv().await else {
                break exit_code::NORMAL;
            };
            remaining -= 1;
            self.known_live.remove(&finished_name);
            pids.remove(&finished_name);
            let code = status.code().unwrap_or(exit_code::ERROR);

            if code == exit_code::STOPPED_CLEANLY {
                info!(app = finished_name.as_str(), "app did a clean stop, not cascading");
                continue;
            }
            if code == exit_code::NORMAL {
                continue;
            }

            warn!(app = finished_name.as_str(), code, "app exited abnormally, cascading SIGTERM");
            cascade_sigterm(&pids);
            while remaining > 0 {
                match rx.recv().await {
                    Some((name, _)) => {
                        self.known_live.remove(&name);
                        remaining -= 1;
                    }
                    None => break,
                }
            }
            break code;
        };

        Ok(exit_code)
    }

    /// TCP liveness probe with a 1s timeout (spec §4.8).
    async fn probe_live(&self, address: &RemoteAddress) -> bool {
        let attempt = TcpStream::connect(address.host_port());
        matches!(tokio::time::timeout(Duration::from_secs(1), attempt).await, Ok(Ok(_)))
    }

    /// Resolves `get_api(name)` per spec §4.8. A mock is only used when
    /// `ALLOW_MOCK_API` permits it, a `mock_cls` is declared, the
    /// `NO_MOCK_<APPNAME>` override isn't set, and the app isn't already
    /// known-live or independently reachable; otherwise this raises rather
    /// than silently handing back a proxy to a dead peer.
    pub async fn get_api(&self, name: &str) -> Result<ApiHandle> {
        let app = self.settings.app(name)?;
        let remote = app
            .remote
            .as_ref()
            .ok_or_else(|| DirtError::configuration(format!("app `{name}` has no remote configured")))?;
        let address = RemoteAddress::parse(remote)?;

        let reachable = self.known_live.contains_key(name) || self.probe_live(&address).await;
        if reachable {
            let client = self.registry.client_for(address.scheme())?;
            return Ok(ApiHandle::Live(Proxy::new(client, address)));
        }

        let mock_allowed = self.settings.allow_mock_api
            && app.mock_cls.is_some()
            && !Settings::mock_disabled_by_env(name);
        if mock_allowed {
            let mock_cls = app.mock_cls.as_ref().expect("checked above");
            return Ok(ApiHandle::Mock(self.mocks.build(mock_cls)?));
        }

        Err(DirtError::transport(format!(
            "app `{name}` is unreachable and mock fallback is unavailable"
        )))
    }
}

fn cascade_sigterm(pids: &HashMap<String, u32>) {
    for (name, pid) in pids {
        match signal::killpg(Pid::from_raw(*pid as i32), Signal::SIGTERM) {
            Ok(()) => info!(app = name.as_str(), pid, "sent SIGTERM to process group"),
            Err(e) => warn!(app = name.as_str(), pid, "failed to signal process group: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Drives `/bin/sh -c <command>` children instead of re-exec'ing this
    /// test binary, by pointing `child_flag` at `-c` and treating each
    /// "app name" as a literal shell command.
    fn shell_supervisor() -> Supervisor {
        Supervisor {
            settings: Settings::from_toml_str("").unwrap(),
            registry: Arc::new(ProtocolRegistry::new()),
            mocks: MockRegistry::new(),
            known_live: DashMap::new(),
            exe_path: PathBuf::from("/bin/sh"),
            child_flag: "-c".to_string(),
        }
    }

    #[tokio::test]
    async fn a_bad_exit_cascades_sigterm_and_kills_the_sleeping_sibling() {
        let supervisor = shell_supervisor();
        let names = vec!["exit 7".to_string(), "sleep 30".to_string()];

        let started = Instant::now();
        let code = supervisor.run_many(&names).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(code, 7);
        // The sibling was killed well short of its 30s sleep.
        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
        assert!(supervisor.known_live.is_empty());
    }

    #[tokio::test]
    async fn a_clean_stop_from_one_app_does_not_cascade() {
        let supervisor = shell_supervisor();
        let names = vec![format!("exit {}", exit_code::STOPPED_CLEANLY), "exit 0".to_string()];

        let code = supervisor.run_many(&names).await.unwrap();
        assert_eq!(code, exit_code::NORMAL);
    }

    #[tokio::test]
    async fn get_api_falls_back_to_mock_when_unreachable_and_allowed() {
        let settings = Settings::from_toml_str(
            r#"
            ALLOW_MOCK_API = true
            [apps.first]
            app_class = "demo::First"
            remote_url = "dirt://127.0.0.1:1"
            mock_cls = "demo::FirstMock"
            "#,
        )
        .unwrap();
        let mocks = MockRegistry::new();
        mocks.register("demo::FirstMock", Arc::new(|| -> Arc<dyn Api> { Arc::new(NoopApi) }));
        let supervisor = Supervisor::new(settings, Arc::new(ProtocolRegistry::new()), mocks, "--child").unwrap();

        let handle = supervisor.get_api("first").await.unwrap();
        assert!(matches!(handle, ApiHandle::Mock(_)));
    }

    #[tokio::test]
    async fn get_api_raises_when_no_mock_env_disables_fallback() {
        let settings = Settings::from_toml_str(
            r#"
            ALLOW_MOCK_API = true
            [apps.second]
            app_class = "demo::Second"
            remote_url = "dirt://127.0.0.1:1"
            mock_cls = "demo::SecondMock"
            "#,
        )
        .unwrap();
        // SAFETY: test is single-threaded with respect to this env var and
        // nothing else in the process reads `NO_MOCK_SECOND`.
        unsafe {
            std::env::set_var("NO_MOCK_SECOND", "1");
        }
        let supervisor = Supervisor::new(settings, Arc::new(ProtocolRegistry::new()), MockRegistry::new(), "--child").unwrap();

        let err = supervisor.get_api("second").await.unwrap_err();
        unsafe {
            std::env::remove_var("NO_MOCK_SECOND");
        }
        assert!(matches!(err, DirtError::Transport { .. }));
    }

    struct NoopApi;

    #[async_trait::async_trait]
    impl Api for NoopApi {
        fn method_names(&self) -> Vec<String> {
            vec![]
        }
        fn doc(&self, _method: &str) -> Option<String> {
            None
        }
        async fn invoke(&self, method: &str, _args: Args, _kwargs: KwArgs) -> Result<ApiOutcome> {
            Err(DirtError::not_found(method.to_string()))
        }
    }
}
