//! `dirt-host`: the process-per-app host around the RPC fabric in
//! `dirt-core`/`dirt-rpc` — settings loading, PID-file lifecycle, the
//! restart-on-fault runloop, the optional blocking detector, and the
//! supervisor that owns one OS process per declared app (spec §4.8/§4.9).

mod mock;
mod pidfile;
mod runloop;
mod settings;
mod supervisor;
mod watchdog;

pub use mock::{MockFactory, MockRegistry};
pub use pidfile::{DEFAULT_KILL_TIMEOUT, is_process_alive, read as read_pidfile, stop as stop_pidfile, write as write_pidfile};
pub use runloop::{WorkerError, WorkerOutcome, run_loop};
pub use settings::{AppSettings, Settings};
pub use supervisor::{ApiHandle, Supervisor, exit_code};
pub use watchdog::{BlockingDetectorConfig, Heartbeat, watch as watch_blocking};
