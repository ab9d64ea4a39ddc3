//! Container-backed services.
//!
//! - [`compose`]: compose CLI wrapper (`up`, `stop`, `down`, `ps`, `inspect`)
//! - [`ports`]: host port assignment and detection
//! - [`health`]: health polling state machine and HTTP probe
//! - [`orchestrator`]: the [`ServiceHandle`] implementation tying them together

pub mod compose;
pub mod health;
pub mod orchestrator;
pub mod ports;
pub mod types;

pub use compose::{ComposeCli, ComposeContainer};
pub use health::{HealthMonitor, HealthProbe, HealthReport, HealthState, HttpProbe, StatusSource};
pub use orchestrator::{port_env_var, OrchestratorSettings, ServiceOrchestrator};
pub use ports::{PortAllocator, PortAssignment, PortLedger};
pub use types::{Health, ServiceHandle, ServiceInfo, ServiceStatus};
