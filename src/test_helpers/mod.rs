// Test Helpers Module - In-Memory Collaborators
//
// Fakes for every external collaborator (store, bus, cluster, query service, alerts) plus
// recorders for notifications, metrics and subscriber frames, and a few scripted checks.
// Shared by unit tests and the tests/ integration suites.

pub mod checks;
pub mod fakes;
pub mod recorders;

pub use checks::{FailingCheck, PanickingCheck, StaticCheck};
pub use fakes::{InMemoryStore, ScriptedAlertSource, ScriptedClusterApi, ScriptedQueryService};
pub use recorders::{RecordingMetricsSink, RecordingNotificationService, RecordingSink};
