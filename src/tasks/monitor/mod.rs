//! Trigger detection over the pending transaction feed and block polling.

mod classify;
pub use classify::{Classification, Classifier};

mod detector;
pub use detector::{Detection, DetectionSource, Detector};

mod seen;
pub use seen::SeenSet;

mod state;
pub use state::{MonitorStats, MonitoringState};

mod task;
pub use task::{MonitorHandle, MonitorSettings, MonitorTask};
