use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::collector::Collector;
use crate::error::CollectionError;
use crate::metrics::{Metric, SimpleMetric};

/// Window over which CPU usage is sampled on every collect.
const PROC_TIMESTEP: Duration = Duration::from_millis(200);

/// Resource usage of the current process.
pub struct ProcessProbe {
    sys: System,
    cpu_percent: Arc<SimpleMetric>,
    rss: Arc<SimpleMetric>,
}

impl ProcessProbe {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            cpu_percent: Arc::new(
                SimpleMetric::new("cpu_percent", "%", "process-level cpu utilization")
                    .with_min(0.0)
                    .lower_is_better(),
            ),
            rss: Arc::new(
                SimpleMetric::new("rss_bytes", "B", "process resident set size")
                    .with_min(0.0)
                    .lower_is_better(),
            ),
        }
    }

    fn refresh(&mut self, pid: Pid) {
        self.sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    }
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ProcessProbe {
    fn description(&self) -> &str {
        "ProcessProbe collects process-level utilization metrics"
    }

    fn metrics(&self) -> Vec<Arc<dyn Metric>> {
        vec![self.cpu_percent.clone() as Arc<dyn Metric>, self.rss.clone()]
    }

    fn collect(&mut self) -> Result<(), CollectionError> {
        let pid = sysinfo::get_current_pid().map_err(|e| CollectionError::Unavailable(e.to_owned()))?;

        // CPU usage is the delta between two refreshes.
        self.refresh(pid);
        thread::sleep(PROC_TIMESTEP.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        self.refresh(pid);

        let process = self
            .sys
            .process(pid)
            .ok_or_else(|| CollectionError::Unavailable(format!("process {pid} not found")))?;

        self.cpu_percent.set_value(f64::from(process.cpu_usage()));
        let rss = i64::try_from(process.memory())
            .map_err(|_| CollectionError::Malformed(format!("rss {} out of range", process.memory())))?;
        self.rss.set_value(rss);
        Ok(())
    }
}
