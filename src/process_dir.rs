use std::collections::HashMap;

use sysinfo::{ProcessRefreshKind, System};

use crate::model::ProcessInfo;

/// Local process table. CPU usage is a delta between two refreshes, so one
/// directory is kept alive for as long as local scanning may happen.
pub struct ProcessDirectory {
    sys: System,
}

impl ProcessDirectory {
    pub fn new() -> Self {
        let mut dir = Self { sys: System::new() };
        dir.refresh();
        dir
    }

    fn refresh(&mut self) {
        self.sys
            .refresh_processes_specifics(ProcessRefreshKind::new().with_cpu().with_memory());
    }

    /// Take a second sample so the first `snapshot` reports real CPU
    /// figures. Only worth it for one-shot commands.
    pub fn warm_up(&mut self) {
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.refresh();
    }

    /// Refresh and return every visible process keyed by pid.
    pub fn snapshot(&mut self) -> HashMap<u32, ProcessInfo> {
        self.refresh();
        self.sys
            .processes()
            .iter()
            .map(|(pid, proc_info)| {
                (
                    pid.as_u32(),
                    ProcessInfo {
                        name: proc_info.name().to_string(),
                        cpu_percent: proc_info.cpu_usage(),
                        memory_bytes: proc_info.memory(),
                        parent_pid: proc_info.parent().map(|p| p.as_u32()),
                    },
                )
            })
            .collect()
    }
}

impl Default for ProcessDirectory {
    fn default() -> Self {
        Self::new()
    }
}
