/// Resource view of one process, from the local process table or a remote `ps`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub name: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub parent_pid: Option<u32>,
}
