use serde::Serialize;

/// Sizing and usage counters returned by [`Pool::get_info`](crate::Pool::get_info).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    /// Connections currently checked out.
    pub busy_count: usize,
    /// Native sessions alive, idle or checked out.
    pub open_count: usize,
    pub min: usize,
    pub max: usize,
    pub increment: usize,
}
