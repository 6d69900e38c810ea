//! Pod list ordering.
//!
//! Default order is (namespace, name). Alternate columns sort by that column
//! with name as the tie-breaker; the tie-breaker stays ascending in both
//! directions so tie groups render stably.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::views::types::PodView;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodSortColumn {
    Namespace,
    Name,
    Ready,
    Status,
    Restarts,
    Age,
    Cpu,
    Memory,
}

impl FromStr for PodSortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "namespace" => Ok(PodSortColumn::Namespace),
            "name" => Ok(PodSortColumn::Name),
            "ready" => Ok(PodSortColumn::Ready),
            "status" => Ok(PodSortColumn::Status),
            "restarts" => Ok(PodSortColumn::Restarts),
            "age" => Ok(PodSortColumn::Age),
            "cpu" => Ok(PodSortColumn::Cpu),
            "memory" | "mem" => Ok(PodSortColumn::Memory),
            _ => Err(format!("unknown sort column: {}", s)),
        }
    }
}

/// Status display priority. Unrecognized statuses sort with Unknown.
fn status_rank(status: &str) -> u8 {
    match status {
        "Running" => 0,
        "Pending" => 1,
        "ContainerCreating" => 2,
        "CrashLoopBackOff" => 3,
        "Error" => 4,
        "Failed" => 5,
        _ => 6,
    }
}

/// Sort key for cpu/memory columns: usage when the source reports any,
/// requested otherwise.
fn cpu_key(pod: &PodView) -> i64 {
    if pod.used_cpu_milli > 0 {
        pod.used_cpu_milli
    } else {
        pod.requested_cpu_milli
    }
}

fn mem_key(pod: &PodView) -> i64 {
    if pod.used_mem_bytes > 0 {
        pod.used_mem_bytes
    } else {
        pod.requested_mem_bytes
    }
}

fn primary(column: PodSortColumn, a: &PodView, b: &PodView) -> Ordering {
    match column {
        PodSortColumn::Namespace => a
            .namespace
            .cmp(&b.namespace)
            .then_with(|| a.name.cmp(&b.name)),
        PodSortColumn::Name => a.name.cmp(&b.name),
        PodSortColumn::Ready => a
            .ready_ratio()
            .partial_cmp(&b.ready_ratio())
            .unwrap_or(Ordering::Equal),
        PodSortColumn::Status => status_rank(&a.status).cmp(&status_rank(&b.status)),
        PodSortColumn::Restarts => a.restarts.cmp(&b.restarts),
        // Older first: larger age sorts ahead.
        PodSortColumn::Age => b.age_seconds.cmp(&a.age_seconds),
        PodSortColumn::Cpu => cpu_key(a).cmp(&cpu_key(b)),
        PodSortColumn::Memory => mem_key(a).cmp(&mem_key(b)),
    }
}

/// Sort in place by `column`, name-tie-broken; `descending` negates only the
/// primary key.
pub fn sort_pod_views(views: &mut [PodView], column: PodSortColumn, descending: bool) {
    views.sort_by(|a, b| {
        let mut ord = primary(column, a, b);
        if descending {
            ord = ord.reverse();
        }
        ord.then_with(|| a.name.cmp(&b.name))
    });
}
