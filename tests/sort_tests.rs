use kubepulse::views::sort::{sort_pod_views, PodSortColumn};
use kubepulse::views::types::PodView;

fn pod_view(namespace: &str, name: &str) -> PodView {
    PodView {
        namespace: namespace.to_string(),
        name: name.to_string(),
        node_name: None,
        phase: "Running".to_string(),
        status: "Running".to_string(),
        ready_containers: 1,
        total_containers: 1,
        restarts: 0,
        requested_cpu_milli: 0,
        requested_mem_bytes: 0,
        limit_cpu_milli: 0,
        limit_mem_bytes: 0,
        used_cpu_milli: 0,
        used_mem_bytes: 0,
        node_allocatable_cpu_milli: 0,
        node_allocatable_mem_bytes: 0,
        node_used_cpu_milli: 0,
        node_used_mem_bytes: 0,
        volumes_count: 0,
        created_at: None,
        age_seconds: 0,
    }
}

fn names(views: &[PodView]) -> Vec<&str> {
    views.iter().map(|v| v.name.as_str()).collect()
}

#[test]
fn test_default_order_namespace_then_name() {
    let mut views = vec![
        pod_view("kube-system", "coredns"),
        pod_view("default", "zeta"),
        pod_view("default", "alpha"),
    ];
    sort_pod_views(&mut views, PodSortColumn::Namespace, false);
    assert_eq!(names(&views), vec!["alpha", "zeta", "coredns"]);
}

#[test]
fn test_status_priority_table() {
    let mut views = vec![
        pod_view("default", "a"),
        pod_view("default", "b"),
        pod_view("default", "c"),
        pod_view("default", "d"),
    ];
    views[0].status = "CrashLoopBackOff".to_string();
    views[1].status = "Running".to_string();
    views[2].status = "Failed".to_string();
    views[3].status = "Pending".to_string();
    sort_pod_views(&mut views, PodSortColumn::Status, false);
    let statuses: Vec<&str> = views.iter().map(|v| v.status.as_str()).collect();
    assert_eq!(statuses, vec!["Running", "Pending", "CrashLoopBackOff", "Failed"]);
}

#[test]
fn test_unknown_status_sorts_last() {
    let mut views = vec![pod_view("default", "a"), pod_view("default", "b")];
    views[0].status = "SomethingOdd".to_string();
    views[1].status = "Failed".to_string();
    sort_pod_views(&mut views, PodSortColumn::Status, false);
    assert_eq!(views[0].status, "Failed");
}

#[test]
fn test_age_orders_older_first() {
    let mut views = vec![pod_view("default", "young"), pod_view("default", "old")];
    views[0].age_seconds = 60;
    views[1].age_seconds = 86_400;
    sort_pod_views(&mut views, PodSortColumn::Age, false);
    assert_eq!(names(&views), vec!["old", "young"]);
}

#[test]
fn test_cpu_prefers_usage_then_requested() {
    let mut views = vec![
        pod_view("default", "idle"),
        pod_view("default", "busy"),
        pod_view("default", "requested-only"),
    ];
    views[0].requested_cpu_milli = 10;
    views[1].used_cpu_milli = 900;
    views[2].requested_cpu_milli = 500;
    sort_pod_views(&mut views, PodSortColumn::Cpu, true);
    assert_eq!(names(&views), vec!["busy", "requested-only", "idle"]);
}

#[test]
fn test_descending_preserves_name_order_in_tie_groups() {
    let mut views = vec![
        pod_view("default", "c"),
        pod_view("default", "a"),
        pod_view("default", "b"),
    ];
    for v in views.iter_mut() {
        v.restarts = 7;
    }
    sort_pod_views(&mut views, PodSortColumn::Restarts, false);
    assert_eq!(names(&views), vec!["a", "b", "c"]);
    // descending negates the primary key only; the tie group keeps name order
    sort_pod_views(&mut views, PodSortColumn::Restarts, true);
    assert_eq!(names(&views), vec!["a", "b", "c"]);
}

#[test]
fn test_ascending_then_descending_reverses_up_to_ties() {
    let mut views = vec![
        pod_view("default", "a"),
        pod_view("default", "b"),
        pod_view("default", "c"),
    ];
    views[0].restarts = 1;
    views[1].restarts = 5;
    views[2].restarts = 3;
    sort_pod_views(&mut views, PodSortColumn::Restarts, false);
    assert_eq!(names(&views), vec!["a", "c", "b"]);
    sort_pod_views(&mut views, PodSortColumn::Restarts, true);
    assert_eq!(names(&views), vec!["b", "c", "a"]);
}
