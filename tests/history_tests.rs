use kubepulse::metrics::{EntityKey, MetricSample, MetricsHistory};

fn sample(ts: i64) -> MetricSample {
    MetricSample {
        timestamp_unix: ts,
        cpu_ratio: 0.25,
        mem_ratio: 0.5,
    }
}

#[test]
fn test_snapshot_length_is_min_of_pushes_and_capacity() {
    let history = MetricsHistory::new(120);
    let key = EntityKey::Node("worker-1".to_string());

    for i in 0..30 {
        history.push(key.clone(), sample(i));
    }
    assert_eq!(history.snapshot(&key).len(), 30);

    for i in 30..200 {
        history.push(key.clone(), sample(i));
    }
    assert_eq!(history.snapshot(&key).len(), 120);
}

#[test]
fn test_snapshot_is_chronological_and_evicts_oldest() {
    let history = MetricsHistory::new(5);
    let key = EntityKey::Cluster;
    for i in 0..8 {
        history.push(key.clone(), sample(i));
    }
    let snap = history.snapshot(&key);
    let timestamps: Vec<i64> = snap.iter().map(|s| s.timestamp_unix).collect();
    assert_eq!(timestamps, vec![3, 4, 5, 6, 7]);
}

#[test]
fn test_reset_empties_ring() {
    let history = MetricsHistory::default();
    let key = EntityKey::pod("default", "web-0");
    for i in 0..10 {
        history.push(key.clone(), sample(i));
    }
    assert_eq!(history.snapshot(&key).len(), 10);
    history.reset(&key);
    assert!(history.snapshot(&key).is_empty());
}

#[test]
fn test_unseen_entity_snapshots_empty() {
    let history = MetricsHistory::default();
    assert!(history
        .snapshot(&EntityKey::Node("nope".to_string()))
        .is_empty());
}

#[test]
fn test_retain_drops_departed_entities() {
    let history = MetricsHistory::default();
    history.push(EntityKey::pod("default", "gone"), sample(1));
    history.push(EntityKey::pod("default", "kept"), sample(1));
    history.push(EntityKey::Cluster, sample(1));

    history.retain(|k| !matches!(k, EntityKey::Pod { name, .. } if name == "gone"));

    assert!(history.snapshot(&EntityKey::pod("default", "gone")).is_empty());
    assert_eq!(history.snapshot(&EntityKey::pod("default", "kept")).len(), 1);
    assert_eq!(history.snapshot(&EntityKey::Cluster).len(), 1);
}
