use std::collections::BTreeMap;
use std::time::Duration;

use kubepulse::metrics::scrape::{parse_exposition_line, MetricStore, Sample, ScrapeConfig};

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_parse_plain_line() {
    let (name, labels, value, ts) =
        parse_exposition_line("node_memory_working_set_bytes 1073741824").unwrap();
    assert_eq!(name, "node_memory_working_set_bytes");
    assert!(labels.is_empty());
    assert_eq!(value, 1073741824.0);
    assert_eq!(ts, None);
}

#[test]
fn test_parse_labelled_line_with_timestamp() {
    let line = r#"container_cpu_usage_seconds_total{namespace="default",pod="web-0",container="app"} 42.5 1700000000000"#;
    let (name, labels, value, ts) = parse_exposition_line(line).unwrap();
    assert_eq!(name, "container_cpu_usage_seconds_total");
    assert_eq!(labels.get("pod").map(String::as_str), Some("web-0"));
    assert_eq!(labels.get("container").map(String::as_str), Some("app"));
    assert_eq!(value, 42.5);
    assert_eq!(ts, Some(1_700_000_000_000));
}

#[test]
fn test_parse_skips_comments_and_blank_lines() {
    assert!(parse_exposition_line("# HELP node_load1 1m load average").is_none());
    assert!(parse_exposition_line("# TYPE node_load1 gauge").is_none());
    assert!(parse_exposition_line("   ").is_none());
}

#[test]
fn test_parse_escaped_label_values() {
    let line = r#"errors_total{message="bad \"thing\" happened"} 1"#;
    let (_, labels, value, _) = parse_exposition_line(line).unwrap();
    assert_eq!(
        labels.get("message").map(String::as_str),
        Some(r#"bad "thing" happened"#)
    );
    assert_eq!(value, 1.0);
}

#[test]
fn test_parse_special_values() {
    let (_, _, inf, _) = parse_exposition_line("up +Inf").unwrap();
    assert!(inf.is_infinite());
    let (_, _, nan, _) = parse_exposition_line("up NaN").unwrap();
    assert!(nan.is_nan());
}

#[test]
fn test_store_latest_and_retention() {
    let mut store = MetricStore::new(Duration::from_secs(300), 100);
    let l = labels(&[("node", "worker-1")]);
    let now = 1_700_000_000_000;

    store.insert("node_load1", l.clone(), Sample { ts_ms: now - 400_000, value: 9.0 });
    store.insert("node_load1", l.clone(), Sample { ts_ms: now - 1_000, value: 1.5 });

    let latest = store
        .latest("node_load1", &[("node", "worker-1")], now)
        .unwrap();
    assert_eq!(latest.value, 1.5);

    // sample outside retention is not served
    store.prune(now);
    let stale = store.latest("node_load1", &[("node", "worker-1")], now + 600_000);
    assert!(stale.is_none());
}

#[test]
fn test_store_caps_samples_per_series() {
    let mut store = MetricStore::new(Duration::from_secs(3600), 5);
    let l = labels(&[("node", "n1")]);
    for i in 0..20 {
        store.insert("m", l.clone(), Sample { ts_ms: i, value: i as f64 });
    }
    // only the newest cap-many remain; latest is the last inserted
    let latest = store.latest("m", &[], 20).unwrap();
    assert_eq!(latest.value, 19.0);
}

#[test]
fn test_rate_from_last_two_samples() {
    let mut store = MetricStore::new(Duration::from_secs(300), 100);
    let l = labels(&[("node", "n1")]);
    let now = 1_700_000_000_000;
    store.insert("cpu_seconds", l.clone(), Sample { ts_ms: now - 10_000, value: 100.0 });
    store.insert("cpu_seconds", l.clone(), Sample { ts_ms: now, value: 105.0 });

    let rate = store.rate("cpu_seconds", &[("node", "n1")], now).unwrap();
    assert!((rate - 0.5).abs() < 1e-9);
}

#[test]
fn test_rate_single_sample_is_zero() {
    let mut store = MetricStore::new(Duration::from_secs(300), 100);
    store.insert(
        "cpu_seconds",
        labels(&[("node", "n1")]),
        Sample { ts_ms: 1_700_000_000_000, value: 100.0 },
    );
    let rate = store
        .rate("cpu_seconds", &[("node", "n1")], 1_700_000_000_000)
        .unwrap();
    assert_eq!(rate, 0.0);
}

#[test]
fn test_rate_skips_counter_reset() {
    let mut store = MetricStore::new(Duration::from_secs(300), 100);
    let l = labels(&[("node", "n1")]);
    let now = 1_700_000_000_000;
    store.insert("cpu_seconds", l.clone(), Sample { ts_ms: now - 10_000, value: 500.0 });
    store.insert("cpu_seconds", l.clone(), Sample { ts_ms: now, value: 3.0 });
    let rate = store.rate("cpu_seconds", &[("node", "n1")], now).unwrap();
    assert_eq!(rate, 0.0);
}

#[test]
fn test_label_pairs_and_values() {
    let mut store = MetricStore::new(Duration::from_secs(300), 100);
    let now = 1_700_000_000_000;
    for (ns, pod, container) in [
        ("default", "web-0", "app"),
        ("default", "web-0", "sidecar"),
        ("kube-system", "dns-1", "coredns"),
    ] {
        store.insert(
            "container_cpu_usage_seconds_total",
            labels(&[("namespace", ns), ("pod", pod), ("container", container)]),
            Sample { ts_ms: now, value: 1.0 },
        );
    }
    let pairs = store.label_pairs("container_cpu_usage_seconds_total", "namespace", "pod");
    assert_eq!(pairs.len(), 2);

    let containers = store.label_values(
        "container_cpu_usage_seconds_total",
        &[("namespace", "default"), ("pod", "web-0")],
        "container",
    );
    assert_eq!(containers.len(), 2);
}

#[test]
fn test_scrape_config_floors() {
    assert!(ScrapeConfig::new(
        Duration::from_secs(5),
        Duration::from_secs(300),
        100,
        vec!["kubelet".to_string()],
    )
    .is_ok());
    assert!(ScrapeConfig::new(
        Duration::from_secs(4),
        Duration::from_secs(300),
        100,
        vec![],
    )
    .is_err());
    assert!(ScrapeConfig::new(
        Duration::from_secs(5),
        Duration::from_secs(200),
        100,
        vec![],
    )
    .is_err());
}
