//! Parse Kubernetes resource Quantity strings to numeric values.
//! CPU is parsed to millicores, memory and storage to bytes.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Parse CPU quantity string (e.g. "500m", "1", "156807706n") to millicores.
/// Metrics endpoints report nanocores ("n") and microcores ("u").
pub fn parse_cpu_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(n) = s.strip_suffix('n') {
        if let Ok(v) = n.parse::<i64>() {
            return Some(v / 1_000_000);
        }
    }
    if let Some(u) = s.strip_suffix('u') {
        if let Ok(v) = u.parse::<i64>() {
            return Some(v / 1_000);
        }
    }
    if let Some(m) = s.strip_suffix('m') {
        if let Ok(v) = m.parse::<i64>() {
            return Some(v);
        }
    }
    if let Ok(v) = s.parse::<f64>() {
        return Some((v * 1000.0) as i64);
    }
    None
}

/// Parse memory/storage quantity string (e.g. "256Mi", "1Gi", "500M") to bytes.
/// Binary suffixes (Ki..Pi) and decimal suffixes (k..P) are both accepted.
pub fn parse_memory_str(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (num_str, unit): (&str, i64) = if let Some(p) = s.strip_suffix("Ki") {
        (p, 1 << 10)
    } else if let Some(p) = s.strip_suffix("Mi") {
        (p, 1 << 20)
    } else if let Some(p) = s.strip_suffix("Gi") {
        (p, 1 << 30)
    } else if let Some(p) = s.strip_suffix("Ti") {
        (p, 1 << 40)
    } else if let Some(p) = s.strip_suffix("Pi") {
        (p, 1 << 50)
    } else if let Some(p) = s.strip_suffix('k').or_else(|| s.strip_suffix('K')) {
        (p, 1_000)
    } else if let Some(p) = s.strip_suffix('M') {
        (p, 1_000_000)
    } else if let Some(p) = s.strip_suffix('G') {
        (p, 1_000_000_000)
    } else if let Some(p) = s.strip_suffix('T') {
        (p, 1_000_000_000_000)
    } else if let Some(p) = s.strip_suffix('P') {
        (p, 1_000_000_000_000_000)
    } else if let Ok(v) = s.parse::<f64>() {
        return Some(v as i64);
    } else {
        return None;
    };
    let v: f64 = num_str.parse().ok()?;
    Some((v * unit as f64) as i64)
}

/// CPU millicores from a typed Quantity, 0 when absent or unparseable.
pub fn cpu_milli(q: Option<&Quantity>) -> i64 {
    q.and_then(|q| parse_cpu_str(&q.0)).unwrap_or(0)
}

/// Bytes from a typed Quantity, 0 when absent or unparseable.
pub fn mem_bytes(q: Option<&Quantity>) -> i64 {
    q.and_then(|q| parse_memory_str(&q.0)).unwrap_or(0)
}

/// Render millicores for display ("1250m" below 10 cores, "12.5" above).
pub fn format_cpu_milli(milli: i64) -> String {
    if milli >= 10_000 {
        format!("{:.1}", milli as f64 / 1000.0)
    } else {
        format!("{}m", milli)
    }
}

/// Render bytes with the largest binary suffix that keeps two digits.
pub fn format_mem_bytes(bytes: i64) -> String {
    const GI: f64 = (1u64 << 30) as f64;
    const MI: f64 = (1u64 << 20) as f64;
    let b = bytes as f64;
    if b >= GI {
        format!("{:.1}Gi", b / GI)
    } else {
        format!("{:.0}Mi", b / MI)
    }
}

/// usage / allocatable clamped to [0, 1]; 0 when allocatable is unknown.
pub fn ratio(used: i64, allocatable: i64) -> f64 {
    if allocatable <= 0 {
        return 0.0;
    }
    (used as f64 / allocatable as f64).clamp(0.0, 1.0)
}
