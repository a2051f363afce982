//! Resource-quantity parsing for host allocatable capacity.
//!
//! The orchestrator reports allocatable resources as quantity strings:
//! CPU as whole cores (`"4"`, `"2.5"`) or millicores (`"500m"`), memory as
//! bytes with optional binary (`Ki`, `Mi`, ...) or decimal (`k`, `M`, ...)
//! suffixes.

/// Parse a CPU quantity into millicores. `"4"` → 4000, `"500m"` → 500.
pub fn parse_cpu_millis(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Some(millis) = raw.strip_suffix('m') {
        return millis.parse::<i64>().ok();
    }
    raw.parse::<f64>().ok().map(|cores| (cores * 1000.0) as i64)
}

/// Parse a memory quantity into bytes. `"128974848"`, `"64Mi"`, `"1Gi"`.
pub fn parse_memory_bytes(raw: &str) -> Option<i64> {
    const SUFFIXES: &[(&str, i64)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("Pi", 1 << 50),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
    ];

    let raw = raw.trim();
    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = raw.strip_suffix(suffix) {
            return number
                .parse::<f64>()
                .ok()
                .map(|value| (value * *multiplier as f64) as i64);
        }
    }
    raw.parse::<f64>().ok().map(|value| value as i64)
}
