use tracing::warn;

/// Parse a Kubernetes CPU quantity into millicores.
///
/// A trailing `m` means the prefix is already millicores; `n`/`u` are the
/// nanocore/microcore forms the metrics API emits; no suffix means whole
/// cores. Unparseable input degrades to 0.0 with a warning so one malformed
/// field cannot abort a whole pressure computation.
pub fn parse_cpu_millicores(q: &str) -> f64 {
    match try_parse_cpu(q) {
        Some(mc) => mc,
        None => {
            warn!(quantity = %q, "unparseable cpu quantity, treating as 0");
            0.0
        }
    }
}

fn try_parse_cpu(q: &str) -> Option<f64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    if let Some(stripped) = q.strip_suffix('n') {
        if let Ok(nanos) = stripped.parse::<f64>() {
            return Some(nanos / 1_000_000.0);
        }
    } else if let Some(stripped) = q.strip_suffix('u') {
        if let Ok(micros) = stripped.parse::<f64>() {
            return Some(micros / 1_000.0);
        }
    } else if let Some(stripped) = q.strip_suffix('m') {
        if let Ok(mc) = stripped.parse::<f64>() {
            return Some(mc);
        }
    } else if let Ok(cores) = q.parse::<f64>() {
        return Some(cores * 1000.0);
    }
    None
}

/// Parse a Kubernetes memory quantity into bytes.
///
/// Binary suffixes (Ki, Mi, ...) are checked ahead of decimal ones since
/// binary is the dominant real-world format; no suffix means raw bytes.
/// Unparseable input degrades to 0.0 with a warning.
pub fn parse_memory_bytes(q: &str) -> f64 {
    match try_parse_memory(q) {
        Some(bytes) => bytes,
        None => {
            warn!(quantity = %q, "unparseable memory quantity, treating as 0");
            0.0
        }
    }
}

fn try_parse_memory(q: &str) -> Option<f64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }

    const BINARY_UNITS: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1024.0 * 1024.0),
        ("Gi", 1024.0 * 1024.0 * 1024.0),
        ("Ti", 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("Pi", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
        ("Ei", 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ];
    const DECIMAL_UNITS: &[(&str, f64)] = &[
        ("K", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
        ("k", 1e3),
    ];

    for (suf, mul) in BINARY_UNITS {
        if let Some(stripped) = q.strip_suffix(suf) {
            if let Ok(v) = stripped.parse::<f64>() {
                return Some(v * mul);
            }
        }
    }
    for (suf, mul) in DECIMAL_UNITS {
        if let Some(stripped) = q.strip_suffix(suf) {
            if let Ok(v) = stripped.parse::<f64>() {
                return Some(v * mul);
            }
        }
    }
    if let Ok(v) = q.parse::<f64>() {
        return Some(v);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_millicore_suffix() {
        // "m" suffix returns the numeric prefix unchanged
        assert_eq!(parse_cpu_millicores("100m"), 100.0);
        assert_eq!(parse_cpu_millicores("1500m"), 1500.0);
        assert_eq!(parse_cpu_millicores("0m"), 0.0);
    }

    #[test]
    fn test_parse_cpu_whole_cores() {
        assert_eq!(parse_cpu_millicores("1"), 1000.0);
        assert_eq!(parse_cpu_millicores("4"), 4000.0);
        assert_eq!(parse_cpu_millicores("0.5"), 500.0);
        assert_eq!(parse_cpu_millicores("2.5"), 2500.0);
    }

    #[test]
    fn test_parse_cpu_metrics_api_suffixes() {
        assert_eq!(parse_cpu_millicores("1000000000n"), 1000.0);
        assert_eq!(parse_cpu_millicores("500000000n"), 500.0);
        assert_eq!(parse_cpu_millicores("1000000u"), 1000.0);
    }

    #[test]
    fn test_parse_cpu_unparseable_degrades_to_zero() {
        assert_eq!(parse_cpu_millicores(""), 0.0);
        assert_eq!(parse_cpu_millicores("invalid"), 0.0);
        assert_eq!(parse_cpu_millicores("100x"), 0.0);
    }

    #[test]
    fn test_parse_cpu_trims_whitespace() {
        assert_eq!(parse_cpu_millicores("  100m  "), 100.0);
        assert_eq!(parse_cpu_millicores("\t1\n"), 1000.0);
    }

    #[test]
    fn test_parse_memory_binary_suffixes() {
        assert_eq!(parse_memory_bytes("1Ki"), 1024.0);
        assert_eq!(parse_memory_bytes("1Mi"), 1024.0 * 1024.0);
        assert_eq!(parse_memory_bytes("1Gi"), 1024.0 * 1024.0 * 1024.0);
        assert_eq!(parse_memory_bytes("1Ti"), 1024.0 * 1024.0 * 1024.0 * 1024.0);
        assert_eq!(parse_memory_bytes("2.5Mi"), 2.5 * 1024.0 * 1024.0);
    }

    #[test]
    fn test_parse_memory_decimal_suffixes() {
        assert_eq!(parse_memory_bytes("1K"), 1000.0);
        assert_eq!(parse_memory_bytes("1k"), 1000.0);
        assert_eq!(parse_memory_bytes("1M"), 1_000_000.0);
        assert_eq!(parse_memory_bytes("1G"), 1_000_000_000.0);
    }

    #[test]
    fn test_parse_memory_binary_wins_over_decimal() {
        // "Ki" must not be parsed as "K" with a dangling i
        assert_eq!(parse_memory_bytes("1Ki"), 1024.0);
        assert_eq!(parse_memory_bytes("1K"), 1000.0);
    }

    #[test]
    fn test_parse_memory_raw_bytes() {
        assert_eq!(parse_memory_bytes("1024"), 1024.0);
        assert_eq!(parse_memory_bytes("500"), 500.0);
        assert_eq!(parse_memory_bytes("0"), 0.0);
    }

    #[test]
    fn test_parse_memory_unparseable_degrades_to_zero() {
        assert_eq!(parse_memory_bytes(""), 0.0);
        assert_eq!(parse_memory_bytes("invalid"), 0.0);
        assert_eq!(parse_memory_bytes("100X"), 0.0);
    }
}
