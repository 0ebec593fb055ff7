//! Duration strings with Go-style units: ns, us (or µs), ms, s, m, h.

use std::time::Duration;

/// Parse a duration like `5s`, `300ms`, or `1h`. A unit is required.
pub fn parse(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let unit_start = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration {s:?}"))?;
    let (value, unit) = s.split_at(unit_start);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;

    match unit {
        "ns" => Ok(Duration::from_nanos(value)),
        "us" | "µs" => Ok(Duration::from_micros(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
        _ => Err(format!("unknown duration unit {unit:?} in {s:?}")),
    }
}
