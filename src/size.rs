//! Human-readable byte sizes ("4GiB", "512M", "1.5 GB").

use anyhow::{bail, Result};

/// Parse a human-readable size into bytes.
///
/// Accepted shape: a number (optionally fractional), an optional single
/// space, then an optional unit letter `k m g t p` (any case), an optional
/// `i`, and an optional `b`/`B`. `G`/`GB` are powers of 1000, `GiB` is a
/// power of 1024. A bare number is bytes.
pub fn parse_human_size(input: &str) -> Result<u64> {
    let raw = input.trim();
    if raw.is_empty() {
        bail!("empty size");
    }

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);
    let suffix = suffix.strip_prefix(' ').unwrap_or(suffix);

    if number.is_empty() || number.starts_with('.') || number.ends_with('.') {
        bail!("invalid size '{}'", input);
    }
    if number.matches('.').count() > 1 {
        bail!("invalid size '{}'", input);
    }
    let value: f64 = number
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid size '{}'", input))?;

    let multiplier = unit_multiplier(suffix)
        .ok_or_else(|| anyhow::anyhow!("invalid size suffix '{}' in '{}'", suffix, input))?;

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes > u64::MAX as f64 {
        bail!("size '{}' is too large", input);
    }
    Ok(bytes as u64)
}

fn unit_multiplier(suffix: &str) -> Option<u64> {
    let mut chars = suffix.chars();
    let unit = match chars.next() {
        None => return Some(1),
        Some('b') | Some('B') if suffix.len() == 1 => return Some(1),
        Some(c) => c.to_ascii_lowercase(),
    };

    let exponent = match unit {
        'k' => 1,
        'm' => 2,
        'g' => 3,
        't' => 4,
        'p' => 5,
        _ => return None,
    };

    let rest: String = chars.collect();
    let binary = match rest.as_str() {
        "" | "b" | "B" => false,
        "i" | "I" | "ib" | "iB" | "Ib" | "IB" => true,
        _ => return None,
    };

    let base: u64 = if binary { 1024 } else { 1000 };
    Some(base.pow(exponent))
}
