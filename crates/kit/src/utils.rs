use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;

/// Bytes per unit for the memory suffixes we accept.
///
/// Single letters and the `iB` forms are binary (powers of 1024), matching
/// what QEMU's own `-m` parser does; the `B` forms are decimal.
fn unit_to_bytes(unit: &str) -> Option<u128> {
    match unit {
        "" | "M" | "MiB" => Some(1024u128.pow(2)),
        "K" | "KiB" => Some(1024),
        "G" | "GiB" => Some(1024u128.pow(3)),
        "T" | "TiB" => Some(1024u128.pow(4)),

        "KB" => Some(1_000),
        "MB" => Some(1_000u128.pow(2)),
        "GB" => Some(1_000u128.pow(3)),
        "TB" => Some(1_000u128.pow(4)),

        _ => None,
    }
}

/// Parse a memory string (like "2G", "1024M", "512") to megabytes
pub(crate) fn parse_memory_to_mb(memory_str: &str) -> Result<u32> {
    let memory_str = memory_str.trim();

    if memory_str.is_empty() {
        return Err(eyre!("Memory string cannot be empty"));
    }

    let split = memory_str
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(memory_str.len());
    let (number_str, unit) = memory_str.split_at(split);
    // Lowercase single-letter suffixes are accepted too
    let unit = match unit {
        "k" | "m" | "g" | "t" => unit.to_ascii_uppercase(),
        u => u.to_owned(),
    };

    let number: f64 = number_str
        .trim()
        .parse()
        .context("Invalid number in memory specification")?;
    if !number.is_finite() || number < 0.0 {
        return Err(eyre!("Memory size must be a positive number: {memory_str}"));
    }

    let bytes_per_unit =
        unit_to_bytes(&unit).ok_or_else(|| eyre!("Unknown memory unit: {}", unit))? as f64;

    let mib = 1024.0 * 1024.0;
    let total_mb = (number * bytes_per_unit) / mib;
    if total_mb > u32::MAX as f64 {
        return Err(eyre!("Memory size too large: {memory_str}"));
    }

    Ok(total_mb as u32)
}
