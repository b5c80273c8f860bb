// [libs/domain/replication/src/sizes.rs]
/*!
 * =================================================================
 * APARATO: ZFS SIZE PARSERS
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: PARSEO DE TAMAÑOS EN LOS DIALECTOS DE 'zfs send'
 *
 * # Logic:
 * Dos superficies distintas de parseo:
 *  - 'zfs send -v' (salida de una transferencia real): cadena de siete
 *    patrones por especificidad, terminando en "el entero más grande
 *    de 6+ dígitos" como red de seguridad.
 *  - 'zfs send -nP' (estimación sin envío): cuatro formatos según la
 *    versión de OpenZFS (tab 'size\tN', 'full|incremental ... N',
 *    'estimated size is N', número crudo).
 * =================================================================
 */

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Multiplicador binario para un sufijo de unidad ZFS.
fn unit_multiplier(unit: &str) -> u64 {
    match unit.to_ascii_uppercase().as_str() {
        "T" => 1u64 << 40,
        "G" => 1u64 << 30,
        "M" => 1u64 << 20,
        "K" => 1u64 << 10,
        _ => 1,
    }
}

fn case_insensitive_multiline(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .unwrap_or_else(|_| Regex::new("$^").unwrap())
}

/// Patrones de 'zfs send -v', ordenados por especificidad.
static TRANSFER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // "estimated size is 26.7G"
        case_insensitive_multiline(r"estimated size is\s+(\d+\.?\d*)\s*([TGMKB])"),
        // "total estimated size is 26.7G"
        case_insensitive_multiline(r"total estimated size is\s+(\d+\.?\d*)\s*([TGMKB])"),
        // Línea final: "26.7G  pool/dataset@snap"
        case_insensitive_multiline(r"^(\d+\.?\d*)\s*([TGMKB])\s+\S+@\S+"),
        // "sent 26.7G"
        case_insensitive_multiline(r"sent\s+(\d+\.?\d*)\s*([TGMKB])"),
        // "26.7GB bytes" / "26.7G bytes"
        case_insensitive_multiline(r"(\d+\.?\d*)\s*([TGMKB])B?\s*bytes?"),
        // Conteo crudo: "size is 123456789"
        case_insensitive_multiline(r"size\s+is\s+(\d+)\s*$"),
    ]
});

static LARGE_INTEGER: Lazy<Regex> = Lazy::new(|| case_insensitive_multiline(r"\b(\d{6,})\b"));

static ESTIMATED_RAW: Lazy<Regex> =
    Lazy::new(|| case_insensitive_multiline(r"estimated size[^0-9]*(\d+)"));

/// Parsea los bytes transferidos desde la salida de 'zfs send -v'.
///
/// Devuelve 0 para entradas vacías o puramente de espacios; si ningún
/// patrón con prefijo reconocido aplica, devuelve el mayor entero de
/// 6+ dígitos presente en la salida.
pub fn parse_transfer_size(output: &str) -> u64 {
    if output.trim().is_empty() {
        return 0;
    }

    for pattern in TRANSFER_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(output) {
            let magnitude: f64 = captures
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0.0);
            let unit = captures.get(2).map(|m| m.as_str()).unwrap_or("");
            let bytes = (magnitude * unit_multiplier(unit) as f64) as u64;
            if bytes > 0 {
                return bytes;
            }
        }
    }

    LARGE_INTEGER
        .captures_iter(output)
        .filter_map(|captures| captures.get(1).and_then(|m| m.as_str().parse::<u64>().ok()))
        .max()
        .unwrap_or(0)
}

/// Parsea la estimación de 'zfs send -nP'. Cuatro formatos por versión:
///
/// 1. OpenZFS 2.x: "size\t11273642128" (último token entero).
/// 2. "full\tpool/ds@snap\t123456" o "incremental\t...\tN".
/// 3. ZFS antiguo: "estimated size is 123456789".
/// 4. Red de seguridad: mayor entero de 6+ dígitos.
pub fn parse_send_size_output(stdout: &str) -> Option<u64> {
    for line in stdout.lines() {
        let stripped = line.trim();

        if stripped.starts_with("size") {
            let parts: Vec<&str> = stripped.split_whitespace().collect();
            if parts.len() >= 2 {
                if let Ok(size_bytes) = parts[parts.len() - 1].parse::<u64>() {
                    return Some(size_bytes);
                }
            }
        }

        if stripped.starts_with("full") || stripped.starts_with("incremental") {
            let parts: Vec<&str> = stripped.split_whitespace().collect();
            if parts.len() >= 3 {
                if let Ok(size_bytes) = parts[parts.len() - 1].parse::<u64>() {
                    return Some(size_bytes);
                }
            }
        }
    }

    if let Some(captures) = ESTIMATED_RAW.captures(stdout) {
        if let Ok(size_bytes) = captures[1].parse::<u64>() {
            return Some(size_bytes);
        }
    }

    LARGE_INTEGER
        .captures_iter(stdout)
        .filter_map(|captures| captures.get(1).and_then(|m| m.as_str().parse::<u64>().ok()))
        .max()
}

/// Parsea un tamaño humano de 'zfs list' ("1.5T", "500G", "12.3M") a bytes.
pub fn parse_zfs_size_to_bytes(size_text: &str) -> u64 {
    let trimmed = size_text.trim().to_ascii_uppercase();
    if trimmed.is_empty() || trimmed == "0" || trimmed == "NONE" || trimmed == "-" {
        return 0;
    }

    let (digits, unit) = match trimmed.char_indices().last() {
        Some((index, last)) if last.is_ascii_alphabetic() => {
            (&trimmed[..index], &trimmed[index..])
        }
        _ => (trimmed.as_str(), ""),
    };

    let magnitude: f64 = digits.trim().parse().unwrap_or(0.0);
    (magnitude * unit_multiplier(unit) as f64) as u64
}

/// Ventana de timeout dinámica por tamaño esperado de transferencia:
/// < 1 MB → 120 s; < 1 GB → 600 s; grande o desconocido → 3600 s.
pub fn transfer_timeout_for(expected_bytes: u64) -> Duration {
    if expected_bytes > 0 && expected_bytes < 1_000_000 {
        Duration::from_secs(120)
    } else if expected_bytes > 0 && expected_bytes < 1_000_000_000 {
        Duration::from_secs(600)
    } else {
        Duration::from_secs(3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_size_line_parses() {
        let output = "full send of tank/vm1@snap estimated size is 26.7G\n";
        assert_eq!(parse_transfer_size(output), (26.7 * (1u64 << 30) as f64) as u64);
    }

    #[test]
    fn trailing_summary_line_parses() {
        let output = "1.2M\ttank/vm1@zerfaux-20250101-000000";
        assert_eq!(parse_transfer_size(output), (1.2 * (1u64 << 20) as f64) as u64);
    }

    #[test]
    fn sent_form_parses() {
        assert_eq!(parse_transfer_size("sent 3G in 12 seconds"), 3 * (1u64 << 30));
    }

    #[test]
    fn raw_size_is_form_parses() {
        assert_eq!(parse_transfer_size("size is 123456789"), 123_456_789);
    }

    #[test]
    fn empty_and_whitespace_return_zero() {
        assert_eq!(parse_transfer_size(""), 0);
        assert_eq!(parse_transfer_size("   \n\t  "), 0);
    }

    #[test]
    fn falls_back_to_largest_large_integer() {
        let output = "warning: something 123 happened\ntotal 11273642128 frames 999999";
        assert_eq!(parse_transfer_size(output), 11_273_642_128);
    }

    #[test]
    fn small_integers_do_not_qualify_for_fallback() {
        assert_eq!(parse_transfer_size("exit 0 after 42 tries"), 0);
    }

    #[test]
    fn send_size_tab_format() {
        let stdout = "full\ttank/vm1@snap\t11273642128\nsize\t11273642128\n";
        assert_eq!(parse_send_size_output(stdout), Some(11_273_642_128));
    }

    #[test]
    fn send_size_full_line_format() {
        let stdout = "incremental\t@base\ttank/vm1@snap\t52428800\n";
        assert_eq!(parse_send_size_output(stdout), Some(52_428_800));
    }

    #[test]
    fn send_size_estimated_format() {
        assert_eq!(
            parse_send_size_output("estimated size is 987654321\n"),
            Some(987_654_321)
        );
    }

    #[test]
    fn send_size_fallback_number() {
        assert_eq!(parse_send_size_output("noise 44556677 noise"), Some(44_556_677));
        assert_eq!(parse_send_size_output("nothing here"), None);
    }

    #[test]
    fn zfs_human_sizes() {
        assert_eq!(parse_zfs_size_to_bytes("1.5T"), (1.5 * (1u64 << 40) as f64) as u64);
        assert_eq!(parse_zfs_size_to_bytes("500G"), 500 * (1u64 << 30));
        assert_eq!(parse_zfs_size_to_bytes("0"), 0);
        assert_eq!(parse_zfs_size_to_bytes("-"), 0);
        assert_eq!(parse_zfs_size_to_bytes("garbage"), 0);
    }

    #[test]
    fn timeout_tiers() {
        assert_eq!(transfer_timeout_for(512_000), Duration::from_secs(120));
        assert_eq!(transfer_timeout_for(500_000_000), Duration::from_secs(600));
        assert_eq!(transfer_timeout_for(5_000_000_000), Duration::from_secs(3600));
        assert_eq!(transfer_timeout_for(0), Duration::from_secs(3600));
    }
}
