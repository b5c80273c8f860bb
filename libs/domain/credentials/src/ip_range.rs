// [libs/domain/credentials/src/ip_range.rs]
/*!
 * =================================================================
 * APARATO: IP RANGE RULES
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: PERTENENCIA Y EXPANSIÓN DE RANGOS IP
 *
 * # Logic:
 * Tres gramáticas de rango: CIDR ("10.0.0.0/24"), rango con guion
 * inclusivo ("10.0.0.1-10.0.0.50") e IP única. La expansión alimenta
 * al motor de descubrimiento; la pertenencia alimenta la cadena de
 * resolución de credenciales.
 * =================================================================
 */

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnet::IpNet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpRangeError {
    #[error("[L2_IPRANGE_FAULT]: INVALID_RANGE_FORMAT -> {0}")]
    InvalidRange(String),

    #[error("[L2_IPRANGE_FAULT]: INVALID_ADDRESS -> {0}")]
    InvalidAddress(String),

    #[error("[L2_IPRANGE_FAULT]: EMPTY_TARGET_SET -> provide ip_range or ip_list")]
    EmptyTargetSet,

    #[error("[L2_IPRANGE_FAULT]: RANGE_BOUNDS_INVERTED -> {0}")]
    InvertedBounds(String),
}

/// ¿Pertenece 'ip_address' al rango dado? Rangos malformados cuentan
/// como no-pertenencia (la cadena de credenciales sigue con el resto).
pub fn ip_in_range(ip_address: &str, ip_range: &str) -> bool {
    let Ok(candidate) = IpAddr::from_str(ip_address.trim()) else {
        return false;
    };

    let range = ip_range.trim();

    // Notación CIDR.
    if range.contains('/') {
        return match IpNet::from_str(range) {
            Ok(network) => network.contains(&candidate),
            Err(_) => false,
        };
    }

    // Rango con guion, inclusivo en ambos extremos.
    if let Some((start_text, end_text)) = range.split_once('-') {
        let (Ok(start), Ok(end)) = (
            IpAddr::from_str(start_text.trim()),
            IpAddr::from_str(end_text.trim()),
        ) else {
            return false;
        };
        return start <= candidate && candidate <= end;
    }

    // IP única.
    IpAddr::from_str(range).map(|single| single == candidate).unwrap_or(false)
}

/// Expande una especificación de objetivos a la lista plana de IPs a
/// escanear. 'ip_list' tiene precedencia sobre 'ip_range'.
///
/// Reglas de borde: un CIDR /32 expande a una sola IP; un rango "A-A"
/// expande a una sola IP; una especificación vacía es un fallo de
/// validación antes de arrancar cualquier worker.
pub fn expand_ip_spec(
    ip_range: Option<&str>,
    ip_list: Option<&[String]>,
) -> Result<Vec<String>, IpRangeError> {
    if let Some(list) = ip_list {
        if !list.is_empty() {
            let mut targets = Vec::with_capacity(list.len());
            for entry in list {
                let trimmed = entry.trim();
                IpAddr::from_str(trimmed)
                    .map_err(|_| IpRangeError::InvalidAddress(trimmed.to_string()))?;
                targets.push(trimmed.to_string());
            }
            return Ok(targets);
        }
    }

    let Some(range) = ip_range.map(str::trim).filter(|range| !range.is_empty()) else {
        return Err(IpRangeError::EmptyTargetSet);
    };

    if range.contains('/') {
        let network = IpNet::from_str(range)
            .map_err(|_| IpRangeError::InvalidRange(range.to_string()))?;
        let targets: Vec<String> = network.hosts().map(|host| host.to_string()).collect();
        if targets.is_empty() {
            return Err(IpRangeError::EmptyTargetSet);
        }
        return Ok(targets);
    }

    if let Some((start_text, end_text)) = range.split_once('-') {
        let start = Ipv4Addr::from_str(start_text.trim())
            .map_err(|_| IpRangeError::InvalidAddress(start_text.trim().to_string()))?;
        let end = Ipv4Addr::from_str(end_text.trim())
            .map_err(|_| IpRangeError::InvalidAddress(end_text.trim().to_string()))?;

        let start_value = u32::from(start);
        let end_value = u32::from(end);
        if start_value > end_value {
            return Err(IpRangeError::InvertedBounds(range.to_string()));
        }

        let targets: Vec<String> = (start_value..=end_value)
            .map(|value| Ipv4Addr::from(value).to_string())
            .collect();
        return Ok(targets);
    }

    // IP única.
    IpAddr::from_str(range).map_err(|_| IpRangeError::InvalidAddress(range.to_string()))?;
    Ok(vec![range.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_membership() {
        assert!(ip_in_range("10.0.0.7", "10.0.0.0/24"));
        assert!(!ip_in_range("10.0.1.7", "10.0.0.0/24"));
    }

    #[test]
    fn hyphen_range_is_inclusive() {
        assert!(ip_in_range("192.168.1.1", "192.168.1.1-192.168.1.50"));
        assert!(ip_in_range("192.168.1.50", "192.168.1.1-192.168.1.50"));
        assert!(!ip_in_range("192.168.1.51", "192.168.1.1-192.168.1.50"));
    }

    #[test]
    fn single_ip_and_garbage() {
        assert!(ip_in_range("10.0.0.5", "10.0.0.5"));
        assert!(!ip_in_range("10.0.0.5", "10.0.0.6"));
        assert!(!ip_in_range("10.0.0.5", "not-a-range"));
        assert!(!ip_in_range("banana", "10.0.0.0/8"));
    }

    #[test]
    fn slash_32_expands_to_single_ip() {
        let targets = expand_ip_spec(Some("10.0.0.5/32"), None).unwrap();
        assert_eq!(targets, vec!["10.0.0.5"]);
    }

    #[test]
    fn degenerate_hyphen_range_expands_to_single_ip() {
        let targets = expand_ip_spec(Some("10.0.0.9-10.0.0.9"), None).unwrap();
        assert_eq!(targets, vec!["10.0.0.9"]);
    }

    #[test]
    fn cidr_expansion_excludes_network_and_broadcast() {
        let targets = expand_ip_spec(Some("10.1.2.0/30"), None).unwrap();
        assert_eq!(targets, vec!["10.1.2.1", "10.1.2.2"]);
    }

    #[test]
    fn ip_list_takes_precedence() {
        let list = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        let targets = expand_ip_spec(Some("10.9.9.0/24"), Some(&list)).unwrap();
        assert_eq!(targets, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn empty_spec_is_a_validation_error() {
        assert!(matches!(
            expand_ip_spec(None, None),
            Err(IpRangeError::EmptyTargetSet)
        ));
        assert!(matches!(
            expand_ip_spec(Some("  "), Some(&[])),
            Err(IpRangeError::EmptyTargetSet)
        ));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert!(matches!(
            expand_ip_spec(Some("10.0.0.9-10.0.0.1"), None),
            Err(IpRangeError::InvertedBounds(_))
        ));
    }
}
