// [libs/domain/credentials/src/fuzzy.rs]
/*!
 * =================================================================
 * APARATO: TEMPLATE FUZZY MATCHING
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: EMPAREJADO DIFUSO VM ↔ PLANTILLA DE APPLIANCE
 *
 * # Logic:
 * Reglas en orden: prefijo exacto del nombre base de la plantilla,
 * luego "prefijo de sitio + appliance de replicación" (S06-VREP-02
 * empareja con S06-VRP-TMP), luego cualquier plantilla con llave del
 * mismo vCenter.
 * =================================================================
 */

/// Marcadores que identifican un appliance de replicación por nombre.
const REPLICATION_MARKERS: [&str; 5] = ["VRP", "VREP", "REPL", "-REP-", "-REP"];

/// Sufijos de plantilla que se eliminan antes del emparejado por prefijo.
const TEMPLATE_SUFFIXES: [&str; 4] = ["-TMP", "-TEMPLATE", "_TMP", "_TEMPLATE"];

/// Extrae el prefijo de sitio "S##" de un nombre ("S06-VREP-02" → "S06").
pub fn extract_site_prefix(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    if bytes.len() >= 4
        && bytes[0].eq_ignore_ascii_case(&b'S')
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
        && bytes[3] == b'-'
    {
        Some(name[..3].to_uppercase())
    } else {
        None
    }
}

/// ¿El nombre contiene algún marcador de appliance de replicación?
pub fn is_replication_appliance(name: &str) -> bool {
    let upper = name.to_uppercase();
    REPLICATION_MARKERS.iter().any(|marker| upper.contains(marker))
}

/// Nombre base de una plantilla con los sufijos de plantilla eliminados.
pub fn template_base_name(template_name: &str) -> String {
    let mut base = template_name.to_string();
    for suffix in TEMPLATE_SUFFIXES {
        base = base.replace(suffix, "");
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_prefix_extraction() {
        assert_eq!(extract_site_prefix("S06-VREP-02").as_deref(), Some("S06"));
        assert_eq!(extract_site_prefix("s12-zfs-a").as_deref(), Some("S12"));
        assert_eq!(extract_site_prefix("SX6-VREP"), None);
        assert_eq!(extract_site_prefix("VREP-02"), None);
        assert_eq!(extract_site_prefix("S0"), None);
    }

    #[test]
    fn replication_markers_are_case_insensitive() {
        assert!(is_replication_appliance("S06-vrep-02"));
        assert!(is_replication_appliance("site-REPL-host"));
        assert!(is_replication_appliance("edge-rep-01".to_uppercase().as_str()));
        assert!(!is_replication_appliance("S06-WEB-01"));
    }

    #[test]
    fn template_suffixes_are_stripped() {
        assert_eq!(template_base_name("S06-VRP-TMP"), "S06-VRP");
        assert_eq!(template_base_name("S06-VRP-TEMPLATE"), "S06-VRP");
        assert_eq!(template_base_name("S06_VRP_TMP"), "S06_VRP");
        assert_eq!(template_base_name("plain"), "plain");
    }
}
