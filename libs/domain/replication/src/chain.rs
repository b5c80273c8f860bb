// [libs/domain/replication/src/chain.rs]
/*!
 * =================================================================
 * APARATO: SNAPSHOT CHAIN LOGIC
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: CADENA ORDENADA DE SNAPSHOTS Y BASE INCREMENTAL
 *
 * # Logic:
 * Los nombres de snapshot llevan un sello 'prefix-YYYYMMDD-HHMMSS',
 * así que el orden lexicográfico ES el orden temporal. La base
 * incremental preferente es el último snapshot usado; si falta en
 * alguno de los dos lados, se recupera con el snapshot común más
 * reciente.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use infrasync_domain_models::replication::SnapshotInfo;

use crate::sizes::parse_zfs_size_to_bytes;

/// Genera un nombre de snapshot sellado con la hora UTC dada.
pub fn generate_snapshot_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, at.format("%Y%m%d-%H%M%S"))
}

/// Parsea la salida de 'zfs list -t snapshot -H -o name,creation,used,referenced'.
/// Cada línea válida trae cuatro campos separados por tabulador.
pub fn parse_snapshot_list(stdout: &str) -> Vec<SnapshotInfo> {
    let mut snapshots = Vec::new();

    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 4 {
            continue;
        }

        let full_name = parts[0].to_string();
        let name = full_name
            .rsplit_once('@')
            .map(|(_, short)| short.to_string())
            .unwrap_or_else(|| full_name.clone());

        snapshots.push(SnapshotInfo {
            name,
            full_name,
            created_at: parts[1].to_string(),
            used_bytes: parse_zfs_size_to_bytes(parts[2]),
            referenced_bytes: parse_zfs_size_to_bytes(parts[3]),
        });
    }

    snapshots
}

/// Snapshot común más reciente entre dos cadenas (por nombre).
pub fn newest_common_snapshot(
    source_names: &[String],
    target_names: &[String],
) -> Option<String> {
    source_names
        .iter()
        .filter(|name| target_names.contains(name))
        .max()
        .cloned()
}

/// Selecciona la base incremental para una replicación.
///
/// Preferencia: el último snapshot usado, si sigue presente en ambos
/// lados. Recuperación: el snapshot común más reciente. Ninguno → None
/// (envío completo tras re-sembrar el target).
pub fn select_incremental_base(
    preferred: Option<&str>,
    source_names: &[String],
    target_names: &[String],
) -> Option<String> {
    if let Some(candidate) = preferred {
        let on_source = source_names.iter().any(|name| name == candidate);
        let on_target = target_names.iter().any(|name| name == candidate);
        if on_source && on_target {
            return Some(candidate.to_string());
        }
    }

    newest_common_snapshot(source_names, target_names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn names(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|entry| entry.to_string()).collect()
    }

    #[test]
    fn snapshot_names_sort_by_embedded_timestamp() {
        let stamp = Utc.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(
            generate_snapshot_name("zerfaux", stamp),
            "zerfaux-20250314-150926"
        );
    }

    #[test]
    fn common_snapshot_is_newest_on_both_sides() {
        let source = names(&["zerfaux-20250101-000000", "zerfaux-20250201-000000"]);
        let target = names(&[
            "zerfaux-20241215-000000",
            "zerfaux-20250101-000000",
            "zerfaux-20250201-000000",
        ]);
        assert_eq!(
            newest_common_snapshot(&source, &target).as_deref(),
            Some("zerfaux-20250201-000000")
        );
    }

    #[test]
    fn disjoint_chains_have_no_common_snapshot() {
        let source = names(&["zerfaux-20250101-000000"]);
        let target = names(&["zerfaux-20250102-000000"]);
        assert_eq!(newest_common_snapshot(&source, &target), None);
    }

    #[test]
    fn missing_preferred_base_recovers_via_common_snapshot() {
        // Escenario: last_snapshot=snapX; fuente=[snapX, snapY]; target=[snapW, snapY].
        let source = names(&["zerfaux-20250110-000000", "zerfaux-20250120-000000"]);
        let target = names(&["zerfaux-20250105-000000", "zerfaux-20250120-000000"]);

        let base = select_incremental_base(
            Some("zerfaux-20250110-000000"),
            &source,
            &target,
        );
        assert_eq!(base.as_deref(), Some("zerfaux-20250120-000000"));
    }

    #[test]
    fn preferred_base_wins_when_present_on_both_sides() {
        let source = names(&["a-20250101-000000", "a-20250201-000000"]);
        let target = names(&["a-20250101-000000", "a-20250201-000000"]);
        let base = select_incremental_base(Some("a-20250101-000000"), &source, &target);
        assert_eq!(base.as_deref(), Some("a-20250101-000000"));
    }

    #[test]
    fn snapshot_list_parses_tab_separated_rows() {
        let stdout = "tank/vm1@zerfaux-20250101-000000\tWed Jan  1 00:00 2025\t1.5G\t10G\n\
                      tank/vm1@zerfaux-20250201-000000\tSat Feb  1 00:00 2025\t0\t10G\n";
        let snapshots = parse_snapshot_list(stdout);
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "zerfaux-20250101-000000");
        assert_eq!(snapshots[0].full_name, "tank/vm1@zerfaux-20250101-000000");
        assert_eq!(snapshots[0].used_bytes, (1.5 * (1u64 << 30) as f64) as u64);
        assert_eq!(snapshots[1].used_bytes, 0);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let snapshots = parse_snapshot_list("garbage line\n\n");
        assert!(snapshots.is_empty());
    }
}
