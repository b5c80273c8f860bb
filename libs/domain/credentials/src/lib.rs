// [libs/domain/credentials/src/lib.rs]
/*!
 * =================================================================
 * APARATO: CREDENTIAL DOMAIN LOGIC
 * CLASIFICACIÓN: DOMAIN LOGIC (ESTRATO L2)
 * RESPONSABILIDAD: REGLAS PURAS DE RANGOS IP Y PLANTILLAS SSH
 *
 * # Logic:
 * Sin I/O. La resolución ejecutable (cadena de prioridad contra la
 * base de datos) vive en la crate de persistencia; aquí viven las
 * reglas que esa cadena consulta: pertenencia a rangos (CIDR, A-B,
 * IP única), expansión de objetivos de escaneo y el emparejado difuso
 * de plantillas de appliance de replicación.
 * =================================================================
 */

pub mod fuzzy;
pub mod ip_range;

pub use fuzzy::{extract_site_prefix, is_replication_appliance, template_base_name};
pub use ip_range::{expand_ip_spec, ip_in_range, IpRangeError};
