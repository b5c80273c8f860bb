// [libs/domain/models/src/wire.rs]
/*!
 * =================================================================
 * APARATO: WIRE COERCION
 * CLASIFICACIÓN: DOMAIN UTILITY (ESTRATO L2)
 * RESPONSABILIDAD: COACCIÓN DE CUERPOS ARBITRARIOS A JSON UTILIZABLE
 *
 * # Logic:
 * Ningún parser aguas abajo debe reventar por una respuesta
 * malformada: lo no-JSON se envuelve con '_raw_response'. Los cuerpos
 * que comienzan con '<SystemConfiguration' son la peculiaridad de los
 * exports SCP de Dell y se sintetizan como tarea completada.
 * =================================================================
 */

use serde_json::{json, Value};

/// Límite de texto crudo preservado en '_raw_response'.
pub const RAW_RESPONSE_CAP: usize = 500;

/// Coacciona un cuerpo arbitrario a JSON utilizable.
pub fn coerce_json(raw_body: &str) -> Value {
    match serde_json::from_str::<Value>(raw_body) {
        Ok(value) => value,
        Err(_) => {
            let truncated: String = raw_body.chars().take(RAW_RESPONSE_CAP).collect();
            let stripped = truncated.trim();

            if stripped.starts_with("<SystemConfiguration") {
                json!({
                    "TaskState": "Completed",
                    "PercentComplete": 100,
                    "Messages": [{"Message": stripped}],
                    "_raw_response": truncated,
                    "_parse_error": "Response returned XML instead of JSON"
                })
            } else {
                json!({
                    "_raw_response": truncated,
                    "_parse_error": "Not valid JSON"
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_json_passes_through() {
        assert!(coerce_json("[1,2,3]").is_array());
    }

    #[test]
    fn garbage_is_wrapped() {
        let value = coerce_json("<<<nope>>>");
        assert_eq!(value["_parse_error"], "Not valid JSON");
    }

    #[test]
    fn scp_xml_synthesizes_completed_task() {
        let value = coerce_json("<SystemConfiguration Model=\"R740\">");
        assert_eq!(value["TaskState"], "Completed");
    }
}
