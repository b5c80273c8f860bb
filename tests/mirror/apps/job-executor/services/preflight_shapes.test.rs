// [tests/mirror/apps/job-executor/services/preflight_shapes.test.rs]
/*!
 * =================================================================
 * APARATO: PREFLIGHT EVENT SHAPES TEST
 * CLASIFICACIÓN: INTEGRATION / STREAMING CONTRACT
 * RESPONSABILIDAD: CERTIFICACIÓN DE LOS EVENTOS SSE DEL PREFLIGHT
 *
 * # Logic:
 * El contrato SSE nombra los eventos 'progress', 'server_result',
 * 'done' y 'error'; el consumidor de la UI enruta por ese nombre y el
 * payload viaja intacto.
 * =================================================================
 */

#[cfg(test)]
mod tests {
    use infrasync_executor::services::preflight::PreflightEvent;
    use serde_json::json;

    #[test]
    fn event_names_match_the_sse_contract() {
        assert_eq!(PreflightEvent::Progress(json!({})).name(), "progress");
        assert_eq!(PreflightEvent::ServerResult(json!({})).name(), "server_result");
        assert_eq!(PreflightEvent::Done(json!({})).name(), "done");
        assert_eq!(PreflightEvent::Error(json!({})).name(), "error");
    }

    #[test]
    fn payload_travels_untouched() {
        let payload = json!({
            "current": 3,
            "total": 8,
            "percent": 37,
            "passed": 2,
            "failed": 1,
        });
        let event = PreflightEvent::Progress(payload.clone());
        assert_eq!(event.payload(), &payload);
    }

    #[test]
    fn done_event_carries_aggregate_fields() {
        let done = PreflightEvent::Done(json!({
            "success": true,
            "overall_ready": false,
            "blockers": [{"type": "pending_jobs", "server_id": "B", "message": "2 pending iDRAC job(s) must be cleared first"}],
        }));
        let payload = done.payload();
        assert_eq!(payload["overall_ready"], false);
        assert!(payload["blockers"][0]["message"]
            .as_str()
            .unwrap()
            .contains("2"));
    }
}
