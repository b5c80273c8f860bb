// [apps/job-executor/src/handlers/preflight_stream.rs]
/*!
 * =================================================================
 * APARATO: PREFLIGHT SSE HANDLER
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L1-APP)
 * RESPONSABILIDAD: STREAMING DEL PREFLIGHT VÍA SERVER-SENT EVENTS
 *
 * # Logic:
 * GET /api/preflight-check-stream?server_ids=a,b,c&firmware_source=...
 * Un escritor SSE por conexión; el motor de preflight empuja eventos
 * 'progress', 'server_result' y el 'done' final por un canal mpsc y
 * este handler los serializa como 'event:<name>\ndata:<json>\n\n'.
 * =================================================================
 */

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::services::preflight::{run_preflight, PreflightEvent};
use crate::state::AppState;

pub async fn preflight_check_stream(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let server_ids: Vec<String> = params
        .get("server_ids")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let firmware_source = params
        .get("firmware_source")
        .cloned()
        .unwrap_or_else(|| "local_repository".to_string());

    let (event_sender, event_receiver) = mpsc::channel::<PreflightEvent>(64);

    if server_ids.is_empty() {
        // Validación dentro del propio stream: el contrato SSE emite
        // un evento 'error' en lugar de un 400 tardío.
        let _ = event_sender
            .try_send(PreflightEvent::Error(json!({
                "error": "server_ids query parameter is required"
            })));
    } else {
        let state = state.clone();
        tokio::spawn(async move {
            let _ =
                run_preflight(&state, server_ids, &firmware_source, Some(event_sender)).await;
        });
    }

    let stream = ReceiverStream::new(event_receiver).map(|preflight_event| {
        let event = Event::default()
            .event(preflight_event.name())
            .data(preflight_event.payload().to_string());
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
