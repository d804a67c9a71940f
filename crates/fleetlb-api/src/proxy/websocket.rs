//! WebSocket upgrade splice (spec §4.H step 9): the downstream client talks
//! axum's WebSocket to us, we talk `tokio-tungstenite` to the chosen worker,
//! and frames are copied between the two until either side closes.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequest, Request};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;

/// Performs the axum-side upgrade, then spawns the splice once both legs are
/// connected. `target` is a `ws://`/`wss://` URL built from the worker's
/// matched endpoint route.
pub async fn upgrade(request: Request, target: String, client_ip: String, hostname: String) -> Response {
    let ws = match WebSocketUpgrade::from_request(request, &()).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| async move {
        if let Err(err) = splice(socket, &target, &client_ip, &hostname).await {
            tracing::warn!(target, error = %err, "websocket upstream splice ended");
        }
    })
}

async fn splice(downstream: WebSocket, target: &str, client_ip: &str, hostname: &str) -> Result<(), String> {
    let mut request = target
        .into_client_request()
        .map_err(|e| format!("invalid upstream websocket url: {e}"))?;
    request
        .headers_mut()
        .insert("x-lb-client-id", client_ip.parse().map_err(|_| "invalid client ip header value".to_string())?);
    request
        .headers_mut()
        .insert("x-lb-hostname", hostname.parse().map_err(|_| "invalid hostname header value".to_string())?);

    let (upstream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| format!("upstream websocket connect failed: {e}"))?;

    let (mut down_tx, mut down_rx) = downstream.split();
    let (mut up_tx, mut up_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(msg)) = down_rx.next().await {
            let done = matches!(msg, Message::Close(_));
            if up_tx.send(to_upstream_message(msg)).await.is_err() || done {
                break;
            }
        }
        let _ = up_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(Ok(msg)) = up_rx.next().await {
            let done = matches!(msg, UpstreamMessage::Close(_));
            if down_tx.send(to_downstream_message(msg)).await.is_err() || done {
                break;
            }
        }
        let _ = down_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
    Ok(())
}

fn to_upstream_message(msg: Message) -> UpstreamMessage {
    match msg {
        Message::Text(t) => UpstreamMessage::Text(t.as_str().into()),
        Message::Binary(b) => UpstreamMessage::Binary(b),
        Message::Ping(b) => UpstreamMessage::Ping(b),
        Message::Pong(b) => UpstreamMessage::Pong(b),
        Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| tokio_tungstenite::tungstenite::protocol::CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        })),
    }
}

fn to_downstream_message(msg: UpstreamMessage) -> Message {
    match msg {
        UpstreamMessage::Text(t) => Message::Text(t.as_str().into()),
        UpstreamMessage::Binary(b) => Message::Binary(b),
        UpstreamMessage::Ping(b) => Message::Ping(b),
        UpstreamMessage::Pong(b) => Message::Pong(b),
        UpstreamMessage::Close(frame) => Message::Close(frame.map(|f| axum::extract::ws::CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        })),
        UpstreamMessage::Frame(_) => Message::Ping(Vec::new().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_parses_as_client_request() {
        let req = "ws://127.0.0.1:9000/v1/stream".into_client_request();
        assert!(req.is_ok());
    }
}
