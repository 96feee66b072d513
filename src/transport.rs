//! Newline-delimited JSON over raw TCP. One Tokio task per connection; each
//! framed request is decoded, dispatched through the single shared
//! [`Coordinator`] behind its mutex, and the framed response written back.
//! Mirrors the teacher's `log_rejected`/`warn!` rejection style from
//! `api.rs`, adapted to a socket instead of an HTTP response.

use crate::state::AppState;
use crate::wire::{self, WireRequest, WireResponse};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Accepts connections on `state.bind_addr`-equivalent listener until
/// `shutdown` fires, spawning one task per connection.
pub async fn serve(listener: TcpListener, state: AppState, shutdown: CancellationToken) {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "listening");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let state = state.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, state, shutdown).await;
                            info!(%peer, "connection closed");
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: AppState, shutdown: CancellationToken) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) if !line.trim().is_empty() => line,
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read from connection");
                break;
            }
        };

        let response = dispatch_line(&line, &state).await;
        let mut payload = match serde_json::to_vec(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to serialize response");
                break;
            }
        };
        payload.push(b'\n');
        if write_half.write_all(&payload).await.is_err() || write_half.flush().await.is_err() {
            break;
        }
    }
}

async fn dispatch_line(line: &str, state: &AppState) -> WireResponse {
    let request: WireRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "request rejected: malformed JSON");
            return WireResponse::Error { status: "invalid_argument", error: e.to_string() };
        }
    };

    let mut coordinator = state.coordinator.lock().await;

    match request {
        WireRequest::GetMarkets => wire::markets_response(coordinator.get_markets()),
        WireRequest::GetSnapshot { market_id } => match wire::parse_market_id(&market_id) {
            Ok(market) => match coordinator.get_snapshot(&market) {
                Ok(snap) => wire::snapshot_response(snap),
                Err(e) => wire::error_response(&e),
            },
            Err(e) => wire::error_response(&e),
        },
        WireRequest::PlaceOrder { market_id, user_id, side, price, qty, id } => {
            match wire::parse_market_id(&market_id) {
                Ok(market) => match coordinator.place_order(market, side, price, qty, id, &user_id) {
                    Ok(outcome) => wire::place_order_response(outcome, coordinator.mapper()),
                    Err(e) => wire::error_response(&e),
                },
                Err(e) => wire::error_response(&e),
            }
        }
        WireRequest::CancelOrder { id, user_id } => match coordinator.cancel_order(id, &user_id) {
            Ok(outcome) => wire::cancel_order_response(outcome),
            Err(e) => wire::error_response(&e),
        },
        WireRequest::Balance { user_id } => wire::balance_response(coordinator.get_balance(&user_id)),
        WireRequest::ProofOfWalk { user_id, steps } => {
            let minted = coordinator.mint_by_activity(&user_id, wire::steps_to_cents(steps));
            WireResponse::Minted { minted: wire::cents_to_dollars(minted) }
        }
        WireRequest::DoomscrollBurn { user_id, minutes } => {
            let burned = coordinator.burn_by_usage(&user_id, wire::minutes_to_cents(minutes));
            WireResponse::Burned { burned: wire::cents_to_dollars(burned) }
        }
        WireRequest::Settle { target_user_id, actual_value } => {
            match coordinator.settle(&target_user_id, actual_value) {
                Ok(outcome) => wire::settle_response(outcome, coordinator.mapper()),
                Err(e) => wire::error_response(&e),
            }
        }
    }
}
