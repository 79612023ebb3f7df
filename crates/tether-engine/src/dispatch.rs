use tether_core::errors::EngineError;
use tether_core::frames::ServerFrame;
use tether_core::ids::SessionId;
use tether_core::message::{ChatMessage, DeliveryStatus, Role, Sender};
use tether_store::ChatStore;

/// What applying a frame asked of the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Store mutations applied; nothing else to do.
    Applied,
    /// Frame belonged to no resolvable stream and was dropped.
    Ignored,
    /// A turn finished; the caller should refresh this session's summary
    /// through the backend.
    SessionRefresh(SessionId),
}

#[derive(Clone, Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unrecognized frame type")]
    UnknownFrame,
}

/// Apply one inbound frame to the store. Pure dispatch: every branch is a
/// store mutation, and the function never performs I/O.
///
/// Frames name their session explicitly or inherit the channel's active
/// stream. A frame naming a different session than the active stream belongs
/// to a turn the user already navigated away from and is dropped. A frame
/// naming a session while no stream is active still lands in that session's
/// ledger; background delivery is intentional.
pub fn apply_frame(
    store: &mut ChatStore,
    frame: ServerFrame,
) -> Result<FrameOutcome, ProtocolError> {
    if matches!(frame, ServerFrame::Unknown) {
        return Err(ProtocolError::UnknownFrame);
    }

    let Some(target) = resolve_session(store, &frame) else {
        return Ok(FrameOutcome::Ignored);
    };

    match frame {
        ServerFrame::Message {
            id,
            agent_id,
            agent_name,
            content,
            timestamp,
            ..
        } => {
            let message = ChatMessage {
                id,
                session_id: target.clone(),
                sender: Sender::Agent,
                role: Role::Assistant,
                content,
                created_at: timestamp.unwrap_or_else(chrono::Utc::now),
                // Pending finalization by a later completion frame.
                status: DeliveryStatus::Sent,
                is_streaming: true,
                sequence: None,
                agent_id,
                agent_name,
                feedback: None,
                error: None,
            };
            store.upsert_message(message);
            store.mark_latest_pending_user_message(&target, DeliveryStatus::Delivered);
            store.clear_typing();
            Ok(FrameOutcome::Applied)
        }

        ServerFrame::Typing { data, .. } => {
            if data.is_typing {
                store.set_typing(data.agent_name);
            } else {
                store.clear_typing();
            }
            Ok(FrameOutcome::Applied)
        }

        ServerFrame::StreamChunk {
            message_id,
            chunk,
            agent_id,
            agent_name,
            ..
        } => {
            store.append_stream_chunk(&target, &message_id, &chunk, agent_id, agent_name);
            Ok(FrameOutcome::Applied)
        }

        ServerFrame::MessageCompleted { message_id, .. } => {
            store.finalize_stream_message(&target, &message_id);
            store.mark_latest_pending_user_message(&target, DeliveryStatus::Delivered);
            store.clear_typing();
            if store.active_stream() == Some(&target) {
                store.set_active_stream(None);
            }
            Ok(FrameOutcome::SessionRefresh(target))
        }

        ServerFrame::Error { data, .. } => {
            store.mark_latest_pending_user_message(&target, DeliveryStatus::Error);
            store.clear_typing();
            if store.active_stream() == Some(&target) {
                store.set_active_stream(None);
            }
            let message = data
                .message
                .unwrap_or_else(|| "agent reported an error".to_string());
            store.report_error(&EngineError::WebsocketMessageError(message));
            Ok(FrameOutcome::Applied)
        }

        ServerFrame::Unknown => unreachable!("handled above"),
    }
}

fn resolve_session(store: &ChatStore, frame: &ServerFrame) -> Option<SessionId> {
    match (frame.session_id(), store.active_stream()) {
        (Some(named), Some(marked)) if named == marked => Some(named.clone()),
        // A stream the user has since navigated away from.
        (Some(_), Some(_)) => None,
        (Some(named), None) => Some(named.clone()),
        (None, Some(marked)) => Some(marked.clone()),
        (None, None) => None,
    }
}
