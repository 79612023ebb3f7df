use tether_api::types::FeedbackUpsert;
use tether_api::Backend;
use tether_core::errors::EngineError;
use tether_core::ids::{MessageId, SessionId};
use tether_core::message::Feedback;

use crate::engine::ChatEngine;

/// Feedback is applied optimistically and rolled back to the prior value if
/// the backend call fails.
impl ChatEngine {
    pub async fn set_feedback(
        &self,
        session_id: &SessionId,
        message_id: &MessageId,
        feedback: Option<Feedback>,
    ) -> Result<(), EngineError> {
        let (prior, agent_id) = {
            let mut store = self.store.lock();
            let prior = store.apply_feedback(session_id, message_id, feedback);
            let agent_id = store
                .messages(session_id)
                .iter()
                .find(|m| m.id == *message_id)
                .and_then(|m| m.agent_id.clone());
            (prior, agent_id)
        };
        // Unknown message: nothing was changed, nothing to persist.
        let Some(prior) = prior else {
            return Ok(());
        };

        let request = FeedbackUpsert::new(
            session_id.clone(),
            message_id.clone(),
            agent_id,
            feedback,
        );
        match self.backend.upsert_feedback(request).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = EngineError::FeedbackFailed(e.to_string());
                let mut store = self.store.lock();
                store.apply_feedback(session_id, message_id, prior);
                store.report_error(&err);
                Err(err)
            }
        }
    }
}
