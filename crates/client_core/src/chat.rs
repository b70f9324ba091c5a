//! Ordered conversation log. Each turn is inserted loading and receives
//! exactly one terminal update, matched by id.

use shared::{
    domain::{ConversationTurn, TurnId},
    protocol::AnswerResponse,
};

use crate::error::{ClientError, ClientResult};

pub const ANSWER_FAILURE_MESSAGE: &str = "Sorry, failed to get an answer. Please try again.";

#[derive(Debug, Default)]
pub struct ChatLog {
    turns: Vec<ConversationTurn>,
    in_flight: Option<TurnId>,
    last_id: i64,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Millisecond clock reading, bumped past the previous id when two
    /// submissions land in the same millisecond.
    fn next_id(&mut self, now_ms: i64) -> TurnId {
        self.last_id = now_ms.max(self.last_id + 1);
        TurnId(self.last_id)
    }

    /// Appends a loading turn. Only one question may be pending at a time.
    pub fn begin(&mut self, question: String, now_ms: i64) -> ClientResult<ConversationTurn> {
        if self.in_flight.is_some() {
            return Err(ClientError::Busy);
        }
        let id = self.next_id(now_ms);
        let turn = ConversationTurn::pending(id, question);
        self.turns.push(turn.clone());
        self.in_flight = Some(id);
        Ok(turn)
    }

    fn pending_mut(&mut self, id: TurnId) -> ClientResult<&mut ConversationTurn> {
        if self.in_flight == Some(id) {
            self.in_flight = None;
        }
        self.turns
            .iter_mut()
            .find(|turn| turn.id == id && turn.is_loading)
            .ok_or(ClientError::TurnNotPending(id))
    }

    pub fn resolve(&mut self, id: TurnId, answer: AnswerResponse) -> ClientResult<ConversationTurn> {
        let turn = self.pending_mut(id)?;
        turn.answer = Some(answer.answer);
        turn.short_answer = answer.short_answer;
        turn.confidence = answer.confidence;
        turn.sources = answer.sources;
        turn.response_time_seconds = Some(answer.response_time);
        turn.is_short_answer_type = answer.is_short_answer_type;
        turn.is_greeting = answer.is_greeting;
        turn.is_list = answer.is_list;
        turn.is_loading = false;
        turn.is_error = false;
        Ok(turn.clone())
    }

    pub fn fail(&mut self, id: TurnId) -> ClientResult<ConversationTurn> {
        let turn = self.pending_mut(id)?;
        mark_failed(turn);
        Ok(turn.clone())
    }

    /// Loads a persisted log. A turn saved mid-flight can never resolve, so it
    /// is restored as failed.
    pub fn restore(&mut self, mut turns: Vec<ConversationTurn>) {
        for turn in turns.iter_mut().filter(|turn| turn.is_loading) {
            mark_failed(turn);
        }
        self.last_id = turns
            .iter()
            .map(|turn| turn.id.0)
            .max()
            .unwrap_or(0)
            .max(self.last_id);
        self.turns = turns;
        self.in_flight = None;
    }

    /// Drops every turn. A pending answer arriving afterwards is discarded, but the
    /// log stays busy until that answer settles.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

fn mark_failed(turn: &mut ConversationTurn) {
    turn.answer = Some(ANSWER_FAILURE_MESSAGE.to_string());
    turn.is_loading = false;
    turn.is_error = true;
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shared::domain::SourceRef;

    use super::*;

    fn answer(text: &str) -> AnswerResponse {
        serde_json::from_value(json!({
            "answer": text,
            "short_answer": "Yes",
            "confidence": 0.91,
            "sources": [{"source": "handbook.pdf", "page": 4, "section": "Leave"}],
            "response_time": 1.5,
            "is_short_answer_type": true
        }))
        .expect("answer")
    }

    #[test]
    fn second_submission_while_pending_is_rejected() {
        let mut log = ChatLog::new();
        log.begin("first question".into(), 1_000).expect("begin");
        assert!(matches!(
            log.begin("second question".into(), 1_001),
            Err(ClientError::Busy)
        ));
        assert_eq!(log.turns().len(), 1);
    }

    #[test]
    fn resolve_keeps_id_and_applies_exactly_once() {
        let mut log = ChatLog::new();
        let pending = log.begin("how many days".into(), 5_000).expect("begin");
        let resolved = log.resolve(pending.id, answer("Ten days")).expect("resolve");

        assert_eq!(resolved.id, pending.id);
        assert_eq!(resolved.answer.as_deref(), Some("Ten days"));
        assert_eq!(resolved.response_time_label().as_deref(), Some("1.50s"));
        assert!(matches!(resolved.sources[0], SourceRef::Structured { .. }));
        assert!(!log.is_busy());

        assert!(matches!(
            log.fail(pending.id),
            Err(ClientError::TurnNotPending(id)) if id == pending.id
        ));
        assert_eq!(log.turns()[0].answer.as_deref(), Some("Ten days"));
    }

    #[test]
    fn failure_marks_turn_in_place() {
        let mut log = ChatLog::new();
        let pending = log.begin("anything".into(), 1).expect("begin");
        let failed = log.fail(pending.id).expect("fail");
        assert!(failed.is_error);
        assert!(!failed.is_loading);
        assert_eq!(failed.answer.as_deref(), Some(ANSWER_FAILURE_MESSAGE));
        assert_eq!(log.turns().len(), 1);
    }

    #[test]
    fn ids_stay_strictly_increasing() {
        let mut log = ChatLog::new();
        let first = log.begin("one".into(), 10).expect("first");
        log.fail(first.id).expect("fail");
        let second = log.begin("two".into(), 10).expect("second");
        assert!(second.id > first.id);
    }

    #[test]
    fn restore_fails_turns_saved_while_loading() {
        let mut log = ChatLog::new();
        let mut stale = ConversationTurn::pending(TurnId(500), "left hanging");
        stale.is_loading = true;
        log.restore(vec![stale]);

        assert!(log.turns()[0].is_error);
        assert!(!log.is_busy());
        let next = log.begin("next".into(), 100).expect("begin");
        assert!(next.id.0 > 500);
    }

    #[test]
    fn answer_after_clear_is_discarded() {
        let mut log = ChatLog::new();
        let pending = log.begin("question".into(), 1).expect("begin");
        log.clear();
        assert!(log.resolve(pending.id, answer("late")).is_err());
        assert!(log.turns().is_empty());
    }

    #[test]
    fn clear_keeps_log_busy_until_pending_answer_settles() {
        let mut log = ChatLog::new();
        let pending = log.begin("question".into(), 1).expect("begin");
        log.clear();
        assert!(log.is_busy());
        assert!(matches!(log.begin("again".into(), 2), Err(ClientError::Busy)));

        assert!(log.fail(pending.id).is_err());
        assert!(!log.is_busy());
        assert!(log.begin("again".into(), 3).is_ok());
    }
}
