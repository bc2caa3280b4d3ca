//! Replicated turn-taking over the counseling questions
//!
//! Each participant holds its own replica of [`TurnState`]. Every local
//! change is broadcast as a full `question_sync` and applied locally with the
//! same values; every inbound sync overwrites the replica (last writer wins).
//!
//! Turn ownership travels as an initiator-relative flag so that both sides,
//! which have opposite roles, agree on one shared boolean:
//! `my_turn == (role is Initiator) == initiator_has_turn`.

use super::session::Role;
use super::CallError;
use crate::rtc::signaling::SignalingEvent;
use crate::transport::SignalSink;
use log::{debug, info};

/// Default question list
pub const COUNSELING_QUESTIONS: [&str; 15] = [
    "What is one small thing I can do this week to make you feel more loved?",
    "What's a recent memory of us that made you really happy?",
    "Is there anything I've done recently that unknowingly hurt you?",
    "What is one of your biggest fears for our future?",
    "What is one of your biggest dreams for our future?",
    "How can I be a better listener for you?",
    "What does 'romance' mean to you, and how can we have more of it?",
    "What's something you feel we're really good at as a couple?",
    "What's one area where you feel we could improve as a team?",
    "If you could relive one day of our relationship, which one would it be and why?",
    "What's a simple, everyday thing I do that makes you smile?",
    "Do you feel you have enough personal space and time? How can I support that?",
    "What is one assumption you've made about me that you found out was wrong?",
    "How do you prefer to be comforted when you're upset?",
    "What's a long-term goal you have that I can help you with?",
];

/// One replica of the shared turn state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TurnState {
    pub active: bool,
    /// Always in `[0, N)` for a list of N questions
    pub item_index: usize,
    pub initiator_has_turn: bool,
}

impl TurnState {
    /// Wire form of this state
    pub fn to_event(&self) -> SignalingEvent {
        if self.active {
            SignalingEvent::question_active(self.item_index, self.initiator_has_turn)
        } else {
            SignalingEvent::question_inactive()
        }
    }
}

/// What the local participant should be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnView {
    pub active: bool,
    pub question: Option<String>,
    pub my_turn: bool,
    /// Whether the "next question" action is offered
    pub can_advance: bool,
}

/// Local replica plus the operations that change it
#[derive(Debug, Clone)]
pub struct TurnSession {
    role: Role,
    questions: Vec<String>,
    state: TurnState,
}

impl TurnSession {
    /// Fails on an empty question list
    pub fn new(role: Role, questions: Vec<String>) -> Result<Self, CallError> {
        if questions.is_empty() {
            return Err(CallError::InvalidState("Question list is empty".to_string()));
        }
        Ok(Self { role, questions, state: TurnState::default() })
    }

    /// Session over the default question list
    pub fn with_default_questions(role: Role) -> Self {
        Self {
            role,
            questions: COUNSELING_QUESTIONS.iter().map(|q| q.to_string()).collect(),
            state: TurnState::default(),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn is_my_turn(&self) -> bool {
        self.state.active && self.role.is_initiator() == self.state.initiator_has_turn
    }

    pub fn view(&self) -> TurnView {
        let my_turn = self.is_my_turn();
        TurnView {
            active: self.state.active,
            question: self
                .state
                .active
                .then(|| self.questions[self.state.item_index].clone()),
            my_turn,
            can_advance: my_turn,
        }
    }

    /// Switch question mode on; the local participant asks first
    pub fn start(&mut self, signals: &dyn SignalSink) {
        let state = TurnState {
            active: true,
            item_index: 0,
            initiator_has_turn: self.role.is_initiator(),
        };
        info!("Question mode started");
        self.publish(state, signals);
    }

    /// Move to the next question and hand the turn over
    pub fn advance(&mut self, signals: &dyn SignalSink) -> Result<(), CallError> {
        if !self.state.active {
            return Err(CallError::InvalidState("Question mode is not active".to_string()));
        }
        if !self.is_my_turn() {
            return Err(CallError::NotYourTurn);
        }

        let state = TurnState {
            active: true,
            item_index: (self.state.item_index + 1) % self.questions.len(),
            initiator_has_turn: !self.state.initiator_has_turn,
        };
        self.publish(state, signals);
        Ok(())
    }

    /// Switch question mode off
    pub fn stop(&mut self, signals: &dyn SignalSink) {
        let state = TurnState { active: false, ..self.state };
        info!("Question mode stopped");
        self.publish(state, signals);
    }

    /// Start when inactive, stop when active
    pub fn toggle(&mut self, signals: &dyn SignalSink) {
        if self.state.active {
            self.stop(signals);
        } else {
            self.start(signals);
        }
    }

    /// Overwrite the replica with a `question_sync` from the other side
    pub fn apply_remote(
        &mut self,
        active: bool,
        index: Option<usize>,
        initiator_turn: Option<bool>,
    ) -> Result<(), CallError> {
        if !active {
            self.state.active = false;
            debug!("Remote switched question mode off");
            return Ok(());
        }

        let (Some(item_index), Some(initiator_has_turn)) = (index, initiator_turn) else {
            return Err(CallError::Protocol(
                "Active question_sync without index or initiatorTurn".to_string(),
            ));
        };
        if item_index >= self.questions.len() {
            return Err(CallError::Protocol(format!(
                "Question index {} out of range ({} questions)",
                item_index,
                self.questions.len()
            )));
        }

        self.state = TurnState { active: true, item_index, initiator_has_turn };
        debug!("Applied remote turn state {:?}", self.state);
        Ok(())
    }

    /// Call ended; nothing is broadcast
    pub fn reset(&mut self) {
        self.state.active = false;
    }

    fn publish(&mut self, state: TurnState, signals: &dyn SignalSink) {
        signals.send(&state.to_event());
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::testing::RecordingSink;
    use proptest::prelude::*;

    /// Deliver every recorded sync from one replica to the other
    fn deliver(sink: &RecordingSink, to: &mut TurnSession) {
        for event in sink.take() {
            if let SignalingEvent::QuestionSync { active, index, initiator_turn } = event {
                to.apply_remote(active, index, initiator_turn).unwrap();
            }
        }
    }

    #[test]
    fn test_initiator_start_gives_initiator_the_turn() {
        let sink = RecordingSink::default();
        let mut initiator = TurnSession::with_default_questions(Role::Initiator);
        let mut joiner = TurnSession::with_default_questions(Role::Joiner);

        initiator.start(&sink);
        assert_eq!(sink.events(), vec![SignalingEvent::question_active(0, true)]);
        deliver(&sink, &mut joiner);

        assert!(initiator.is_my_turn());
        assert!(!joiner.is_my_turn());
        assert_eq!(initiator.state(), joiner.state());
        assert_eq!(joiner.view().question.as_deref(), Some(COUNSELING_QUESTIONS[0]));
        assert!(!joiner.view().can_advance);
    }

    #[test]
    fn test_joiner_start_gives_joiner_the_turn() {
        let sink = RecordingSink::default();
        let mut joiner = TurnSession::with_default_questions(Role::Joiner);
        joiner.start(&sink);
        assert_eq!(sink.events(), vec![SignalingEvent::question_active(0, false)]);
        assert!(joiner.is_my_turn());
    }

    #[test]
    fn test_advance_flips_turn_and_increments() {
        let sink = RecordingSink::default();
        let mut joiner = TurnSession::with_default_questions(Role::Joiner);
        joiner.apply_remote(true, Some(4), Some(false)).unwrap();

        joiner.advance(&sink).unwrap();
        assert_eq!(
            joiner.state(),
            TurnState { active: true, item_index: 5, initiator_has_turn: true }
        );
        assert_eq!(sink.events(), vec![SignalingEvent::question_active(5, true)]);
        assert!(!joiner.is_my_turn());
    }

    #[test]
    fn test_advance_wraps_around() {
        let sink = RecordingSink::default();
        let mut initiator = TurnSession::with_default_questions(Role::Initiator);
        initiator.apply_remote(true, Some(14), Some(true)).unwrap();
        initiator.advance(&sink).unwrap();
        assert_eq!(initiator.state().item_index, 0);
    }

    #[test]
    fn test_advance_rejected_off_turn_and_inactive() {
        let sink = RecordingSink::default();
        let mut joiner = TurnSession::with_default_questions(Role::Joiner);
        assert!(matches!(joiner.advance(&sink), Err(CallError::InvalidState(_))));

        joiner.apply_remote(true, Some(0), Some(true)).unwrap();
        assert_eq!(joiner.advance(&sink), Err(CallError::NotYourTurn));
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_malformed_remote_sync_is_rejected() {
        let mut session = TurnSession::with_default_questions(Role::Joiner);
        assert!(matches!(session.apply_remote(true, None, Some(true)), Err(CallError::Protocol(_))));
        assert!(matches!(session.apply_remote(true, Some(15), Some(true)), Err(CallError::Protocol(_))));
        assert!(!session.is_active());
    }

    #[test]
    fn test_stop_and_toggle() {
        let sink = RecordingSink::default();
        let mut initiator = TurnSession::with_default_questions(Role::Initiator);
        let mut joiner = TurnSession::with_default_questions(Role::Joiner);

        initiator.toggle(&sink);
        deliver(&sink, &mut joiner);
        joiner.toggle(&sink);
        assert_eq!(sink.events(), vec![SignalingEvent::question_inactive()]);
        deliver(&sink, &mut initiator);

        assert!(!initiator.is_active());
        assert!(!initiator.view().can_advance);
        assert_eq!(initiator.view().question, None);
    }

    #[test]
    fn test_custom_question_list() {
        let sink = RecordingSink::default();
        let mut session = TurnSession::new(Role::Initiator, vec!["a".into(), "b".into()]).unwrap();
        session.start(&sink);
        session.advance(&sink).unwrap();
        assert_eq!(session.view().question.as_deref(), Some("b"));
        assert!(matches!(session.apply_remote(true, Some(2), Some(true)), Err(CallError::Protocol(_))));
    }

    #[test]
    fn test_empty_question_list_is_rejected() {
        assert!(matches!(
            TurnSession::new(Role::Joiner, Vec::new()),
            Err(CallError::InvalidState(_))
        ));
    }

    proptest! {
        #[test]
        fn replicas_agree_and_exactly_one_side_holds_the_turn(
            initiator_starts in any::<bool>(),
            advances in 0usize..64,
        ) {
            let sink = RecordingSink::default();
            let mut initiator = TurnSession::with_default_questions(Role::Initiator);
            let mut joiner = TurnSession::with_default_questions(Role::Joiner);

            if initiator_starts {
                initiator.start(&sink);
                deliver(&sink, &mut joiner);
            } else {
                joiner.start(&sink);
                deliver(&sink, &mut initiator);
            }

            for _ in 0..advances {
                if initiator.is_my_turn() {
                    initiator.advance(&sink).unwrap();
                    deliver(&sink, &mut joiner);
                } else {
                    joiner.advance(&sink).unwrap();
                    deliver(&sink, &mut initiator);
                }
                prop_assert_eq!(initiator.state(), joiner.state());
                prop_assert!(initiator.is_my_turn() != joiner.is_my_turn());
            }

            prop_assert_eq!(initiator.state().item_index, advances % COUNSELING_QUESTIONS.len());
        }
    }
}
