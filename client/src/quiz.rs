//! Live-quiz state machine.
//!
//! Drives a single client through LOADING → QUESTION → WAITING → RESULTS
//! per question. The machine owns no timers and never reads the clock:
//! the network driver feeds it `tick` calls from its interval timers, so
//! every transition is synchronous, deterministic, and testable. A tick
//! or event against a phase that does not expect it is a no-op — that is
//! what makes stale timers harmless by construction.
//!
//! The server paces the session. The machine submits answers and counts
//! down locally, but only a server-pushed `NewQuestion` advances it, and
//! only an index strictly greater than the last applied one is accepted.

use crate::effect::{Effect, Notice};
use log::{debug, warn};
use shared::protocol::{ClientIntent, ServerEvent};
use shared::{
    scoring, AnswerEvent, AnswerLog, GameResults, GameSettings, Player, Question,
    ANSWER_FEEDBACK_SECS, NEXT_QUESTION_PAUSE_SECS, STARTUP_GRACE_SECS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    Loading,
    Question,
    Waiting,
    Results,
}

pub struct QuizMachine {
    lobby_code: String,
    player_id: String,
    player_name: String,
    settings: GameSettings,

    phase: QuizPhase,
    questions: Vec<Question>,
    current: Option<Question>,
    index: usize,
    last_applied: Option<usize>,

    // Per-question transient state, reset on every question change
    answered: bool,
    selected: Option<String>,
    countdown: f32,
    elapsed: f32,
    /// Remaining answer-feedback delay before entering Waiting.
    feedback: Option<f32>,
    /// Remaining inter-question pause once all answers are in.
    pause: Option<f32>,
    next_requested: bool,

    /// Seconds since the machine entered the quiz; gates startup-noise
    /// error suppression.
    run_time: f32,

    roster: Vec<Player>,
    answers: AnswerLog,
    results: Option<GameResults>,
    torn_down: bool,
}

impl QuizMachine {
    pub fn new(
        lobby_code: &str,
        player_id: &str,
        player_name: &str,
        settings: GameSettings,
    ) -> Self {
        Self {
            lobby_code: lobby_code.to_string(),
            player_id: player_id.to_string(),
            player_name: player_name.to_string(),
            settings,
            phase: QuizPhase::Loading,
            questions: Vec::new(),
            current: None,
            index: 0,
            last_applied: None,
            answered: false,
            selected: None,
            countdown: 0.0,
            elapsed: 0.0,
            feedback: None,
            pause: None,
            next_requested: false,
            run_time: 0.0,
            roster: Vec::new(),
            answers: AnswerLog::new(),
            results: None,
            torn_down: false,
        }
    }

    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    pub fn countdown(&self) -> f32 {
        self.countdown
    }

    pub fn question_index(&self) -> usize {
        self.index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current.as_ref()
    }

    pub fn has_answered(&self) -> bool {
        self.answered
    }

    pub fn selected_answer(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn scoreboard(&self) -> &[Player] {
        &self.roster
    }

    pub fn results(&self) -> Option<&GameResults> {
        self.results.as_ref()
    }

    /// Seeds the machine with the fetched question set and roster, then
    /// arms the first question. If a pushed `NewQuestion` already moved
    /// the machine out of Loading, the fetched data only fills gaps.
    pub fn begin(
        &mut self,
        questions: Vec<Question>,
        roster: Vec<Player>,
        current_index: usize,
    ) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        if !roster.is_empty() {
            self.roster = roster;
        }
        if questions.is_empty() {
            warn!("Game state carried no questions, staying in Loading");
            return Vec::new();
        }
        self.questions = questions;

        if self.phase != QuizPhase::Loading {
            return Vec::new();
        }
        let Some(question) = self.questions.get(current_index).cloned() else {
            warn!(
                "Current question index {} out of range ({} questions)",
                current_index,
                self.questions.len()
            );
            return Vec::new();
        };
        self.index = current_index;
        self.last_applied = Some(current_index);
        self.current = Some(question);
        self.arm_question();
        Vec::new()
    }

    /// Resets per-question transients and cancels every timer that could
    /// fire for a previous question.
    fn arm_question(&mut self) {
        self.answered = false;
        self.selected = None;
        self.countdown = self.settings.time_per_question as f32;
        self.elapsed = 0.0;
        self.feedback = None;
        self.pause = None;
        self.next_requested = false;
        self.phase = QuizPhase::Question;
    }

    /// Local player picks an answer. Repeated attempts for the same
    /// question are no-ops.
    pub fn select_answer(&mut self, letter: &str) -> Vec<Effect> {
        if self.torn_down || self.phase != QuizPhase::Question || self.answered {
            return Vec::new();
        }
        self.submit(Some(letter))
    }

    fn submit(&mut self, letter: Option<&str>) -> Vec<Effect> {
        let Some(question) = self.current.clone() else {
            warn!("Answer submitted with no current question, ignoring");
            return Vec::new();
        };
        self.answered = true;
        self.selected = letter.map(|l| l.to_string());

        let answer = letter.unwrap_or("");
        let is_correct = !answer.is_empty() && answer == question.correct_answer;
        let remaining = self.countdown.max(0.0);
        let points = scoring::score(
            is_correct,
            remaining,
            question.difficulty(),
            self.settings.time_per_question,
        );

        let event = AnswerEvent {
            player_id: self.player_id.clone(),
            player_name: self.player_name.clone(),
            question_index: self.index,
            answer: answer.to_string(),
            time_taken: self.elapsed,
            is_correct,
            score: points,
        };
        self.apply_answer(&event);
        self.feedback = Some(ANSWER_FEEDBACK_SECS);

        vec![Effect::Send(ClientIntent::SubmitAnswer {
            lobby_code: self.lobby_code.clone(),
            answer: event,
        })]
    }

    /// Fine-grained tick driving the question countdown and the answer
    /// feedback delay.
    pub fn tick(&mut self, dt: f32) -> Vec<Effect> {
        if self.torn_down || self.phase == QuizPhase::Results {
            return Vec::new();
        }
        self.run_time += dt;

        if self.phase != QuizPhase::Question {
            return Vec::new();
        }

        if !self.answered {
            self.countdown -= dt;
            self.elapsed += dt;
            if self.countdown <= 0.0 {
                self.countdown = 0.0;
                // Timeout submits an empty answer through the same path
                return self.submit(None);
            }
            return Vec::new();
        }

        if let Some(remaining) = self.feedback {
            let remaining = remaining - dt;
            if remaining <= 0.0 {
                self.feedback = None;
                self.phase = QuizPhase::Waiting;
            } else {
                self.feedback = Some(remaining);
            }
        }
        Vec::new()
    }

    /// Coarse tick driving the server-synchronized inter-question pause.
    pub fn tick_pause(&mut self, dt: f32) -> Vec<Effect> {
        if self.torn_down || self.phase != QuizPhase::Waiting {
            return Vec::new();
        }
        let Some(remaining) = self.pause else {
            return Vec::new();
        };
        let remaining = remaining - dt;
        if remaining > 0.0 {
            self.pause = Some(remaining);
            return Vec::new();
        }
        self.pause = None;
        if self.next_requested {
            return Vec::new();
        }
        self.next_requested = true;
        vec![Effect::Send(ClientIntent::RequestNextQuestion {
            lobby_code: self.lobby_code.clone(),
        })]
    }

    pub fn handle_event(&mut self, event: &ServerEvent) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }
        match event {
            ServerEvent::PlayerAnswered(answer) => {
                self.apply_answer(answer);
                Vec::new()
            }
            ServerEvent::AllAnswersIn => {
                if self.phase == QuizPhase::Results || !self.answered {
                    return Vec::new();
                }
                // The reveal supersedes any leftover feedback delay
                self.feedback = None;
                self.phase = QuizPhase::Waiting;
                if self.pause.is_none() && !self.next_requested {
                    self.pause = Some(NEXT_QUESTION_PAUSE_SECS);
                }
                Vec::new()
            }
            ServerEvent::NewQuestion { index, question } => self.advance_to(*index, question),
            ServerEvent::GameOver(results) => {
                if self.phase == QuizPhase::Results {
                    return Vec::new();
                }
                // Cancel everything that could fire after the game ended
                self.feedback = None;
                self.pause = None;
                self.phase = QuizPhase::Results;
                self.results = Some(results.clone());
                vec![Effect::PersistResults(results.clone())]
            }
            ServerEvent::Error { message } => {
                if self.run_time < STARTUP_GRACE_SECS {
                    // Expected start-of-game races, not real failures
                    debug!("Suppressing startup-window error: {}", message);
                    Vec::new()
                } else {
                    vec![Effect::Notify(Notice::GameError {
                        message: message.clone(),
                    })]
                }
            }
            _ => Vec::new(),
        }
    }

    /// Adopts a server-paced question change. The server-provided index is
    /// ground truth; anything at or below the last applied index is a
    /// duplicate or stale delivery and must not be processed again.
    fn advance_to(&mut self, index: usize, question: &Question) -> Vec<Effect> {
        if self.phase == QuizPhase::Results {
            return Vec::new();
        }
        if let Some(last) = self.last_applied {
            if index <= last {
                debug!(
                    "Ignoring stale new_question for index {} (applied: {})",
                    index, last
                );
                return Vec::new();
            }
        }
        self.index = index;
        self.last_applied = Some(index);
        self.current = Some(question.clone());
        self.arm_question();
        Vec::new()
    }

    /// Records an answer (own or remote) exactly once and folds it into
    /// the displayed scoreboard. Duplicate deliveries change nothing.
    fn apply_answer(&mut self, event: &AnswerEvent) {
        if !self.answers.record(event) {
            debug!(
                "Duplicate answer from {} for question {}, discarding",
                event.player_name, event.question_index
            );
            return;
        }
        if let Some(player) = self
            .roster
            .iter_mut()
            .find(|p| p.id == event.player_id || p.name == event.player_name)
        {
            player.score += event.score;
            if event.is_correct {
                player.correct_answers += 1;
            }
            player.current_question = event.question_index + 1;
        }
    }

    /// Permanently detaches the machine: pending timers are cleared and
    /// every later event or tick is a no-op.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.feedback = None;
        self.pause = None;
    }
}
