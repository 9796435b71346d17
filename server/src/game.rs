//! Authoritative game flow for one lobby.
//!
//! The server paces the session: it decides when all answers are in,
//! when the next question goes out, and when the game is over. Answer
//! recording goes through the shared idempotent log, so the at-least-once
//! channel can redeliver submissions without corrupting any total.

use log::debug;
use shared::{AnswerEvent, AnswerLog, Player, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Already had an answer for this (player, question); nothing changed.
    Duplicate,
    Recorded {
        all_answered: bool,
        last_question: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// Moved to the next question.
    Next { index: usize, question: Question },
    /// The game is over (now or previously).
    Finished,
    /// The current question is still open; no advance happens.
    Pending,
}

pub struct GameFlow {
    questions: Vec<Question>,
    current: usize,
    player_count: usize,
    answers: AnswerLog,
    finished: bool,
}

impl GameFlow {
    pub fn new(questions: Vec<Question>, player_count: usize) -> Self {
        Self {
            questions,
            current: 0,
            player_count,
            answers: AnswerLog::new(),
            finished: false,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Records one answer, applying it to the roster aggregates exactly
    /// once. Duplicate deliveries report `Duplicate` and change nothing.
    pub fn record_answer(&mut self, event: &AnswerEvent, roster: &mut [Player]) -> RecordOutcome {
        if !self.answers.record(event) {
            debug!(
                "Duplicate answer from {} for question {}",
                event.player_name, event.question_index
            );
            return RecordOutcome::Duplicate;
        }
        if let Some(player) = roster
            .iter_mut()
            .find(|p| p.id == event.player_id || p.name == event.player_name)
        {
            player.score += event.score;
            if event.is_correct {
                player.correct_answers += 1;
            }
            player.current_question = event.question_index + 1;
        }

        let all_answered = self.answers.answered_count(event.question_index) >= self.player_count;
        let last_question = event.question_index + 1 >= self.questions.len();
        if all_answered && last_question {
            self.finished = true;
        }
        RecordOutcome::Recorded {
            all_answered,
            last_question,
        }
    }

    /// Tries to move to the next question. Refuses while the current
    /// question is still open, so every client asking after the pause
    /// causes exactly one advance.
    pub fn advance(&mut self) -> AdvanceOutcome {
        if self.finished {
            return AdvanceOutcome::Finished;
        }
        if self.answers.answered_count(self.current) < self.player_count {
            return AdvanceOutcome::Pending;
        }
        let next = self.current + 1;
        match self.questions.get(next) {
            Some(question) => {
                self.current = next;
                AdvanceOutcome::Next {
                    index: next,
                    question: question.clone(),
                }
            }
            None => {
                self.finished = true;
                AdvanceOutcome::Finished
            }
        }
    }
}
