use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod api;
pub mod protocol;
pub mod scoring;

pub use protocol::{ClientIntent, ServerEvent, Topic};
pub use scoring::score;

pub const MAX_PLAYERS_PER_LOBBY: usize = 8;
pub const LOBBY_CODE_LEN: usize = 6;
pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 20;
pub const DEFAULT_NUM_QUESTIONS: usize = 10;
pub const DEFAULT_TIME_PER_QUESTION: u32 = 15;
pub const ANSWER_FEEDBACK_SECS: f32 = 1.5;
pub const NEXT_QUESTION_PAUSE_SECS: f32 = 3.0;
pub const PUSH_STALE_AFTER_SECS: u64 = 5;
pub const POLL_INTERVAL_SECS: u64 = 3;
pub const STARTUP_GRACE_SECS: f32 = 2.0;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;
pub const RECONNECT_DELAY_SECS: u64 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub is_host: bool,
    pub avatar: String,
    pub ready: bool,
    pub score: u32,
    pub correct_answers: u32,
    pub current_question: usize,
    pub total_questions: usize,
}

impl Player {
    pub fn new(id: &str, name: &str, is_host: bool, avatar: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            is_host,
            avatar: avatar.to_string(),
            ready: false,
            score: 0,
            correct_answers: 0,
            current_question: 0,
            total_questions: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Lenient parse: unknown labels fall back to medium rather than failing,
    /// since question data from the generator is not fully trusted.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }

    pub fn multiplier(self) -> f32 {
        match self {
            Difficulty::Easy => 0.8,
            Difficulty::Medium => 1.0,
            Difficulty::Hard => 1.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameSettings {
    pub num_questions: usize,
    pub categories: Vec<String>,
    pub difficulty: Difficulty,
    pub time_per_question: u32,
    pub allow_skipping: bool,
    pub topic: Option<String>,
    pub model: String,
    pub include_images: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            num_questions: DEFAULT_NUM_QUESTIONS,
            categories: Vec::new(),
            difficulty: Difficulty::Medium,
            time_per_question: DEFAULT_TIME_PER_QUESTION,
            allow_skipping: false,
            topic: None,
            model: "gemini".to_string(),
            include_images: false,
        }
    }
}

impl GameSettings {
    /// Clamps values into their valid ranges. Applied server-side on every
    /// settings write so a misbehaving client cannot store a zero-second
    /// timer or a thousand-question game.
    pub fn sanitize(&mut self) {
        self.num_questions = self.num_questions.clamp(MIN_QUESTIONS, MAX_QUESTIONS);
        if self.time_per_question == 0 {
            self.time_per_question = DEFAULT_TIME_PER_QUESTION;
        }
    }
}

/// Partial settings update sent by the host. Every field is optional;
/// unset fields leave the current value untouched.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub num_questions: Option<usize>,
    pub categories: Option<Vec<String>>,
    pub difficulty: Option<Difficulty>,
    pub time_per_question: Option<u32>,
    pub allow_skipping: Option<bool>,
    pub topic: Option<Option<String>>,
    pub model: Option<String>,
    pub include_images: Option<bool>,
}

impl SettingsPatch {
    pub fn apply(&self, settings: &mut GameSettings) {
        if let Some(v) = self.num_questions {
            settings.num_questions = v;
        }
        if let Some(v) = &self.categories {
            settings.categories = v.clone();
        }
        if let Some(v) = self.difficulty {
            settings.difficulty = v;
        }
        if let Some(v) = self.time_per_question {
            settings.time_per_question = v;
        }
        if let Some(v) = self.allow_skipping {
            settings.allow_skipping = v;
        }
        if let Some(v) = &self.topic {
            settings.topic = v.clone();
        }
        if let Some(v) = &self.model {
            settings.model = v.clone();
        }
        if let Some(v) = self.include_images {
            settings.include_images = v;
        }
        settings.sanitize();
    }
}

/// Full roster + settings view of a lobby at a point in time.
///
/// `seq` increases monotonically with every lobby mutation. Clients discard
/// any snapshot whose `seq` is not strictly greater than the last one they
/// applied, which makes push/poll reconciliation independent of arrival
/// order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LobbySnapshot {
    pub code: String,
    pub players: Vec<Player>,
    pub settings: GameSettings,
    pub game_started: bool,
    pub seq: u64,
}

impl LobbySnapshot {
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Question {
    pub index: usize,
    pub text: String,
    /// Four options, each prefixed with its letter tag ("A. ...").
    pub options: Vec<String>,
    /// Single letter in {A, B, C, D}.
    pub correct_answer: String,
    pub difficulty: String,
    pub image: Option<String>,
}

impl Question {
    pub fn difficulty(&self) -> Difficulty {
        Difficulty::parse(&self.difficulty)
    }

    /// Returns the option body for a letter, with the "A. " tag stripped.
    pub fn option_text(&self, letter: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|opt| opt.starts_with(letter))
            .map(|opt| opt.get(3..).unwrap_or(opt.as_str()))
    }
}

/// One player's submitted response to one question. An empty `answer`
/// string marks a timeout submission.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AnswerEvent {
    pub player_id: String,
    pub player_name: String,
    pub question_index: usize,
    pub answer: String,
    pub time_taken: f32,
    pub is_correct: bool,
    pub score: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerStanding {
    pub name: String,
    pub score: u32,
    pub correct_answers: u32,
    pub avatar: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameResults {
    pub lobby_code: String,
    pub standings: Vec<PlayerStanding>,
}

/// Idempotent answer aggregation.
///
/// The channel delivers at least once, so the same AnswerEvent may arrive
/// multiple times. At most one answer is kept per (player, question); the
/// first one received wins and duplicates are discarded without touching
/// any score totals.
#[derive(Debug, Default, Clone)]
pub struct AnswerLog {
    recorded: HashMap<(String, usize), AnswerEvent>,
}

impl AnswerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an answer. Returns false (and changes nothing) when an
    /// answer for this (player, question) pair is already present.
    pub fn record(&mut self, event: &AnswerEvent) -> bool {
        let key = (event.player_id.clone(), event.question_index);
        if self.recorded.contains_key(&key) {
            return false;
        }
        self.recorded.insert(key, event.clone());
        true
    }

    pub fn has_answered(&self, player_id: &str, question_index: usize) -> bool {
        self.recorded
            .contains_key(&(player_id.to_string(), question_index))
    }

    pub fn answered_count(&self, question_index: usize) -> usize {
        self.recorded
            .keys()
            .filter(|(_, idx)| *idx == question_index)
            .count()
    }

    pub fn total_score(&self, player_id: &str) -> u32 {
        self.recorded
            .iter()
            .filter(|((id, _), _)| id == player_id)
            .map(|(_, ev)| ev.score)
            .sum()
    }

    pub fn correct_count(&self, player_id: &str) -> u32 {
        self.recorded
            .iter()
            .filter(|((id, _), ev)| id == player_id && ev.is_correct)
            .count() as u32
    }

    pub fn get(&self, player_id: &str, question_index: usize) -> Option<&AnswerEvent> {
        self.recorded.get(&(player_id.to_string(), question_index))
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(player: &str, index: usize, score: u32) -> AnswerEvent {
        AnswerEvent {
            player_id: player.to_string(),
            player_name: player.to_string(),
            question_index: index,
            answer: "A".to_string(),
            time_taken: 5.0,
            is_correct: score > 0,
            score,
        }
    }

    #[test]
    fn test_player_creation() {
        let player = Player::new("p1", "Alice", true, "🦊");
        assert_eq!(player.id, "p1");
        assert_eq!(player.name, "Alice");
        assert!(player.is_host);
        assert!(!player.ready);
        assert_eq!(player.score, 0);
        assert_eq!(player.correct_answers, 0);
    }

    #[test]
    fn test_difficulty_parse_lenient() {
        assert_eq!(Difficulty::parse("easy"), Difficulty::Easy);
        assert_eq!(Difficulty::parse("HARD"), Difficulty::Hard);
        assert_eq!(Difficulty::parse("medium"), Difficulty::Medium);
        assert_eq!(Difficulty::parse("mixed"), Difficulty::Medium);
        assert_eq!(Difficulty::parse(""), Difficulty::Medium);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = GameSettings::default();
        assert_eq!(settings.num_questions, 10);
        assert_eq!(settings.difficulty, Difficulty::Medium);
        assert_eq!(settings.time_per_question, 15);
        assert!(!settings.allow_skipping);
        assert!(settings.topic.is_none());
    }

    #[test]
    fn test_settings_sanitize() {
        let mut settings = GameSettings {
            num_questions: 500,
            time_per_question: 0,
            ..GameSettings::default()
        };
        settings.sanitize();
        assert_eq!(settings.num_questions, MAX_QUESTIONS);
        assert_eq!(settings.time_per_question, DEFAULT_TIME_PER_QUESTION);

        let mut settings = GameSettings {
            num_questions: 0,
            ..GameSettings::default()
        };
        settings.sanitize();
        assert_eq!(settings.num_questions, MIN_QUESTIONS);
    }

    #[test]
    fn test_settings_patch_partial_merge() {
        let mut settings = GameSettings::default();
        let patch = SettingsPatch {
            difficulty: Some(Difficulty::Hard),
            time_per_question: Some(20),
            ..SettingsPatch::default()
        };
        patch.apply(&mut settings);
        assert_eq!(settings.difficulty, Difficulty::Hard);
        assert_eq!(settings.time_per_question, 20);
        // Untouched fields keep their values
        assert_eq!(settings.num_questions, 10);
        assert_eq!(settings.model, "gemini");
    }

    #[test]
    fn test_settings_patch_clears_topic() {
        let mut settings = GameSettings {
            topic: Some("space".to_string()),
            ..GameSettings::default()
        };
        let patch = SettingsPatch {
            topic: Some(None),
            ..SettingsPatch::default()
        };
        patch.apply(&mut settings);
        assert!(settings.topic.is_none());
    }

    #[test]
    fn test_question_option_lookup() {
        let question = Question {
            index: 0,
            text: "Capital of France?".to_string(),
            options: vec![
                "A. Paris".to_string(),
                "B. Lyon".to_string(),
                "C. Nice".to_string(),
                "D. Lille".to_string(),
            ],
            correct_answer: "A".to_string(),
            difficulty: "easy".to_string(),
            image: None,
        };
        assert_eq!(question.option_text("A"), Some("Paris"));
        assert_eq!(question.option_text("D"), Some("Lille"));
        assert_eq!(question.option_text("E"), None);
        assert_eq!(question.difficulty(), Difficulty::Easy);
    }

    #[test]
    fn test_answer_log_records_once() {
        let mut log = AnswerLog::new();
        let ev = answer("p1", 0, 10);

        assert!(log.record(&ev));
        assert!(!log.record(&ev));
        assert!(!log.record(&ev));

        assert_eq!(log.total_score("p1"), 10);
        assert_eq!(log.correct_count("p1"), 1);
        assert_eq!(log.answered_count(0), 1);
    }

    #[test]
    fn test_answer_log_duplicate_burst_matches_single_apply() {
        let mut duplicated = AnswerLog::new();
        let mut single = AnswerLog::new();

        let events = [answer("p1", 0, 10), answer("p1", 1, 8), answer("p2", 0, 12)];
        for ev in &events {
            single.record(ev);
            // Deliver each event several times, interleaved
            for _ in 0..4 {
                duplicated.record(ev);
            }
        }

        for player in ["p1", "p2"] {
            assert_eq!(duplicated.total_score(player), single.total_score(player));
            assert_eq!(
                duplicated.correct_count(player),
                single.correct_count(player)
            );
        }
        assert_eq!(duplicated.len(), single.len());
    }

    #[test]
    fn test_answer_log_first_delivery_wins() {
        let mut log = AnswerLog::new();
        log.record(&answer("p1", 0, 10));

        // A conflicting duplicate for the same slot must not replace it
        let mut conflicting = answer("p1", 0, 99);
        conflicting.answer = "B".to_string();
        assert!(!log.record(&conflicting));
        assert_eq!(log.get("p1", 0).map(|ev| ev.score), Some(10));
    }

    #[test]
    fn test_answer_log_distinguishes_players_and_questions() {
        let mut log = AnswerLog::new();
        assert!(log.record(&answer("p1", 0, 5)));
        assert!(log.record(&answer("p2", 0, 7)));
        assert!(log.record(&answer("p1", 1, 9)));

        assert!(log.has_answered("p1", 0));
        assert!(log.has_answered("p1", 1));
        assert!(!log.has_answered("p2", 1));
        assert_eq!(log.answered_count(0), 2);
        assert_eq!(log.total_score("p1"), 14);
    }
}
