//! Question sourcing seam.
//!
//! Actual quiz-content generation (AI generators, trivia databases) is an
//! external collaborator. The server only needs something that turns game
//! settings into a question list; the sample bank below keeps the binary
//! and the tests self-contained.

use shared::{GameSettings, Question};

pub trait QuestionSource {
    fn generate(&self, settings: &GameSettings) -> Vec<Question>;
}

/// Built-in general-knowledge bank. Cycles its pool to honor
/// `num_questions` and tags questions with the configured difficulty.
pub struct SampleQuestionBank;

const POOL: &[(&str, [&str; 4], &str)] = &[
    (
        "Which planet is known as the Red Planet?",
        ["A. Mars", "B. Venus", "C. Jupiter", "D. Mercury"],
        "A",
    ),
    (
        "What is the largest ocean on Earth?",
        ["A. Atlantic", "B. Indian", "C. Pacific", "D. Arctic"],
        "C",
    ),
    (
        "Which element has the chemical symbol O?",
        ["A. Gold", "B. Oxygen", "C. Osmium", "D. Silver"],
        "B",
    ),
    (
        "In which year did the first moon landing occur?",
        ["A. 1965", "B. 1972", "C. 1969", "D. 1958"],
        "C",
    ),
    (
        "What is the capital of Japan?",
        ["A. Osaka", "B. Kyoto", "C. Nagoya", "D. Tokyo"],
        "D",
    ),
    (
        "Which composer wrote the Ninth Symphony?",
        ["A. Mozart", "B. Beethoven", "C. Bach", "D. Brahms"],
        "B",
    ),
    (
        "What is the smallest prime number?",
        ["A. 2", "B. 1", "C. 3", "D. 0"],
        "A",
    ),
    (
        "Which country invented paper?",
        ["A. Egypt", "B. Greece", "C. China", "D. India"],
        "C",
    ),
];

impl QuestionSource for SampleQuestionBank {
    fn generate(&self, settings: &GameSettings) -> Vec<Question> {
        (0..settings.num_questions)
            .map(|index| {
                let (text, options, correct) = POOL[index % POOL.len()];
                Question {
                    index,
                    text: text.to_string(),
                    options: options.iter().map(|s| s.to_string()).collect(),
                    correct_answer: correct.to_string(),
                    difficulty: settings.difficulty.as_str().to_string(),
                    image: None,
                }
            })
            .collect()
    }
}
