//! Scoring engine.
//!
//! Deliberately free of I/O and state so it can be unit-tested without the
//! channel or the quiz state machine. Both the client (for immediate
//! feedback) and the server-side aggregates rely on the same numbers.

use crate::Difficulty;

/// Maps an answer outcome to a point value.
///
/// Incorrect answers score zero. Correct answers score the remaining
/// seconds (clamped to `[0, time_per_question]`, rounded to the nearest
/// whole second) times the difficulty multiplier. The result is rounded
/// to whole points; `hard`'s 1.5x multiplier is the only source of
/// fractional intermediates.
pub fn score(
    is_correct: bool,
    seconds_remaining: f32,
    difficulty: Difficulty,
    time_per_question: u32,
) -> u32 {
    if !is_correct {
        return 0;
    }
    let clamped = seconds_remaining.clamp(0.0, time_per_question as f32);
    (clamped.round() * difficulty.multiplier()).round() as u32
}
