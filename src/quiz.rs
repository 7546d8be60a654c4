// src/quiz.rs
// Dental health assessment quiz: a fixed 15-question bank, per-archetype
// additive scoring with deterministic tie-breaking, resumable progress with
// a short TTL, and the coarser five-profile taxonomy the follow-up email
// pipeline validates against.

use serde::{Deserialize, Serialize};

use crate::store::KeyValueStore;

pub const TOTAL_QUESTIONS: usize = 15;
pub const ANSWERS_PER_QUESTION: usize = 4;

/// Saved progress is resumable for half an hour, then discarded.
pub const PROGRESS_TTL_MS: u64 = 30 * 60 * 1_000;
/// A completed result stays valid for thirty days.
pub const RESULT_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1_000;

/// The four scoring archetypes. Declaration order is the tie-break order:
/// on equal top scores the earlier archetype wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Archetype {
    Guardian,
    Warrior,
    Explorer,
    Rebuilder,
}

pub const ARCHETYPES: [Archetype; 4] = [
    Archetype::Guardian,
    Archetype::Warrior,
    Archetype::Explorer,
    Archetype::Rebuilder,
];

impl Archetype {
    pub fn id(&self) -> &'static str {
        match self {
            Archetype::Guardian => "guardian",
            Archetype::Warrior => "warrior",
            Archetype::Explorer => "explorer",
            Archetype::Rebuilder => "rebuilder",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Archetype::Guardian => "The Guardian",
            Archetype::Warrior => "The Warrior",
            Archetype::Explorer => "The Explorer",
            Archetype::Rebuilder => "The Rebuilder",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Archetype::Guardian => "Excellent preventive care habits with minimal dental issues",
            Archetype::Warrior => "Currently fighting active dental issues that need treatment",
            Archetype::Explorer => "Interested in cosmetic improvements and enhancing your smile",
            Archetype::Rebuilder => "Requires significant restorative work to rebuild oral health",
        }
    }

    pub fn recommended_services(&self) -> &'static [&'static str] {
        match self {
            Archetype::Guardian => &["Regular cleanings", "Teeth whitening", "Preventive sealants"],
            Archetype::Warrior => &["Restorative care", "Root canals", "Crowns & bridges"],
            Archetype::Explorer => {
                &["Veneers", "Invisalign", "Teeth whitening", "Smile makeover"]
            }
            Archetype::Rebuilder => {
                &["Dental implants", "Dentures", "Full mouth reconstruction"]
            }
        }
    }

    fn index(&self) -> usize {
        match self {
            Archetype::Guardian => 0,
            Archetype::Warrior => 1,
            Archetype::Explorer => 2,
            Archetype::Rebuilder => 3,
        }
    }
}

/// One selectable answer; `points` follows [`ARCHETYPES`] order.
#[derive(Debug, Clone, Copy)]
pub struct QuizAnswer {
    pub text: &'static str,
    pub points: [u32; 4],
}

#[derive(Debug, Clone, Copy)]
pub struct QuizQuestion {
    pub prompt: &'static str,
    pub answers: [QuizAnswer; ANSWERS_PER_QUESTION],
}

const fn answer(text: &'static str, points: [u32; 4]) -> QuizAnswer {
    QuizAnswer { text, points }
}

/// The fixed question bank. Point vectors are [guardian, warrior,
/// explorer, rebuilder].
pub const QUESTIONS: [QuizQuestion; TOTAL_QUESTIONS] = [
    QuizQuestion {
        prompt: "How often do you visit the dentist?",
        answers: [
            answer("Every 6 months", [3, 0, 1, 0]),
            answer("Once a year", [2, 1, 1, 0]),
            answer("Only when I have pain", [0, 3, 0, 2]),
            answer("Can't remember my last visit", [0, 2, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "How would you describe your current dental health?",
        answers: [
            answer("Excellent - no issues", [3, 0, 1, 0]),
            answer("Good - minor issues", [2, 1, 2, 0]),
            answer("Fair - several problems", [0, 3, 1, 2]),
            answer("Poor - many issues", [0, 2, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "What's your primary dental concern right now?",
        answers: [
            answer("Maintaining healthy teeth", [3, 0, 0, 0]),
            answer("Treating pain or decay", [0, 3, 0, 1]),
            answer("Improving appearance", [0, 0, 3, 0]),
            answer("Major restoration needed", [0, 1, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "How do you feel about your smile?",
        answers: [
            answer("Love it!", [3, 0, 0, 0]),
            answer("It's okay", [2, 1, 1, 0]),
            answer("Want to improve it", [0, 0, 3, 1]),
            answer("Embarrassed by it", [0, 1, 2, 3]),
        ],
    },
    QuizQuestion {
        prompt: "Do you experience dental pain or sensitivity?",
        answers: [
            answer("Never", [3, 0, 1, 0]),
            answer("Occasionally", [1, 2, 1, 1]),
            answer("Frequently", [0, 3, 0, 2]),
            answer("Constant pain", [0, 3, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "How many cavities have you had in the past 5 years?",
        answers: [
            answer("None", [3, 0, 1, 0]),
            answer("1-2", [2, 1, 1, 0]),
            answer("3-5", [0, 3, 0, 2]),
            answer("More than 5", [0, 2, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "How often do you brush your teeth?",
        answers: [
            answer("Twice daily or more", [3, 0, 1, 0]),
            answer("Once daily", [1, 2, 1, 1]),
            answer("Few times a week", [0, 2, 0, 2]),
            answer("Rarely", [0, 1, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "Do you have any missing teeth?",
        answers: [
            answer("No missing teeth", [3, 0, 1, 0]),
            answer("1-2 missing", [0, 2, 1, 2]),
            answer("3-5 missing", [0, 1, 0, 3]),
            answer("Many missing", [0, 0, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "What's your interest in cosmetic dentistry?",
        answers: [
            answer("Not interested", [2, 1, 0, 1]),
            answer("Slightly interested", [1, 0, 2, 0]),
            answer("Very interested", [0, 0, 3, 0]),
            answer("Need it for confidence", [0, 0, 3, 2]),
        ],
    },
    QuizQuestion {
        prompt: "How are your gums?",
        answers: [
            answer("Healthy pink gums", [3, 0, 1, 0]),
            answer("Occasional bleeding", [1, 2, 1, 1]),
            answer("Frequent bleeding/swelling", [0, 3, 0, 2]),
            answer("Severe gum disease", [0, 2, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "Have you had any dental emergencies?",
        answers: [
            answer("Never", [3, 0, 1, 0]),
            answer("One minor incident", [2, 1, 1, 0]),
            answer("Several emergencies", [0, 3, 0, 2]),
            answer("Frequent emergencies", [0, 2, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "What's your age range?",
        answers: [
            answer("Under 30", [2, 1, 2, 0]),
            answer("30-45", [1, 2, 2, 1]),
            answer("45-60", [1, 2, 1, 2]),
            answer("Over 60", [1, 1, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "How important is having a perfect smile to you?",
        answers: [
            answer("Not important", [2, 1, 0, 1]),
            answer("Somewhat important", [1, 0, 2, 0]),
            answer("Very important", [0, 0, 3, 1]),
            answer("Life-changing important", [0, 0, 3, 2]),
        ],
    },
    QuizQuestion {
        prompt: "Do you grind or clench your teeth?",
        answers: [
            answer("Never", [3, 0, 1, 0]),
            answer("Sometimes when stressed", [1, 2, 1, 1]),
            answer("Regularly at night", [0, 3, 0, 2]),
            answer("Constantly", [0, 3, 0, 3]),
        ],
    },
    QuizQuestion {
        prompt: "What's your dental insurance situation?",
        answers: [
            answer("Great coverage", [2, 1, 2, 1]),
            answer("Basic coverage", [2, 2, 1, 1]),
            answer("No insurance", [1, 2, 1, 2]),
            answer("Need financing options", [0, 2, 2, 3]),
        ],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizError {
    /// Answer index outside the per-question choice range.
    InvalidChoice,
    /// Tried to advance past a question that has no recorded answer.
    Unanswered,
    /// Tried to answer or navigate past the last question.
    OutOfRange,
}

/// A participant's in-flight run. `answers[i]` is the chosen index for
/// question `i`, or `None` while unanswered; going back and re-answering
/// overwrites the earlier choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizState {
    pub current: usize,
    pub answers: Vec<Option<usize>>,
    pub started_at_ms: u64,
}

impl QuizState {
    pub fn start(now_ms: u64) -> Self {
        QuizState {
            current: 0,
            answers: vec![None; TOTAL_QUESTIONS],
            started_at_ms: now_ms,
        }
    }

    /// Record an answer for the current question.
    pub fn answer(&mut self, choice: usize) -> Result<(), QuizError> {
        if self.current >= TOTAL_QUESTIONS {
            return Err(QuizError::OutOfRange);
        }
        if choice >= ANSWERS_PER_QUESTION {
            return Err(QuizError::InvalidChoice);
        }
        self.answers[self.current] = Some(choice);
        Ok(())
    }

    /// Advance to the next question; the current one must be answered.
    pub fn next(&mut self) -> Result<(), QuizError> {
        if self.current >= TOTAL_QUESTIONS {
            return Err(QuizError::OutOfRange);
        }
        if self.answers[self.current].is_none() {
            return Err(QuizError::Unanswered);
        }
        self.current += 1;
        Ok(())
    }

    pub fn previous(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    pub fn is_complete(&self) -> bool {
        self.answers.iter().take(TOTAL_QUESTIONS).all(Option::is_some)
    }

    /// Accumulated per-archetype totals over the answered questions, in
    /// [`ARCHETYPES`] order.
    pub fn scores(&self) -> [u32; 4] {
        tally(&QUESTIONS, &self.answers)
    }

    /// The winning archetype and its score. `None` until every question is
    /// answered; ties resolve to the earliest archetype in declaration
    /// order.
    pub fn resolve_profile(&self) -> Option<(Archetype, u32)> {
        if !self.is_complete() {
            return None;
        }
        let totals = self.scores();
        let winner = leader(totals);
        Some((winner, totals[winner.index()]))
    }
}

/// Sum per-archetype points for a sequence of choices over a question
/// bank. Unanswered or out-of-range choices contribute nothing.
pub fn tally(questions: &[QuizQuestion], answers: &[Option<usize>]) -> [u32; 4] {
    let mut totals = [0u32; 4];
    for (question, choice) in questions.iter().zip(answers.iter()) {
        if let Some(choice) = choice {
            if let Some(answer) = question.answers.get(*choice) {
                for (total, points) in totals.iter_mut().zip(answer.points.iter()) {
                    *total += points;
                }
            }
        }
    }
    totals
}

/// First archetype, in declaration order, holding the maximum total.
pub fn leader(totals: [u32; 4]) -> Archetype {
    let max = totals.iter().copied().max().unwrap_or(0);
    ARCHETYPES
        .into_iter()
        .find(|archetype| totals[archetype.index()] == max)
        .unwrap_or(Archetype::Guardian)
}

/// A completed run, persisted for follow-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResult {
    pub profile: Archetype,
    pub score: u32,
    pub scores: [u32; 4],
    pub completed_at_ms: u64,
}

fn progress_key(participant: &str) -> String {
    format!("quiz:progress:{}", participant)
}

fn result_key(participant: &str) -> String {
    format!("quiz:result:{}", participant)
}

pub fn save_progress<S: KeyValueStore>(
    store: &S,
    participant: &str,
    state: &QuizState,
) -> Result<(), ()> {
    let bytes = serde_json::to_vec(state).map_err(|_| ())?;
    store.set_with_ttl(&progress_key(participant), &bytes, PROGRESS_TTL_MS)
}

pub fn load_progress<S: KeyValueStore>(store: &S, participant: &str) -> Option<QuizState> {
    load_progress_at(store, participant, crate::now_ms())
}

/// Resume a run if it started within the progress TTL; anything older is
/// deleted rather than resumed.
pub fn load_progress_at<S: KeyValueStore>(
    store: &S,
    participant: &str,
    now_ms: u64,
) -> Option<QuizState> {
    let key = progress_key(participant);
    let bytes = store.get(&key).ok()??;
    let state: QuizState = serde_json::from_slice(&bytes).ok()?;
    if now_ms.saturating_sub(state.started_at_ms) >= PROGRESS_TTL_MS {
        let _ = store.delete(&key);
        return None;
    }
    Some(state)
}

pub fn save_result<S: KeyValueStore>(
    store: &S,
    participant: &str,
    result: &QuizResult,
) -> Result<(), ()> {
    let bytes = serde_json::to_vec(result).map_err(|_| ())?;
    store.set_with_ttl(&result_key(participant), &bytes, RESULT_TTL_MS)
}

pub fn load_result_at<S: KeyValueStore>(
    store: &S,
    participant: &str,
    now_ms: u64,
) -> Option<QuizResult> {
    let key = result_key(participant);
    let bytes = store.get(&key).ok()??;
    let result: QuizResult = serde_json::from_slice(&bytes).ok()?;
    if now_ms.saturating_sub(result.completed_at_ms) >= RESULT_TTL_MS {
        let _ = store.delete(&key);
        return None;
    }
    Some(result)
}

/// The coarser five-profile taxonomy used by the follow-up email pipeline. Distinct
/// from [`Archetype`]; the two are not mapped onto each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthProfile {
    Excellent,
    Good,
    Fair,
    NeedsAttention,
    Urgent,
}

/// Follow-up guidance attached to a health profile.
#[derive(Debug, Clone, Copy)]
pub struct Recommendation {
    pub services: &'static [&'static str],
    pub message: &'static str,
    pub priority: &'static str,
}

impl HealthProfile {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "excellent" => Some(HealthProfile::Excellent),
            "good" => Some(HealthProfile::Good),
            "fair" => Some(HealthProfile::Fair),
            "needs-attention" => Some(HealthProfile::NeedsAttention),
            "urgent" => Some(HealthProfile::Urgent),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            HealthProfile::Excellent => "excellent",
            HealthProfile::Good => "good",
            HealthProfile::Fair => "fair",
            HealthProfile::NeedsAttention => "needs-attention",
            HealthProfile::Urgent => "urgent",
        }
    }

    pub fn recommendation(&self) -> Recommendation {
        match self {
            HealthProfile::Excellent => Recommendation {
                services: &["preventive-care", "teeth-whitening"],
                message: "Great job maintaining your oral health! Keep up with regular cleanings.",
                priority: "routine",
            },
            HealthProfile::Good => Recommendation {
                services: &["preventive-care", "fillings", "teeth-whitening"],
                message: "Your oral health is good, but there are areas for improvement.",
                priority: "preventive",
            },
            HealthProfile::Fair => Recommendation {
                services: &["general-dentistry", "fillings", "gum-disease"],
                message: "Your oral health needs attention. Schedule a comprehensive exam soon.",
                priority: "moderate",
            },
            HealthProfile::NeedsAttention => Recommendation {
                services: &["general-dentistry", "gum-disease", "root-canals"],
                message: "Your oral health requires prompt professional care.",
                priority: "high",
            },
            HealthProfile::Urgent => Recommendation {
                services: &["emergency-dentistry", "root-canals", "gum-disease"],
                message: "You may need immediate dental care. Please contact us right away.",
                priority: "urgent",
            },
        }
    }
}

/// Validate a quiz submission as received from a client: score in 0..=100
/// and a recognized health profile.
pub fn validate_quiz_submission(
    score: i64,
    profile: &str,
) -> Result<(u32, HealthProfile), &'static str> {
    if !(0..=100).contains(&score) {
        return Err("Invalid score value");
    }
    let profile = HealthProfile::parse(profile).ok_or("Invalid health profile")?;
    Ok((score as u32, profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn completed_with(choice: usize) -> QuizState {
        let mut state = QuizState::start(0);
        for _ in 0..TOTAL_QUESTIONS {
            state.answer(choice).unwrap();
            state.next().unwrap();
        }
        state
    }

    #[test]
    fn all_first_answers_favor_guardian() {
        let state = completed_with(0);
        // Q9, Q12, Q13, and Q15 give their first answer only 2 guardian points.
        let (profile, score) = state.resolve_profile().unwrap();
        assert_eq!(profile, Archetype::Guardian);
        assert_eq!(score, 41);
    }

    #[test]
    fn pure_guardian_bank_scores_45() {
        let bank: Vec<QuizQuestion> = (0..TOTAL_QUESTIONS)
            .map(|_| QuizQuestion {
                prompt: "synthetic",
                answers: [
                    answer("all guardian", [3, 0, 0, 0]),
                    answer("b", [0, 1, 0, 0]),
                    answer("c", [0, 0, 1, 0]),
                    answer("d", [0, 0, 0, 1]),
                ],
            })
            .collect();
        let choices = vec![Some(0); TOTAL_QUESTIONS];
        let totals = tally(&bank, &choices);
        assert_eq!(totals, [45, 0, 0, 0]);
        assert_eq!(leader(totals), Archetype::Guardian);
    }

    #[test]
    fn navigation_requires_an_answer_before_advancing() {
        let mut state = QuizState::start(0);
        assert_eq!(state.next(), Err(QuizError::Unanswered));
        state.answer(1).unwrap();
        state.next().unwrap();
        assert_eq!(state.current, 1);
        state.previous();
        assert_eq!(state.current, 0);
        state.previous();
        assert_eq!(state.current, 0);
        // Re-answering overwrites.
        state.answer(2).unwrap();
        assert_eq!(state.answers[0], Some(2));
    }

    #[test]
    fn choice_bounds_are_enforced() {
        let mut state = QuizState::start(0);
        assert_eq!(state.answer(4), Err(QuizError::InvalidChoice));
        let mut done = completed_with(0);
        assert_eq!(done.answer(0), Err(QuizError::OutOfRange));
        assert_eq!(done.next(), Err(QuizError::OutOfRange));
    }

    #[test]
    fn incomplete_runs_resolve_to_none() {
        let mut state = QuizState::start(0);
        state.answer(0).unwrap();
        assert_eq!(state.resolve_profile(), None);
    }

    #[test]
    fn ties_resolve_in_declaration_order() {
        assert_eq!(leader([5, 5, 5, 5]), Archetype::Guardian);
        assert_eq!(leader([0, 7, 2, 7]), Archetype::Warrior);
        assert_eq!(leader([1, 2, 3, 3]), Archetype::Explorer);
        assert_eq!(leader([0, 0, 0, 4]), Archetype::Rebuilder);
        assert_eq!(leader([0, 0, 0, 0]), Archetype::Guardian);
    }

    #[test]
    fn resolve_matches_leader_over_real_bank() {
        let mut state = QuizState::start(0);
        state.answers = vec![Some(1); TOTAL_QUESTIONS];
        let scores = state.scores();
        let (winner, score) = state.resolve_profile().unwrap();
        assert_eq!(winner, leader(scores));
        assert_eq!(score, *scores.iter().max().unwrap());
    }

    #[test]
    fn progress_round_trip_and_expiry() {
        let store = InMemoryStore::new();
        let mut state = QuizState::start(1_000);
        state.answer(2).unwrap();
        save_progress(&store, "visitor-1", &state).unwrap();

        let resumed = load_progress_at(&store, "visitor-1", 1_000 + PROGRESS_TTL_MS - 1).unwrap();
        assert_eq!(resumed.answers[0], Some(2));

        assert!(load_progress_at(&store, "visitor-1", 1_000 + PROGRESS_TTL_MS).is_none());
        // Expired progress is deleted, not merely skipped.
        assert!(store.get("quiz:progress:visitor-1").unwrap().is_none());
    }

    #[test]
    fn result_round_trip_and_expiry() {
        let store = InMemoryStore::new();
        let result = QuizResult {
            profile: Archetype::Explorer,
            score: 31,
            scores: [10, 5, 31, 2],
            completed_at_ms: 5_000,
        };
        save_result(&store, "visitor-2", &result).unwrap();
        let loaded = load_result_at(&store, "visitor-2", 5_000 + RESULT_TTL_MS - 1).unwrap();
        assert_eq!(loaded.profile, Archetype::Explorer);
        assert!(load_result_at(&store, "visitor-2", 5_000 + RESULT_TTL_MS).is_none());
    }

    #[test]
    fn health_profile_parse_and_recommendations() {
        assert_eq!(
            HealthProfile::parse("needs-attention"),
            Some(HealthProfile::NeedsAttention)
        );
        assert_eq!(HealthProfile::parse("guardian"), None);
        let rec = HealthProfile::Urgent.recommendation();
        assert_eq!(rec.priority, "urgent");
        assert!(rec.services.contains(&"emergency-dentistry"));
    }

    #[test]
    fn quiz_submission_validation() {
        assert!(validate_quiz_submission(0, "excellent").is_ok());
        assert!(validate_quiz_submission(100, "urgent").is_ok());
        assert!(validate_quiz_submission(101, "urgent").is_err());
        assert!(validate_quiz_submission(-1, "good").is_err());
        assert!(validate_quiz_submission(50, "amazing").is_err());
    }
}
