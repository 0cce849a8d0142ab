//! Chat intent classification.
//!
//! Messages are matched against short phrase lists with a fuzzy partial ratio:
//! the best normalised indel similarity between the shorter string and every
//! equally long window of the longer one, scaled to `0..=100`. Matches below
//! [`MATCH_THRESHOLD`] yield no intent.

use dosecast_api_models::{ClassifyResponse, Intent};

/// Minimum partial ratio (0-100) for a phrase to count as a match.
pub const MATCH_THRESHOLD: u32 = 70;

/// Longest message, in characters, the classifier accepts. Scoring cost grows
/// with message length, so longer input is rejected before it is matched.
pub const MAX_MESSAGE_CHARS: usize = 1024;

const PREDICT_DOSE_PHRASES: &[&str] = &[
    "generate predicted dose",
    "start prediction",
    "predict",
    "dose",
    "run model",
];

const HELP_PHRASES: &[&str] = &["help", "what can you do", "how does this work", "commands"];

/// Phrase-list classifier for chat messages.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    phrases: Vec<(Intent, &'static [&'static str])>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self {
            phrases: vec![
                (Intent::PredictDose, PREDICT_DOSE_PHRASES),
                (Intent::Help, HELP_PHRASES),
            ],
        }
    }
}

impl IntentClassifier {
    /// Best intent and its score (0-100) for `message`, if any clears the threshold.
    #[must_use]
    pub fn classify(&self, message: &str) -> Option<(Intent, u32)> {
        let message = message.to_lowercase();
        let mut best: Option<(Intent, u32)> = None;
        for (intent, phrases) in &self.phrases {
            for phrase in *phrases {
                let score = partial_ratio(&message, phrase);
                if best.is_none_or(|(_, top)| score > top) {
                    best = Some((*intent, score));
                }
            }
        }
        best.filter(|(_, score)| *score >= MATCH_THRESHOLD)
    }

    /// Classify `message` and build the wire response, including the canned help reply.
    #[must_use]
    pub fn respond(&self, message: &str, patient_id: Option<&str>) -> ClassifyResponse {
        match self.classify(message) {
            Some((intent, score)) => ClassifyResponse {
                intent: Some(intent),
                score: f64::from(score) / 100.0,
                bot_response: (intent == Intent::Help).then(|| help_response(patient_id)),
            },
            None => ClassifyResponse {
                intent: None,
                score: 0.0,
                bot_response: None,
            },
        }
    }
}

fn help_response(patient_id: Option<&str>) -> String {
    let subject = patient_id
        .filter(|id| !id.trim().is_empty())
        .map_or_else(|| "a patient".to_string(), |id| format!("patient {id}"));
    format!(
        "I can generate a predicted dose for {subject}. Try \"start prediction\" or \
         \"run model\", then page through the CT, dose and prediction slices."
    )
}

/// Fuzzy partial ratio of two strings, `0..=100`.
///
/// Both strings empty scores 100; exactly one empty scores 0.
#[must_use]
pub fn partial_ratio(left: &str, right: &str) -> u32 {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    let (short, long) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    if short.is_empty() {
        return if long.is_empty() { 100 } else { 0 };
    }

    let width = short.len();
    let mut best = 0.0_f64;
    let mut consider = |window: &[char]| {
        let score = indel_ratio(&short, window);
        if score > best {
            best = score;
        }
    };
    // Windows partially hanging off either end catch matches at the edges.
    // This is rapidfuzz's alignment; fuzzywuzzy only tries windows anchored on
    // difflib matching blocks, so scores near the threshold can differ by a
    // few points between the two.
    for len in 1..width {
        consider(&long[..len.min(long.len())]);
        consider(&long[long.len().saturating_sub(len)..]);
    }
    for start in 0..=(long.len() - width) {
        consider(&long[start..start + width]);
    }

    // Bounded to [0, 100] so the cast cannot truncate.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let rounded = (best * 100.0).round() as u32;
    rounded
}

#[allow(clippy::cast_precision_loss)]
fn indel_ratio(left: &[char], right: &[char]) -> f64 {
    let total = left.len() + right.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(left, right)) as f64 / total as f64
}

fn lcs_len(left: &[char], right: &[char]) -> usize {
    let mut row = vec![0_usize; right.len() + 1];
    for a in left {
        let mut diagonal = 0;
        for (idx, b) in right.iter().enumerate() {
            let above = row[idx + 1];
            row[idx + 1] = if a == b {
                diagonal + 1
            } else {
                above.max(row[idx])
            };
            diagonal = above;
        }
    }
    row[right.len()]
}
