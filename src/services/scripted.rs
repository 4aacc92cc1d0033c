//! Scripted stand-ins for speech recognition and response generation.
//!
//! Both wait a fixed delay to mimic the latency of the real thing, then answer
//! from a script. The interviewer walks through `INTERVIEW_PROMPTS` one turn at
//! a time and keeps repeating the last prompt once the script runs out.

use super::{ResponseGenerator, ServiceResult, SpeechToText};
use crate::protocol::AudioPayload;
use crate::session::TurnContext;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Interviewer prompts, in the order they are asked.
pub const INTERVIEW_PROMPTS: [&str; 8] = [
    "That's very interesting! Can you tell me more about your experience with React and TypeScript?",
    "Great background! What challenges have you faced in your previous frontend projects?",
    "Excellent! How do you approach state management in large React applications?",
    "Perfect! What's your experience with testing frontend applications?",
    "Wonderful! How do you ensure code quality and maintainability in your projects?",
    "That's impressive! Can you describe a complex technical problem you've solved recently?",
    "Great insights! How do you stay updated with the latest frontend technologies?",
    "Excellent! What's your approach to optimizing web application performance?",
];

pub fn greeting(candidate_name: &str) -> String {
    format!(
        "Hello {candidate_name}! Welcome to your VTB interview. I'm your AI interviewer. \
         Please tell me about yourself and your experience."
    )
}

pub fn scripted_transcript(turn: u64) -> String {
    format!("[Transcription {turn}] Thank you for your response about your background and experience.")
}

/// Index of the prompt for a 1-based turn: `min(turn - 1, len - 1)`.
pub fn prompt_index(turn: u64, prompt_count: usize) -> usize {
    let zero_based = usize::try_from(turn.saturating_sub(1)).unwrap_or(usize::MAX);
    zero_based.min(prompt_count.saturating_sub(1))
}

async fn simulate_latency(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedTranscriber {
    delay: Duration,
}

impl ScriptedTranscriber {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl SpeechToText for ScriptedTranscriber {
    async fn transcribe(&self, turn: &TurnContext, audio: Option<&AudioPayload>) -> ServiceResult<String> {
        debug!(
            turn = turn.turn,
            encoded_len = audio.map_or(0, AudioPayload::encoded_len),
            decoded_len = ?audio.and_then(AudioPayload::decoded_len),
            "Simulating transcription"
        );
        simulate_latency(self.delay).await;
        Ok(scripted_transcript(turn.turn))
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedInterviewer {
    delay: Duration,
    prompts: Vec<String>,
}

impl ScriptedInterviewer {
    pub fn new(delay: Duration) -> Self {
        Self::with_prompts(delay, INTERVIEW_PROMPTS.iter().map(|p| p.to_string()).collect())
    }

    /// Interviewer with a custom script. An empty script is replaced by the
    /// default one, there must always be something to say.
    pub fn with_prompts(delay: Duration, prompts: Vec<String>) -> Self {
        let prompts = if prompts.is_empty() {
            INTERVIEW_PROMPTS.iter().map(|p| p.to_string()).collect()
        } else {
            prompts
        };
        Self { delay, prompts }
    }

    pub fn prompt_for_turn(&self, turn: u64) -> &str {
        &self.prompts[prompt_index(turn, self.prompts.len())]
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedInterviewer {
    async fn respond(&self, turn: &TurnContext, _transcript: &str) -> ServiceResult<String> {
        simulate_latency(self.delay).await;
        Ok(self.prompt_for_turn(turn.turn).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(n: u64) -> TurnContext {
        TurnContext {
            session_id: Some("s-1".into()),
            candidate_name: "Alex".into(),
            turn: n,
        }
    }

    #[test]
    fn test_prompt_index_saturates() {
        assert_eq!(prompt_index(1, 8), 0);
        assert_eq!(prompt_index(3, 8), 2);
        assert_eq!(prompt_index(8, 8), 7);
        assert_eq!(prompt_index(9, 8), 7);
        assert_eq!(prompt_index(1_000, 8), 7);
        assert_eq!(prompt_index(u64::MAX, 8), 7);
    }

    #[test]
    fn test_prompt_index_matches_formula() {
        for count in 1..=10usize {
            for n in 1..=25u64 {
                let expected = ((n - 1) as usize).min(count - 1);
                assert_eq!(prompt_index(n, count), expected, "turn {} of {}", n, count);
            }
        }
    }

    #[test]
    fn test_greeting_mentions_candidate() {
        let text = greeting("Alex");
        assert!(text.starts_with("Hello Alex! Welcome to your VTB interview."));
        assert!(text.ends_with("Please tell me about yourself and your experience."));
    }

    #[test]
    fn test_empty_script_falls_back_to_default() {
        let interviewer = ScriptedInterviewer::with_prompts(Duration::ZERO, Vec::new());
        assert_eq!(interviewer.prompt_for_turn(1), INTERVIEW_PROMPTS[0]);
    }

    #[tokio::test]
    async fn test_scripted_transcriber() {
        let transcriber = ScriptedTranscriber::new(Duration::ZERO);
        let payload = AudioPayload::from_bytes(&[0u8; 32]);
        let text = transcriber.transcribe(&turn(2), Some(&payload)).await.unwrap();
        assert_eq!(text, scripted_transcript(2));
        assert!(text.starts_with("[Transcription 2]"));

        let without_audio = transcriber.transcribe(&turn(3), None).await.unwrap();
        assert!(without_audio.starts_with("[Transcription 3]"));
    }

    #[tokio::test]
    async fn test_scripted_interviewer_walks_the_script() {
        let interviewer = ScriptedInterviewer::new(Duration::ZERO);
        for n in 1..=8u64 {
            let reply = interviewer.respond(&turn(n), "").await.unwrap();
            assert_eq!(reply, INTERVIEW_PROMPTS[(n - 1) as usize]);
        }
        let ninth = interviewer.respond(&turn(9), "").await.unwrap();
        assert_eq!(ninth, INTERVIEW_PROMPTS[7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_delay_is_honoured() {
        let interviewer = ScriptedInterviewer::new(Duration::from_millis(1500));
        let started = tokio::time::Instant::now();
        interviewer.respond(&turn(1), "").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }
}
