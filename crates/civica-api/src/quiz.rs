//! Quiz, leaderboard, history, and statistics surface
//!
//! Route constants plus thin typed calls on `ApiClient`. All of these ride on
//! the stored token pair; none takes credentials explicitly.

use common::Envelope;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::ApiError;

/// Today's quiz
pub const QUIZ_TODAY: &str = "/quiz/today";

/// Quiz for an arbitrary date (`?date=YYYY-MM-DD`)
pub const QUIZ_BY_DATE: &str = "/quiz/by-date";

/// Start a session for a quiz
pub const QUIZ_START: &str = "/quiz/start";

/// Submit one answer within a session
pub const QUIZ_SUBMIT_ANSWER: &str = "/quiz/submit-answer";

/// Session progress poll
pub const QUIZ_SESSION_STATUS: &str = "/quiz/session-status";

/// Abandon an in-flight session
pub const QUIZ_ABANDON: &str = "/quiz/abandon";

/// Results of a finished session
pub const QUIZ_RESULTS: &str = "/quiz/results";

/// Past sessions, newest first
pub const QUIZ_HISTORY: &str = "/quiz/history";

/// Today's leaderboard
pub const LEADERBOARD_TODAY: &str = "/quiz/leaderboard/today";

/// Leaderboard for an arbitrary date (`?date=YYYY-MM-DD`)
pub const LEADERBOARD_BY_DATE: &str = "/quiz/leaderboard/by-date";

/// Aggregate per-user statistics
pub const QUIZ_STATISTICS: &str = "/quiz/statistics";

/// Detail view of one past session.
pub fn quiz_history_detail(session_id: &str) -> String {
    format!("{QUIZ_HISTORY}/{session_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub date: String,
    pub title: String,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSession {
    pub id: String,
    pub quiz_id: String,
    pub status: String,
    pub current_question: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub correct: bool,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResults {
    pub session_id: String,
    pub score: u32,
    pub total_questions: u32,
    pub correct_answers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub session_id: String,
    pub date: String,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub username: String,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub quizzes_taken: u32,
    pub average_score: f64,
    pub best_score: u32,
    pub current_streak: u32,
}

impl ApiClient {
    pub async fn today_quiz(&self) -> Result<Envelope<Quiz>, ApiError> {
        self.get(QUIZ_TODAY, &[]).await
    }

    pub async fn quiz_by_date(&self, date: &str) -> Result<Envelope<Quiz>, ApiError> {
        self.get(QUIZ_BY_DATE, &[("date", date.to_owned())]).await
    }

    pub async fn start_quiz(&self, quiz_id: &str) -> Result<Envelope<QuizSession>, ApiError> {
        self.post(QUIZ_START, &[("quizId", quiz_id.to_owned())], None)
            .await
    }

    pub async fn submit_answer(
        &self,
        session_id: &str,
        question_id: &str,
        selected_option: u32,
    ) -> Result<Envelope<AnswerResult>, ApiError> {
        self.post(
            QUIZ_SUBMIT_ANSWER,
            &[],
            Some(serde_json::json!({
                "sessionId": session_id,
                "questionId": question_id,
                "selectedOption": selected_option,
            })),
        )
        .await
    }

    pub async fn session_status(
        &self,
        session_id: &str,
    ) -> Result<Envelope<QuizSession>, ApiError> {
        self.get(QUIZ_SESSION_STATUS, &[("sessionId", session_id.to_owned())])
            .await
    }

    /// Abandon an in-flight session. Message-only response.
    pub async fn abandon_session(
        &self,
        session_id: &str,
    ) -> Result<Envelope<serde_json::Value>, ApiError> {
        self.post(QUIZ_ABANDON, &[("sessionId", session_id.to_owned())], None)
            .await
    }

    pub async fn quiz_results(
        &self,
        session_id: &str,
    ) -> Result<Envelope<QuizResults>, ApiError> {
        self.get(QUIZ_RESULTS, &[("sessionId", session_id.to_owned())])
            .await
    }

    pub async fn quiz_history(&self) -> Result<Envelope<Vec<HistoryEntry>>, ApiError> {
        self.get(QUIZ_HISTORY, &[]).await
    }

    pub async fn history_detail(
        &self,
        session_id: &str,
    ) -> Result<Envelope<QuizResults>, ApiError> {
        self.get(&quiz_history_detail(session_id), &[]).await
    }

    pub async fn leaderboard_today(&self) -> Result<Envelope<Vec<LeaderboardEntry>>, ApiError> {
        self.get(LEADERBOARD_TODAY, &[]).await
    }

    pub async fn leaderboard_by_date(
        &self,
        date: &str,
    ) -> Result<Envelope<Vec<LeaderboardEntry>>, ApiError> {
        self.get(LEADERBOARD_BY_DATE, &[("date", date.to_owned())])
            .await
    }

    pub async fn statistics(&self) -> Result<Envelope<Statistics>, ApiError> {
        self.get(QUIZ_STATISTICS, &[]).await
    }
}
