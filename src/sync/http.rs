//! REST client for the remote workout mirror

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{RemoteError, RemoteStore, UserId};
use crate::db::{SessionId, WorkoutSession};

/// Session body as stored remotely
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSession<'a> {
    #[serde(flatten)]
    session: &'a WorkoutSession,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Created {
    #[serde(alias = "_id")]
    id: serde_json::Value,
}

/// `RemoteStore` backed by `{base}/users/{uid}/workouts`
#[derive(Clone)]
pub struct HttpRemote {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn workouts_url(&self, user: &UserId) -> String {
        format!("{}/users/{}/workouts", self.base_url, user.as_str())
    }

    fn body(session: &WorkoutSession) -> RemoteSession<'_> {
        RemoteSession {
            session,
            updated_at: Utc::now(),
        }
    }
}

/// Turn non-2xx responses into `RemoteError::Api`
async fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RemoteError::Api {
        status: status.as_u16(),
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or("unknown").to_string()
        } else {
            message
        },
    })
}

impl RemoteStore for HttpRemote {
    async fn create_session(&self, user: &UserId, session: &WorkoutSession) -> Result<String, RemoteError> {
        let response = self
            .http_client
            .post(self.workouts_url(user))
            .json(&Self::body(session))
            .send()
            .await?;
        let response = check(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(session.id.map(|id| id.to_string()).unwrap_or_default());
        }
        let created: Created = response.json().await?;
        Ok(match created.id {
            serde_json::Value::String(id) => id,
            other => other.to_string(),
        })
    }

    async fn update_session(&self, user: &UserId, id: SessionId, session: &WorkoutSession) -> Result<(), RemoteError> {
        let url = format!("{}/{}", self.workouts_url(user), id);
        let response = self
            .http_client
            .put(url)
            .json(&Self::body(session))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn list_sessions(&self, user: &UserId) -> Result<Vec<WorkoutSession>, RemoteError> {
        let response = self.http_client.get(self.workouts_url(user)).send().await?;
        let sessions = check(response).await?.json().await?;
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_urls() {
        let remote = HttpRemote::new("https://sync.example.com/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            remote.workouts_url(&UserId::new("abc")),
            "https://sync.example.com/api/users/abc/workouts"
        );
    }

    #[test]
    fn test_body_flattens_session() {
        let start = Utc.with_ymd_and_hms(2024, 7, 1, 18, 0, 0).unwrap();
        let session = WorkoutSession {
            id: Some(3),
            template_id: 1,
            date: start.date_naive(),
            start_time: start,
            end_time: None,
            exercises: vec![],
        };
        let json = serde_json::to_value(HttpRemote::body(&session)).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["templateId"], 1);
        assert!(json["endTime"].is_null());
        assert!(json.get("updatedAt").is_some());
    }
}
