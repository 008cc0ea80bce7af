//! REST client for the external profile service.

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    dao::{
        profile_store::ProfileStore,
        storage::{StorageError, StorageResult},
    },
    state::session::SkillGroup,
};

/// [`ProfileStore`] backed by the profile service's REST API.
#[derive(Clone)]
pub struct HttpProfileStore {
    client: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct GroupResponse {
    group: SkillGroup,
}

#[derive(Serialize)]
struct PointsDelta {
    delta: i64,
}

#[derive(Deserialize)]
struct PointsResponse {
    points: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizzesResponse {
    quizzes_completed: u32,
}

#[derive(Serialize)]
struct LevelUpdate {
    level: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AchievementQuery {
    total_points: i64,
    quizzes_completed: u32,
}

#[derive(Deserialize)]
struct AchievementsResponse {
    unlocked: Vec<String>,
}

#[derive(Deserialize)]
struct HintResponse {
    consumed: bool,
}

impl HttpProfileStore {
    /// Build a client targeting `base_url` (for example `http://profiles:9000`).
    pub fn new(base_url: &str) -> StorageResult<Self> {
        let base_url = Url::parse(base_url).map_err(|err| {
            StorageError::Rejected(format!("invalid profile service url `{base_url}`: {err}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::Rejected(format!(
                "profile service url `{base_url}` cannot carry a path"
            )));
        }
        let client = Client::builder().build().map_err(|source| {
            StorageError::unavailable("failed to build profile service client".into(), source)
        })?;
        Ok(Self { client, base_url })
    }

    /// Base URL followed by `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> StorageResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                StorageError::Rejected(format!("`{}` cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn call<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> StorageResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = url.path().to_string();
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| {
                StorageError::unavailable(format!("request to `{path}` failed"), source)
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::Missing(path)),
            status if status.is_success() => response.json::<T>().await.map_err(|source| {
                StorageError::unavailable(format!("failed to decode response for `{path}`"), source)
            }),
            status => Err(StorageError::Rejected(format!(
                "unexpected status {status} for `{path}`"
            ))),
        }
    }

    async fn call_empty<B>(&self, method: Method, url: Url, body: &B) -> StorageResult<()>
    where
        B: Serialize + ?Sized,
    {
        let path = url.path().to_string();
        let response = self
            .client
            .request(method, url)
            .json(body)
            .send()
            .await
            .map_err(|source| {
                StorageError::unavailable(format!("request to `{path}` failed"), source)
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::Missing(path)),
            status if status.is_success() => Ok(()),
            status => Err(StorageError::Rejected(format!(
                "unexpected status {status} for `{path}`"
            ))),
        }
    }
}

impl ProfileStore for HttpProfileStore {
    fn skill_group(
        &self,
        participant_id: &str,
        category: &str,
    ) -> BoxFuture<'static, StorageResult<SkillGroup>> {
        let store = self.clone();
        let url = self.endpoint(&["profiles", participant_id, "groups", category]);
        Box::pin(async move {
            let response: GroupResponse = store.call(Method::GET, url?, None::<&()>).await?;
            Ok(response.group)
        })
    }

    fn points(&self, participant_id: &str) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        let url = self.endpoint(&["profiles", participant_id, "points"]);
        Box::pin(async move {
            let response: PointsResponse = store.call(Method::GET, url?, None::<&()>).await?;
            Ok(response.points)
        })
    }

    fn adjust_points(
        &self,
        participant_id: &str,
        delta: i64,
    ) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        let url = self.endpoint(&["profiles", participant_id, "points"]);
        Box::pin(async move {
            let response: PointsResponse = store
                .call(Method::POST, url?, Some(&PointsDelta { delta }))
                .await?;
            Ok(response.points)
        })
    }

    fn record_quiz_completed(
        &self,
        participant_id: &str,
    ) -> BoxFuture<'static, StorageResult<u32>> {
        let store = self.clone();
        let url = self.endpoint(&["profiles", participant_id, "quizzes"]);
        Box::pin(async move {
            let response: QuizzesResponse = store.call(Method::POST, url?, None::<&()>).await?;
            Ok(response.quizzes_completed)
        })
    }

    fn update_level(
        &self,
        participant_id: &str,
        level: u32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let url = self.endpoint(&["profiles", participant_id, "level"]);
        Box::pin(async move {
            store
                .call_empty(Method::PUT, url?, &LevelUpdate { level })
                .await
        })
    }

    fn evaluate_achievements(
        &self,
        participant_id: &str,
        total_points: i64,
        quizzes_completed: u32,
    ) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        let url = self.endpoint(&["profiles", participant_id, "achievements", "evaluate"]);
        Box::pin(async move {
            let query = AchievementQuery {
                total_points,
                quizzes_completed,
            };
            let response: AchievementsResponse =
                store.call(Method::POST, url?, Some(&query)).await?;
            Ok(response.unlocked)
        })
    }

    fn consume_hint(&self, participant_id: &str) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        let url = self.endpoint(&["profiles", participant_id, "hints", "consume"]);
        Box::pin(async move {
            let response: HintResponse = store.call(Method::POST, url?, None::<&()>).await?;
            Ok(response.consumed)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let url = self.endpoint(&["health"]);
        Box::pin(async move {
            let response = store.client.get(url?).send().await.map_err(|source| {
                StorageError::unavailable("profile service health check failed".into(), source)
            })?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(StorageError::Rejected(format!(
                    "health check returned {}",
                    response.status()
                )))
            }
        })
    }
}
