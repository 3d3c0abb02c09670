use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use learn_core::model::{
    AdvanceTarget, Answer, ConceptContent, CorrelationId, GradingResult, ItemSet,
    LearningSession, SessionId, StudyMode, SummaryPayload, TopicId, WrongItem,
};

use super::wire::{
    AdvanceBody, AdvanceResponse, GradeBody, GradeResponse, ItemSetDto, SessionDto, StartBody,
    StartResponse, SummaryDto, answer_value,
};
use super::{AdvanceRequest, ContentKey, GradeRequest, SessionGateway};
use crate::config::GatewayConfig;
use crate::error::{ConfigError, GatewayError};

/// `reqwest`-backed gateway talking JSON to the study server.
#[derive(Clone)]
pub struct HttpSessionGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpSessionGateway {
    /// # Errors
    ///
    /// Returns `ConfigError::Client` if the HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ConfigError::Client(err.to_string()))?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> Result<Url, GatewayError> {
        self.config
            .base_url
            .join(path)
            .map_err(|err| GatewayError::Network(format!("bad request url {path}: {err}")))
    }

    fn content_url(&self, key: ContentKey, leaf: &str) -> Result<Url, GatewayError> {
        let mut url = self.url(&format!("topics/{}/{leaf}", key.topic_id))?;
        if let Some(session_id) = key.session_id {
            url.query_pairs_mut()
                .append_pair("sessionId", &session_id.to_string());
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, GatewayError> {
        let response = self.authorize(self.client.get(url)).send().await?;
        read_json(response).await
    }

    async fn post<B: serde::Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, GatewayError> {
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> GatewayError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT => GatewayError::InvalidState(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Forbidden,
        StatusCode::NOT_FOUND => GatewayError::NotFound,
        other => GatewayError::Status(other.as_u16()),
    }
}

fn grade_path(answer: &Answer) -> &'static str {
    match answer {
        Answer::Boolean(_) => "grade-one/mini",
        Answer::Choice(_) => "grade-one/mcq",
        Answer::Text(_) => "grade-one/practical",
    }
}

fn problem_leaf(mode: StudyMode) -> &'static str {
    match mode {
        StudyMode::Written => "mcq",
        StudyMode::Practical => "practical",
    }
}

fn wrong_path(mode: StudyMode) -> &'static str {
    match mode {
        StudyMode::Written => "wrong-items/written",
        StudyMode::Practical => "wrong-items/practical",
    }
}

#[async_trait]
impl SessionGateway for HttpSessionGateway {
    async fn fetch_session(&self, session_id: SessionId) -> Result<LearningSession, GatewayError> {
        let url = self.url(&format!("session/{session_id}"))?;
        let dto: SessionDto = self.get(url).await?;
        Ok(dto.into_session())
    }

    async fn start_session(
        &self,
        topic_id: TopicId,
        mode: StudyMode,
        resume: bool,
    ) -> Result<SessionId, GatewayError> {
        let body = StartBody {
            topic_id,
            mode,
            resume,
        };
        let response: StartResponse = self.post(self.url("session/start")?, &body).await?;
        Ok(response.session_id)
    }

    async fn advance_step(&self, request: &AdvanceRequest) -> Result<AdvanceTarget, GatewayError> {
        let details_json = request
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| GatewayError::Decode(err.to_string()))?;
        let body = AdvanceBody {
            session_id: request.session_id,
            step: request.step.clone(),
            score: request.score,
            details_json,
        };
        let response: AdvanceResponse = self.post(self.url("session/advance")?, &body).await?;
        Ok(response.moved_to)
    }

    async fn fetch_concept(&self, key: ContentKey) -> Result<ConceptContent, GatewayError> {
        self.get(self.content_url(key, "concept")?).await
    }

    async fn fetch_mini_items(&self, key: ContentKey) -> Result<ItemSet, GatewayError> {
        let dto: ItemSetDto = self.get(self.content_url(key, "mini")?).await?;
        Ok(dto.into())
    }

    async fn fetch_problem_items(
        &self,
        key: ContentKey,
        mode: StudyMode,
    ) -> Result<ItemSet, GatewayError> {
        let dto: ItemSetDto = self.get(self.content_url(key, problem_leaf(mode))?).await?;
        Ok(dto.into())
    }

    async fn grade_one(&self, request: &GradeRequest) -> Result<GradingResult, GatewayError> {
        let body = GradeBody {
            topic_id: request.topic_id,
            question_id: request.question_id,
            answer: answer_value(&request.answer),
            session_id: request.session_id,
        };
        let response: GradeResponse = self.post(self.url(grade_path(&request.answer))?, &body).await?;
        Ok(response.into())
    }

    async fn fetch_wrong_items(
        &self,
        correlation_id: &CorrelationId,
        mode: StudyMode,
    ) -> Result<Vec<WrongItem>, GatewayError> {
        let mut url = self.url(wrong_path(mode))?;
        url.query_pairs_mut()
            .append_pair("correlationId", correlation_id.as_str());
        self.get(url).await
    }

    async fn fetch_summary(
        &self,
        topic_id: TopicId,
        correlation_id: &CorrelationId,
    ) -> Result<SummaryPayload, GatewayError> {
        let mut url = self.url("summary")?;
        url.query_pairs_mut()
            .append_pair("topicId", &topic_id.to_string())
            .append_pair("correlationId", correlation_id.as_str());
        let dto: SummaryDto = self.get(url).await?;
        Ok(dto.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::model::{QuestionId, Step};

    fn gateway() -> HttpSessionGateway {
        HttpSessionGateway::new(GatewayConfig::new("https://study.example.com/api").unwrap()).unwrap()
    }

    #[test]
    fn content_urls_carry_session_only_when_present() {
        let gw = gateway();
        let with_session = gw
            .content_url(
                ContentKey {
                    topic_id: TopicId::new(3),
                    session_id: Some(SessionId::new(9)),
                },
                "mini",
            )
            .unwrap();
        assert_eq!(
            with_session.as_str(),
            "https://study.example.com/api/topics/3/mini?sessionId=9"
        );

        let topic_only = gw
            .content_url(
                ContentKey {
                    topic_id: TopicId::new(3),
                    session_id: None,
                },
                "concept",
            )
            .unwrap();
        assert_eq!(topic_only.as_str(), "https://study.example.com/api/topics/3/concept");
    }

    #[test]
    fn statuses_map_to_gateway_errors() {
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, "incomplete".into()),
            GatewayError::InvalidState("incomplete".into())
        );
        assert_eq!(status_error(StatusCode::FORBIDDEN, String::new()), GatewayError::Forbidden);
        assert_eq!(status_error(StatusCode::NOT_FOUND, String::new()), GatewayError::NotFound);
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, String::new()),
            GatewayError::Status(502)
        );
    }

    #[test]
    fn grade_endpoint_follows_answer_kind() {
        let request = GradeRequest {
            topic_id: TopicId::new(1),
            question_id: QuestionId::new(2),
            answer: Answer::Text("SELECT * FROM t".into()),
            session_id: None,
        };
        assert_eq!(grade_path(&request.answer), "grade-one/practical");
        assert_eq!(grade_path(&Answer::Boolean(true)), "grade-one/mini");
        assert_eq!(problem_leaf(StudyMode::Written), "mcq");
        assert_eq!(wrong_path(StudyMode::Practical), "wrong-items/practical");
        assert_eq!(Step::problem_for(StudyMode::Practical), Step::Practical);
    }
}
