//! Remote operation gateway: every backend call goes through here so timeout,
//! bearer credential and error normalisation are applied uniformly.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{FileSource, SelectedFile},
    error::{ApiErrorBody, GENERIC_FAILURE},
    protocol::{
        AnswerResponse, AskQuestionRequest, AuthCallbackResponse, ChatHistoryResponse,
        ClearChatRequest, DocumentSummary, LoginUrlResponse, SessionResponse,
        ToggleDocumentRequest, UploadAck,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{config::GatewayTimeouts, error::GatewayError, session::SessionContext};

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn login_url(&self) -> GatewayResult<String>;
    async fn auth_callback(&self, code: &str, state: Option<&str>)
        -> GatewayResult<AuthCallbackResponse>;
    async fn check_session(&self) -> GatewayResult<SessionResponse>;
    async fn logout(&self) -> GatewayResult<()>;
    async fn list_documents(&self, user: Option<&str>) -> GatewayResult<Vec<DocumentSummary>>;
    async fn upload_document(&self, file: &SelectedFile, owner: &str) -> GatewayResult<UploadAck>;
    async fn toggle_document(
        &self,
        name: &str,
        active: bool,
        owner: Option<&str>,
    ) -> GatewayResult<()>;
    async fn delete_document(&self, name: &str, owner: Option<&str>) -> GatewayResult<()>;
    async fn ask_question(&self, question: &str, user: Option<&str>)
        -> GatewayResult<AnswerResponse>;
    async fn clear_chat(&self) -> GatewayResult<()>;
    async fn chat_history(&self) -> GatewayResult<ChatHistoryResponse>;
}

#[derive(Clone, Copy)]
enum Auth {
    Bearer,
    Skip,
}

pub struct HttpGateway {
    http: Client,
    base_url: String,
    session: Arc<SessionContext>,
    timeouts: GatewayTimeouts,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        session: Arc<SessionContext>,
        timeouts: GatewayTimeouts,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            timeouts,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `/api/documents/{name}` with the name percent-encoded as a single segment.
    fn document_url(&self, name: &str) -> GatewayResult<Url> {
        let endpoint = "/api/documents";
        let mut url = Url::parse(&self.url(endpoint)).map_err(|err| GatewayError::Network {
            endpoint: endpoint.to_string(),
            message: format!("invalid base url: {err}"),
        })?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Network {
                endpoint: endpoint.to_string(),
                message: "base url cannot carry a path".to_string(),
            })?
            .push(name);
        Ok(url)
    }

    async fn execute(
        &self,
        endpoint: &str,
        request: RequestBuilder,
        timeout: Duration,
        auth: Auth,
    ) -> GatewayResult<Response> {
        let mut request = request.timeout(timeout);
        if let Auth::Bearer = auth {
            if let Some(token) = self.session.token().await {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await.map_err(|err| {
            let err = GatewayError::from_reqwest(endpoint, err);
            warn!(endpoint, "gateway: request failed: {err}");
            err
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(endpoint, status = status.as_u16(), "gateway: request ok");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|body| body.message_or_generic())
            .unwrap_or_else(|_| GENERIC_FAILURE.to_string());
        warn!(
            endpoint,
            status = status.as_u16(),
            "gateway: request rejected: {detail}"
        );
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }

    async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> GatewayResult<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|err| GatewayError::from_reqwest(endpoint, err))?;
        serde_json::from_slice(&bytes).map_err(|err| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
        timeout: Duration,
        auth: Auth,
    ) -> GatewayResult<T> {
        let response = self.execute(endpoint, request, timeout, auth).await?;
        Self::decode(endpoint, response).await
    }
}

async fn read_file(file: &SelectedFile) -> GatewayResult<Vec<u8>> {
    match &file.source {
        FileSource::Memory(bytes) => Ok(bytes.clone()),
        FileSource::Path(path) => {
            tokio::fs::read(path)
                .await
                .map_err(|err| GatewayError::LocalFile {
                    name: file.name.clone(),
                    message: err.to_string(),
                })
        }
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn login_url(&self) -> GatewayResult<String> {
        let endpoint = "/api/auth/login-url";
        let response: LoginUrlResponse = self
            .get_json(
                endpoint,
                self.http.get(self.url(endpoint)),
                self.timeouts.login,
                Auth::Skip,
            )
            .await?;
        Ok(response.login_url)
    }

    async fn auth_callback(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> GatewayResult<AuthCallbackResponse> {
        let endpoint = "/api/auth/callback";
        let request = self
            .http
            .get(self.url(endpoint))
            .query(&[("code", code), ("state", state.unwrap_or_default())]);
        self.get_json(endpoint, request, self.timeouts.request, Auth::Skip)
            .await
    }

    async fn check_session(&self) -> GatewayResult<SessionResponse> {
        let endpoint = "/api/auth/session";
        let mut request = self.http.get(self.url(endpoint));
        if let Some(token) = self.session.token().await {
            request = request.query(&[("session_token", token)]);
        }
        self.get_json(endpoint, request, self.timeouts.request, Auth::Bearer)
            .await
    }

    async fn logout(&self) -> GatewayResult<()> {
        let endpoint = "/api/auth/logout";
        self.execute(
            endpoint,
            self.http.post(self.url(endpoint)),
            self.timeouts.request,
            Auth::Bearer,
        )
        .await?;
        Ok(())
    }

    async fn list_documents(&self, user: Option<&str>) -> GatewayResult<Vec<DocumentSummary>> {
        let endpoint = "/api/documents";
        let mut request = self.http.get(self.url(endpoint));
        if let Some(user) = user {
            request = request.query(&[("user", user)]);
        }
        self.get_json(endpoint, request, self.timeouts.request, Auth::Bearer)
            .await
    }

    async fn upload_document(&self, file: &SelectedFile, owner: &str) -> GatewayResult<UploadAck> {
        let endpoint = "/api/documents/upload";
        let bytes = read_file(file).await?;
        let form = multipart::Form::new().part(
            "file",
            multipart::Part::bytes(bytes).file_name(file.name.clone()),
        );
        let request = self
            .http
            .post(self.url(endpoint))
            .query(&[("owner", owner)])
            .multipart(form);
        let response = self
            .execute(endpoint, request, self.timeouts.upload, Auth::Bearer)
            .await?;

        // Some backends answer uploads with an empty or non-JSON body.
        match Self::decode::<UploadAck>(endpoint, response).await {
            Ok(ack) => Ok(ack),
            Err(GatewayError::Decode { .. }) => Ok(UploadAck {
                success: Some(true),
                message: Some("Document uploaded successfully".to_string()),
            }),
            Err(err) => Err(err),
        }
    }

    async fn toggle_document(
        &self,
        name: &str,
        active: bool,
        owner: Option<&str>,
    ) -> GatewayResult<()> {
        let endpoint = "/api/documents/toggle";
        let request = self.http.post(self.url(endpoint)).json(&ToggleDocumentRequest {
            name: name.to_string(),
            active,
            owner: owner.map(str::to_string),
        });
        self.execute(endpoint, request, self.timeouts.request, Auth::Bearer)
            .await?;
        Ok(())
    }

    async fn delete_document(&self, name: &str, owner: Option<&str>) -> GatewayResult<()> {
        let endpoint = "/api/documents/{name}";
        let mut request = self.http.delete(self.document_url(name)?);
        if let Some(owner) = owner {
            request = request.query(&[("owner", owner)]);
        }
        self.execute(endpoint, request, self.timeouts.request, Auth::Bearer)
            .await?;
        Ok(())
    }

    async fn ask_question(
        &self,
        question: &str,
        user: Option<&str>,
    ) -> GatewayResult<AnswerResponse> {
        let endpoint = "/api/chat/question";
        let request = self.http.post(self.url(endpoint)).json(&AskQuestionRequest {
            question: question.to_string(),
            session_token: self.session.token().await,
            user: user.map(str::to_string),
        });
        self.get_json(endpoint, request, self.timeouts.request, Auth::Bearer)
            .await
    }

    async fn clear_chat(&self) -> GatewayResult<()> {
        let endpoint = "/api/chat/clear";
        let request = self.http.post(self.url(endpoint)).json(&ClearChatRequest {
            session_token: self.session.token().await,
        });
        self.execute(endpoint, request, self.timeouts.request, Auth::Bearer)
            .await?;
        Ok(())
    }

    async fn chat_history(&self) -> GatewayResult<ChatHistoryResponse> {
        let endpoint = "/api/chat/history";
        self.get_json(
            endpoint,
            self.http.get(self.url(endpoint)),
            self.timeouts.request,
            Auth::Bearer,
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
