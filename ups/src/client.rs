//! The UPS-RS client: the PS3.18 §11 workitem transactions
//! over HTTP, with workitems carried in the DICOM-JSON model.

use crate::json;
use crate::model::{ProcedureStepState, Workitem};
use radlink_core::tags;
use radlink_object::InMemObject;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use snafu::{Backtrace, OptionExt, ResultExt, Snafu};
use std::time::Duration;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("failed to build the HTTP client"))]
    BuildClient {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("request to {} failed", url))]
    Request {
        url: String,
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to read the response body"))]
    ReadBody {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to interpret the response as DICOM-JSON"))]
    ParseBody {
        #[snafu(backtrace)]
        source: json::Error,
    },

    #[snafu(display("workitem not found"))]
    NotFound { backtrace: Backtrace },

    #[snafu(display("request conflicts with the workitem state: {}", detail))]
    Conflict {
        detail: String,
        backtrace: Backtrace,
    },

    #[snafu(display("server answered {} for {}", status, url))]
    UnexpectedStatus {
        url: String,
        status: StatusCode,
        backtrace: Backtrace,
    },

    #[snafu(display("the create response carries no Location header"))]
    MissingLocation { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A client for one UPS-RS origin server.
#[derive(Debug, Clone)]
pub struct UpsRsClient {
    base_url: String,
    http: Client,
}

impl UpsRsClient {
    /// Create a client for the given base URL
    /// (up to and including the service root, without `/workitems`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context(BuildClientSnafu)?;
        Ok(UpsRsClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn check(
        &self,
        url: &str,
        response: reqwest::blocking::Response,
        expected: StatusCode,
    ) -> Result<reqwest::blocking::Response> {
        match response.status() {
            status if status == expected => Ok(response),
            StatusCode::NOT_FOUND => NotFoundSnafu.fail(),
            StatusCode::CONFLICT => {
                let detail = response.text().unwrap_or_default();
                ConflictSnafu { detail }.fail()
            }
            status => UnexpectedStatusSnafu { url, status }.fail(),
        }
    }

    /// Search workitems: `GET /workitems?...`.
    ///
    /// `match_params` are `attribute=value` pairs per PS3.18 §8.3.4,
    /// passed through verbatim.
    pub fn search_workitems(&self, match_params: &[(String, String)]) -> Result<Vec<InMemObject>> {
        let url = self.url("/workitems");
        let response = self
            .http
            .get(&url)
            .query(match_params)
            .header("Accept", "application/dicom+json")
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let response = self.check(&url, response, StatusCode::OK)?;
        let body: serde_json::Value = response.json().context(ReadBodySnafu)?;
        let items = body
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .map(json::from_json)
                    .collect::<Result<Vec<_>, _>>()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
            .context(ParseBodySnafu)?;
        Ok(items)
    }

    /// Retrieve one workitem: `GET /workitems/{uid}`.
    pub fn retrieve_workitem(&self, uid: &str) -> Result<InMemObject> {
        let url = self.url(&format!("/workitems/{}", uid));
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/dicom+json")
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        let response = self.check(&url, response, StatusCode::OK)?;
        let body: serde_json::Value = response.json().context(ReadBodySnafu)?;
        json::from_json(&body).context(ParseBodySnafu)
    }

    /// Create a workitem: `POST /workitems[/{uid}]`.
    /// On success the server answers `201 Created` with the
    /// retrieve URL in the `Location` header, which is returned.
    pub fn create_workitem(&self, item: &Workitem) -> Result<String> {
        let path = format!("/workitems/{}", item.uid);
        let url = self.url(&path);
        let body = json::to_json(&item.to_object());
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/dicom+json")
            .json(&body)
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        let response = self.check(&url, response, StatusCode::CREATED)?;
        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .context(MissingLocationSnafu)?;
        Ok(location)
    }

    /// Update the mutable attributes of a workitem:
    /// `PUT /workitems/{uid}` with a DICOM-JSON body.
    pub fn update_workitem(&self, uid: &str, attributes: &InMemObject) -> Result<()> {
        let url = self.url(&format!("/workitems/{}", uid));
        let body = json::to_json(attributes);
        let response = self
            .http
            .put(&url)
            .header("Content-Type", "application/dicom+json")
            .json(&body)
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        self.check(&url, response, StatusCode::OK)?;
        Ok(())
    }

    /// Request a state change: `PUT /workitems/{uid}/state`.
    /// The body carries ProcedureStepState (0074,1000) and,
    /// when required, TransactionUID (0008,1195).
    pub fn change_state(
        &self,
        uid: &str,
        target: ProcedureStepState,
        transaction_uid: Option<&str>,
    ) -> Result<()> {
        let url = self.url(&format!("/workitems/{}/state", uid));
        let mut body = InMemObject::new();
        // built from controlled values, the setters cannot fail here
        let _ = body.set_string(tags::PROCEDURE_STEP_STATE, target.as_str());
        if let Some(tx) = transaction_uid {
            let _ = body.set_string(tags::TRANSACTION_UID, tx);
        }
        let response = self
            .http
            .put(&url)
            .header("Content-Type", "application/dicom+json")
            .json(&json::to_json(&body))
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        self.check(&url, response, StatusCode::OK)?;
        Ok(())
    }

    /// Request cancellation: `PUT /workitems/{uid}/cancelrequest`,
    /// answered with `202 Accepted` when the request is taken up.
    pub fn request_cancel(&self, uid: &str, reason: Option<&str>) -> Result<()> {
        let url = self.url(&format!("/workitems/{}/cancelrequest", uid));
        let mut body = InMemObject::new();
        if let Some(reason) = reason {
            let _ = body.set_string(tags::REASON_FOR_CANCELLATION, reason);
        }
        let response = self
            .http
            .put(&url)
            .header("Content-Type", "application/dicom+json")
            .json(&json::to_json(&body))
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        self.check(&url, response, StatusCode::ACCEPTED)?;
        Ok(())
    }

    /// Subscribe an AE to a workitem (or to all, with uid `1.2.840.10008.5.1.4.34.5`):
    /// `POST /workitems/{uid}/subscribers/{aet}` with the
    /// `Deletion-Lock` header.
    pub fn subscribe(&self, uid: &str, ae_title: &str, deletion_lock: bool) -> Result<()> {
        let url = self.url(&format!("/workitems/{}/subscribers/{}", uid, ae_title));
        let response = self
            .http
            .post(&url)
            .header("Deletion-Lock", if deletion_lock { "true" } else { "false" })
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        self.check(&url, response, StatusCode::CREATED)?;
        Ok(())
    }

    /// Remove a subscription:
    /// `DELETE /workitems/{uid}/subscribers/{aet}`.
    pub fn unsubscribe(&self, uid: &str, ae_title: &str) -> Result<()> {
        let url = self.url(&format!("/workitems/{}/subscribers/{}", uid, ae_title));
        let response = self
            .http
            .delete(&url)
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        self.check(&url, response, StatusCode::OK)?;
        Ok(())
    }

    /// Suspend a subscription:
    /// `POST /workitems/{uid}/subscribers/{aet}/suspend`.
    pub fn suspend_subscription(&self, uid: &str, ae_title: &str) -> Result<()> {
        let url = self.url(&format!(
            "/workitems/{}/subscribers/{}/suspend",
            uid, ae_title
        ));
        let response = self
            .http
            .post(&url)
            .send()
            .context(RequestSnafu { url: url.clone() })?;
        self.check(&url, response, StatusCode::OK)?;
        Ok(())
    }
}
