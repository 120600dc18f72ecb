use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MATCH};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{
    CreateOutcome, DEFAULT_VARIATION, FEATURE_DESCRIPTION, Feature, Revision, RingStore, SlotWrite,
    VariationSet, feature_name, variation::encode_slot,
};
use crate::error::StoreError;
use crate::types::{ModuleName, WriteOutcome};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireValue {
    string_value: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireVariation {
    name: String,
    value: WireValue,
}

impl WireVariation {
    fn new(name: &str, value: String) -> Self {
        Self {
            name: name.to_owned(),
            value: WireValue {
                string_value: value,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFeature {
    #[serde(default)]
    variations: Vec<WireVariation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFeatureRequest<'a> {
    name: &'a str,
    description: &'a str,
    variations: Vec<WireVariation>,
    default_variation: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFeatureRequest<'a> {
    description: &'a str,
    add_or_update_variations: Vec<WireVariation>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Ring store backed by a remote feature-flag service.
///
/// `GET` / `POST` / `PATCH` on `{base}/projects/{project}/features[/{name}]`;
/// the `ETag` of a read is sent back as `If-Match` so a concurrent promotion
/// surfaces as `412` rather than a silent overwrite.
#[derive(Clone)]
pub struct HttpRingStore {
    client: Client,
    base: Url,
    project: String,
    token: Option<String>,
}

impl HttpRingStore {
    pub fn new(base_url: &str, project: &str, token: Option<String>) -> Result<Self, StoreError> {
        let base = Url::parse(base_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_owned()));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base,
            project: project.to_owned(),
            token,
        })
    }

    fn features_url(&self, feature: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| StoreError::InvalidUrl(self.base.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["projects", self.project.as_str(), "features"]);
            if let Some(feature) = feature {
                segments.push(feature);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

async fn unexpected(response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    StoreError::UnexpectedStatus { status, body }
}

#[async_trait]
impl RingStore for HttpRingStore {
    #[tracing::instrument(skip(self), fields(%module), err)]
    async fn get_feature(&self, module: &ModuleName) -> Result<Option<Feature>, StoreError> {
        let url = self.features_url(Some(&feature_name(module)))?;
        let response = self.authorize(self.client.get(url)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let revision = response
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(Revision::new);
                let feature: WireFeature = response.json().await?;
                let variations = VariationSet::from_pairs(
                    feature
                        .variations
                        .iter()
                        .map(|v| (v.name.as_str(), v.value.string_value.as_str())),
                );
                Ok(Some(Feature {
                    variations,
                    revision,
                }))
            }
            _ => Err(unexpected(response).await),
        }
    }

    #[tracing::instrument(skip(self, initial), fields(%module), err)]
    async fn create_feature(
        &self,
        module: &ModuleName,
        initial: &VariationSet,
    ) -> Result<CreateOutcome, StoreError> {
        let name = feature_name(module);
        let body = CreateFeatureRequest {
            name: &name,
            description: FEATURE_DESCRIPTION,
            variations: initial
                .to_pairs()
                .into_iter()
                .map(|(name, value)| WireVariation::new(name, value))
                .collect(),
            default_variation: DEFAULT_VARIATION.name(),
        };

        let url = self.features_url(None)?;
        let response = self.authorize(self.client.post(url)).json(&body).send().await?;

        match response.status() {
            StatusCode::CONFLICT => Ok(CreateOutcome::AlreadyExists),
            status if status.is_success() => Ok(CreateOutcome::Created),
            _ => Err(unexpected(response).await),
        }
    }

    #[tracing::instrument(
        skip(self, expected, writes),
        fields(%module, writes = writes.len()),
        err
    )]
    async fn update_variations(
        &self,
        module: &ModuleName,
        expected: Option<&Revision>,
        writes: &[SlotWrite],
    ) -> Result<WriteOutcome, StoreError> {
        let body = UpdateFeatureRequest {
            description: FEATURE_DESCRIPTION,
            add_or_update_variations: writes
                .iter()
                .map(|w| WireVariation::new(w.variation.name(), encode_slot(&w.value)))
                .collect(),
        };

        let url = self.features_url(Some(&feature_name(module)))?;
        let mut request = self.authorize(self.client.patch(url)).json(&body);
        if let Some(revision) = expected {
            request = request.header(IF_MATCH, revision.as_str());
        } else {
            tracing::warn!(
                %module,
                "feature service sent no revision, updating without a concurrency check"
            );
        }
        let response = request.send().await?;

        match response.status() {
            // A feature deleted since it was read is a lost race too.
            StatusCode::PRECONDITION_FAILED | StatusCode::NOT_FOUND => Ok(WriteOutcome::Conflict),
            status if status.is_success() => Ok(WriteOutcome::Applied),
            _ => Err(unexpected(response).await),
        }
    }
}
