//! Blocking REST client for a Tator server.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{
    AnnotationApi, Entity, EntityKind, ListFilter, Localization, LocalizationQuery,
    LocalizationSpec, NewEntity, State, StateQuery, StateSpec,
};
use crate::error::TatorError;

/// Upper bound for a downloaded frame or chip image.
const MAX_IMAGE_BYTES: u64 = 256 * 1024 * 1024;

type HttpResponse = ureq::http::Response<ureq::Body>;

/// [`AnnotationApi`] over Tator's `/rest` endpoints.
pub struct TatorClient {
    agent: ureq::Agent,
    base: Url,
    auth_header: String,
}

#[derive(Deserialize)]
struct CreatedOne {
    id: u64,
}

#[derive(Deserialize)]
struct CreatedMany {
    #[serde(default)]
    id: Vec<u64>,
}

#[derive(Serialize)]
struct IdQuery<'a> {
    ids: &'a [u64],
}

impl TatorClient {
    /// Creates a client for `host` authenticating with `token`.
    ///
    /// `timeout` bounds every request end to end; `None` waits indefinitely.
    pub fn new(host: &str, token: &str, timeout: Option<Duration>) -> Result<Self, TatorError> {
        let mut normalized = host.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }

        let base = Url::parse(&normalized).map_err(|source| TatorError::InvalidHost {
            host: host.to_string(),
            message: source.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(TatorError::InvalidHost {
                host: host.to_string(),
                message: "expected an http(s) URL".to_string(),
            });
        }

        let config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .http_status_as_error(false)
            .build();

        Ok(Self {
            agent: config.into(),
            base,
            auth_header: format!("Token {}", token.trim()),
        })
    }

    /// The server root this client talks to.
    pub fn host(&self) -> &str {
        self.base.as_str()
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, TatorError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|source| TatorError::InvalidHost {
                host: self.base.to_string(),
                message: format!("cannot join '{path}': {source}"),
            })?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TatorError> {
        let url = self.url(path, query)?;
        debug!(%url, "GET");
        let response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .call()
            .map_err(|source| transport_error(&url, source))?;
        read_json(&url, response)
    }

    fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<T, TatorError> {
        let url = self.url(path, query)?;
        debug!(%url, method, "sending JSON body");
        let result = match method {
            "PUT" => self
                .agent
                .put(url.as_str())
                .header("Authorization", &self.auth_header)
                .header("Accept", "application/json")
                .send_json(body),
            _ => self
                .agent
                .post(url.as_str())
                .header("Authorization", &self.auth_header)
                .header("Accept", "application/json")
                .send_json(body),
        };
        let response = result.map_err(|source| transport_error(&url, source))?;
        read_json(&url, response)
    }

    fn get_bytes(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, TatorError> {
        let url = self.url(path, query)?;
        debug!(%url, "GET image");
        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", &self.auth_header)
            .call()
            .map_err(|source| transport_error(&url, source))?;
        check_status(&url, &mut response)?;
        response
            .body_mut()
            .with_config()
            .limit(MAX_IMAGE_BYTES)
            .read_to_vec()
            .map_err(|source| transport_error(&url, source))
    }
}

/// REST collection and item routes per entity kind.
fn routes(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Project => ("Projects", "Project"),
        EntityKind::Media => ("Medias", "Media"),
        EntityKind::MediaType => ("MediaTypes", "MediaType"),
        EntityKind::Version => ("Versions", "Version"),
        EntityKind::LocalizationType => ("LocalizationTypes", "LocalizationType"),
        EntityKind::StateType => ("StateTypes", "StateType"),
        EntityKind::LeafType => ("LeafTypes", "LeafType"),
        EntityKind::Leaf => ("Leaves", "Leaf"),
        EntityKind::User => ("Users", "User"),
    }
}

fn collection_path(kind: EntityKind, scope: Option<u64>) -> Result<String, TatorError> {
    let (collection, _) = routes(kind);
    match (kind.is_scoped(), scope) {
        (true, Some(project)) => Ok(format!("rest/{collection}/{project}")),
        (true, None) => Err(TatorError::MissingScope {
            kind,
            query: "list".to_string(),
        }),
        (false, _) => Ok(format!("rest/{collection}")),
    }
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn attribute_params(attributes: &[(String, String)]) -> Vec<(&'static str, String)> {
    attributes
        .iter()
        .map(|(key, value)| ("attribute", format!("{key}::{value}")))
        .collect()
}

fn localization_params(query: &LocalizationQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if !query.versions.is_empty() {
        params.push(("version", join_ids(&query.versions)));
    }
    if let Some(type_id) = query.type_id {
        params.push(("type", type_id.to_string()));
    }
    if !query.media_ids.is_empty() {
        params.push(("media_id", join_ids(&query.media_ids)));
    }
    if let Some(frame) = query.frame {
        params.push(("frame", frame.to_string()));
    }
    params.extend(attribute_params(&query.attributes));
    if let Some((start, stop)) = query.window {
        params.push(("start", start.to_string()));
        params.push(("stop", stop.to_string()));
    }
    params
}

fn state_params(query: &StateQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(type_id) = query.type_id {
        params.push(("type", type_id.to_string()));
    }
    if !query.versions.is_empty() {
        params.push(("version", join_ids(&query.versions)));
    }
    if !query.media_ids.is_empty() {
        params.push(("media_id", join_ids(&query.media_ids)));
    }
    params.extend(attribute_params(&query.attributes));
    params
}

fn transport_error(url: &Url, source: ureq::Error) -> TatorError {
    TatorError::Api {
        url: url.to_string(),
        message: source.to_string(),
    }
}

fn check_status(url: &Url, response: &mut HttpResponse) -> Result<(), TatorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Err(TatorError::ApiStatus {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn read_json<T: DeserializeOwned>(url: &Url, mut response: HttpResponse) -> Result<T, TatorError> {
    check_status(url, &mut response)?;
    response
        .body_mut()
        .read_json::<T>()
        .map_err(|source| TatorError::ApiDecode {
            url: url.to_string(),
            message: source.to_string(),
        })
}

impl AnnotationApi for TatorClient {
    fn list_entities(
        &self,
        kind: EntityKind,
        scope: Option<u64>,
        filter: &ListFilter,
    ) -> Result<Vec<Entity>, TatorError> {
        let path = collection_path(kind, scope)?;
        let mut params = Vec::new();
        if let Some(name) = &filter.name {
            match kind {
                EntityKind::User => params.push(("username", name.clone())),
                EntityKind::Media => params.push(("name", name.clone())),
                _ => {}
            }
        }
        if let (EntityKind::Media, Some(dtype)) = (kind, &filter.media_dtype) {
            params.push(("dtype", dtype.clone()));
        }
        self.get_json(&path, &params)
    }

    fn get_entity(&self, kind: EntityKind, id: u64) -> Result<Entity, TatorError> {
        let (_, item) = routes(kind);
        self.get_json(&format!("rest/{item}/{id}"), &[])
    }

    fn create_entity(
        &self,
        kind: EntityKind,
        scope: u64,
        spec: &NewEntity,
    ) -> Result<u64, TatorError> {
        if kind != EntityKind::Version {
            return Err(TatorError::UnsupportedOperation {
                kind,
                operation: "create",
            });
        }
        let path = collection_path(kind, Some(scope))?;
        let created: CreatedOne = self.send_json("POST", &path, &[], spec)?;
        Ok(created.id)
    }

    fn list_localizations(
        &self,
        project: u64,
        query: &LocalizationQuery,
    ) -> Result<Vec<Localization>, TatorError> {
        let path = format!("rest/Localizations/{project}");
        let params = localization_params(query);
        if query.ids.is_empty() {
            self.get_json(&path, &params)
        } else {
            self.send_json("PUT", &path, &params, &IdQuery { ids: &query.ids })
        }
    }

    fn create_localizations(
        &self,
        project: u64,
        specs: &[LocalizationSpec],
    ) -> Result<Vec<u64>, TatorError> {
        let created: CreatedMany =
            self.send_json("POST", &format!("rest/Localizations/{project}"), &[], &specs)?;
        Ok(created.id)
    }

    fn list_states(&self, project: u64, query: &StateQuery) -> Result<Vec<State>, TatorError> {
        self.get_json(&format!("rest/States/{project}"), &state_params(query))
    }

    fn create_states(&self, project: u64, specs: &[StateSpec]) -> Result<Vec<u64>, TatorError> {
        let created: CreatedMany =
            self.send_json("POST", &format!("rest/States/{project}"), &[], &specs)?;
        Ok(created.id)
    }

    fn get_frame(&self, media: u64, frame: u64) -> Result<Vec<u8>, TatorError> {
        self.get_bytes(
            &format!("rest/GetFrame/{media}"),
            &[("frames", frame.to_string())],
        )
    }

    fn get_localization_graphic(&self, id: u64) -> Result<Vec<u8>, TatorError> {
        self.get_bytes(&format!("rest/LocalizationGraphic/{id}"), &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_without_trailing_slash_keeps_its_path() {
        let client = TatorClient::new("https://example.org/tator", "abc", None).expect("client");
        let url = client.url("rest/Projects", &[]).expect("url");
        assert_eq!(url.as_str(), "https://example.org/tator/rest/Projects");
    }

    #[test]
    fn invalid_host_is_rejected() {
        let err = TatorClient::new("not a url", "abc", None)
            .err()
            .expect("should fail");
        assert!(matches!(err, TatorError::InvalidHost { .. }));

        let err = TatorClient::new("ftp://example.org", "abc", None)
            .err()
            .expect("should fail");
        assert!(matches!(err, TatorError::InvalidHost { .. }));
    }

    #[test]
    fn query_params_are_encoded() {
        let client = TatorClient::new("https://example.org", "abc", None).expect("client");
        let params = localization_params(&LocalizationQuery {
            versions: vec![1, 2],
            media_ids: vec![5],
            attributes: vec![("Class".to_string(), "salpa aspera".to_string())],
            window: Some((0, 10)),
            ..Default::default()
        });
        let url = client.url("rest/Localizations/3", &params).expect("url");
        assert_eq!(
            url.as_str(),
            "https://example.org/rest/Localizations/3?version=1%2C2&media_id=5&attribute=Class%3A%3Asalpa+aspera&start=0&stop=10"
        );
    }

    #[test]
    fn empty_query_adds_no_question_mark() {
        let client = TatorClient::new("https://example.org/", "abc", None).expect("client");
        let url = client.url("rest/Project/1", &[]).expect("url");
        assert_eq!(url.as_str(), "https://example.org/rest/Project/1");
    }

    #[test]
    fn scoped_collection_requires_project() {
        assert_eq!(
            collection_path(EntityKind::Version, Some(4)).expect("path"),
            "rest/Versions/4"
        );
        assert_eq!(
            collection_path(EntityKind::User, None).expect("path"),
            "rest/Users"
        );
        assert!(matches!(
            collection_path(EntityKind::Leaf, None),
            Err(TatorError::MissingScope { .. })
        ));
    }
}
