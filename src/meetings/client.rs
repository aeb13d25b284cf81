use reqwest::Url;
use serde_json::Value;

use crate::{AppResult, config::Config};

/// Client for the Metered video-meeting API, which owns the actual rooms.
#[derive(Clone)]
pub struct Metered {
    http: reqwest::Client,
    domain: Option<String>,
    secret_key: Option<String>,
}

impl Metered {
    pub fn new(domain: Option<String>, secret_key: Option<String>) -> Metered {
        Metered {
            http: reqwest::Client::new(),
            domain,
            secret_key,
        }
    }

    pub fn from_config(config: &Config) -> Metered {
        Metered::new(config.metered_domain.clone(), config.metered_secret_key.clone())
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// `https://{domain}/api/v1/room[/{name}]?secretKey=…`
    pub(crate) fn room_url(&self, room_name: Option<&str>) -> AppResult<Url> {
        let domain = self.domain.as_deref().ok_or("METERED_DOMAIN is not set")?;
        let secret_key = self.secret_key.as_deref().ok_or("METERED_SECRET_KEY is not set")?;

        let mut url = Url::parse(&format!("https://{domain}/api/v1/room"))
            .map_err(|e| format!("bad METERED_DOMAIN {domain}: {e}"))?;
        if let Some(room_name) = room_name {
            url.path_segments_mut()
                .map_err(|_| format!("{domain} can't carry a path"))?
                .push(room_name);
        }
        url.query_pairs_mut().append_pair("secretKey", secret_key);
        Ok(url)
    }

    /// Creates a room at the provider and hands back whatever it answered.
    pub async fn create_room(&self) -> AppResult<Value> {
        let body = self.http.post(self.room_url(None)?)
            .send()
            .await?
            .json()
            .await?;
        Ok(body)
    }

    pub async fn room_exists(&self, room_name: &str) -> AppResult<bool> {
        let body: Value = self.http.get(self.room_url(Some(room_name))?)
            .send()
            .await?
            .json()
            .await?;
        Ok(names_a_room(&body))
    }
}

fn names_a_room(body: &Value) -> bool {
    body.get("roomName")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.is_empty())
}
