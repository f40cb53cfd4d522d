use reqwest::Method;
use serde_json::{json, Value};

use super::{UpstreamClient, UpstreamError};

#[derive(Debug, Clone)]
pub struct SeriesDefaults {
    pub root_folder: String,
    pub quality_profile: i64,
    pub language_profile: i64,
}

/// Sonarr v3 API: the series library.
#[derive(Clone)]
pub struct SonarrClient {
    api: UpstreamClient,
    defaults: SeriesDefaults,
}

impl SonarrClient {
    pub fn new(api: UpstreamClient, defaults: SeriesDefaults) -> Self {
        Self { api, defaults }
    }

    pub async fn library(&self) -> Result<Vec<Value>, UpstreamError> {
        self.api.get_json("series", &[]).await
    }

    pub async fn lookup(&self, term: &str) -> Result<Vec<Value>, UpstreamError> {
        self.api
            .get_json("series/lookup", &[("term", term.to_string())])
            .await
    }

    /// TVDB id of the best lookup match, preferring an exact year when given.
    pub async fn tvdb_id(&self, title: &str, year: Option<i64>) -> Result<Option<i64>, UpstreamError> {
        let candidates = self.lookup(title).await?;
        Ok(pick_tvdb_id(&candidates, year))
    }

    pub async fn add(&self, title: &str, tvdb_id: i64) -> Result<(), UpstreamError> {
        let body = self.series_payload(title, tvdb_id);
        self.api
            .send_ok(self.api.request(Method::POST, "series").json(&body))
            .await?;
        tracing::info!(title, tvdb_id, "series added to sonarr");
        Ok(())
    }

    pub async fn remove(&self, id: i64) -> Result<(), UpstreamError> {
        self.api
            .send_ok(self.api.request(Method::DELETE, &format!("series/{}", id)))
            .await?;
        Ok(())
    }

    fn series_payload(&self, title: &str, tvdb_id: i64) -> Value {
        let d = &self.defaults;
        json!({
            "title": title,
            "tvdbId": tvdb_id,
            "qualityProfileId": d.quality_profile,
            "languageProfileId": d.language_profile,
            "profileId": d.quality_profile,
            "rootFolderPath": d.root_folder,
            "path": format!("{}/{}", d.root_folder.trim_end_matches('/'), title),
            "monitored": true,
            "seasonFolder": true,
            "seriesType": "standard",
            "addOptions": {
                "ignoreEpisodesWithFiles": false,
                "ignoreEpisodesWithoutFiles": false,
                "searchForMissingEpisodes": true,
            },
            "images": [],
            "seasons": [],
            "genres": [],
            "network": "",
            "runtime": 0,
        })
    }
}

fn pick_tvdb_id(candidates: &[Value], year: Option<i64>) -> Option<i64> {
    let with_id = || candidates.iter().filter(|c| c["tvdbId"].as_i64().is_some());
    let chosen = match year {
        Some(y) => with_id()
            .find(|c| c["year"].as_i64() == Some(y))
            .or_else(|| with_id().next()),
        None => with_id().next(),
    };
    chosen.and_then(|c| c["tvdbId"].as_i64())
}
