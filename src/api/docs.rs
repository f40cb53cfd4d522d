//! `/specification` (OpenAPI 3 JSON) and `/docs` (Swagger UI).

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::AppState;

pub const TITLE: &str = "Riverr API";
pub const VERSION: &str = "1.0.0";
pub const DESCRIPTION: &str = "Backend for riverr";

#[derive(Clone, Copy)]
enum In {
    Query,
    Path,
}

struct Param {
    name: &'static str,
    location: In,
    required: bool,
    kind: &'static str,
}

const fn query(name: &'static str) -> Param {
    Param {
        name,
        location: In::Query,
        required: true,
        kind: "string",
    }
}

struct Operation {
    method: &'static str,
    path: &'static str,
    tag: &'static str,
    summary: &'static str,
    params: &'static [Param],
}

const OPERATIONS: &[Operation] = &[
    Operation { method: "get", path: "/", tag: "info", summary: "Info", params: &[] },
    Operation { method: "get", path: "/getmovies", tag: "radarr", summary: "Movies in the watch list", params: &[] },
    Operation { method: "get", path: "/recomovies", tag: "radarr", summary: "Recommended movies", params: &[] },
    Operation { method: "get", path: "/searchmovies", tag: "radarr", summary: "Search movies", params: &[query("title")] },
    Operation { method: "post", path: "/addmovies", tag: "radarr", summary: "Add a movie to the watch list", params: &[query("title")] },
    Operation { method: "delete", path: "/removemovies", tag: "radarr", summary: "Remove a movie from the watch list", params: &[query("title")] },
    Operation { method: "get", path: "/gettv", tag: "sonarr", summary: "Series in the watch list", params: &[] },
    Operation { method: "get", path: "/recotv", tag: "sonarr", summary: "Recommended series", params: &[] },
    Operation { method: "get", path: "/searchtv", tag: "sonarr", summary: "Search series", params: &[query("title")] },
    Operation {
        method: "post",
        path: "/addtv",
        tag: "sonarr",
        summary: "Add a series to the watch list",
        params: &[
            query("title"),
            Param { name: "year", location: In::Query, required: false, kind: "integer" },
        ],
    },
    Operation { method: "delete", path: "/removeseries", tag: "sonarr", summary: "Remove a series from the watch list", params: &[query("title")] },
    Operation { method: "get", path: "/gettorrents", tag: "deluge", summary: "Torrents and their state", params: &[] },
    Operation {
        method: "get",
        path: "/pausetorrents/{torrent_id}",
        tag: "deluge",
        summary: "Pause a torrent",
        params: &[Param { name: "torrent_id", location: In::Path, required: true, kind: "string" }],
    },
    Operation { method: "delete", path: "/removetorrents", tag: "deluge", summary: "Remove a torrent, keeping its data", params: &[query("torrent_id")] },
    Operation { method: "post", path: "/addtorrents", tag: "deluge", summary: "Add a torrent from a magnet link", params: &[query("magnet_link")] },
    Operation { method: "get", path: "/gettrackers", tag: "jackett", summary: "Configured Jackett indexers", params: &[] },
];

/// Builds the OpenAPI document. `servers` is only advertised when
/// `SERVER_ADDRESS` is set.
pub fn openapi_document(config: &Config) -> Value {
    let mut paths = Map::new();
    for op in OPERATIONS {
        let params: Vec<Value> = op
            .params
            .iter()
            .map(|p| {
                json!({
                    "name": p.name,
                    "in": match p.location { In::Query => "query", In::Path => "path" },
                    "required": p.required,
                    "schema": { "type": p.kind, "title": p.name },
                })
            })
            .collect();

        let entry = paths
            .entry(op.path.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(methods) = entry {
            methods.insert(
                op.method.to_string(),
                json!({
                    "tags": [op.tag],
                    "summary": op.summary,
                    "parameters": params,
                    "responses": {
                        "200": {
                            "description": "Successful Response",
                            "content": { "application/json": { "schema": {} } },
                        },
                        "4XX": { "$ref": "#/components/responses/Error" },
                        "5XX": { "$ref": "#/components/responses/Error" },
                    },
                }),
            );
        }
    }

    let mut doc = json!({
        "openapi": "3.0.3",
        "info": { "title": TITLE, "version": VERSION, "description": DESCRIPTION },
        "paths": paths,
        "components": {
            "schemas": {
                "Media": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "synopsis": { "type": "string" },
                        "rating": { "type": "string" },
                        "length": { "type": "string" },
                        "thumbnail": { "type": "string" },
                        "watched": { "type": "boolean" },
                        "year": { "type": "string" },
                    },
                },
                "Error": {
                    "type": "object",
                    "properties": {
                        "error": {
                            "type": "object",
                            "properties": {
                                "message": { "type": "string" },
                                "type": { "type": "string" },
                                "code": { "type": "string" },
                            },
                        },
                    },
                },
            },
            "responses": {
                "Error": {
                    "description": "Error",
                    "content": {
                        "application/json": { "schema": { "$ref": "#/components/schemas/Error" } },
                    },
                },
            },
        },
    });

    if config.server_address.is_some() {
        let url = format!(
            "{}{}",
            config.exposed_address.trim_end_matches('/'),
            config.url_prefix
        );
        doc["servers"] = json!([{ "url": url, "description": TITLE }]);
    }
    doc
}

pub async fn specification(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.openapi.clone())
}

/// Swagger UI, loaded from a CDN. The document URL is relative so it
/// resolves under whatever prefix `/docs` is served from.
pub async fn swagger_ui() -> Html<String> {
    Html(format!(
        r##"<!DOCTYPE html>
<html>
<head>
<title>{title} - Swagger UI</title>
<meta charset="utf-8">
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui.css">
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://cdn.jsdelivr.net/npm/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>
SwaggerUIBundle({{ url: "specification", dom_id: "#swagger-ui", deepLinking: true }});
</script>
</body>
</html>
"##,
        title = TITLE
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| {
            vars.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_document_lists_every_route() {
        let doc = openapi_document(&config(&[]));
        assert_eq!(doc["info"]["title"], "Riverr API");
        assert_eq!(doc["info"]["version"], "1.0.0");
        assert!(doc["paths"]["/addmovies"]["post"].is_object());
        assert!(doc["paths"]["/removeseries"]["delete"].is_object());
        assert_eq!(
            doc["paths"]["/pausetorrents/{torrent_id}"]["get"]["parameters"][0]["in"],
            "path"
        );
        assert!(doc.get("servers").is_none());
    }

    #[test]
    fn test_servers_use_exposed_address_and_prefix() {
        let doc = openapi_document(&config(&[
            ("SERVER_ADDRESS", "yes"),
            ("URL_PREFIX", "riverr"),
        ]));
        assert_eq!(doc["servers"][0]["url"], "https://myserver.com/riverr");
    }

    #[tokio::test]
    async fn test_swagger_page_loads_relative_document() {
        let Html(page) = swagger_ui().await;
        assert!(page.contains("<title>Riverr API - Swagger UI</title>"));
        assert!(page.contains(r##"dom_id: "#swagger-ui""##));
        assert!(page.contains(r#"url: "specification""#));
    }
}
