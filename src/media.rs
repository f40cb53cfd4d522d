//! The `Media` output model and the helpers that extract it from Radarr,
//! Sonarr and TMDB payloads.
//!
//! Every field is rendered as a string. Missing values render as `"None"` and
//! floats keep a decimal point (`8.0`, not `8`) so clients see the same
//! strings the API has always returned.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const NONE: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub name: String,
    pub synopsis: String,
    pub rating: String,
    pub length: String,
    pub thumbnail: String,
    pub watched: bool,
    pub year: String,
}

impl Media {
    /// A movie from the Radarr library or lookup.
    pub fn from_radarr(movie: &Value, watched: bool) -> Self {
        Media {
            name: title(movie),
            synopsis: overview(movie),
            rating: display_opt(rating(&movie["ratings"])),
            length: runtime(&movie["runtime"]),
            thumbnail: poster_url(&movie["images"]).unwrap_or_else(|| NONE.into()),
            watched,
            year: year(movie),
        }
    }

    /// A series from Sonarr. Length is the episode count.
    pub fn from_sonarr(series: &Value, watched: bool) -> Self {
        Media {
            name: title(series),
            synopsis: overview(series),
            rating: display_opt(rating(&series["ratings"])),
            length: display_value(&series["statistics"]["episodeCount"]),
            thumbnail: poster_url(&series["images"]).unwrap_or_else(|| NONE.into()),
            watched,
            year: year(series),
        }
    }

    /// A TMDB discover result. TV results use `original_name`/`first_air_date`.
    pub fn from_tmdb(result: &Value, tv: bool, poster_base: &str) -> Self {
        let (name_field, date_field) = if tv {
            ("original_name", "first_air_date")
        } else {
            ("original_title", "release_date")
        };
        let thumbnail = match result["poster_path"].as_str() {
            Some(p) => format!("{}{}", poster_base, p),
            None => NONE.into(),
        };
        Media {
            name: display_value(&result[name_field]),
            synopsis: overview(result),
            rating: display_value(&result["vote_average"]),
            length: "N/A".into(),
            thumbnail,
            watched: false,
            year: result[date_field]
                .as_str()
                .map(|d| d.chars().take(4).collect())
                .unwrap_or_else(|| NONE.into()),
        }
    }
}

/// Either a list of media, or a warning when there is nothing to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaListing {
    Found(Vec<Media>),
    Empty { warning: String },
}

impl MediaListing {
    pub fn or_warn(items: Vec<Media>, warning: impl Into<String>) -> Self {
        if items.is_empty() {
            MediaListing::Empty {
                warning: warning.into(),
            }
        } else {
            MediaListing::Found(items)
        }
    }
}

pub fn title(media: &Value) -> String {
    media["title"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| "No title found".into())
}

pub fn overview(media: &Value) -> String {
    media["overview"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| "No overview found".into())
}

pub fn year(media: &Value) -> String {
    match &media["year"] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => "No year found".into(),
    }
}

/// First floating-point `value` found depth-first in a ratings tree.
///
/// Radarr nests ratings per provider (`{"imdb": {"value": 7.9}, ...}`),
/// Sonarr has a flat `{"value": 8.6}`.
pub fn rating(ratings: &Value) -> Option<f64> {
    match ratings {
        Value::Object(map) => {
            if let Some(Value::Number(n)) = map.get("value") {
                if n.is_f64() {
                    return n.as_f64();
                }
            }
            map.values().find_map(rating)
        }
        Value::Array(items) => items.iter().find_map(rating),
        _ => None,
    }
}

/// Minutes → `"2h 35m"`. Anything that is not a whole number is passed through.
pub fn runtime(minutes: &Value) -> String {
    let parsed = match minutes {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(m) => format!("{}h {}m", m.div_euclid(60), m.rem_euclid(60)),
        None => display_value(minutes),
    }
}

pub fn poster_url(images: &Value) -> Option<String> {
    images
        .as_array()?
        .iter()
        .find(|img| img["coverType"] == "poster")
        .and_then(|img| img["remoteUrl"].as_str())
        .map(str::to_string)
}

/// Most frequent genre across the library. Ties go to the genre seen first.
pub fn dominant_genre(library: &[Value]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for genre in library
        .iter()
        .filter_map(|m| m["genres"].as_array())
        .flatten()
        .filter_map(Value::as_str)
    {
        match counts.iter_mut().find(|(g, _)| *g == genre) {
            Some((_, n)) => *n += 1,
            None => counts.push((genre, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (genre, n) in counts {
        if best.map_or(true, |(_, top)| n > top) {
            best = Some((genre, n));
        }
    }
    best.map(|(g, _)| g.to_string())
}

/// Library id of the first item whose title matches, ignoring case.
pub fn find_id_by_title(items: &[Value], title: &str) -> Option<i64> {
    let wanted = title.to_lowercase();
    items
        .iter()
        .find(|item| {
            item["title"]
                .as_str()
                .map_or(false, |t| t.to_lowercase() == wanted)
        })
        .and_then(|item| item["id"].as_i64())
}

pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

fn display_opt(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_else(|| NONE.into())
}

/// Renders an arbitrary JSON scalar the way clients expect it.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => NONE.into(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        Value::Number(n) if n.is_f64() => n.as_f64().map(format_float).unwrap_or_else(|| n.to_string()),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
