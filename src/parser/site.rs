//! Rulesets for the 9Anime markup and their mapping into models
//!
//! Every selector here is tied to the current site layout. When the site
//! changes its markup the listing functions start returning fewer rows and
//! `parse_detail` fails with `ExtractionFailed` naming the missing field.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::Html;

use super::{extract, extract_page, fix_url, FieldRule, Locate, Record, Ruleset, Transform};
use crate::error::ProviderError;
use crate::models::{CatalogEntry, LanguageAvailability, SeriesDetail, SeriesKind, SeriesStatus};

lazy_static! {
    static ref EPISODE_SUFFIX: Regex = Regex::new(r"/ep.*$").unwrap();
    static ref HOURS: Regex = Regex::new(r"(\d+)\s*h").unwrap();
    static ref MINUTES: Regex = Regex::new(r"(\d+)\s*m").unwrap();
}

/// Home widget rows
pub static LISTING: Ruleset = Ruleset {
    name: "listing",
    scope: "div.item",
    fields: &[
        FieldRule::text("title", ".info > .name").required(),
        FieldRule::attr("link", ".info > .name", "href").required(),
        FieldRule::attr("poster", ".poster > a > img", "src"),
        FieldRule::new(
            "sub",
            Locate::Css(".poster > a > .meta > .inner > .left .sub"),
            Transform::Int,
        ),
        FieldRule::new(
            "dub",
            Locate::Css(".poster > a > .meta > .inner > .left .dub"),
            Transform::Int,
        ),
    ],
};

/// Rows of the quick-search dropdown
pub static QUICK_SEARCH: Ruleset = Ruleset {
    name: "quick search",
    scope: ".items > a",
    fields: &[
        FieldRule::new("link", Locate::Scope, Transform::Attr("href")).required(),
        FieldRule::text("title", ".info > .name").required(),
        FieldRule::attr("poster", ".poster > span > img", "src"),
    ],
};

/// Rows of the filter page
pub static SEARCH: Ruleset = Ruleset {
    name: "search",
    scope: "#list-items div.ani.poster.tip > a",
    fields: &[
        FieldRule::new("link", Locate::Scope, Transform::Attr("href")).required(),
        FieldRule::attr("title", "img", "alt").required(),
        FieldRule::attr("poster", "img", "src"),
    ],
};

/// The detail page; field order decides which missing field is reported
pub static DETAIL: Ruleset = Ruleset {
    name: "detail",
    scope: "html",
    fields: &[
        FieldRule::new("info", Locate::Css("#w-info"), Transform::Marker).required(),
        FieldRule::attr("id", "#w-info .brating > #w-rating", "data-id").required(),
        FieldRule::new("binfo", Locate::Css("#w-info .binfo"), Transform::Marker).required(),
        FieldRule::new("binfo info", Locate::Css("#w-info .binfo .info"), Transform::Marker)
            .required(),
        FieldRule::new(
            "title",
            Locate::FirstOf(&["#w-info .binfo .info .title", "#w-info .binfo .info .d-title"]),
            Transform::Text,
        )
        .required(),
        FieldRule::new(
            "background",
            Locate::Css("#player"),
            Transform::Regex {
                attr: Some("style"),
                pattern: r"(http|https).*jpg",
                group: 0,
            },
        ),
        FieldRule::text("synopsis", "#w-info .binfo .info .synopsis > .shorting > .content"),
        FieldRule::attr("poster", "#w-info .binfo .poster > span > img", "src"),
        FieldRule::attr("score", "#w-info .brating > #w-rating", "data-score"),
        FieldRule::new(
            "genres",
            Locate::Labelled {
                row: "div.meta:nth-child(1) > div",
                label: "Genre:",
                inner: "a",
            },
            Transform::Text,
        )
        .many(),
        FieldRule::new(
            "status",
            Locate::Labelled {
                row: "div.meta:nth-child(1) > div",
                label: "Status:",
                inner: "span",
            },
            Transform::Text,
        ),
        FieldRule::new(
            "type",
            Locate::Labelled {
                row: "div.meta:nth-child(1) > div",
                label: "Type:",
                inner: "span",
            },
            Transform::Text,
        ),
        FieldRule::new(
            "duration",
            Locate::Labelled {
                row: ".bmeta > div > div",
                label: "Duration:",
                inner: "span",
            },
            Transform::Text,
        ),
    ],
};

pub static RECOMMENDATIONS: Ruleset = Ruleset {
    name: "recommendations",
    scope: "div#watch-second .w-side-section div.body a.item",
    fields: &[
        FieldRule::new("link", Locate::Scope, Transform::Attr("href")).required(),
        FieldRule::text("title", ".name"),
        FieldRule::attr("poster", "img", "src"),
    ],
};

/// Rows of the episode-list fragment
pub static EPISODES: Ruleset = Ruleset {
    name: "episodes",
    scope: ".episodes > ul > li > a",
    fields: &[
        FieldRule::new("num", Locate::Scope, Transform::Attr("data-num")),
        FieldRule::new("slug", Locate::Scope, Transform::Attr("data-slug")),
        FieldRule::new("sub", Locate::Scope, Transform::AttrInt("data-sub")),
        FieldRule::new("dub", Locate::Scope, Transform::AttrInt("data-dub")),
        FieldRule::text("title", "span.d-title"),
    ],
};

/// One row of the episode list, before it is split per language
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRow {
    pub number: Option<u32>,
    /// Path segment used when the number is not an integer (e.g. `7.5`)
    pub slug: Option<String>,
    pub title: Option<String>,
    pub has_sub: bool,
    pub has_dub: bool,
}

impl EpisodeRow {
    /// `ep-<number>`, or `ep-<slug>` for fractional episodes
    pub fn path_segment(&self) -> Option<String> {
        match (&self.number, &self.slug) {
            (Some(number), _) => Some(format!("ep-{}", number)),
            (None, Some(slug)) => Some(format!("ep-{}", slug)),
            (None, None) => None,
        }
    }
}

/// Drop the `/ep-N` suffix listing links carry
pub fn strip_episode_suffix(link: &str) -> String {
    EPISODE_SUFFIX.replace(link, "").into_owned()
}

/// Minutes from strings like `24 min`, `1 hr 50 min` or `2h`; `None` when
/// the total does not fit
pub fn parse_duration_minutes(text: &str) -> Option<u32> {
    let hours = HOURS
        .captures(text)
        .and_then(|c| c[1].parse::<u32>().ok());
    let minutes = MINUTES
        .captures(text)
        .and_then(|c| c[1].parse::<u32>().ok());

    match (hours, minutes) {
        (None, None) => text.trim().parse().ok(),
        (h, m) => h
            .unwrap_or(0)
            .checked_mul(60)?
            .checked_add(m.unwrap_or(0)),
    }
}

/// `data-score` scaled to the 0..=100000 rating range
pub fn parse_rating(score: &str) -> Option<i32> {
    score
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite())
        .map(|s| (s * 1000.0).round() as i32)
}

fn entry(
    record: &Record,
    base: &str,
    link: &str,
    availability: LanguageAvailability,
) -> Option<CatalogEntry> {
    Some(CatalogEntry {
        title: record.owned("title").unwrap_or_default(),
        detail_url: fix_url(base, link)?,
        poster_url: record.owned("poster"),
        availability,
    })
}

fn count(record: &Record, name: &str) -> Option<u32> {
    record.int(name).and_then(|n| u32::try_from(n).ok())
}

pub fn parse_listing(html: &str, base: &str) -> Vec<CatalogEntry> {
    let document = Html::parse_document(html);
    extract(&document, &LISTING)
        .iter()
        .filter_map(|record| {
            let link = strip_episode_suffix(record.first("link")?);
            let availability =
                LanguageAvailability::from_counts(count(record, "sub"), count(record, "dub"));
            entry(record, base, &link, availability)
        })
        .collect()
}

pub fn parse_quick_search(html: &str, base: &str) -> Vec<CatalogEntry> {
    let document = Html::parse_document(html);
    extract(&document, &QUICK_SEARCH)
        .iter()
        .filter_map(|record| {
            let availability = LanguageAvailability::from_title(record.first("title")?);
            entry(record, base, record.first("link")?, availability)
        })
        .collect()
}

pub fn parse_search(html: &str, base: &str) -> Vec<CatalogEntry> {
    let document = Html::parse_document(html);
    extract(&document, &SEARCH)
        .iter()
        .filter_map(|record| {
            let availability = LanguageAvailability::from_title(record.first("title")?);
            entry(record, base, record.first("link")?, availability)
        })
        .collect()
}

/// Series detail from a detail page; `url` is only used for error reports
pub fn parse_detail(html: &str, url: &str, base: &str) -> Result<SeriesDetail, ProviderError> {
    let document = Html::parse_document(html);
    let record = extract_page(&document, &DETAIL, url)?;

    let recommendations = extract(&document, &RECOMMENDATIONS)
        .iter()
        .filter_map(|rec| {
            let link = rec.first("link")?;
            let availability =
                LanguageAvailability::from_title(rec.first("title").unwrap_or_default());
            entry(rec, base, link, availability)
        })
        .collect();

    let mut genres: Vec<String> = Vec::new();
    for genre in record.all("genres") {
        if !genres.contains(genre) {
            genres.push(genre.clone());
        }
    }

    Ok(SeriesDetail {
        id: record.owned("id").unwrap_or_default(),
        title: record.owned("title").unwrap_or_default(),
        synopsis: record.owned("synopsis"),
        poster_url: record.owned("poster"),
        background_url: record.owned("background"),
        genres,
        rating: record.first("score").and_then(parse_rating),
        status: SeriesStatus::from_label(record.first("status")),
        kind: SeriesKind::from_label(record.first("type")),
        duration_minutes: record.first("duration").and_then(parse_duration_minutes),
        recommendations,
    })
}

pub fn parse_episode_rows(html: &str) -> Vec<EpisodeRow> {
    let document = Html::parse_document(html);
    extract(&document, &EPISODES)
        .iter()
        .map(|record| {
            let raw_number = record.first("num");
            let number = raw_number.and_then(|n| n.parse::<u32>().ok());
            let slug = record
                .owned("slug")
                .or_else(|| raw_number.filter(|_| number.is_none()).map(str::to_string));

            EpisodeRow {
                number,
                slug,
                title: record.owned("title"),
                has_sub: record.int("sub") == Some(1),
                has_dub: record.int("dub") == Some(1),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://9anime.id";

    fn listing_row(title: Option<&str>, href: &str, sub: Option<u32>, dub: Option<u32>) -> String {
        let name = match title {
            Some(t) => format!(r#"<a class="name" href="{}">{}</a>"#, href, t),
            None => format!(r#"<a class="name" href="{}"></a>"#, href),
        };
        let sub = sub.map(|n| format!(r#"<span class="sub">{}</span>"#, n)).unwrap_or_default();
        let dub = dub.map(|n| format!(r#"<span class="dub">{}</span>"#, n)).unwrap_or_default();
        format!(
            r#"<div class="item">
                <div class="poster"><a href="{href}">
                    <img src="https://static.example/p.jpg" />
                    <div class="meta"><div class="inner"><div class="left">{sub}{dub}</div></div></div>
                </a></div>
                <div class="info">{name}</div>
            </div>"#,
            href = href,
            sub = sub,
            dub = dub,
            name = name
        )
    }

    #[test]
    fn test_parse_listing() {
        let html = [
            listing_row(Some("One Piece"), "/watch/one-piece.ov8/ep-1071", Some(1071), Some(1030)),
            listing_row(Some("Frieren"), "/watch/frieren.3q5", Some(12), None),
        ]
        .join("");

        let entries = parse_listing(&html, BASE);
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].title, "One Piece");
        assert_eq!(entries[0].detail_url, "https://9anime.id/watch/one-piece.ov8");
        assert_eq!(entries[0].poster_url.as_deref(), Some("https://static.example/p.jpg"));
        assert!(entries[0].availability.has_sub);
        assert!(entries[0].availability.has_dub);
        assert_eq!(entries[0].availability.dub_episode_count, Some(1030));

        assert!(!entries[1].availability.has_dub);
        assert_eq!(entries[1].availability.dub_episode_count, None);
        assert_eq!(entries[1].availability.sub_episode_count, Some(12));
    }

    #[test]
    fn test_parse_listing_omits_rows_without_title() {
        let html = [
            listing_row(None, "/watch/ghost.1", Some(1), None),
            listing_row(Some("Bleach"), "/watch/bleach.2", Some(366), Some(366)),
        ]
        .join("");

        let entries = parse_listing(&html, BASE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Bleach");
    }

    #[test]
    fn test_parse_quick_search() {
        let html = r#"
        <div class="items">
            <a href="/watch/naruto.xx8z">
                <div class="poster"><span><img src="https://static.example/n.jpg"></span></div>
                <div class="info"><div class="name">Naruto</div></div>
            </a>
            <a href="/watch/naruto-dub.aa1">
                <div class="info"><div class="name">Naruto (Dub)</div></div>
            </a>
            <a href="/watch/nameless.0"><div class="info"></div></a>
        </div>
        "#;

        let entries = parse_quick_search(html, BASE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].detail_url, "https://9anime.id/watch/naruto.xx8z");
        assert_eq!(entries[0].poster_url.as_deref(), Some("https://static.example/n.jpg"));
        assert!(entries[0].availability.has_sub);
        assert!(entries[1].availability.has_dub);
        assert!(!entries[1].availability.has_sub);
    }

    #[test]
    fn test_parse_search() {
        let html = r#"
        <div id="list-items">
            <div class="ani poster tip"><a href="/watch/naruto.xx8z"><img src="https://static.example/n.jpg" alt="Naruto"></a></div>
            <div class="ani poster tip"><a href="/watch/naruto-dub.aa1"><img src="https://static.example/d.jpg" alt="Naruto (Dub)"></a></div>
        </div>
        "#;

        let entries = parse_search(html, BASE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "Naruto");
        assert_eq!(entries[1].detail_url, "https://9anime.id/watch/naruto-dub.aa1");
        assert!(entries[1].availability.has_dub);
        assert_eq!(entries[1].availability.dub_episode_count, None);
    }

    const DETAIL_PAGE: &str = r#"
    <html><body>
        <div id="player" style="background-image: url('https://static.example/bg.jpg')"></div>
        <div id="w-info">
            <div class="binfo">
                <div class="poster"><span><img src="https://static.example/poster.jpg"></span></div>
                <div class="info">
                    <h1 class="title">Frieren</h1>
                    <div class="synopsis"><div class="shorting"><div class="content">An elf mage.</div></div></div>
                    <div class="bmeta">
                        <div class="meta">
                            <div>Type: <span>TV</span></div>
                            <div>Genre: <a>Adventure</a>, <a>Drama</a>, <a>Adventure</a></div>
                            <div>Status: <span>Releasing</span></div>
                        </div>
                        <div class="meta">
                            <div>Duration: <span>24 min</span></div>
                        </div>
                    </div>
                </div>
            </div>
            <div class="brating"><div id="w-rating" data-id="123" data-score="9.1"></div></div>
        </div>
        <div id="watch-second"><div class="w-side-section"><div class="body">
            <a class="item" href="/watch/mushishi.1"><img src="https://static.example/m.jpg"><span class="name">Mushishi</span></a>
        </div></div></div>
    </body></html>
    "#;

    #[test]
    fn test_parse_detail() {
        let detail =
            parse_detail(DETAIL_PAGE, "https://9anime.id/watch/frieren.3q5", BASE).unwrap();

        assert_eq!(detail.id, "123");
        assert_eq!(detail.title, "Frieren");
        assert_eq!(detail.synopsis.as_deref(), Some("An elf mage."));
        assert_eq!(detail.poster_url.as_deref(), Some("https://static.example/poster.jpg"));
        assert_eq!(detail.background_url.as_deref(), Some("https://static.example/bg.jpg"));
        assert_eq!(detail.genres, vec!["Adventure", "Drama"]);
        assert_eq!(detail.rating, Some(9100));
        assert_eq!(detail.status, SeriesStatus::Ongoing);
        assert_eq!(detail.kind, SeriesKind::Series);
        assert_eq!(detail.duration_minutes, Some(24));
        assert_eq!(detail.recommendations.len(), 1);
        assert_eq!(detail.recommendations[0].title, "Mushishi");
        assert_eq!(detail.recommendations[0].detail_url, "https://9anime.id/watch/mushishi.1");
    }

    #[test]
    fn test_parse_detail_without_id_fails() {
        let html = DETAIL_PAGE.replace(r#"data-id="123""#, "");
        let error = parse_detail(&html, "https://9anime.id/watch/frieren.3q5", BASE).unwrap_err();
        assert_eq!(
            error,
            ProviderError::extraction_failed("id", "https://9anime.id/watch/frieren.3q5")
        );
    }

    #[test]
    fn test_parse_detail_with_oversized_duration() {
        let html = DETAIL_PAGE.replace("24 min", "99999999 hr");
        let detail = parse_detail(&html, "https://9anime.id/watch/frieren.3q5", BASE).unwrap();
        assert_eq!(detail.title, "Frieren");
        assert_eq!(detail.duration_minutes, None);
    }

    #[test]
    fn test_parse_detail_without_info_block_fails() {
        let error =
            parse_detail("<html><body></body></html>", "https://9anime.id/x", BASE).unwrap_err();
        assert_eq!(error, ProviderError::extraction_failed("info", "https://9anime.id/x"));
    }

    #[test]
    fn test_parse_episode_rows() {
        let html = r#"
        <div class="episodes"><ul>
            <li><a data-num="1" data-slug="1" data-sub="1" data-dub="1"><span class="d-title">Start</span></a></li>
            <li><a data-num="7.5" data-slug="7.5" data-sub="1" data-dub="0"></a></li>
            <li><a data-sub="1" data-dub="0"></a></li>
        </ul></div>
        "#;

        let rows = parse_episode_rows(html);
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].number, Some(1));
        assert_eq!(rows[0].title.as_deref(), Some("Start"));
        assert!(rows[0].has_sub && rows[0].has_dub);
        assert_eq!(rows[0].path_segment().as_deref(), Some("ep-1"));

        assert_eq!(rows[1].number, None);
        assert!(!rows[1].has_dub);
        assert_eq!(rows[1].path_segment().as_deref(), Some("ep-7.5"));

        assert_eq!(rows[2].path_segment(), None);
    }

    #[test]
    fn test_parse_duration_minutes() {
        assert_eq!(parse_duration_minutes("24 min"), Some(24));
        assert_eq!(parse_duration_minutes("1 hr 50 min"), Some(110));
        assert_eq!(parse_duration_minutes("2h"), Some(120));
        assert_eq!(parse_duration_minutes("45"), Some(45));
        assert_eq!(parse_duration_minutes("unknown"), None);
        assert_eq!(parse_duration_minutes("99999999 hr"), None);
        assert_eq!(parse_duration_minutes("71582788 hr 20 min"), None);
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating("8.5"), Some(8500));
        assert_eq!(parse_rating("?"), None);
    }

    #[test]
    fn test_strip_episode_suffix() {
        assert_eq!(strip_episode_suffix("/watch/x.1/ep-12"), "/watch/x.1");
        assert_eq!(strip_episode_suffix("/watch/x.1"), "/watch/x.1");
    }
}
