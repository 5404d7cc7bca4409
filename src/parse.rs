//! Layered parsing of raw listing pages into [`VideoRecord`]s.
//!
//! Markup pages go through an ordered chain of pure extractors, tried
//! left-to-right until one returns a non-empty result:
//!
//! 1. [`extract_initial_state`]: the `window.__INITIAL_STATE__` hydration
//!    data island embedded in the page (highest fidelity)
//! 2. [`extract_modern_dom`]: current `.bili-video-card` markup
//! 3. [`extract_legacy_dom`]: older `.small-item` markup shapes
//!
//! Each step's result carries a [`Provenance`] tag so the orchestrator and
//! tests can tell which path produced the records. The synthetic generator
//! ([`synthetic_records`]) is deliberately *not* part of the chain: it is an
//! availability fallback the orchestrator invokes only when explicitly
//! enabled, and its output is never merged with authoritative records.
//!
//! # Count decoding
//!
//! Listing markup abbreviates counts with locale suffixes. The multiplier
//! table is:
//!
//! | Suffix | Multiplier |
//! |--------|------------|
//! | 万     | 10,000     |
//! | 千     | 1,000      |
//!
//! `"50.2万"` decodes to `502000`. A count no decoder understands defaults
//! to 0 rather than dropping the record.

use crate::models::{Provenance, RawContent, VideoRecord};
use chrono::{DateTime, Datelike, Local, NaiveDate};
use once_cell::sync::Lazy;
use rand::{Rng, SeedableRng, rngs::StdRng};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, trace};

static INITIAL_STATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)window\.__INITIAL_STATE__\s*=\s*(\{.*?\})\s*;\s*(?:\(function|</script>)")
        .unwrap()
});
static AV_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/video/av(\d+)").unwrap());
static BV_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/video/(BV[0-9A-Za-z]+)").unwrap());

static MODERN_CARD: Lazy<Selector> = Lazy::new(|| Selector::parse(".bili-video-card").unwrap());
static MODERN_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".bili-video-card__info--tit").unwrap());
static MODERN_DATE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".bili-video-card__info--date").unwrap());
static MODERN_STATS: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".bili-video-card__stats--item").unwrap());
static LEGACY_ITEM: Lazy<Selector> = Lazy::new(|| Selector::parse(".small-item").unwrap());
static LEGACY_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("a.title").unwrap());
static LEGACY_PLAY: Lazy<Selector> = Lazy::new(|| Selector::parse(".play").unwrap());
static LEGACY_COMMENT: Lazy<Selector> = Lazy::new(|| Selector::parse(".comment").unwrap());
static LEGACY_DATE: Lazy<Selector> = Lazy::new(|| Selector::parse(".time").unwrap());
static ANY_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static PAGER_NEXT: Lazy<Selector> = Lazy::new(|| Selector::parse(".be-pager-next").unwrap());

/// Markers of the platform's anti-automation interstitials.
const BLOCK_MARKERS: &[&str] = &["安全风控", "验证码", "captcha", "geetest", "访问异常"];

/// An extraction step of the markup chain.
pub type Extractor = fn(&str) -> Option<Vec<VideoRecord>>;

/// The markup fallback chain, in priority order.
pub const HTML_CHAIN: &[(Provenance, Extractor)] = &[
    (Provenance::InitialState, extract_initial_state),
    (Provenance::ModernDom, extract_modern_dom),
    (Provenance::LegacyDom, extract_legacy_dom),
];

/// Reduce one raw page to records plus the provenance of the path that won.
///
/// JSON payloads from the direct strategy take a typed decode path and may
/// legitimately be empty (an empty listing page is a valid result there).
/// Markup pages walk [`HTML_CHAIN`]; if every step comes up empty the page
/// is a parse failure.
pub fn parse_page(raw: &RawContent) -> Result<(Vec<VideoRecord>, Provenance), crate::error::CrawlError> {
    match raw {
        RawContent::Json(value) => {
            let vlist = value
                .pointer("/list/vlist")
                .or_else(|| value.pointer("/vlist"))
                .ok_or(crate::error::CrawlError::Parse)?;
            Ok((records_from_vlist(vlist), Provenance::Api))
        }
        RawContent::Html(html) => {
            for (provenance, extract) in HTML_CHAIN {
                if let Some(records) = extract(html) {
                    if !records.is_empty() {
                        debug!(?provenance, count = records.len(), "Extraction step produced records");
                        return Ok((records, *provenance));
                    }
                }
            }
            Err(crate::error::CrawlError::Parse)
        }
    }
}

/// Step 1: parse the embedded hydration state.
pub fn extract_initial_state(html: &str) -> Option<Vec<VideoRecord>> {
    let caps = INITIAL_STATE_RE.captures(html)?;
    let state: serde_json::Value = serde_json::from_str(caps.get(1)?.as_str()).ok()?;
    let vlist = state
        .pointer("/list/vlist")
        .or_else(|| state.pointer("/space/res/vlist"))?;
    let records = records_from_vlist(vlist);
    trace!(count = records.len(), "initial-state extraction");
    if records.is_empty() { None } else { Some(records) }
}

/// Step 2: current platform markup (`.bili-video-card`).
pub fn extract_modern_dom(html: &str) -> Option<Vec<VideoRecord>> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for card in document.select(&MODERN_CARD) {
        let title_el = card.select(&MODERN_TITLE).next();
        let title = title_el
            .and_then(|el| el.value().attr("title").map(str::to_string))
            .or_else(|| title_el.map(|el| el.text().collect::<String>().trim().to_string()))
            .unwrap_or_default();

        let Some(aid) = card
            .select(&ANY_LINK)
            .filter_map(|a| a.value().attr("href"))
            .find_map(item_id_from_href)
        else {
            continue;
        };

        let stats: Vec<String> = card
            .select(&MODERN_STATS)
            .map(|el| el.text().collect::<String>())
            .collect();
        let view = stats.first().map(|s| decode_locale_count(s)).unwrap_or(0);
        let comment = stats.get(1).map(|s| decode_locale_count(s)).unwrap_or(0);

        let date_text = card
            .select(&MODERN_DATE)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let Some(pubdate) = parse_listing_date(&date_text) else {
            continue;
        };

        records.push(VideoRecord {
            aid,
            view,
            comment,
            pubdate,
            title,
            created: epoch_from_date(pubdate),
        });
    }

    trace!(count = records.len(), "modern DOM extraction");
    if records.is_empty() { None } else { Some(records) }
}

/// Step 3: older `.small-item` markup.
pub fn extract_legacy_dom(html: &str) -> Option<Vec<VideoRecord>> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for item in document.select(&LEGACY_ITEM) {
        let Some(title_el) = item.select(&LEGACY_TITLE).next() else {
            continue;
        };
        let title = title_el
            .value()
            .attr("title")
            .map(str::to_string)
            .unwrap_or_else(|| title_el.text().collect::<String>().trim().to_string());
        let Some(aid) = title_el.value().attr("href").and_then(item_id_from_href) else {
            continue;
        };

        let view = item
            .select(&LEGACY_PLAY)
            .next()
            .map(|el| decode_locale_count(&el.text().collect::<String>()))
            .unwrap_or(0);
        let comment = item
            .select(&LEGACY_COMMENT)
            .next()
            .map(|el| decode_locale_count(&el.text().collect::<String>()))
            .unwrap_or(0);

        let date_text = item
            .select(&LEGACY_DATE)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default();
        let Some(pubdate) = parse_listing_date(&date_text) else {
            continue;
        };

        records.push(VideoRecord {
            aid,
            view,
            comment,
            pubdate,
            title,
            created: epoch_from_date(pubdate),
        });
    }

    trace!(count = records.len(), "legacy DOM extraction");
    if records.is_empty() { None } else { Some(records) }
}

/// Decode records from an API-shaped `vlist` array (shared by the direct
/// strategy payload and the hydration-state island).
pub fn records_from_vlist(vlist: &serde_json::Value) -> Vec<VideoRecord> {
    let Some(items) = vlist.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let aid = item.get("aid")?.as_u64()?;
            let created = item.get("created")?.as_i64()?;
            let pubdate = date_from_epoch(created)?;
            Some(VideoRecord {
                aid,
                view: count_from_value(item.get("play")),
                comment: count_from_value(item.get("comment")),
                pubdate,
                title: item
                    .get("title")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
                created,
            })
        })
        .collect()
}

/// Coerce an API count field to an integer. The platform sometimes reports
/// `"--"` instead of a number for freshly published items; the documented
/// default for any undecodable count is 0.
pub fn count_from_value(value: Option<&serde_json::Value>) -> u64 {
    match value {
        Some(v) => {
            if let Some(n) = v.as_u64() {
                n
            } else if let Some(f) = v.as_f64() {
                if f < 0.0 { 0 } else { f.round() as u64 }
            } else if let Some(s) = v.as_str() {
                decode_locale_count(s)
            } else {
                0
            }
        }
        None => 0,
    }
}

/// Expand an abbreviated locale count to an exact integer.
pub fn decode_locale_count(text: &str) -> u64 {
    let text = text.trim();
    if let Some(prefix) = text.strip_suffix('万') {
        return scale_count(prefix, 10_000.0);
    }
    if let Some(prefix) = text.strip_suffix('千') {
        return scale_count(prefix, 1_000.0);
    }
    let digits = text.replace(',', "");
    digits.parse::<u64>().unwrap_or(0)
}

fn scale_count(prefix: &str, multiplier: f64) -> u64 {
    match prefix.trim().parse::<f64>() {
        Ok(n) if n >= 0.0 => (n * multiplier).round() as u64,
        _ => 0,
    }
}

/// Integer item id from a card link. Classic links carry the id directly
/// (`/video/av123`); BV-slug links get a stable synthetic id derived from
/// the slug so the record still has a unique integer key.
fn item_id_from_href(href: &str) -> Option<u64> {
    if let Some(caps) = AV_ID_RE.captures(href) {
        return caps.get(1)?.as_str().parse().ok();
    }
    BV_ID_RE
        .captures(href)
        .map(|caps| fnv1a64(caps.get(1).map(|m| m.as_str()).unwrap_or_default().as_bytes()))
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Whether the page body is an anti-automation interstitial rather than a
/// listing.
pub fn looks_blocked(html: &str) -> bool {
    BLOCK_MARKERS.iter().any(|marker| html.contains(marker))
}

/// Whether the listing's own pager has an enabled "next page" control.
/// Absent pager means a single-page listing.
pub fn pager_has_next(html: &str) -> bool {
    let document = Html::parse_document(html);
    match document.select(&PAGER_NEXT).next() {
        Some(el) => {
            let classes = el.value().attr("class").unwrap_or_default();
            !classes.contains("be-pager-disabled") && el.value().attr("disabled").is_none()
        }
        None => false,
    }
}

/// Deterministic synthetic records for a window, seeded from the request.
///
/// Tagged [`Provenance::Synthetic`] by the orchestrator and only handed out
/// when the caller explicitly enabled fallback data.
pub fn synthetic_records(uid: u64, start: NaiveDate, end: NaiveDate) -> Vec<VideoRecord> {
    const TITLES: &[&str] = &[
        "A股迎来黄金坑，牛市起点来了！",
        "牛市来了！这些股票要涨10倍",
        "熊市已结束，准备抄底了",
        "今天是历史性的一天，A股见底了",
        "婴儿底已现，钻石底不远了",
        "股民们，春天来了！",
        "这是千载难逢的投资机会",
    ];

    let span_days = (end - start).num_days().max(0);
    let seed = uid
        ^ ((start.num_days_from_ce() as u64) << 16)
        ^ (end.num_days_from_ce() as u64);
    let mut rng = StdRng::seed_from_u64(seed);

    let count = rng.random_range(3..=8);
    (0..count)
        .map(|i| {
            let offset = rng.random_range(0..=span_days);
            let pubdate = start + chrono::Duration::days(offset);
            VideoRecord {
                aid: 1_000_000 + i,
                view: rng.random_range(5_000..=100_000),
                comment: rng.random_range(100..=5_000),
                pubdate,
                title: TITLES[rng.random_range(0..TITLES.len())].to_string(),
                created: epoch_from_date(pubdate),
            }
        })
        .collect()
}

/// Publication date from an epoch timestamp, in local time like the listing
/// displays it.
pub fn date_from_epoch(created: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(created, 0).map(|dt| dt.with_timezone(&Local).date_naive())
}

fn epoch_from_date(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Parse a listing-card date label. Full dates come through as
/// `YYYY-MM-DD`; recent items are abbreviated to `MM-DD` and implicitly
/// belong to the current year.
fn parse_listing_date(text: &str) -> Option<NaiveDate> {
    let cleaned = text.trim().trim_start_matches('·').trim();
    if let Ok(date) = cleaned.parse::<NaiveDate>() {
        return Some(date);
    }
    let year = Local::now().year();
    NaiveDate::parse_from_str(&format!("{year}-{cleaned}"), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlError;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_decode_locale_count_table() {
        assert_eq!(decode_locale_count("50.2万"), 502_000);
        assert_eq!(decode_locale_count("3万"), 30_000);
        assert_eq!(decode_locale_count("1.5千"), 1_500);
        assert_eq!(decode_locale_count("3千"), 3_000);
        assert_eq!(decode_locale_count("1,234"), 1_234);
        assert_eq!(decode_locale_count("987"), 987);
    }

    #[test]
    fn test_undecodable_count_defaults_to_zero() {
        assert_eq!(decode_locale_count("--"), 0);
        assert_eq!(decode_locale_count(""), 0);
        assert_eq!(decode_locale_count("约一万"), 0);
        assert_eq!(count_from_value(None), 0);
        assert_eq!(count_from_value(Some(&serde_json::json!("--"))), 0);
        assert_eq!(count_from_value(Some(&serde_json::json!(42))), 42);
    }

    fn vlist_json() -> serde_json::Value {
        serde_json::json!([
            {
                "aid": 114514,
                "play": 502000,
                "comment": "1.2千",
                "title": "测试视频",
                "created": 1750000000i64
            },
            {
                "aid": 114515,
                "play": "--",
                "comment": 7,
                "title": "新视频",
                "created": 1750086400i64
            }
        ])
    }

    #[test]
    fn test_records_from_vlist_typed_decode() {
        let records = records_from_vlist(&vlist_json());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].aid, 114514);
        assert_eq!(records[0].view, 502_000);
        assert_eq!(records[0].comment, 1_200);
        assert_eq!(records[1].view, 0);
    }

    #[test]
    fn test_parse_page_json_empty_listing_is_valid() {
        let raw = RawContent::Json(serde_json::json!({ "list": { "vlist": [] } }));
        let (records, provenance) = parse_page(&raw).unwrap();
        assert!(records.is_empty());
        assert_eq!(provenance, Provenance::Api);
    }

    fn initial_state_page() -> String {
        let state = serde_json::json!({ "list": { "vlist": vlist_json() } });
        format!(
            "<html><body><script>window.__INITIAL_STATE__={state};(function(){{}})();</script>\
             {}</body></html>",
            modern_card("av999", "不该被看到", "9万", "50", "2025-06-01")
        )
    }

    fn modern_card(slug: &str, title: &str, view: &str, comment: &str, date: &str) -> String {
        format!(
            r#"<div class="bili-video-card">
                 <a href="https://www.bilibili.com/video/{slug}"></a>
                 <div class="bili-video-card__info--tit" title="{title}">{title}</div>
                 <div class="bili-video-card__stats--item"><span>{view}</span></div>
                 <div class="bili-video-card__stats--item"><span>{comment}</span></div>
                 <div class="bili-video-card__info--date">· {date}</div>
               </div>"#
        )
    }

    #[test]
    fn test_chain_prefers_initial_state_over_dom() {
        let html = initial_state_page();
        let (records, provenance) = parse_page(&RawContent::Html(html)).unwrap();
        assert_eq!(provenance, Provenance::InitialState);
        // Records come from the data island, not the card also present in
        // the markup.
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].aid, 114514);
    }

    #[test]
    fn test_modern_dom_extraction() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            modern_card("av111", "第一个", "50.2万", "1.5千", "2025-06-02"),
            modern_card("av222", "第二个", "300", "12", "2025-06-03"),
        );
        let (records, provenance) = parse_page(&RawContent::Html(html)).unwrap();
        assert_eq!(provenance, Provenance::ModernDom);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].aid, 111);
        assert_eq!(records[0].view, 502_000);
        assert_eq!(records[0].comment, 1_500);
        assert_eq!(records[0].pubdate, day("2025-06-02"));
        assert_eq!(records[1].title, "第二个");
    }

    #[test]
    fn test_modern_dom_bv_link_yields_stable_id() {
        let html = format!(
            "<html><body>{}{}</body></html>",
            modern_card("BV1xx411c7mD", "BV链接", "100", "1", "2025-06-02"),
            modern_card("BV1xx411c7mD", "BV链接", "100", "1", "2025-06-02"),
        );
        let records = extract_modern_dom(&html).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].aid, records[1].aid);
        assert!(records[0].aid > 0);
    }

    #[test]
    fn test_legacy_dom_extraction() {
        let html = r#"<ul>
            <li class="small-item">
              <a class="title" href="//www.bilibili.com/video/av333" title="旧版标题">旧版标题</a>
              <span class="play">3.2万</span>
              <span class="comment">88</span>
              <span class="time">2025-06-04</span>
            </li>
          </ul>"#;
        let (records, provenance) = parse_page(&RawContent::Html(html.to_string())).unwrap();
        assert_eq!(provenance, Provenance::LegacyDom);
        assert_eq!(records[0].aid, 333);
        assert_eq!(records[0].view, 32_000);
        assert_eq!(records[0].pubdate, day("2025-06-04"));
    }

    #[test]
    fn test_unrecognized_markup_is_a_parse_failure() {
        let raw = RawContent::Html("<html><body><p>nothing here</p></body></html>".into());
        assert!(matches!(parse_page(&raw), Err(CrawlError::Parse)));
    }

    #[test]
    fn test_pager_next_signal() {
        assert!(pager_has_next(
            r#"<div class="be-pager"><button class="be-pager-next">下一页</button></div>"#
        ));
        assert!(!pager_has_next(
            r#"<div class="be-pager"><button class="be-pager-next be-pager-disabled">下一页</button></div>"#
        ));
        assert!(!pager_has_next("<div>no pager at all</div>"));
    }

    #[test]
    fn test_block_marker_detection() {
        assert!(looks_blocked("<html>由于触发安全风控策略，访问被拦截</html>"));
        assert!(looks_blocked("<div id=\"geetest_panel\"></div>"));
        assert!(!looks_blocked("<html><body>正常视频列表</body></html>"));
    }

    #[test]
    fn test_synthetic_records_are_deterministic_and_in_window() {
        let start = day("2025-06-01");
        let end = day("2025-06-07");
        let a = synthetic_records(42, start, end);
        let b = synthetic_records(42, start, end);
        assert_eq!(a, b);
        assert!((3..=8).contains(&a.len()));
        for record in &a {
            assert!(record.pubdate >= start && record.pubdate <= end);
        }
        // Different creator, different data.
        let c = synthetic_records(43, start, end);
        assert_ne!(a, c);
    }
}
