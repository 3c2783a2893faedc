//! Heuristic extraction of pin metadata from page snapshots.
//!
//! Pinterest's markup is undocumented and changes often; everything here is
//! best effort. Search pages are parsed for pin cards, detail pages for the
//! like count (from visible text) and for related pins.

use crate::models::Pin;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// Origin used to resolve relative pin links.
pub const PINTEREST_ORIGIN: &str = "https://www.pinterest.com";

/// Like counts outside this range are treated as noise (ids, years, ...).
const MIN_PLAUSIBLE_LIKES: u64 = 10;
const MAX_PLAUSIBLE_LIKES: u64 = 10_000_000;

/// Thumbnail size segments that can be swapped for `/originals/`.
const THUMBNAIL_SEGMENTS: [&str; 3] = ["/236x/", "/474x/", "/736x/"];

static PIN_CARD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"[data-test-id="pin"]"#).expect("valid selector"));
static PIN_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href*="/pin/"]"#).expect("valid selector"));
static IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("valid selector"));

/// Parse pin cards from a search results snapshot.
///
/// Cards are `[data-test-id="pin"]` elements; if the page has none, every
/// pin link that wraps an image is used instead. Pins without both a pin URL
/// and an image URL are dropped, and duplicates (same image) are removed
/// keeping the first occurrence.
pub fn parse_search_snapshot(html: &str) -> Vec<Pin> {
    let document = Html::parse_document(html);

    let cards: Vec<Pin> = document
        .select(&PIN_CARD)
        .filter_map(pin_from_card)
        .collect();

    let pins = if cards.is_empty() {
        linked_pins(&document)
    } else {
        cards
    };

    dedupe_by_image(pins)
}

/// Parse pins linked from a detail page, excluding the page's own pin.
pub fn parse_related_pins(html: &str, own_id: &str) -> Vec<Pin> {
    let document = Html::parse_document(html);
    let pins = linked_pins(&document)
        .into_iter()
        .filter(|p| p.id.is_empty() || p.id != own_id)
        .collect();
    dedupe_by_image(pins)
}

/// Read the like count from a detail page's visible text.
///
/// Looks at every line that is nothing but a number (optionally `K`/`M`/`B`/`万`
/// suffixed, commas allowed) and returns the largest plausible one, or 0.
pub fn max_like_count(text: &str) -> u64 {
    text.lines()
        .filter_map(parse_like_count)
        .filter(|n| (MIN_PLAUSIBLE_LIKES..MAX_PLAUSIBLE_LIKES).contains(n))
        .max()
        .unwrap_or(0)
}

/// Parse a like-count label such as `523`, `1,024`, `1.2K`, `3M` or `1.5万`.
pub fn parse_like_count(label: &str) -> Option<u64> {
    let cleaned: String = label.trim().chars().filter(|c| *c != ',').collect();
    let last = cleaned.chars().last()?;

    let multiplier = match last {
        'K' | 'k' => 1_000f64,
        'M' | 'm' => 1_000_000f64,
        'B' | 'b' => 1_000_000_000f64,
        '万' => 10_000f64,
        _ => 1f64,
    };
    let number = if multiplier > 1.0 {
        &cleaned[..cleaned.len() - last.len_utf8()]
    } else {
        cleaned.as_str()
    };

    if !is_plain_decimal(number) {
        return None;
    }

    let value: f64 = number.parse().ok()?;
    Some((value * multiplier).floor() as u64)
}

/// Digits with at most one decimal point, starting with a digit.
fn is_plain_decimal(s: &str) -> bool {
    let mut dots = 0;
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => {}
        _ => return false,
    }
    for c in chars {
        match c {
            '0'..='9' => {}
            '.' => {
                dots += 1;
                if dots > 1 {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

/// Numeric pin id from a pin URL (`.../pin/123456/`).
pub fn pin_id_from_url(url: &str) -> Option<String> {
    let rest = &url[url.find("/pin/")? + "/pin/".len()..];
    let id: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Rewrite a thumbnail URL to its full-size `/originals/` variant.
pub fn upgrade_image_url(image_url: &str) -> Option<String> {
    THUMBNAIL_SEGMENTS
        .iter()
        .find(|seg| image_url.contains(*seg))
        .map(|seg| image_url.replacen(seg, "/originals/", 1))
}

fn pin_from_card(card: ElementRef<'_>) -> Option<Pin> {
    let link = card.select(&PIN_LINK).next()?;
    let image = card.select(&IMAGE).next()?;
    build_pin(link, image)
}

/// Pins built from links that contain an image.
fn linked_pins(document: &Html) -> Vec<Pin> {
    document
        .select(&PIN_LINK)
        .filter_map(|link| {
            let image = link.select(&IMAGE).next()?;
            build_pin(link, image)
        })
        .collect()
}

fn build_pin(link: ElementRef<'_>, image: ElementRef<'_>) -> Option<Pin> {
    let href = link.value().attr("href")?;
    let absolute = absolutize(href)?;
    let id = pin_id_from_url(&absolute).unwrap_or_default();

    let url = if id.is_empty() {
        absolute
    } else {
        format!("{}/pin/{}/", PINTEREST_ORIGIN, id)
    };

    let image_url = image_source(image)?;
    let title = image
        .value()
        .attr("alt")
        .map(|a| a.trim().to_string())
        .unwrap_or_default();

    Some(Pin {
        id,
        url,
        image_url_hq: upgrade_image_url(&image_url),
        image_url,
        title,
        likes: None,
    })
}

/// `src`, then `data-src`, then the first `srcset` candidate.
fn image_source(image: ElementRef<'_>) -> Option<String> {
    let attrs = image.value();
    let usable = |s: &&str| !s.trim().is_empty() && !s.starts_with("data:");

    if let Some(src) = attrs.attr("src").filter(usable) {
        return Some(src.trim().to_string());
    }
    if let Some(src) = attrs.attr("data-src").filter(usable) {
        return Some(src.trim().to_string());
    }
    attrs
        .attr("srcset")
        .and_then(|set| set.split(',').next())
        .and_then(|candidate| candidate.split_whitespace().next())
        .filter(usable)
        .map(String::from)
}

fn absolutize(href: &str) -> Option<String> {
    let base = Url::parse(PINTEREST_ORIGIN).ok()?;
    base.join(href.trim()).ok().map(String::from)
}

fn dedupe_by_image(pins: Vec<Pin>) -> Vec<Pin> {
    let mut seen = HashSet::new();
    pins.into_iter()
        .filter(|p| seen.insert(p.image_url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_PAGE: &str = r#"
    <html><body>
      <div data-test-id="pin">
        <a href="/pin/1111/"><img src="https://i.pinimg.com/236x/aa/1.jpg" alt=" Blue dashboard "></a>
      </div>
      <div data-test-id="pin">
        <a href="https://www.pinterest.com/pin/2222/?nic=1">
          <img data-src="https://i.pinimg.com/474x/bb/2.jpg" alt="Mobile app">
        </a>
      </div>
      <div data-test-id="pin">
        <a href="/pin/3333/"><img src="https://i.pinimg.com/236x/aa/1.jpg"></a>
      </div>
      <div data-test-id="pin">
        <a href="/pin/4444/"></a>
      </div>
      <div data-test-id="pin">
        <img src="https://i.pinimg.com/236x/cc/5.jpg">
      </div>
    </body></html>"#;

    #[test]
    fn test_parse_search_snapshot() {
        let pins = parse_search_snapshot(SEARCH_PAGE);
        assert_eq!(pins.len(), 2);

        assert_eq!(pins[0].id, "1111");
        assert_eq!(pins[0].url, "https://www.pinterest.com/pin/1111/");
        assert_eq!(pins[0].title, "Blue dashboard");
        assert_eq!(
            pins[0].image_url_hq.as_deref(),
            Some("https://i.pinimg.com/originals/aa/1.jpg")
        );

        assert_eq!(pins[1].id, "2222");
        assert_eq!(pins[1].url, "https://www.pinterest.com/pin/2222/");
        assert_eq!(pins[1].image_url, "https://i.pinimg.com/474x/bb/2.jpg");
        assert!(pins.iter().all(|p| p.likes.is_none()));
    }

    #[test]
    fn test_parse_search_snapshot_without_cards() {
        let html = r#"
            <a href="/pin/9/"><span><img srcset="https://i.pinimg.com/736x/x.jpg 2x, https://i.pinimg.com/236x/x.jpg 1x"></span></a>
            <a href="/pin/10/">text only</a>
        "#;
        let pins = parse_search_snapshot(html);
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].id, "9");
        assert_eq!(pins[0].image_url, "https://i.pinimg.com/736x/x.jpg");
    }

    #[test]
    fn test_parse_empty_snapshot() {
        assert!(parse_search_snapshot("").is_empty());
        assert!(parse_search_snapshot("<html><body>Log in</body></html>").is_empty());
    }

    #[test]
    fn test_parse_related_pins_excludes_self() {
        let html = r#"
            <a href="/pin/5/"><img src="https://i.pinimg.com/736x/self.jpg"></a>
            <a href="/pin/6/"><img src="https://i.pinimg.com/236x/six.jpg"></a>
            <a href="/pin/7/"><img src="https://i.pinimg.com/236x/seven.jpg"></a>
        "#;
        let related = parse_related_pins(html, "5");
        let ids: Vec<&str> = related.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["6", "7"]);
    }

    #[test]
    fn test_parse_like_count() {
        assert_eq!(parse_like_count("523"), Some(523));
        assert_eq!(parse_like_count(" 1,024 "), Some(1024));
        assert_eq!(parse_like_count("1.2K"), Some(1200));
        assert_eq!(parse_like_count("3.5k"), Some(3500));
        assert_eq!(parse_like_count("2M"), Some(2_000_000));
        assert_eq!(parse_like_count("1B"), Some(1_000_000_000));
        assert_eq!(parse_like_count("1.5万"), Some(15_000));
        assert_eq!(parse_like_count("3万"), Some(30_000));
        assert_eq!(parse_like_count("万"), None);
        assert_eq!(parse_like_count("K"), None);
        assert_eq!(parse_like_count("1.2.3"), None);
        assert_eq!(parse_like_count("12 comments"), None);
        assert_eq!(parse_like_count(".5K"), None);
        assert_eq!(parse_like_count(""), None);
    }

    #[test]
    fn test_max_like_count() {
        let text = "Save\nUI Kit\n1.4K\n2 comments\n7\n356\nMore like this";
        assert_eq!(max_like_count(text), 1400);

        assert_eq!(max_like_count("Save\nShare"), 0);
        // Values under 10 and from 10M upwards are ignored.
        assert_eq!(max_like_count("9\n10M\n15"), 15);
    }

    #[test]
    fn test_pin_id_from_url() {
        assert_eq!(
            pin_id_from_url("https://www.pinterest.com/pin/123456/"),
            Some("123456".to_string())
        );
        assert_eq!(pin_id_from_url("/pin/42?x=1"), Some("42".to_string()));
        assert_eq!(pin_id_from_url("/pin/abc/"), None);
        assert_eq!(pin_id_from_url("https://www.pinterest.com/ideas/"), None);
    }

    #[test]
    fn test_upgrade_image_url() {
        assert_eq!(
            upgrade_image_url("https://i.pinimg.com/236x/a/b.jpg").as_deref(),
            Some("https://i.pinimg.com/originals/a/b.jpg")
        );
        assert_eq!(
            upgrade_image_url("https://i.pinimg.com/736x/a/b.jpg").as_deref(),
            Some("https://i.pinimg.com/originals/a/b.jpg")
        );
        assert_eq!(upgrade_image_url("https://i.pinimg.com/1200x/a/b.jpg"), None);
    }
}
