use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use tracing::{debug, warn};

use crate::config::Source;
use crate::model::{DayLocator, ProgramRecord, ScheduleEntry};

/// Source of per-day program listings. Implementations are called from
/// several workers at once and must not share mutable state between calls.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Discover the listing pages (one per day) published for `channel`.
    async fn list_days(&self, channel: &str) -> Result<Vec<DayLocator>>;

    /// Fetch every program listed on one channel-day page.
    async fn fetch_day(&self, locator: &DayLocator) -> Result<Vec<ScheduleEntry>>;
}

static CHANNEL_NAME: Lazy<Selector> = Lazy::new(|| selector("h2.prg-channel span"));
static WEEK_LINKS: Lazy<Selector> = Lazy::new(|| selector("#mtvprg-week a[href]"));
static DAY_NUMBER: Lazy<Selector> = Lazy::new(|| selector("strong"));
static DAY_OF_WEEK: Lazy<Selector> = Lazy::new(|| selector("small"));
static PROGRAMS: Lazy<Selector> =
    Lazy::new(|| selector("#mtvprg-program ol li .tlcbar.is-able"));
static START: Lazy<Selector> = Lazy::new(|| selector("ins"));
static START_LINK: Lazy<Selector> = Lazy::new(|| selector("ins a[href]"));
static TITLE_LINK: Lazy<Selector> = Lazy::new(|| selector("dfn a"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// HTTP fetcher for the cn.ru TV program pages.
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpFetcher {
    pub fn from_config(source: &Source) -> Result<Self> {
        let base_url = Url::parse(&source.base_url)
            .with_context(|| format!("invalid source base URL {}", source.base_url))?;
        let http = Client::builder()
            .user_agent(source.user_agent.clone())
            .timeout(source.timeout())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    /// Resolve a site-relative href against the base URL.
    pub fn resolve(&self, href: &str) -> Result<Url> {
        self.base_url
            .join(href)
            .with_context(|| format!("invalid page reference {href}"))
    }

    async fn get_text(&self, url: Url) -> Result<String> {
        debug!(%url, "requesting page");
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        let status = res.status();
        if !status.is_success() {
            return Err(anyhow!("{url} answered {status}"));
        }
        res.text()
            .await
            .with_context(|| format!("failed to read body of {url}"))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn list_days(&self, channel: &str) -> Result<Vec<DayLocator>> {
        let url = self.resolve(&format!("/tv/program/{channel}/"))?;
        let html = self.get_text(url).await?;
        Ok(parse_week_page(&html, channel))
    }

    async fn fetch_day(&self, locator: &DayLocator) -> Result<Vec<ScheduleEntry>> {
        let url = self.resolve(&locator.url)?;
        let html = self.get_text(url).await?;
        Ok(parse_day_page(&html)
            .into_iter()
            .map(|record| locator.entry(record))
            .collect())
    }
}

/// Element text with whitespace runs collapsed to single spaces, so a title
/// can never break the one-line `#EXTINF` template.
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel).next().map(text_of)
}

fn first_attr<'a>(el: ElementRef<'a>, sel: &Selector, attr: &str) -> Option<&'a str> {
    el.select(sel).next().and_then(|n| n.value().attr(attr))
}

/// Second-to-last `/`-separated segment, i.e. the last one of a path with a
/// trailing slash: `/tv/program/rossija/2016-03-12/` -> `2016-03-12`.
fn penultimate_segment(href: &str) -> Option<&str> {
    let mut parts = href.rsplit('/');
    parts.next()?;
    parts.next().filter(|s| !s.is_empty())
}

/// Extract one locator per day link from a channel's week page.
pub fn parse_week_page(html: &str, channel: &str) -> Vec<DayLocator> {
    let document = Html::parse_document(html);
    let channel_name = document
        .select(&CHANNEL_NAME)
        .next()
        .map(text_of)
        .unwrap_or_default();

    let mut days = Vec::new();
    for link in document.select(&WEEK_LINKS) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let grouping_date = match penultimate_segment(href)
            .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        {
            Some(Ok(date)) => date,
            _ => {
                warn!(channel, href, "day link without a date; skipping");
                continue;
            }
        };
        days.push(DayLocator {
            channel: channel.to_string(),
            channel_name: channel_name.clone(),
            url: href.to_string(),
            day_label: first_text(link, &DAY_NUMBER).unwrap_or_default(),
            weekday_label: first_text(link, &DAY_OF_WEEK).unwrap_or_default(),
            grouping_date,
        });
    }
    days
}

/// Extract the program records listed on a single day page.
pub fn parse_day_page(html: &str) -> Vec<ProgramRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();
    for item in document.select(&PROGRAMS) {
        let start_href = first_attr(item, &START_LINK, "href").unwrap_or_default();
        let air_time = match penultimate_segment(start_href)
            .map(|s| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        {
            Some(Ok(t)) => t,
            _ => {
                debug!(start_href, "program without a parseable air time; skipping");
                continue;
            }
        };
        let detail_href = first_attr(item, &TITLE_LINK, "href").unwrap_or_default();
        let Some(program_id) = penultimate_segment(detail_href) else {
            debug!(detail_href, "program without an id; skipping");
            continue;
        };
        records.push(ProgramRecord {
            air_time,
            start_label: first_text(item, &START).unwrap_or_default(),
            title: first_text(item, &TITLE_LINK).unwrap_or_default(),
            detail_href: detail_href.to_string(),
            program_id: program_id.to_string(),
        });
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK_PAGE: &str = r#"<html><body><div class="tv-inner-content">
        <h2 class="prg-channel"><span>Россия 1</span></h2>
        <div id="mtvprg-week" class="prg-week">
          <a href="/tv/program/rossija/2016-03-12/"><strong>12</strong><small>сб</small></a>
          <a href="/tv/program/rossija/2016-03-13/"><strong>13</strong><small>вс</small></a>
          <a href="/tv/program/rossija/today/"><strong>?</strong></a>
        </div></div></body></html>"#;

    const DAY_PAGE: &str = r#"<html><body>
        <div id="mtvprg-program" class="prg-list"><ol>
          <li>
            <div class="tlcbar is-able">
              <ins><a href="/tv/program/rossija/2016-03-12T06:30:00+0700/">06:30</a></ins>
              <dfn><a href="/tv/program/info/1001/">Утро</a></dfn>
            </div>
            <div class="tlcbar">
              <ins><a href="/tv/program/rossija/2016-03-12T07:00:00+0700/">07:00</a></ins>
              <dfn><a href="/tv/program/info/1002/">Not archived</a></dfn>
            </div>
          </li>
          <li>
            <div class="tlcbar is-able">
              <ins><a href="/tv/program/rossija/2016-03-13T00:40:00+0700/">00:40</a></ins>
              <dfn><a href="/tv/program/info/1003/">Ночной фильм</a></dfn>
            </div>
            <div class="tlcbar is-able">
              <ins>broken</ins>
              <dfn><a href="/tv/program/info/1004/">No time</a></dfn>
            </div>
          </li>
        </ol></div></body></html>"#;

    #[test]
    fn week_page_yields_dated_locators() {
        let days = parse_week_page(WEEK_PAGE, "rossija");
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].channel_name, "Россия 1");
        assert_eq!(days[0].url, "/tv/program/rossija/2016-03-12/");
        assert_eq!(days[0].day_label, "12");
        assert_eq!(days[0].weekday_label, "сб");
        assert_eq!(days[1].grouping_date, NaiveDate::from_ymd_opt(2016, 3, 13).unwrap());
    }

    #[test]
    fn day_page_keeps_only_archived_programs_with_times() {
        let records = parse_day_page(DAY_PAGE);
        let ids: Vec<_> = records.iter().map(|r| r.program_id.as_str()).collect();
        assert_eq!(ids, vec!["1001", "1003"]);
        assert_eq!(records[0].start_label, "06:30");
        assert_eq!(records[0].title, "Утро");
        assert_eq!(records[1].air_time.to_rfc3339(), "2016-03-13T00:40:00+07:00");
    }

    #[test]
    fn titles_spanning_lines_are_collapsed() {
        let html = r#"<div id="mtvprg-program"><ol><li><div class="tlcbar is-able">
            <ins><a href="/tv/program/rossija/2016-03-12T21:00:00+0700/"> 21:00 </a></ins>
            <dfn><a href="/tv/program/info/2001/">Вести
                 в <b>субботу</b></a></dfn>
        </div></li></ol></div>"#;
        let records = parse_day_page(html);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Вести в субботу");
        assert_eq!(records[0].start_label, "21:00");
    }

    #[test]
    fn penultimate_segment_of_hrefs() {
        assert_eq!(penultimate_segment("/a/b/c/"), Some("c"));
        assert_eq!(penultimate_segment("/a/b/c"), Some("b"));
        assert_eq!(penultimate_segment("c"), None);
        assert_eq!(penultimate_segment("//"), None);
    }

    #[test]
    fn resolve_joins_site_relative_hrefs() {
        let fetcher = HttpFetcher::from_config(&Source::default()).unwrap();
        let url = fetcher.resolve("/tv/program/rossija/2016-03-12/").unwrap();
        assert_eq!(url.as_str(), "http://www.cn.ru/tv/program/rossija/2016-03-12/");
    }
}
