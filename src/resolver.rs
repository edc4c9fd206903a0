use crate::config::TemplateConfig;
use crate::types::{CollectorError, Result, SourceKind};
use tracing::debug;
use url::Url;

/// Resolve a configured source URL to the feed URL to fetch.
///
/// Special kinds carry an identifier inside the raw URL (a path segment for
/// zhihu, query parameters for wechat) that is substituted into the
/// per-kind template. Everything else passes through unchanged. A missing
/// identifier is a hard failure for that single source.
pub fn resolve_feed_url(raw: &str, kind: SourceKind, templates: &TemplateConfig) -> Result<String> {
    let resolved = match kind {
        SourceKind::Zhihu => {
            let uid = zhihu_uid(raw)
                .ok_or_else(|| source_error(raw, "no user id path segment"))?;
            templates.zhihu.replace("{uid}", uid)
        }
        SourceKind::Wechat => {
            let (biz, aid) = wechat_ids(raw)
                .ok_or_else(|| source_error(raw, "missing __biz or album_id query parameter"))?;
            templates.wechat.replace("{biz}", &biz).replace("{aid}", &aid)
        }
        SourceKind::Rss => raw.to_string(),
    };

    if resolved != raw {
        debug!("resolved {} source {} -> {}", kind.label(), raw, resolved);
    }
    Ok(resolved)
}

/// The zhihu user id is the second-to-last path segment of the profile URL,
/// e.g. `https://www.zhihu.com/people/<uid>/posts`.
fn zhihu_uid(raw: &str) -> Option<&str> {
    raw.rsplit('/').nth(1).filter(|segment| !segment.is_empty())
}

/// WeChat album URLs carry the account (`__biz`) and album (`album_id`)
/// identifiers as query parameters.
fn wechat_ids(raw: &str) -> Option<(String, String)> {
    let url = Url::parse(raw).ok()?;
    let mut biz = None;
    let mut aid = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "__biz" => biz = Some(value.into_owned()),
            "album_id" => aid = Some(value.into_owned()),
            _ => {}
        }
    }
    Some((biz?, aid?))
}

fn source_error(url: &str, reason: &str) -> CollectorError {
    CollectorError::Source {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}
