//! Per-tab navigation state machine.
//!
//! A tab goes `idle -> loading -> complete` for every navigation. While loading, the record
//! collects a pending target (either the canonical url of a tab that just finished loading, which
//! makes a quick reload look like a client side redirect, or the url the tab started loading)
//! plus the network redirects reported by the host. At completion the pending target and the
//! chain are folded into the record's canonical identity, so that a tab which went through
//! `A -> B -> C` is published as `A` on every peer regardless of where each peer ends up.

use crate::{
    identity::{is_same_page, UrlPolicy},
    properties::Timestamp,
    tracker::TabItem,
};

/// A navigation started. `window_ms` is the interval after a completed load during which another
/// load is taken for a client side redirect rather than a new navigation.
pub fn on_loading(item: &mut TabItem, tab_url: &str, now: Timestamp, window_ms: i64) {
    if item.redirect_url.is_some() {
        return;
    }
    let recent_load = item
        .update_time
        .map(|updated| now.saturating_sub(updated) < window_ms)
        .unwrap_or(false);
    match item.original_url.as_ref() {
        Some(original) if recent_load => {
            tracing::debug!("[Redirect] assumed client side redirect from {original}");
            item.redirect_url = Some(original.clone());
            item.assumed_redirect = true;
        }
        _ => {
            tracing::debug!("[Redirect] potential redirect from {tab_url}");
            item.redirect_url = Some(tab_url.to_string());
        }
    }
}

/// The host reported a network level redirect `source -> target` for this tab.
pub fn on_redirect(item: &mut TabItem, source: &str, target: &str) {
    tracing::debug!("[Redirect] network redirect {source} -> {target}");
    item.redirects.insert(target.to_string(), source.to_string());
}

/// Earliest source reachable from `url` through the recorded chain.
fn chain_origin(item: &TabItem, url: &str) -> String {
    let mut current = url;
    // A malformed chain may loop; no valid walk is longer than the chain itself.
    for _ in 0..item.redirects.len() {
        match item.redirects.get(current) {
            Some(source) => current = source,
            None => break,
        }
    }
    current.to_string()
}

/// A navigation finished at `tab_url`.
///
/// Returns the identity that was navigated away from when this was a manual navigation, so the
/// caller can remember it as recently closed.
pub fn on_complete(
    item: &mut TabItem,
    tab_url: &str,
    now: Timestamp,
    policy: &UrlPolicy,
) -> Option<String> {
    if !item.assumed_redirect && !item.redirects.is_empty() {
        let origin = chain_origin(item, tab_url);
        if origin != tab_url && !policy.should_ignore(&origin) {
            tracing::debug!("[Redirect] resolved redirect chain {origin} -> {tab_url}");
            item.redirect_url = Some(origin);
        }
    }

    let mut replaced = None;
    match item.url.as_deref() {
        None => {
            if item.original_url.is_none()
                && !policy.should_ignore_opt(item.redirect_url.as_deref())
            {
                item.original_url = item.redirect_url.clone();
            }
        }
        Some(previous) if previous != tab_url => {
            if is_same_page(previous, tab_url) {
                if item.original_url.is_none() {
                    item.original_url = Some(previous.to_string());
                }
            } else if item.assumed_redirect {
                tracing::debug!("[Redirect] assumed redirect {previous} -> {tab_url}");
            } else {
                tracing::debug!("[Redirect] manual navigation {previous} -> {tab_url}");
                replaced = policy
                    .first_syncable([item.original_url.as_deref(), Some(previous)])
                    .map(str::to_string);
                item.source = None;
                item.original_url = item
                    .redirect_url
                    .take()
                    .filter(|pending| !policy.should_ignore(pending));
            }
        }
        Some(_) => {}
    }

    item.update_time = Some(now);
    item.url = Some(tab_url.to_string());
    item.redirect_url = None;
    item.assumed_redirect = false;
    item.redirects.clear();
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{identity::NEW_TAB_URL, properties::PeerId};
    use test_log::test;

    const WINDOW: i64 = 1_500;

    fn loaded(url: &str, at: Timestamp) -> TabItem {
        let policy = UrlPolicy::default();
        let mut item = TabItem::default();
        on_loading(&mut item, url, at, WINDOW);
        on_complete(&mut item, url, at, &policy);
        item
    }

    #[test]
    fn test_first_load_adopts_pending_as_canonical() {
        let item = loaded("https://a.example/", 0);
        assert_eq!(item.url.as_deref(), Some("https://a.example/"));
        assert_eq!(item.original_url.as_deref(), Some("https://a.example/"));
        assert_eq!(item.update_time, Some(0));
        assert!(item.redirect_url.is_none());
    }

    #[test]
    fn test_first_load_of_ignored_url_has_no_canonical() {
        let item = loaded(NEW_TAB_URL, 0);
        assert!(item.original_url.is_none());
    }

    #[test]
    fn test_redirect_chain_collapses_to_origin() {
        let policy = UrlPolicy::default();
        let mut item = TabItem::default();
        on_loading(&mut item, "https://a.example/", 0, WINDOW);
        on_redirect(&mut item, "https://a.example/", "https://b.example/");
        on_redirect(&mut item, "https://b.example/", "https://c.example/");
        let replaced = on_complete(&mut item, "https://c.example/", 10, &policy);

        assert!(replaced.is_none());
        assert_eq!(item.url.as_deref(), Some("https://c.example/"));
        assert_eq!(item.original_url.as_deref(), Some("https://a.example/"));
        assert!(item.redirects.is_empty());
    }

    #[test]
    fn test_chain_walk_survives_cycles() {
        let policy = UrlPolicy::default();
        let mut item = TabItem::default();
        on_redirect(&mut item, "https://a.example/", "https://b.example/");
        on_redirect(&mut item, "https://b.example/", "https://a.example/");
        on_complete(&mut item, "https://b.example/", 0, &policy);
        assert_eq!(item.url.as_deref(), Some("https://b.example/"));
    }

    #[test]
    fn test_fragment_navigation_locks_canonical() {
        let policy = UrlPolicy::default();
        let mut item = TabItem {
            url: Some("https://a.example/doc".to_string()),
            update_time: Some(0),
            ..Default::default()
        };
        on_loading(&mut item, "https://a.example/doc#usage", 5_000, WINDOW);
        let replaced = on_complete(&mut item, "https://a.example/doc#usage", 5_000, &policy);

        assert!(replaced.is_none());
        assert_eq!(item.original_url.as_deref(), Some("https://a.example/doc"));
        assert_eq!(item.url.as_deref(), Some("https://a.example/doc#usage"));
    }

    #[test]
    fn test_quick_reload_is_assumed_redirect() {
        let policy = UrlPolicy::default();
        let mut item = loaded("https://a.example/", 0);
        item.source = Some(PeerId::from("desk"));

        on_loading(&mut item, "https://a.example/", 500, WINDOW);
        assert!(item.assumed_redirect);
        let replaced = on_complete(&mut item, "https://login.example/", 600, &policy);

        assert!(replaced.is_none());
        assert_eq!(item.original_url.as_deref(), Some("https://a.example/"));
        assert_eq!(item.source, Some(PeerId::from("desk")));
        assert!(!item.assumed_redirect);
    }

    #[test]
    fn test_manual_navigation_resets_identity() {
        let policy = UrlPolicy::default();
        let mut item = loaded("https://a.example/", 0);
        item.source = Some(PeerId::from("desk"));

        on_loading(&mut item, "https://b.example/", 5_000, WINDOW);
        assert!(!item.assumed_redirect);
        let replaced = on_complete(&mut item, "https://b.example/", 5_100, &policy);

        assert_eq!(replaced.as_deref(), Some("https://a.example/"));
        assert!(item.source.is_none());
        assert_eq!(item.original_url.as_deref(), Some("https://b.example/"));
        assert_eq!(item.update_time, Some(5_100));
    }

    #[test]
    fn test_manual_navigation_from_placeholder_tracks_nothing() {
        let policy = UrlPolicy::default();
        let mut item = loaded(NEW_TAB_URL, 0);
        on_loading(&mut item, "https://b.example/", 5_000, WINDOW);
        let replaced = on_complete(&mut item, "https://b.example/", 5_000, &policy);
        assert!(replaced.is_none());
        assert_eq!(item.original_url.as_deref(), Some("https://b.example/"));
    }

    #[test]
    fn test_loading_keeps_existing_pending_target() {
        let mut item = TabItem::default();
        on_loading(&mut item, "https://a.example/", 0, WINDOW);
        on_loading(&mut item, "https://b.example/", 10, WINDOW);
        assert_eq!(item.redirect_url.as_deref(), Some("https://a.example/"));
    }

    #[test]
    fn test_ancient_update_time_is_not_a_recent_load() {
        let mut item = loaded("https://a.example/", 0);
        item.update_time = Some(i64::MIN);
        on_loading(&mut item, "https://b.example/", 1_000, WINDOW);
        assert_eq!(item.redirect_url.as_deref(), Some("https://b.example/"));
        assert!(!item.assumed_redirect);
    }
}
