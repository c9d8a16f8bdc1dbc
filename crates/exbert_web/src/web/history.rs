use exbert::config::HistorySink;
use wasm_bindgen::JsValue;

/// `window.history` as the URL sink for the configuration store.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct BrowserHistory;

fn with_query_url(query: &str) -> String {
    if query.is_empty() {
        location_pathname()
    } else {
        format!("?{query}")
    }
}

fn location_pathname() -> String {
    web_sys::window()
        .and_then(|w| w.location().pathname().ok())
        .unwrap_or_else(|| "/".to_string())
}

/// Query string of the current page without the leading `?`.
pub(super) fn current_query() -> String {
    web_sys::window()
        .and_then(|w| w.location().search().ok())
        .map(|s| s.trim_start_matches('?').to_string())
        .unwrap_or_default()
}

impl HistorySink for BrowserHistory {
    fn push(&mut self, query: &str) {
        let Some(history) = web_sys::window().and_then(|w| w.history().ok()) else {
            return;
        };
        if let Err(e) = history.push_state_with_url(&JsValue::NULL, "", Some(&with_query_url(query))) {
            tracing::warn!(error = ?e, "history.pushState failed");
        }
    }

    fn replace(&mut self, query: &str) {
        let Some(history) = web_sys::window().and_then(|w| w.history().ok()) else {
            return;
        };
        if let Err(e) =
            history.replace_state_with_url(&JsValue::NULL, "", Some(&with_query_url(query)))
        {
            tracing::warn!(error = ?e, "history.replaceState failed");
        }
    }
}
