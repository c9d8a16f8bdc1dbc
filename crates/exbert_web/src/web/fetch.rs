use exbert::api::{ApiError, HttpRequest, HttpResponse, Method, Transport};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

/// `window.fetch` as the backend transport.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct FetchTransport;

fn js_err(context: &str, e: JsValue) -> ApiError {
    let detail = e.as_string().unwrap_or_else(|| format!("{e:?}"));
    ApiError::Network(format!("{context}: {detail}"))
}

fn build_request(req: &HttpRequest) -> Result<Request, ApiError> {
    let init = RequestInit::new();
    init.set_mode(RequestMode::SameOrigin);
    match req.method {
        Method::Get => init.set_method("GET"),
        Method::Post => {
            init.set_method("POST");
            if let Some(body) = &req.body {
                init.set_body(&JsValue::from_str(body));
            }
        }
    }
    let request = Request::new_with_str_and_init(&req.url, &init)
        .map_err(|e| js_err("fetch: bad request", e))?;
    if req.body.is_some() {
        request
            .headers()
            .set("Content-Type", "application/json")
            .map_err(|e| js_err("fetch: headers", e))?;
    }
    Ok(request)
}

impl Transport for FetchTransport {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, ApiError> {
        let window = web_sys::window().ok_or(ApiError::Network("no window".to_string()))?;
        let request = build_request(&req)?;

        let value = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(|e| js_err("fetch", e))?;
        let resp: Response = value
            .dyn_into()
            .map_err(|_| ApiError::Network("fetch: expected Response".to_string()))?;

        let text = resp.text().map_err(|e| js_err("fetch: text()", e))?;
        let body = JsFuture::from(text)
            .await
            .map_err(|e| js_err("fetch: body", e))?
            .as_string()
            .unwrap_or_default();

        Ok(HttpResponse {
            status: resp.status(),
            status_text: resp.status_text(),
            body,
        })
    }
}
