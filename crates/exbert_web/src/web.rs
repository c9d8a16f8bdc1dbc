use std::rc::Rc;

use exbert::api::{ApiClient, DemoTable, HttpRequest, NearestKind, Transport};
use exbert::component::{IdGenerator, Point, VizComponent};
use exbert::config::{ConfigStore, InspectorMode, Side};
use exbert::events::{AppEvent, EventBus, EventName};
use exbert::float_fmt::fmt_f32_fixed;
use exbert::search::MetaField;
use exbert::session::{Command, Session, Status, View};
use exbert::settings::AppSettings;
use exbert::widgets::{AttentionGraph, AttentionHeadBox, CorpusHistogram, TextTokens};
use leptos::ev::MouseEvent;
use leptos::html;
use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

mod canvas;
mod fetch;
mod history;
mod logging;

use canvas::CanvasSurface;
use fetch::FetchTransport;
use history::BrowserHistory;

const SETTINGS_ELEMENT_ID: &str = "exbert-settings";
const HISTOGRAM_SIZE: (u32, u32) = (360, 160);

type Client = ApiClient<FetchTransport>;

/// Installs logging and mounts the app on `<body>`.
pub fn start() {
    logging::init();
    mount_to_body(|| view! { <App /> });
}

/// Settings come from an inline JSON `<script>` so one build can be pointed
/// at different backends.
fn load_settings() -> AppSettings {
    let text = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(SETTINGS_ELEMENT_ID))
        .and_then(|el| el.text_content());
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return AppSettings::default();
    };
    match AppSettings::from_json(&text) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring page settings");
            AppSettings::default()
        }
    }
}

async fn load_demo_table(settings: &AppSettings) -> Result<DemoTable, String> {
    let url = format!(
        "{}/{}",
        settings.demo_base.trim_end_matches('/'),
        settings.demo_table
    );
    let resp = FetchTransport
        .send(HttpRequest::get(url))
        .await
        .map_err(|e| e.to_string())?;
    if !resp.is_success() {
        return Err(format!("demo table: status {}", resp.status));
    }
    DemoTable::from_json(&resp.body).map_err(|e| e.to_string())
}

struct Views {
    ids: IdGenerator,
    graph: Option<VizComponent<AttentionGraph, CanvasSurface>>,
    heads: Vec<(Side, VizComponent<AttentionHeadBox, CanvasSurface>)>,
    tokens: Vec<(Side, VizComponent<TextTokens, CanvasSurface>)>,
    histograms: Vec<VizComponent<CorpusHistogram, CanvasSurface>>,
}

impl Views {
    fn new() -> Self {
        Self {
            ids: IdGenerator::new(),
            graph: None,
            heads: Vec::new(),
            tokens: Vec::new(),
            histograms: Vec::new(),
        }
    }

    fn is_attached(&self) -> bool {
        self.graph.is_some()
    }
}

/// Runs session commands against the client and the canvases.
#[derive(Clone, Copy)]
struct Host {
    session: StoredValue<Session<BrowserHistory>, LocalStorage>,
    views: StoredValue<Views, LocalStorage>,
    client: StoredValue<Rc<Client>, LocalStorage>,
    set_status: WriteSignal<Status>,
    set_revision: WriteSignal<u64>,
    histogram_host: NodeRef<html::Div>,
}

impl Host {
    fn handle(self, event: &AppEvent) {
        let mut cmds = Vec::new();
        self.session.update_value(|s| cmds = s.handle(event));
        self.run(cmds);
    }

    fn run(self, cmds: Vec<Command>) {
        for cmd in cmds {
            match cmd {
                Command::Redraw(view) => self.redraw(view),
                Command::FetchAttention { ticket, request } => {
                    let client = self.client.get_value();
                    spawn_local(async move {
                        let result = client.attend(&request).await;
                        let mut next = Vec::new();
                        self.session
                            .update_value(|s| next = s.apply_attention(ticket, result));
                        self.run(next);
                    });
                }
                Command::UpdateMask { ticket, request } => {
                    let client = self.client.get_value();
                    spawn_local(async move {
                        let result = client.update_mask(&request).await;
                        let mut next = Vec::new();
                        self.session
                            .update_value(|s| next = s.apply_attention(ticket, result));
                        self.run(next);
                    });
                }
                Command::Search { ticket, request } => {
                    let client = self.client.get_value();
                    spawn_local(async move {
                        let result = client.nearest(&request).await;
                        let mut next = Vec::new();
                        self.session
                            .update_value(|s| next = s.apply_search(ticket, result));
                        self.run(next);
                    });
                }
            }
        }
        self.set_status.set(self.session.with_value(|s| s.status()));
        self.set_revision.update(|r| *r += 1);
    }

    fn redraw(self, view: View) {
        match view {
            View::Graph => {
                let Some(input) = self.session.with_value(|s| s.graph_input()) else {
                    return;
                };
                self.views.update_value(|v| {
                    if let Some(graph) = &mut v.graph {
                        graph.update(input);
                    }
                });
            }
            View::HeadBoxes => self.views.update_value(|v| {
                for (side, head_box) in &mut v.heads {
                    if let Some(input) = self.session.with_value(|s| s.head_box_input(*side)) {
                        head_box.update(input);
                    }
                }
            }),
            View::Tokens => self.views.update_value(|v| {
                for (side, tokens) in &mut v.tokens {
                    if let Some(input) = self.session.with_value(|s| s.text_tokens_input(*side)) {
                        tokens.update(input);
                    }
                }
            }),
            View::Histograms => self.redraw_histograms(),
        }
    }

    /// The histogram list changes shape with the inspector settings, so the
    /// canvases are rebuilt each time.
    fn redraw_histograms(self) {
        let inputs = self.session.with_value(|s| s.histogram_inputs());
        let Some(parent) = self.histogram_host.get_untracked() else {
            return;
        };
        self.views.update_value(|v| {
            for mut h in v.histograms.drain(..) {
                h.destroy();
            }
            for input in inputs {
                let id = v.ids.next_id("histogram");
                let surface = match CanvasSurface::create_in(
                    &parent,
                    &id,
                    HISTOGRAM_SIZE.0,
                    HISTOGRAM_SIZE.1,
                ) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(error = %e, "histogram canvas");
                        return;
                    }
                };
                let mut component = VizComponent::new(CorpusHistogram::new(), surface, &v.ids);
                component.update(input);
                v.histograms.push(component);
            }
        });
    }

    fn set_head_boxes_visible(self, visible: bool) {
        self.views.update_value(|v| {
            for (_, head_box) in &mut v.heads {
                if visible {
                    head_box.unhide_view();
                    if head_box.is_stale() {
                        head_box.refresh();
                    }
                } else {
                    head_box.hide_view();
                }
            }
        });
    }
}

#[component]
fn App() -> impl IntoView {
    let settings = load_settings();
    let config = ConfigStore::from_query(
        &history::current_query(),
        &settings.view_defaults(),
        BrowserHistory,
    );
    let n_layers = settings.n_layers;
    let demo = settings.demo_enabled.then(|| settings.clone());
    let client = Rc::new(ApiClient::new(FetchTransport, settings.api_base.clone()));

    let session = StoredValue::new_local(Session::new(settings, config));
    let views = StoredValue::new_local(Views::new());
    let client = StoredValue::new_local(client);
    let (status, set_status) = signal(Status::Idle);
    let (revision, set_revision) = signal(0u64);
    let (show_heads, set_show_heads) = signal(true);

    let graph_ref = NodeRef::<html::Canvas>::new();
    let heads_left_ref = NodeRef::<html::Canvas>::new();
    let heads_right_ref = NodeRef::<html::Canvas>::new();
    let tokens_left_ref = NodeRef::<html::Canvas>::new();
    let tokens_right_ref = NodeRef::<html::Canvas>::new();
    let histogram_host = NodeRef::<html::Div>::new();

    let host = Host {
        session,
        views,
        client,
        set_status,
        set_revision,
        histogram_host,
    };

    let bus = StoredValue::new_local(EventBus::<AppEvent>::new());
    bus.update_value(|b| {
        for name in EventName::ALL {
            b.subscribe(name, move |ev| host.handle(ev));
        }
    });
    let emit = move |ev: AppEvent| bus.update_value(|b| b.emit(&ev));

    // Reads of session state inside the view re-run whenever commands ran.
    let config_read = move |f: fn(&Session<BrowserHistory>) -> String| {
        revision.get();
        session.with_value(f)
    };

    Effect::new(move |_| {
        let (Some(g), Some(hl), Some(hr), Some(tl), Some(tr)) = (
            graph_ref.get(),
            heads_left_ref.get(),
            heads_right_ref.get(),
            tokens_left_ref.get(),
            tokens_right_ref.get(),
        ) else {
            return;
        };
        if views.with_value(Views::is_attached) {
            return;
        }

        let attached = (|| -> Result<(), String> {
            let graph = CanvasSurface::new(g)?;
            let heads = [(Side::Left, CanvasSurface::new(hl)?), (Side::Right, CanvasSurface::new(hr)?)];
            let tokens = [(Side::Left, CanvasSurface::new(tl)?), (Side::Right, CanvasSurface::new(tr)?)];
            views.update_value(|v| {
                v.graph = Some(VizComponent::new(AttentionGraph::new(), graph, &v.ids));
                for (side, surface) in heads {
                    let c = VizComponent::new(AttentionHeadBox::new(), surface, &v.ids);
                    v.heads.push((side, c));
                }
                for (side, surface) in tokens {
                    let c = VizComponent::new(TextTokens::new(), surface, &v.ids);
                    v.tokens.push((side, c));
                }
            });
            Ok(())
        })();
        if let Err(e) = attached {
            tracing::error!(error = %e, "attaching canvases");
            set_status.set(Status::Failed { message: e, busy: false });
            return;
        }

        match demo.clone() {
            Some(demo) => spawn_local(async move {
                match load_demo_table(&demo).await {
                    Ok(table) => {
                        tracing::info!(entries = table.len(), "demo table loaded");
                        let c = ApiClient::new(FetchTransport, demo.api_base.clone())
                            .with_demo(demo.demo_base.clone(), table);
                        client.set_value(Rc::new(c));
                    }
                    Err(e) => tracing::warn!(error = %e, "demo table unavailable"),
                }
                let mut cmds = Vec::new();
                session.update_value(|s| cmds = s.start());
                host.run(cmds);
            }),
            None => {
                let mut cmds = Vec::new();
                session.update_value(|s| cmds = s.start());
                host.run(cmds);
            }
        }
    });

    let on_graph_click = move |ev: MouseEvent| {
        let p = Point::new(ev.offset_x() as f64, ev.offset_y() as f64);
        let hit = views.with_value(|v| v.graph.as_ref().and_then(|g| g.widget().token_at(p)));
        if let Some(sel) = hit {
            emit(AppEvent::TokenClicked(sel));
        }
    };

    let on_heads_click = move |side: Side, ev: MouseEvent| {
        let (x, y) = (ev.offset_x() as f64, ev.offset_y() as f64);
        let hit = views.with_value(|v| {
            v.heads
                .iter()
                .find(|(s, _)| *s == side)
                .and_then(|(_, c)| c.widget().head_at(x, y))
        });
        if let Some(head) = hit {
            emit(AppEvent::HeadClicked { head });
        }
    };

    let on_tokens_click = move |side: Side, ev: MouseEvent| {
        let p = Point::new(ev.offset_x() as f64, ev.offset_y() as f64);
        let hit = views.with_value(|v| {
            v.tokens
                .iter()
                .find(|(s, _)| *s == side)
                .and_then(|(_, c)| c.widget().token_at(p))
        });
        match hit {
            Some(sel) if ev.shift_key() => emit(AppEvent::TokenMaskToggled(sel)),
            Some(sel) => emit(AppEvent::TokenClicked(sel)),
            None => {}
        }
    };

    let search = move |kind: NearestKind| emit(AppEvent::SearchRequested { kind });

    let (sentence, set_sentence) = signal(session.with_value(|s| s.config().sentence().to_string()));

    view! {
        <main style=move || {
            let cursor = if status.get().is_busy() { "progress" } else { "default" };
            format!("font-family: system-ui, -apple-system, Segoe UI, Roboto, sans-serif; padding: 18px; cursor: {cursor};")
        }>
            <h1 style="margin: 0 0 8px 0;">"exbert"</h1>

            {move || match status.get() {
                Status::Failed { message, .. } => Some(view! {
                    <div style="display: flex; gap: 10px; align-items: center; padding: 8px 12px; margin-bottom: 12px; background: #4a1f24; color: #ffd7d7; border-radius: 6px;">
                        <span>{message}</span>
                        <button on:click=move |_| emit(AppEvent::RetryRequested)>"Retry"</button>
                    </div>
                }),
                _ => None,
            }}

            <form
                style="display: flex; gap: 8px; margin-bottom: 12px;"
                on:submit=move |ev| {
                    ev.prevent_default();
                    emit(AppEvent::SentenceSubmitted { sentence: sentence.get_untracked() });
                }
            >
                <input
                    type="text"
                    style="flex: 1;"
                    prop:value=move || sentence.get()
                    on:input=move |ev| set_sentence.set(event_target_value(&ev))
                />
                <button type="submit">"Analyze"</button>
            </form>

            <section style="display: flex; gap: 14px; flex-wrap: wrap; align-items: center; margin-bottom: 12px;">
                <label style="display: flex; gap: 6px; align-items: center;">
                    <span>"Layer"</span>
                    <select
                        prop:value=move || config_read(|s| s.config().layer().to_string())
                        on:change=move |ev| {
                            if let Ok(layer) = event_target_value(&ev).parse::<u32>() {
                                emit(AppEvent::LayerChanged { layer });
                            }
                        }
                    >
                        {(0..n_layers)
                            .map(|l| view! { <option value=l.to_string()>{l.to_string()}</option> })
                            .collect_view()}
                    </select>
                </label>

                <label style="display: flex; gap: 6px; align-items: center;">
                    <span>"Threshold"</span>
                    <input
                        type="range"
                        min="0"
                        max="1"
                        step="0.01"
                        prop:value=move || config_read(|s| fmt_f32_fixed(s.config().threshold(), 2))
                        on:change=move |ev| {
                            if let Ok(t) = event_target_value(&ev).parse::<f32>() {
                                emit(AppEvent::ThresholdChanged { threshold: t.clamp(0.0, 1.0) });
                            }
                        }
                    />
                    <span style="min-width: 36px;">
                        {move || config_read(|s| fmt_f32_fixed(s.config().threshold(), 2))}
                    </span>
                </label>

                <label style="display: flex; gap: 6px; align-items: center;">
                    <input
                        type="checkbox"
                        prop:checked=move || { revision.get(); session.with_value(|s| s.config().hide_special()) }
                        on:change=move |ev| emit(AppEvent::ZeroedToggled { zeroed: event_target_checked(&ev) })
                    />
                    <span>"Hide special tokens"</span>
                </label>

                <button on:click=move |_| emit(AppEvent::AllHeadsSelected)>"All heads"</button>
                <button on:click=move |_| emit(AppEvent::NoHeadsSelected)>"No heads"</button>

                <label style="display: flex; gap: 6px; align-items: center;">
                    <input
                        type="checkbox"
                        prop:checked=move || show_heads.get()
                        on:change=move |ev| {
                            let visible = event_target_checked(&ev);
                            set_show_heads.set(visible);
                            host.set_head_boxes_visible(visible);
                        }
                    />
                    <span>"Head summaries"</span>
                </label>
            </section>

            <section style="display: flex; gap: 6px; align-items: flex-start;">
                <canvas node_ref=tokens_left_ref width="110" height="560"
                    on:click=move |ev| on_tokens_click(Side::Left, ev)></canvas>
                <canvas node_ref=heads_left_ref width="220" height="560"
                    on:click=move |ev| on_heads_click(Side::Left, ev)></canvas>
                <canvas node_ref=graph_ref width="460" height="560"
                    on:click=on_graph_click></canvas>
                <canvas node_ref=heads_right_ref width="220" height="560"
                    on:click=move |ev| on_heads_click(Side::Right, ev)></canvas>
                <canvas node_ref=tokens_right_ref width="110" height="560"
                    on:click=move |ev| on_tokens_click(Side::Right, ev)></canvas>
            </section>
            <p style="margin: 6px 0 16px 0; color: #777; font-size: 0.9em;">
                "Click a token to focus it, shift-click to mask it. Click a head column to toggle it."
            </p>

            <section style="display: flex; gap: 14px; flex-wrap: wrap; align-items: center; margin-bottom: 12px;">
                <label style="display: flex; gap: 6px; align-items: center;">
                    <span>"Match"</span>
                    <MetaSelect
                        current=move || { revision.get(); session.with_value(|s| s.config().meta_match()) }
                        on_pick=move |f| emit(AppEvent::MetaMatchChanged(f))
                    />
                </label>
                <label style="display: flex; gap: 6px; align-items: center;">
                    <span>"Max attention"</span>
                    <MetaSelect
                        current=move || { revision.get(); session.with_value(|s| s.config().meta_max()) }
                        on_pick=move |f| emit(AppEvent::MetaMaxChanged(f))
                    />
                </label>
                <label style="display: flex; gap: 6px; align-items: center;">
                    <span>"Show"</span>
                    <select
                        prop:value=move || config_read(|s| s.config().inspector_mode().as_str().to_string())
                        on:change=move |ev| {
                            if let Some(mode) = InspectorMode::parse(&event_target_value(&ev)) {
                                emit(AppEvent::InspectorModeChanged(mode));
                            }
                        }
                    >
                        <option value=InspectorMode::Context.as_str()>"context"</option>
                        <option value=InspectorMode::Embeddings.as_str()>"embeddings"</option>
                    </select>
                </label>
                <label style="display: flex; gap: 6px; align-items: center;">
                    <span>"Offsets"</span>
                    <input
                        type="text"
                        style="width: 90px;"
                        prop:value=move || config_read(|s| {
                            s.config()
                                .offset_window()
                                .iter()
                                .map(|o| o.to_string())
                                .collect::<Vec<_>>()
                                .join(",")
                        })
                        on:change=move |ev| {
                            let parsed: Result<Vec<i32>, _> = event_target_value(&ev)
                                .split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(str::parse::<i32>)
                                .collect();
                            match parsed {
                                Ok(offsets) => emit(AppEvent::OffsetWindowChanged { offsets }),
                                Err(e) => tracing::warn!(error = %e, "ignoring offset window"),
                            }
                        }
                    />
                </label>
                <button on:click=move |_| search(NearestKind::Embeddings)>"Search embeddings"</button>
                <button on:click=move |_| search(NearestKind::Contexts)>"Search contexts"</button>
            </section>

            <div node_ref=histogram_host style="display: flex; gap: 10px; flex-wrap: wrap;"></div>
        </main>
    }
}

#[component]
fn MetaSelect(
    current: impl Fn() -> MetaField + Send + Sync + 'static,
    on_pick: impl Fn(MetaField) + 'static,
) -> impl IntoView {
    view! {
        <select
            prop:value=move || current().as_str()
            on:change=move |ev| {
                if let Some(f) = MetaField::parse(&event_target_value(&ev)) {
                    on_pick(f);
                }
            }
        >
            {MetaField::all()
                .iter()
                .map(|f| view! { <option value=f.as_str()>{f.as_str()}</option> })
                .collect_view()}
        </select>
    }
}
