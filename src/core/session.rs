//! Event → state → command orchestration for one page.
//!
//! [`Session`] owns everything the views derive from: the URL-backed
//! [`ConfigStore`], the current [`AttentionModel`] and its token metadata, and
//! the last search results. It never performs I/O. [`Session::handle`] turns an
//! [`AppEvent`] into store mutations plus a list of [`Command`]s; the host runs
//! the fetches and feeds results back through [`Session::apply_attention`] and
//! [`Session::apply_search`], which drop anything but the newest ticket.

use tracing::{debug, error, info, warn};

use crate::api::{
    ApiError, AttendRequest, AttentionResponse, MaskRequest, NearestKind, NearestRequest,
    RequestGeneration, Ticket,
};
use crate::attention::AttentionModel;
use crate::config::{ConfigStore, HeadToggle, HistorySink, InspectorMode, Side, TokenSelection};
use crate::events::AppEvent;
use crate::search::{count_matched, count_max_att, offset_histograms, SearchHit};
use crate::settings::AppSettings;
use crate::tokens::{texts, TokenMeta};
use crate::widgets::{GraphInput, HeadBoxInput, HistogramInput, TextTokensInput};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Loading,
    /// `busy` is set while another fetch is still in flight.
    Failed { message: String, busy: bool },
}

impl Status {
    pub fn is_busy(&self) -> bool {
        matches!(self, Status::Loading | Status::Failed { busy: true, .. })
    }
}

/// Which view a [`Command::Redraw`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Graph,
    HeadBoxes,
    Tokens,
    Histograms,
}

impl View {
    pub const ALL: [View; 4] = [View::Graph, View::HeadBoxes, View::Tokens, View::Histograms];
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    FetchAttention { ticket: Ticket, request: AttendRequest },
    UpdateMask { ticket: Ticket, request: MaskRequest },
    Search { ticket: Ticket, request: NearestRequest },
    Redraw(View),
}

/// A fetch without its ticket, kept so a failure can be retried verbatim.
#[derive(Debug, Clone, PartialEq)]
enum Fetch {
    Attend(AttendRequest),
    Mask(MaskRequest),
    Search(NearestRequest),
}

impl Fetch {
    fn is_search(&self) -> bool {
        matches!(self, Fetch::Search(_))
    }
}

fn redraw(views: &[View]) -> Vec<Command> {
    views.iter().copied().map(Command::Redraw).collect()
}

pub struct Session<H: HistorySink> {
    settings: AppSettings,
    config: ConfigStore<H>,
    model: Option<AttentionModel>,
    left: Vec<TokenMeta>,
    right: Vec<TokenMeta>,
    attention_gen: RequestGeneration,
    search_gen: RequestGeneration,
    attention_pending: bool,
    search_pending: bool,
    last_attention: Option<Fetch>,
    last_search: Option<Fetch>,
    failure: Option<(String, Fetch)>,
    hits: Vec<SearchHit>,
}

impl<H: HistorySink> Session<H> {
    pub fn new(settings: AppSettings, config: ConfigStore<H>) -> Self {
        Self {
            settings,
            config,
            model: None,
            left: Vec::new(),
            right: Vec::new(),
            attention_gen: RequestGeneration::default(),
            search_gen: RequestGeneration::default(),
            attention_pending: false,
            search_pending: false,
            last_attention: None,
            last_search: None,
            failure: None,
            hits: Vec::new(),
        }
    }

    /// Initial fetch for whatever the URL describes.
    pub fn start(&mut self) -> Vec<Command> {
        vec![self.attention_command()]
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn config(&self) -> &ConfigStore<H> {
        &self.config
    }

    pub fn model(&self) -> Option<&AttentionModel> {
        self.model.as_ref()
    }

    pub fn tokens(&self, side: Side) -> &[TokenMeta] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn status(&self) -> Status {
        let busy = self.attention_pending || self.search_pending;
        match &self.failure {
            Some((message, _)) => Status::Failed {
                message: message.clone(),
                busy,
            },
            None if busy => Status::Loading,
            None => Status::Idle,
        }
    }

    pub fn handle(&mut self, event: &AppEvent) -> Vec<Command> {
        match event {
            AppEvent::TokenClicked(sel) => {
                self.config.toggle_token(*sel);
                redraw(&[View::Graph, View::Tokens])
            }
            AppEvent::TokenMaskToggled(sel) => {
                self.config.toggle_mask(sel.index);
                if self.model.is_none() {
                    return redraw(&[View::Tokens]);
                }
                vec![self.attention_command(), Command::Redraw(View::Tokens)]
            }
            AppEvent::HeadClicked { head } => match self.config.toggle_head(*head) {
                HeadToggle::OutOfRange => {
                    debug!(head, n_heads = self.config.n_heads(), "ignoring click on missing head");
                    Vec::new()
                }
                HeadToggle::Added | HeadToggle::Removed => redraw(&[View::Graph, View::HeadBoxes]),
            },
            AppEvent::AllHeadsSelected => {
                self.config.select_all_heads();
                redraw(&[View::Graph, View::HeadBoxes])
            }
            AppEvent::NoHeadsSelected => {
                self.config.select_no_heads();
                redraw(&[View::Graph, View::HeadBoxes])
            }
            AppEvent::LayerChanged { layer } => {
                self.config.set_layer(*layer);
                vec![self.attention_command()]
            }
            AppEvent::ThresholdChanged { threshold } => {
                self.config.set_threshold(*threshold);
                redraw(&[View::Graph])
            }
            AppEvent::SentenceSubmitted { sentence } => {
                self.config.begin_sentence(sentence.clone());
                vec![self.attention_command()]
            }
            AppEvent::ZeroedToggled { zeroed } => {
                self.config.set_hide_special(*zeroed);
                if let Some(model) = &mut self.model {
                    model.set_zeroed(*zeroed);
                }
                redraw(&[View::Graph, View::HeadBoxes])
            }
            AppEvent::MetaMatchChanged(field) => {
                self.config.set_meta_match(*field);
                redraw(&[View::Histograms])
            }
            AppEvent::MetaMaxChanged(field) => {
                self.config.set_meta_max(*field);
                redraw(&[View::Histograms])
            }
            AppEvent::InspectorModeChanged(mode) => {
                self.config.set_inspector_mode(*mode);
                redraw(&[View::Histograms])
            }
            AppEvent::OffsetWindowChanged { offsets } => {
                self.config.set_offset_window(offsets.clone());
                redraw(&[View::Histograms])
            }
            AppEvent::SearchRequested { kind } => self.search_command(*kind),
            AppEvent::RetryRequested => match self.failure.take() {
                Some((message, fetch)) => {
                    info!(%message, "retrying failed request");
                    vec![self.dispatch(fetch)]
                }
                None => Vec::new(),
            },
        }
    }

    /// Attention for the current sentence and layer; a mask update when any
    /// token is masked and the tokens are known.
    fn attention_command(&mut self) -> Command {
        let sentence = self.config.sentence().to_string();
        let fetch = if !self.config.mask_inds().is_empty() && !self.left.is_empty() {
            let mask = self.config.mask_inds();
            Fetch::Mask(MaskRequest::new(
                (texts(&self.left), texts(&self.right)),
                (sentence.clone(), sentence),
                (mask, mask),
                self.config.layer(),
            ))
        } else {
            Fetch::Attend(AttendRequest {
                sentence_a: sentence,
                sentence_b: String::new(),
                layer: self.config.layer(),
            })
        };
        self.dispatch(fetch)
    }

    fn search_command(&mut self, kind: NearestKind) -> Vec<Command> {
        let Some(TokenSelection { side, index }) = self.config.token() else {
            warn!(?kind, "search requested without a selected token");
            return Vec::new();
        };
        let Some(token) = self.tokens(side).get(index) else {
            warn!(index, side = side.as_str(), "search token outside sentence");
            return Vec::new();
        };
        let vector = match kind {
            NearestKind::Embeddings => token.embeddings.clone(),
            NearestKind::Contexts => token.contexts.clone(),
        };
        if vector.is_empty() {
            warn!(index, ?kind, "selected token has no vector to search with");
            return Vec::new();
        }
        let fetch = Fetch::Search(NearestRequest::new(
            kind,
            vector,
            self.config.layer(),
            self.config.heads(),
            self.settings.search_k,
        ));
        vec![self.dispatch(fetch)]
    }

    fn dispatch(&mut self, fetch: Fetch) -> Command {
        // A new fetch on the same channel supersedes whatever failed there.
        if self
            .failure
            .as_ref()
            .is_some_and(|(_, f)| f.is_search() == fetch.is_search())
        {
            self.failure = None;
        }
        if fetch.is_search() {
            self.search_pending = true;
            self.last_search = Some(fetch.clone());
        } else {
            self.attention_pending = true;
            self.last_attention = Some(fetch.clone());
        }
        match fetch {
            Fetch::Attend(request) => Command::FetchAttention {
                ticket: self.attention_gen.begin(),
                request,
            },
            Fetch::Mask(request) => Command::UpdateMask {
                ticket: self.attention_gen.begin(),
                request,
            },
            Fetch::Search(request) => Command::Search {
                ticket: self.search_gen.begin(),
                request,
            },
        }
    }

    /// Applies an attention or mask-update response.
    pub fn apply_attention(
        &mut self,
        ticket: Ticket,
        result: Result<AttentionResponse, ApiError>,
    ) -> Vec<Command> {
        if !self.attention_gen.is_current(ticket) {
            debug!(?ticket, "discarding stale attention response");
            return Vec::new();
        }
        self.attention_pending = false;
        match result {
            Ok(resp) => {
                let model = AttentionModel::from_response(
                    &resp,
                    &self.settings.special_tokens,
                    self.config.hide_special(),
                );
                self.config.set_n_heads(model.n_heads());
                if let Some(sel) = self.config.token() {
                    let len = match sel.side {
                        Side::Left => resp.left.len(),
                        Side::Right => resp.right.len(),
                    };
                    if sel.index >= len {
                        self.config.set_token(None);
                    }
                }
                self.left = resp.left;
                self.right = resp.right;
                self.model = Some(model);
                redraw(&View::ALL)
            }
            Err(e) => {
                error!(error = %e, "attention request failed");
                if let Some(fetch) = self.last_attention.clone() {
                    self.failure = Some((e.to_string(), fetch));
                }
                Vec::new()
            }
        }
    }

    pub fn apply_search(
        &mut self,
        ticket: Ticket,
        result: Result<Vec<SearchHit>, ApiError>,
    ) -> Vec<Command> {
        if !self.search_gen.is_current(ticket) {
            debug!(?ticket, "discarding stale search response");
            return Vec::new();
        }
        self.search_pending = false;
        match result {
            Ok(hits) => {
                info!(hits = hits.len(), "search results");
                self.hits = hits;
                redraw(&[View::Histograms])
            }
            Err(e) => {
                error!(error = %e, "search request failed");
                if let Some(fetch) = self.last_search.clone() {
                    self.failure = Some((e.to_string(), fetch));
                }
                Vec::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // View inputs
    // -----------------------------------------------------------------------

    pub fn graph_input(&self) -> Option<GraphInput> {
        let model = self.model.as_ref()?;
        Some(GraphInput {
            matrix: model.by_heads(&self.config.heads()),
            left: texts(&self.left),
            right: texts(&self.right),
            threshold: self.config.threshold(),
            scale: self.settings.scale_mode,
            selected: self.config.token(),
        })
    }

    pub fn head_box_input(&self, side: Side) -> Option<HeadBoxInput> {
        let model = self.model.as_ref()?;
        Some(HeadBoxInput {
            heads: (0..model.n_heads()).map(|h| model.by_head(h).clone()).collect(),
            side,
            selected: self.config.heads(),
        })
    }

    pub fn text_tokens_input(&self, side: Side) -> Option<TextTokensInput> {
        if self.model.is_none() {
            return None;
        }
        Some(TextTokensInput {
            side,
            tokens: texts(self.tokens(side)),
            masked: self.config.mask_inds().to_vec(),
            selected: self
                .config
                .token()
                .filter(|t| t.side == side)
                .map(|t| t.index),
        })
    }

    /// Matched-token histogram, the max-attention histogram in context mode,
    /// then one histogram per offset in the window.
    pub fn histogram_inputs(&self) -> Vec<HistogramInput> {
        if self.hits.is_empty() {
            return Vec::new();
        }
        let matched = self.config.meta_match();
        let mut out = vec![HistogramInput {
            title: format!("matched {}", matched.as_str()),
            histogram: count_matched(&self.hits, matched),
        }];
        if self.config.inspector_mode() == InspectorMode::Context {
            let max = self.config.meta_max();
            out.push(HistogramInput {
                title: format!("max attention {}", max.as_str()),
                histogram: count_max_att(&self.hits, max),
            });
        }
        out.extend(
            offset_histograms(&self.hits, matched, self.config.offset_window())
                .into_iter()
                .filter(|(offset, _)| *offset != 0)
                .map(|(offset, histogram)| HistogramInput {
                    title: format!("offset {offset} {}", matched.as_str()),
                    histogram,
                }),
        );
        out
    }
}
