//! Core of the exbert attention explorer: attention data model, edge
//! thresholding, widget lifecycle, URL-backed view configuration and the
//! backend client. Everything here runs on the host; the browser shell lives
//! in `crates/exbert_web`.

#[path = "core/api.rs"]
pub mod api;

#[path = "core/attention.rs"]
pub mod attention;

#[path = "core/component.rs"]
pub mod component;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/edges.rs"]
pub mod edges;

#[path = "core/events.rs"]
pub mod events;

#[path = "core/float_fmt.rs"]
pub mod float_fmt;

#[path = "core/search.rs"]
pub mod search;

#[path = "core/session.rs"]
pub mod session;

#[path = "core/settings.rs"]
pub mod settings;

#[path = "core/tokens.rs"]
pub mod tokens;

#[path = "core/widgets/mod.rs"]
pub mod widgets;
