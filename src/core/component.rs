//! The update → wrangle → render lifecycle shared by every visual widget.
//!
//! A widget only supplies [`Widget::wrangle`] (pure) and [`Widget::render`]
//! (the one place that touches visible elements). [`VizComponent`] owns the
//! mount point and drives the lifecycle generically over that pair.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.w && p.y >= self.y && p.y < self.y + self.h
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// CSS `rgba(...)` string.
    pub fn css(&self) -> String {
        format!(
            "rgba({}, {}, {}, {})",
            self.r,
            self.g,
            self.b,
            crate::float_fmt::fmt_f32_fixed(self.a, 3)
        )
    }
}

/// A widget's mount point: something that can be hidden and torn down.
pub trait Mount {
    fn set_hidden(&mut self, hidden: bool);
    fn detach(&mut self);
}

/// 2D drawing target. The browser implementation wraps a canvas context.
pub trait Surface: Mount {
    fn size(&self) -> (f64, f64);
    fn clear(&mut self, color: Rgba);
    fn line(&mut self, from: Point, to: Point, width: f64, color: Rgba);
    fn fill_rect(&mut self, rect: Rect, color: Rgba);
    fn stroke_rect(&mut self, rect: Rect, width: f64, color: Rgba);
    fn text(&mut self, at: Point, text: &str, color: Rgba);
}

pub trait Widget<M: Mount> {
    type Input;
    type RenderData;

    /// Pure, deterministic transformation of raw input into render data.
    fn wrangle(&self, input: &Self::Input) -> Self::RenderData;

    /// Draws `data`; calling it twice with the same data changes nothing.
    fn render(&mut self, mount: &mut M, data: &Self::RenderData);
}

pub struct VizComponent<W: Widget<M>, M: Mount> {
    widget: W,
    mount: M,
    id: String,
    input: Option<W::Input>,
    render_data: Option<W::RenderData>,
    hidden: bool,
    stale: bool,
    destroyed: bool,
}

impl<W: Widget<M>, M: Mount> VizComponent<W, M> {
    pub fn new(widget: W, mount: M, ids: &IdGenerator) -> Self {
        Self {
            widget,
            mount,
            id: ids.next_id("viz"),
            input: None,
            render_data: None,
            hidden: false,
            stale: false,
            destroyed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stores `input`; unless hidden, wrangles and renders it.
    pub fn update(&mut self, input: W::Input) {
        if self.destroyed {
            return;
        }
        self.input = Some(input);
        if self.hidden {
            self.stale = true;
            return;
        }
        self.refresh();
    }

    /// Re-wrangles the stored input; the explicit follow-up to [`Self::unhide_view`].
    pub fn refresh(&mut self) {
        if self.destroyed || self.hidden {
            return;
        }
        let Some(input) = &self.input else {
            return;
        };
        let data = self.widget.wrangle(input);
        self.widget.render(&mut self.mount, &data);
        self.render_data = Some(data);
        self.stale = false;
    }

    /// Renders the last render data again without re-wrangling.
    pub fn redraw(&mut self) {
        if self.destroyed || self.hidden {
            return;
        }
        if let Some(data) = &self.render_data {
            self.widget.render(&mut self.mount, data);
        }
    }

    pub fn hide_view(&mut self) {
        self.hidden = true;
        self.mount.set_hidden(true);
    }

    /// Shows the mount again without rendering. If [`Self::update`] ran while
    /// hidden, [`Self::is_stale`] reports it and the caller decides when to
    /// [`Self::refresh`].
    pub fn unhide_view(&mut self) {
        self.hidden = false;
        self.mount.set_hidden(false);
    }

    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.mount.detach();
        self.destroyed = true;
        self.render_data = None;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn input(&self) -> Option<&W::Input> {
        self.input.as_ref()
    }

    pub fn render_data(&self) -> Option<&W::RenderData> {
        self.render_data.as_ref()
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn mount(&self) -> &M {
        &self.mount
    }
}

/// Element id source handed to widgets at construction. Clones share a counter.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: Rc<Cell<u64>>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, prefix: &str) -> String {
        let n = self.next.get();
        self.next.set(n + 1);
        format!("{prefix}-{n}")
    }
}

/// Records draw calls; lets widget tests run without a browser.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordingSurface {
    pub width: f64,
    pub height: f64,
    pub ops: Vec<DrawOp>,
    pub hidden: bool,
    pub detached: bool,
    pub frames: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Line {
        from: Point,
        to: Point,
        width: f64,
        color: Rgba,
    },
    Fill(Rect, Rgba),
    Stroke(Rect, Rgba),
    Text(Point, String),
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn lines(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Line { .. }))
            .count()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text(_, t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Mount for RecordingSurface {
    fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    fn detach(&mut self) {
        self.detached = true;
        self.ops.clear();
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn clear(&mut self, _color: Rgba) {
        self.ops.clear();
        self.frames += 1;
    }

    fn line(&mut self, from: Point, to: Point, width: f64, color: Rgba) {
        self.ops.push(DrawOp::Line {
            from,
            to,
            width,
            color,
        });
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.ops.push(DrawOp::Fill(rect, color));
    }

    fn stroke_rect(&mut self, rect: Rect, _width: f64, color: Rgba) {
        self.ops.push(DrawOp::Stroke(rect, color));
    }

    fn text(&mut self, at: Point, text: &str, _color: Rgba) {
        self.ops.push(DrawOp::Text(at, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Doubles every value and draws one line per value.
    #[derive(Default)]
    struct Doubler {
        wrangles: Cell<usize>,
        renders: usize,
    }

    impl Widget<RecordingSurface> for Doubler {
        type Input = Vec<f64>;
        type RenderData = Vec<f64>;

        fn wrangle(&self, input: &Vec<f64>) -> Vec<f64> {
            self.wrangles.set(self.wrangles.get() + 1);
            input.iter().map(|v| v * 2.0).collect()
        }

        fn render(&mut self, mount: &mut RecordingSurface, data: &Vec<f64>) {
            self.renders += 1;
            mount.clear(Rgba::rgb(0, 0, 0));
            for v in data {
                mount.line(Point::new(0.0, 0.0), Point::new(*v, 0.0), 1.0, Rgba::rgb(1, 1, 1));
            }
        }
    }

    fn component() -> VizComponent<Doubler, RecordingSurface> {
        VizComponent::new(Doubler::default(), RecordingSurface::new(10.0, 10.0), &IdGenerator::new())
    }

    #[test]
    fn update_wrangles_then_renders() {
        let mut c = component();
        c.update(vec![1.0, 2.0]);
        assert_eq!(c.render_data(), Some(&vec![2.0, 4.0]));
        assert_eq!(c.mount().lines(), 2);
        assert_eq!(c.widget().renders, 1);
    }

    #[test]
    fn hidden_component_skips_work_until_refreshed() {
        let mut c = component();
        c.hide_view();
        c.update(vec![3.0]);
        assert_eq!(c.widget().wrangles.get(), 0);
        assert!(c.render_data().is_none());
        assert!(c.mount().hidden);

        c.unhide_view();
        assert!(!c.mount().hidden);
        assert_eq!(c.widget().renders, 0, "unhiding does not render by itself");
        assert!(c.is_stale());

        c.refresh();
        assert!(!c.is_stale());
        assert_eq!(c.render_data(), Some(&vec![6.0]));
    }

    #[test]
    fn redraw_reuses_render_data_and_is_idempotent() {
        let mut c = component();
        c.update(vec![1.0]);
        let before = c.mount().ops.clone();
        c.redraw();
        c.redraw();
        assert_eq!(c.widget().wrangles.get(), 1);
        assert_eq!(c.widget().renders, 3);
        assert_eq!(c.mount().ops, before);
    }

    #[test]
    fn destroy_detaches_and_ignores_later_updates() {
        let mut c = component();
        c.update(vec![1.0]);
        c.destroy();
        assert!(c.mount().detached);
        c.update(vec![5.0]);
        c.redraw();
        assert_eq!(c.widget().renders, 1);
    }

    #[test]
    fn ids_are_unique_across_shared_generators() {
        let ids = IdGenerator::new();
        let other = ids.clone();
        assert_eq!(ids.next_id("a"), "a-0");
        assert_eq!(other.next_id("b"), "b-1");
        let fresh = IdGenerator::new();
        assert_eq!(fresh.next_id("a"), "a-0");
    }
}
