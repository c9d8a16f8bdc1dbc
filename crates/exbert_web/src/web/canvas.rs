use exbert::component::{Mount, Point, Rect, Rgba, Surface};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

/// A 2d canvas as a widget mount point.
pub(super) struct CanvasSurface {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    /// Created by us (and removed on detach) rather than declared in the view.
    owned: bool,
}

fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, String> {
    canvas
        .get_context("2d")
        .map_err(|_| "canvas: get_context threw".to_string())?
        .ok_or("canvas: missing 2d context".to_string())?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| "canvas: context is not 2d".to_string())
}

impl CanvasSurface {
    pub(super) fn new(canvas: HtmlCanvasElement) -> Result<Self, String> {
        let ctx = context_2d(&canvas)?;
        Ok(Self {
            canvas,
            ctx,
            owned: false,
        })
    }

    /// Creates a canvas with `id` and appends it to `parent`.
    pub(super) fn create_in(
        parent: &web_sys::Element,
        id: &str,
        width: u32,
        height: u32,
    ) -> Result<Self, String> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or("no document".to_string())?;
        let canvas = document
            .create_element("canvas")
            .map_err(|_| "document: create_element failed".to_string())?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| "document: canvas cast failed".to_string())?;
        canvas.set_id(id);
        canvas.set_width(width);
        canvas.set_height(height);
        parent
            .append_child(&canvas)
            .map_err(|_| "append_child failed".to_string())?;
        let mut surface = Self::new(canvas)?;
        surface.owned = true;
        Ok(surface)
    }

    fn css(color: Rgba) -> JsValue {
        JsValue::from_str(&color.css())
    }
}

impl Mount for CanvasSurface {
    fn set_hidden(&mut self, hidden: bool) {
        let style = self.canvas.style();
        let _ = style.set_property("display", if hidden { "none" } else { "block" });
    }

    fn detach(&mut self) {
        self.ctx
            .clear_rect(0.0, 0.0, self.canvas.width() as f64, self.canvas.height() as f64);
        if self.owned {
            self.canvas.remove();
        }
    }
}

#[allow(deprecated)]
impl Surface for CanvasSurface {
    fn size(&self) -> (f64, f64) {
        (self.canvas.width() as f64, self.canvas.height() as f64)
    }

    fn clear(&mut self, color: Rgba) {
        let (w, h) = self.size();
        self.ctx.set_fill_style(&Self::css(color));
        self.ctx.fill_rect(0.0, 0.0, w, h);
    }

    fn line(&mut self, from: Point, to: Point, width: f64, color: Rgba) {
        self.ctx.set_stroke_style(&Self::css(color));
        self.ctx.set_line_width(width);
        self.ctx.begin_path();
        self.ctx.move_to(from.x, from.y);
        self.ctx.line_to(to.x, to.y);
        self.ctx.stroke();
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.ctx.set_fill_style(&Self::css(color));
        self.ctx.fill_rect(rect.x, rect.y, rect.w, rect.h);
    }

    fn stroke_rect(&mut self, rect: Rect, width: f64, color: Rgba) {
        self.ctx.set_stroke_style(&Self::css(color));
        self.ctx.set_line_width(width);
        self.ctx.stroke_rect(rect.x, rect.y, rect.w, rect.h);
    }

    fn text(&mut self, at: Point, text: &str, color: Rgba) {
        self.ctx.set_fill_style(&Self::css(color));
        self.ctx.set_font("12px system-ui, sans-serif");
        self.ctx.set_text_baseline("middle");
        let _ = self.ctx.fill_text(text, at.x, at.y);
    }
}
