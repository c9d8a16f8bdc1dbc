//! Clickable token column with mask shading and the current selection outlined.

use crate::component::{Point, Rect, Surface, Widget};
use crate::config::{Side, TokenSelection};

use super::{slot_positions, BG, HIGHLIGHT, MASKED, TEXT};

const PAD: f64 = 4.0;
const MAX_ROW_H: f64 = 22.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TextTokensInput {
    pub side: Side,
    pub tokens: Vec<String>,
    pub masked: Vec<usize>,
    pub selected: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenCell {
    pub index: usize,
    pub text: String,
    pub masked: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenRow {
    pub side: Side,
    pub cells: Vec<TokenCell>,
}

#[derive(Debug, Default)]
pub struct TextTokens {
    side: Option<Side>,
    rows: Vec<Rect>,
}

impl TextTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_at(&self, p: Point) -> Option<TokenSelection> {
        let side = self.side?;
        self.rows
            .iter()
            .position(|r| r.contains(p))
            .map(|index| TokenSelection { side, index })
    }
}

impl<S: Surface> Widget<S> for TextTokens {
    type Input = TextTokensInput;
    type RenderData = TokenRow;

    fn wrangle(&self, input: &TextTokensInput) -> TokenRow {
        let cells = input
            .tokens
            .iter()
            .enumerate()
            .map(|(index, text)| TokenCell {
                index,
                text: text.clone(),
                masked: input.masked.contains(&index),
                selected: input.selected == Some(index),
            })
            .collect();
        TokenRow {
            side: input.side,
            cells,
        }
    }

    fn render(&mut self, mount: &mut S, data: &TokenRow) {
        let (w, h) = mount.size();
        let (ys, row_h) = slot_positions(data.cells.len(), PAD, h - 2.0 * PAD, MAX_ROW_H);

        self.side = Some(data.side);
        self.rows = ys
            .iter()
            .map(|y| Rect::new(PAD, y - row_h / 2.0, w - 2.0 * PAD, row_h))
            .collect();

        mount.clear(BG);
        for (cell, rect) in data.cells.iter().zip(&self.rows) {
            if cell.masked {
                mount.fill_rect(*rect, MASKED.with_alpha(0.35));
            }
            if cell.selected {
                mount.stroke_rect(*rect, 1.5, HIGHLIGHT);
            }
            let color = if cell.selected { HIGHLIGHT } else { TEXT };
            mount.text(
                Point::new(rect.x + 4.0, rect.y + rect.h / 2.0),
                &cell.text,
                color,
            );
        }
    }
}
