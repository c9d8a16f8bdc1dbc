//! Horizontal bar chart over a corpus search [`Histogram`].

use crate::component::{Point, Rect, Surface, Widget};
use crate::search::Histogram;

use super::{slot_positions, ACCENT, BG, TEXT, TEXT_DIM};

const PAD: f64 = 6.0;
const TITLE_H: f64 = 18.0;
const LABEL_W: f64 = 64.0;
const MAX_BAR_H: f64 = 18.0;

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramInput {
    pub title: String,
    pub histogram: Histogram,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBars {
    pub title: String,
    pub bars: Vec<(String, u32)>,
    pub max: u32,
}

#[derive(Debug, Default)]
pub struct CorpusHistogram;

impl CorpusHistogram {
    pub fn new() -> Self {
        Self
    }
}

impl<S: Surface> Widget<S> for CorpusHistogram {
    type Input = HistogramInput;
    type RenderData = HistogramBars;

    fn wrangle(&self, input: &HistogramInput) -> HistogramBars {
        let bars = input.histogram.sorted();
        let max = bars.first().map(|(_, c)| *c).unwrap_or(0);
        HistogramBars {
            title: input.title.clone(),
            bars,
            max,
        }
    }

    fn render(&mut self, mount: &mut S, data: &HistogramBars) {
        let (w, h) = mount.size();
        mount.clear(BG);
        mount.text(Point::new(PAD, PAD + TITLE_H / 2.0), &data.title, TEXT);

        let top = PAD + TITLE_H;
        let (ys, bar_h) = slot_positions(data.bars.len(), top, h - top - PAD, MAX_BAR_H);
        let track = (w - 2.0 * PAD - LABEL_W).max(0.0);

        for ((label, count), y) in data.bars.iter().zip(ys) {
            mount.text(Point::new(PAD, y), label, TEXT_DIM);
            if data.max == 0 {
                continue;
            }
            let len = track * f64::from(*count) / f64::from(data.max);
            mount.fill_rect(
                Rect::new(PAD + LABEL_W, y - bar_h * 0.4, len, bar_h * 0.8),
                ACCENT.with_alpha(0.8),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{DrawOp, IdGenerator, RecordingSurface, VizComponent};

    fn input() -> HistogramInput {
        HistogramInput {
            title: "matched pos".into(),
            histogram: ["NOUN", "VERB", "NOUN", "ADJ", "NOUN", "VERB"]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn bars_sort_by_count_then_label() {
        let bars = <CorpusHistogram as Widget<RecordingSurface>>::wrangle(&CorpusHistogram, &input());
        let labels: Vec<&str> = bars.bars.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["NOUN", "VERB", "ADJ"]);
        assert_eq!(bars.max, 3);
    }

    #[test]
    fn longest_bar_fills_the_track() {
        let mut c = VizComponent::new(
            CorpusHistogram::new(),
            RecordingSurface::new(200.0, 100.0),
            &IdGenerator::new(),
        );
        c.update(input());
        assert_eq!(c.mount().texts(), vec!["matched pos", "NOUN", "VERB", "ADJ"]);

        let widths: Vec<f64> = c
            .mount()
            .ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Fill(r, _) => Some(r.w),
                _ => None,
            })
            .collect();
        let track = 200.0 - 2.0 * PAD - LABEL_W;
        assert_eq!(widths.len(), 3);
        assert!((widths[0] - track).abs() < 1e-9);
        assert!((widths[2] - track / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_histogram_draws_only_the_title() {
        let mut c = VizComponent::new(
            CorpusHistogram::new(),
            RecordingSurface::new(200.0, 100.0),
            &IdGenerator::new(),
        );
        c.update(HistogramInput {
            title: "empty".into(),
            histogram: Histogram::default(),
        });
        assert_eq!(c.mount().ops, vec![DrawOp::Text(Point::new(PAD, PAD + TITLE_H / 2.0), "empty".into())]);
    }
}
