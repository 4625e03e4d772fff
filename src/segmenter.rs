// src/segmenter.rs

use serde::Serialize;
use tracing::debug;

use crate::config::SegmenterConfig;
use crate::heuristics::region_has_label;
use crate::model::Rect;
use crate::text_layout::RegionText;

/// How a page was cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Grid {
    Single,
    Quadrants,
    Halves,
    WholePage,
}

/// One label-sized piece of a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Position inside the grid, row-major.
    pub index: usize,
    pub rect: Rect,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    small_format_width: f32,
    min_region_chars: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(&SegmenterConfig::default())
    }
}

fn quadrants(w: f32, h: f32) -> Vec<Rect> {
    let (hw, hh) = (w / 2.0, h / 2.0);
    vec![
        Rect::new(0.0, 0.0, hw, hh),
        Rect::new(hw, 0.0, w, hh),
        Rect::new(0.0, hh, hw, h),
        Rect::new(hw, hh, w, h),
    ]
}

fn halves(w: f32, h: f32) -> Vec<Rect> {
    let hh = h / 2.0;
    vec![Rect::new(0.0, 0.0, w, hh), Rect::new(0.0, hh, w, h)]
}

impl Segmenter {
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            small_format_width: config.small_format_width,
            min_region_chars: config.min_region_chars,
        }
    }

    pub fn min_region_chars(&self) -> usize {
        self.min_region_chars
    }

    /// Whether the page is too narrow to hold more than one label.
    pub fn is_small_format(&self, page: &dyn RegionText) -> bool {
        page.size().0 < self.small_format_width
    }

    fn cut(page: &dyn RegionText, rects: Vec<Rect>) -> Vec<Region> {
        rects
            .into_iter()
            .enumerate()
            .map(|(index, rect)| Region {
                index,
                text: page.text_in(&rect),
                rect,
            })
            .collect()
    }

    /// How many regions read as a label. Only used to pick the grid.
    fn populated(&self, regions: &[Region]) -> usize {
        regions
            .iter()
            .filter(|r| region_has_label(&r.text, self.min_region_chars))
            .count()
    }

    /// Every region of the chosen grid holding some text, marked or not.
    fn non_empty(&self, regions: Vec<Region>) -> Vec<Region> {
        regions
            .into_iter()
            .filter(|r| r.text.trim().chars().count() >= self.min_region_chars)
            .collect()
    }

    /// Cut a page into label regions. Empty when the page holds no label.
    pub fn segment(&self, page: &dyn RegionText) -> (Grid, Vec<Region>) {
        let (w, h) = page.size();
        let whole = || {
            let rect = Rect::new(0.0, 0.0, w, h);
            let text = page.text_in(&rect);
            if text.trim().chars().count() < self.min_region_chars {
                Vec::new()
            } else {
                vec![Region { index: 0, rect, text }]
            }
        };

        if self.is_small_format(page) {
            return (Grid::Single, whole());
        }

        let quads = Self::cut(page, quadrants(w, h));
        let rows = Self::cut(page, halves(w, h));
        let (in_quads, in_rows) = (self.populated(&quads), self.populated(&rows));
        if in_quads >= 2 {
            return (Grid::Quadrants, self.non_empty(quads));
        }
        if in_rows >= 2 {
            return (Grid::Halves, self.non_empty(rows));
        }
        if in_quads == 1 {
            return (Grid::Quadrants, self.non_empty(quads));
        }
        if in_rows == 1 {
            return (Grid::Halves, self.non_empty(rows));
        }
        debug!(width = w, height = h, "No populated region, using whole page");
        (Grid::WholePage, whole())
    }
}
