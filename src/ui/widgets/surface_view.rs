use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    symbols,
    widgets::{Block, Widget},
};

use crate::render::Surface;

/// Blits a drawing surface into the terminal buffer.
///
/// Each terminal cell covers a rectangle of surface pixels; a cell lights up
/// when any pixel in its rectangle is set. The surface keeps its fixed pixel
/// dimensions regardless of the widget area.
pub struct SurfaceView<'a> {
    surface: &'a Surface,
    block: Option<Block<'a>>,
    style: Style,
}

impl<'a> SurfaceView<'a> {
    pub fn new(surface: &'a Surface) -> Self {
        Self {
            surface,
            block: None,
            style: Style::default().fg(Color::Green),
        }
    }

    pub fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }
}

impl<'a> Widget for SurfaceView<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = self.block.unwrap_or_default();
        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width < 1 || inner.height < 1 {
            return;
        }

        let sw = self.surface.width();
        let sh = self.surface.height();

        for cy in 0..inner.height {
            let py0 = cy as u32 * sh / inner.height as u32;
            let py1 = ((cy as u32 + 1) * sh / inner.height as u32).max(py0 + 1);
            for cx in 0..inner.width {
                let px0 = cx as u32 * sw / inner.width as u32;
                let px1 = ((cx as u32 + 1) * sw / inner.width as u32).max(px0 + 1);

                let lit = (py0..py1.min(sh))
                    .any(|py| (px0..px1.min(sw)).any(|px| self.surface.pixel(px, py)));
                if lit {
                    buf.get_mut(inner.left() + cx, inner.top() + cy)
                        .set_symbol(symbols::block::FULL)
                        .set_style(self.style);
                }
            }
        }
    }
}
