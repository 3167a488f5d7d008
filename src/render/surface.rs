/// A fixed-size monochrome drawing target, the canvas analogue.
///
/// Pixels are either background or foreground; the terminal UI blits the
/// grid each UI frame. The frame counter advances once per painted analysis
/// frame so tests can observe whether a render loop is still live.
pub struct Surface {
    name: String,
    width: u32,
    height: u32,
    pixels: Vec<bool>,
    frames: u64,
}

impl Surface {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width: width.max(1),
            height: height.max(1),
            pixels: vec![false; (width.max(1) * height.max(1)) as usize],
            frames: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of analysis frames painted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn mark_frame(&mut self) {
        self.frames += 1;
    }

    pub fn pixel(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.pixels[(y * self.width + x) as usize]
    }

    /// Resets every pixel to the background fill.
    pub fn clear(&mut self) {
        self.pixels.fill(false);
    }

    /// Fills the axis-aligned rectangle covering [x, x+w) x [y, y+h).
    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let x0 = x.max(0.0).floor() as u32;
        let y0 = y.max(0.0).floor() as u32;
        let x1 = ((x + w).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((y + h).ceil().max(0.0) as u32).min(self.height);
        for yy in y0..y1 {
            for xx in x0..x1 {
                self.pixels[(yy * self.width + xx) as usize] = true;
            }
        }
    }

    /// Strokes a connected polyline through the given points.
    pub fn stroke_polyline(&mut self, points: &[(f32, f32)]) {
        for pair in points.windows(2) {
            self.line(pair[0], pair[1]);
        }
    }

    fn line(&mut self, from: (f32, f32), to: (f32, f32)) {
        // Coordinates on the far edge land on the last row/column, like a
        // canvas path along the surface boundary.
        let clamp = |p: (f32, f32)| {
            (
                (p.0.round() as i64).clamp(0, self.width as i64 - 1),
                (p.1.round() as i64).clamp(0, self.height as i64 - 1),
            )
        };
        let (mut x0, mut y0) = clamp(from);
        let (x1, y1) = clamp(to);

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        loop {
            self.pixels[(y0 as u32 * self.width + x0 as u32) as usize] = true;
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    #[cfg(test)]
    fn set_pixel_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    #[cfg(test)]
    fn column_set_count(&self, x: u32) -> usize {
        (0..self.height).filter(|&y| self.pixel(x, y)).count()
    }
}

/// Height in pixels of a spectrum bar for a byte magnitude.
pub fn bar_height(value: u8, surface_height: f32) -> f32 {
    surface_height * value as f32 / 255.0
}

/// Vertical position of a waveform sample byte; 128 maps to the centerline.
pub fn sample_to_y(value: u8, surface_height: f32) -> f32 {
    value as f32 / 128.0 * (surface_height / 2.0)
}

/// Paints one spectrum frame: one bottom-anchored bar per frequency bin over
/// a freshly cleared background.
pub fn paint_spectrum(surface: &mut Surface, bins: &[u8]) {
    surface.clear();
    if bins.is_empty() {
        surface.mark_frame();
        return;
    }

    let w = surface.width() as f32;
    let h = surface.height() as f32;
    let slice_width = w / bins.len() as f32;
    let mut x = 0.0;
    for &value in bins {
        let bar = bar_height(value, h);
        surface.fill_rect(x, h - bar, slice_width, bar);
        x += slice_width;
    }
    surface.mark_frame();
}

/// Paints one waveform frame: a polyline through every sample, terminated on
/// the centerline at the right edge.
pub fn paint_waveform(surface: &mut Surface, samples: &[u8]) {
    surface.clear();
    if samples.is_empty() {
        surface.mark_frame();
        return;
    }

    let w = surface.width() as f32;
    let h = surface.height() as f32;
    let slice_width = w / samples.len() as f32;
    let mut points = Vec::with_capacity(samples.len() + 1);
    let mut x = 0.0;
    for &value in samples {
        points.push((x, sample_to_y(value, h)));
        x += slice_width;
    }
    points.push((w, h / 2.0));
    surface.stroke_polyline(&points);
    surface.mark_frame();
}
