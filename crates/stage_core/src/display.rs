//! Resize-aware rendering of the retained capture.
//!
//! Resize notifications arrive in bursts while the window is dragged. They
//! are coalesced by a [`Debouncer`]: every notification pushes the deadline
//! out again, and only the last bounds of a burst are rendered once the
//! deadline passes. Time is passed in by the caller so the event loop stays
//! the only clock.

use std::time::{Duration, Instant};

use image::{DynamicImage, RgbaImage, imageops::FilterType};

use crate::config::DisplayConfig;

/// Size of the area available for the photo, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn shrink(self, by: u32) -> Self {
        Self::new(self.width.saturating_sub(by), self.height.saturating_sub(by))
    }

    fn is_usable(self, min_side: u32) -> bool {
        self.width >= min_side && self.height >= min_side
    }
}

/// Largest size with the source aspect ratio that fits in `bounds`. Never
/// enlarges: a source that already fits keeps its size.
pub fn fit_within(source: (u32, u32), bounds: Bounds) -> (u32, u32) {
    let (sw, sh) = source;
    if sw == 0 || sh == 0 {
        return (0, 0);
    }
    if sw <= bounds.width && sh <= bounds.height {
        return (sw, sh);
    }
    let scale = f64::min(
        bounds.width as f64 / sw as f64,
        bounds.height as f64 / sh as f64,
    );
    let w = ((sw as f64 * scale).round() as u32).clamp(1, bounds.width.max(1));
    let h = ((sh as f64 * scale).round() as u32).clamp(1, bounds.height.max(1));
    (w, h)
}

/// One-shot trailing-edge timer carrying the latest value of a burst.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// (Re)arm the timer. A pending value is replaced, never queued.
    pub fn notify(&mut self, now: Instant, value: T) {
        self.pending = Some((now + self.delay, value));
    }

    /// Take the value if the burst has been quiet for the full delay.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((deadline, _)) if *deadline <= now => self.pending.take().map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|(deadline, _)| deadline.saturating_duration_since(now))
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Holds the photo being shown and its scaled rendering.
pub struct ResponsiveDisplay {
    config: DisplayConfig,
    source: Option<DynamicImage>,
    rendered: Option<RgbaImage>,
    area: Option<Bounds>,
    debounce: Debouncer<Bounds>,
    generation: u64,
    rescales: u64,
}

impl ResponsiveDisplay {
    pub fn new(config: DisplayConfig) -> Self {
        let debounce = Debouncer::new(config.debounce());
        Self {
            config,
            source: None,
            rendered: None,
            area: None,
            debounce,
            generation: 0,
            rescales: 0,
        }
    }

    /// Retain `image` and render it into the current area right away.
    pub fn show(&mut self, image: DynamicImage) {
        let image = if self.config.rotate_clockwise {
            image.rotate90()
        } else {
            image
        };
        let target = self
            .area
            .map(|a| a.shrink(self.config.padding))
            .filter(|b| b.is_usable(self.config.min_side))
            .unwrap_or_else(|| Bounds::new(self.config.fallback[0], self.config.fallback[1]));
        self.rendered = Some(render(&image, target));
        self.source = Some(image);
        self.debounce.cancel();
        self.generation += 1;
    }

    /// Record a new display area. Rendering is deferred until the burst
    /// settles; without a photo only the area is remembered.
    pub fn on_resize(&mut self, now: Instant, area: Bounds) {
        self.area = Some(area);
        if self.source.is_some() {
            self.debounce.notify(now, area);
        }
    }

    /// Fire the debounced rescale if due. Returns true when a new rendering
    /// was produced.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(area) = self.debounce.poll(now) else {
            return false;
        };
        let Some(source) = &self.source else {
            return false;
        };
        let target = area.shrink(self.config.padding);
        if !target.is_usable(self.config.min_side) {
            tracing::debug!("área {}x{} demasiado pequeña; sin reescalar", area.width, area.height);
            return false;
        }
        let rendered = render(source, target);
        tracing::debug!(
            "reescalado a {}x{} para área {}x{}",
            rendered.width(),
            rendered.height(),
            area.width,
            area.height
        );
        self.rendered = Some(rendered);
        self.rescales += 1;
        self.generation += 1;
        true
    }

    /// Drop the photo and go back to the placeholder. Returns false when
    /// the placeholder was already showing.
    pub fn clear(&mut self) -> bool {
        self.debounce.cancel();
        if self.source.is_none() && self.rendered.is_none() {
            return false;
        }
        self.source = None;
        self.rendered = None;
        self.generation += 1;
        true
    }

    pub fn is_placeholder(&self) -> bool {
        self.rendered.is_none()
    }

    pub fn rendered(&self) -> Option<&RgbaImage> {
        self.rendered.as_ref()
    }

    pub fn source_dimensions(&self) -> Option<(u32, u32)> {
        self.source.as_ref().map(|s| (s.width(), s.height()))
    }

    /// Bumped whenever [`Self::rendered`] changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of debounced rescales performed so far.
    pub fn rescale_count(&self) -> u64 {
        self.rescales
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.debounce.time_until_due(now)
    }
}

fn render(source: &DynamicImage, target: Bounds) -> RgbaImage {
    let (w, h) = fit_within((source.width(), source.height()), target);
    if (w, h) == (source.width(), source.height()) {
        return source.to_rgba8();
    }
    source.resize_exact(w, h, FilterType::Lanczos3).to_rgba8()
}
