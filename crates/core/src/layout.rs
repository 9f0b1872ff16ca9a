//! Sequential layout of certificate pages.
//!
//! [`LayoutAllocator`] hands out non-overlapping rectangles from top to bottom of A4 pages,
//! breaking to a new page when the current one is full. Fixed rectangles (the QR code) are
//! reserved at the right margin; text lines that pass beside a reserved rectangle are given a
//! narrower width, and image blocks are pushed below it.
//!
//! All coordinates are millimetres measured from the top-left corner of the page.

/// A4 portrait.
pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
/// 50pt, the usual document margin.
pub const PAGE_MARGIN_MM: f32 = 17.6;

/// Horizontal clearance between text and a reserved rectangle.
const RESERVED_CLEARANCE_MM: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    fn overlaps_vertically(&self, top: f32, bottom: f32) -> bool {
        self.y < bottom && top < self.bottom()
    }
}

/// A rectangle on a specific page (zero-based).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub page: usize,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageGeometry {
    pub const A4: PageGeometry = PageGeometry {
        width: PAGE_WIDTH_MM,
        height: PAGE_HEIGHT_MM,
        margin: PAGE_MARGIN_MM,
    };

    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    pub fn content_height(&self) -> f32 {
        self.height - 2.0 * self.margin
    }

    pub fn content_box(&self) -> Rect {
        Rect {
            x: self.margin,
            y: self.margin,
            width: self.content_width(),
            height: self.content_height(),
        }
    }

    fn bottom(&self) -> f32 {
        self.height - self.margin
    }
}

#[derive(Debug, Clone)]
pub struct LayoutAllocator {
    geometry: PageGeometry,
    page: usize,
    cursor: f32,
    reserved: Vec<Slot>,
}

impl Default for LayoutAllocator {
    fn default() -> Self {
        Self::new(PageGeometry::A4)
    }
}

impl LayoutAllocator {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            page: 0,
            cursor: geometry.margin,
            reserved: Vec::new(),
        }
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Number of pages touched so far.
    pub fn page_count(&self) -> usize {
        self.page + 1
    }

    pub fn current_page(&self) -> usize {
        self.page
    }

    /// Distance from the top of the current page to the next free line.
    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    pub fn reserved(&self) -> &[Slot] {
        &self.reserved
    }

    pub fn new_page(&mut self) {
        self.page += 1;
        self.cursor = self.geometry.margin;
    }

    /// Breaks to a new page unless `height` still fits below the cursor.
    pub fn ensure(&mut self, height: f32) {
        if self.cursor + height > self.geometry.bottom() && self.cursor > self.geometry.margin {
            self.new_page();
        }
    }

    /// Advances the cursor. A gap that runs off the page starts a new one.
    pub fn gap(&mut self, height: f32) {
        self.cursor += height;
        if self.cursor >= self.geometry.bottom() {
            self.new_page();
        }
    }

    /// Allocates a full-width text line, narrowed beside any reserved rectangle.
    pub fn line(&mut self, height: f32) -> Slot {
        let height = height.min(self.geometry.content_height());
        self.ensure(height);

        let top = self.cursor;
        let bottom = top + height;
        let mut right = self.geometry.width - self.geometry.margin;
        for reserved in self.reserved_on_page() {
            if reserved.overlaps_vertically(top, bottom) {
                right = right.min(reserved.x - RESERVED_CLEARANCE_MM);
            }
        }

        let x = self.geometry.margin;
        self.cursor = bottom;
        Slot {
            page: self.page,
            rect: Rect {
                x,
                y: top,
                width: (right - x).max(0.0),
                height,
            },
        }
    }

    /// Reserves a fixed rectangle at the right margin, starting at the cursor.
    ///
    /// The cursor is not advanced: following lines flow beside the reservation.
    pub fn reserve_right(&mut self, width: f32, height: f32) -> Slot {
        let width = width.min(self.geometry.content_width());
        let height = height.min(self.geometry.content_height());
        self.ensure(height);

        let slot = Slot {
            page: self.page,
            rect: Rect {
                x: self.geometry.width - self.geometry.margin - width,
                y: self.cursor,
                width,
                height,
            },
        };
        self.reserved.push(slot);
        slot
    }

    /// Allocates a left-aligned block (an image), below any reserved rectangle it would touch.
    ///
    /// Blocks larger than the content box are scaled down, preserving aspect ratio.
    pub fn block(&mut self, width: f32, height: f32) -> Slot {
        let (width, height) = self.fit(width, height);
        self.ensure(height);

        let x = self.geometry.margin;
        loop {
            let candidate = Rect {
                x,
                y: self.cursor,
                width,
                height,
            };
            let blocking = self
                .reserved_on_page()
                .filter(|reserved| reserved.intersects(&candidate))
                .map(|reserved| reserved.bottom())
                .fold(None, |acc: Option<f32>, bottom| {
                    Some(acc.map_or(bottom, |a| a.max(bottom)))
                });

            match blocking {
                Some(bottom) => {
                    self.cursor = bottom + 1.0;
                    self.ensure(height);
                }
                None => {
                    self.cursor = candidate.bottom();
                    return Slot {
                        page: self.page,
                        rect: candidate,
                    };
                }
            }
        }
    }

    /// Moves the cursor below every reservation on the current page.
    pub fn clear_reserved(&mut self) {
        let lowest = self
            .reserved_on_page()
            .map(|reserved| reserved.bottom())
            .fold(self.cursor, f32::max);
        if lowest > self.cursor {
            self.cursor = lowest;
            self.gap(1.0);
        }
    }

    fn reserved_on_page(&self) -> impl Iterator<Item = Rect> + '_ {
        let page = self.page;
        self.reserved
            .iter()
            .filter(move |slot| slot.page == page)
            .map(|slot| slot.rect)
    }

    fn fit(&self, width: f32, height: f32) -> (f32, f32) {
        let max_width = self.geometry.content_width();
        let max_height = self.geometry.content_height();
        if width <= 0.0 || height <= 0.0 {
            return (width.max(0.0), height.max(0.0));
        }
        let scale = (max_width / width).min(max_height / height).min(1.0);
        (width * scale, height * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within_content_box(slot: &Slot) -> bool {
        let content = PageGeometry::A4.content_box();
        slot.rect.x >= content.x - f32::EPSILON
            && slot.rect.y >= content.y - f32::EPSILON
            && slot.rect.right() <= content.right() + 0.001
            && slot.rect.bottom() <= content.bottom() + 0.001
    }

    #[test]
    fn lines_flow_top_to_bottom() {
        let mut layout = LayoutAllocator::default();
        let a = layout.line(5.0);
        let b = layout.line(5.0);

        assert_eq!(a.page, 0);
        assert_eq!(a.rect.y, PAGE_MARGIN_MM);
        assert_eq!(b.rect.y, a.rect.bottom());
        assert_eq!(a.rect.width, PageGeometry::A4.content_width());
    }

    #[test]
    fn lines_beside_reserved_rect_are_narrowed_and_never_intersect() {
        let mut layout = LayoutAllocator::default();
        layout.line(10.0);
        let qr = layout.reserve_right(40.0, 40.0);

        let mut lines = Vec::new();
        for _ in 0..20 {
            lines.push(layout.line(5.0));
        }

        for line in &lines {
            assert!(!line.rect.intersects(&qr.rect), "{:?} overlaps {:?}", line, qr);
            assert!(within_content_box(line));
        }
        assert!(lines[0].rect.width < PageGeometry::A4.content_width());
        // below the QR code the full width is available again
        let last = lines.last().unwrap();
        assert!(last.rect.y >= qr.rect.bottom());
        assert_eq!(last.rect.width, PageGeometry::A4.content_width());
    }

    #[test]
    fn block_is_pushed_below_reserved_rect() {
        let mut layout = LayoutAllocator::default();
        let qr = layout.reserve_right(40.0, 40.0);
        let image = layout.block(PageGeometry::A4.content_width(), 30.0);

        assert!(!image.rect.intersects(&qr.rect));
        assert!(image.rect.y >= qr.rect.bottom());
    }

    #[test]
    fn narrow_block_fits_beside_reserved_rect() {
        let mut layout = LayoutAllocator::default();
        let qr = layout.reserve_right(40.0, 40.0);
        let image = layout.block(60.0, 30.0);

        assert!(!image.rect.intersects(&qr.rect));
        assert_eq!(image.rect.y, PAGE_MARGIN_MM);
    }

    #[test]
    fn page_breaks_when_content_runs_out() {
        let mut layout = LayoutAllocator::default();
        let mut slots = Vec::new();
        for _ in 0..100 {
            slots.push(layout.line(5.0));
        }

        assert!(layout.page_count() > 1);
        for slot in &slots {
            assert!(within_content_box(slot), "{:?} leaves the content box", slot);
        }
        let first_on_second = slots.iter().find(|s| s.page == 1).unwrap();
        assert_eq!(first_on_second.rect.y, PAGE_MARGIN_MM);
    }

    #[test]
    fn reserved_rect_only_affects_its_page() {
        let mut layout = LayoutAllocator::default();
        layout.reserve_right(40.0, 40.0);
        layout.new_page();
        let line = layout.line(5.0);
        assert_eq!(line.page, 1);
        assert_eq!(line.rect.width, PageGeometry::A4.content_width());
    }

    #[test]
    fn oversized_block_is_scaled_into_the_content_box() {
        let mut layout = LayoutAllocator::default();
        layout.line(50.0);
        let block = layout.block(400.0, 600.0);

        assert_eq!(block.page, 1);
        assert!(within_content_box(&block));
        let ratio = block.rect.width / block.rect.height;
        assert!((ratio - 400.0 / 600.0).abs() < 0.001);
    }

    #[test]
    fn gap_past_the_bottom_starts_a_new_page() {
        let mut layout = LayoutAllocator::default();
        layout.gap(PageGeometry::A4.content_height() + 1.0);
        assert_eq!(layout.current_page(), 1);
        assert_eq!(layout.cursor(), PAGE_MARGIN_MM);
    }

    #[test]
    fn clear_reserved_moves_below_reservations() {
        let mut layout = LayoutAllocator::default();
        let qr = layout.reserve_right(40.0, 40.0);
        layout.line(5.0);
        layout.clear_reserved();
        assert!(layout.cursor() > qr.rect.bottom());
    }
}
