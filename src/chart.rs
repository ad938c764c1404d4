pub mod overlay;

use data::annotation::{Annotation, AnnotationKind, AnnotationStore, DrawingPoint};
use data::chart::TimeScale;
use data::chart::hit_test::{self, PositionHandle};
use data::series::MondayRange;
use exchange::{Candle, Interval};

use iced::widget::canvas::{self, Event, Geometry};
use iced::{Point, Rectangle, Renderer, Size, Theme, Vector, mouse};

const MIN_SCALING: f32 = 0.25;
const MAX_SCALING: f32 = 2.5;
const MIN_CELL_WIDTH: f32 = 1.0;
const MAX_CELL_WIDTH: f32 = 16.0;
const DEFAULT_CELL_WIDTH: f32 = 4.0;
const DEFAULT_CELL_HEIGHT: f32 = 4.0;
const ZOOM_SENSITIVITY: f32 = 30.0;

/// Render caches, split so cheap invalidations (cursor, selection)
/// do not force a candle repaint.
#[derive(Default)]
pub struct Caches {
    main: canvas::Cache,
    overlay: canvas::Cache,
}

impl Caches {
    pub fn clear_all(&self) {
        self.main.clear();
        self.overlay.clear();
    }

    pub fn clear_overlay(&self) {
        self.overlay.clear();
    }
}

/// Chart viewport: pan/zoom state plus the transforms between chart
/// space (x in bar widths anchored at the last displayed bar, y in
/// price cells around a base price) and domain values.
pub struct ViewState {
    pub cache: Caches,
    bounds: Size,
    translation: Vector,
    scaling: f32,
    cell_width: f32,
    cell_height: f32,
    tick_size: f64,
    base_price: f64,
    scale: TimeScale,
}

impl ViewState {
    pub fn new(interval: Interval) -> Self {
        Self {
            cache: Caches::default(),
            bounds: Size::ZERO,
            translation: Vector::default(),
            scaling: 1.0,
            cell_width: DEFAULT_CELL_WIDTH,
            cell_height: DEFAULT_CELL_HEIGHT,
            tick_size: 1.0,
            base_price: 0.0,
            scale: TimeScale::new(vec![], interval),
        }
    }

    /// Rebase the price axis on a freshly loaded series.
    pub fn fit_price_axis(&mut self, candles: &[Candle]) {
        let Some(first) = candles.first() else {
            return;
        };
        let mut low = first.low;
        let mut high = first.high;
        let tail = candles.len().saturating_sub(200);
        for candle in &candles[tail..] {
            low = low.min(candle.low);
            high = high.max(candle.high);
        }
        self.base_price = (low + high) / 2.0;
        self.tick_size = ((high - low) / 80.0).max(f64::EPSILON);
        self.translation.y = 0.0;
        self.cache.clear_all();
    }

    /// Re-anchor the time axis on the displayed window; called on
    /// load and after every replay tick, since truncation moves the
    /// last bar.
    pub fn set_display(&mut self, displayed: &[Candle], interval: Interval) {
        self.scale = TimeScale::from_candles(displayed, interval);
        self.cache.clear_all();
    }

    pub fn scaling(&self) -> f32 {
        self.scaling
    }

    pub fn translation(&self) -> Vector {
        self.translation
    }

    pub fn cell_width(&self) -> f32 {
        self.cell_width
    }

    /// One price cell in domain units. Sizes default position shapes.
    pub fn price_step(&self) -> f64 {
        self.tick_size
    }

    pub fn set_bounds(&mut self, bounds: Size) {
        self.bounds = bounds;
    }

    pub fn bounds(&self) -> Size {
        self.bounds
    }

    pub fn apply_translation(&mut self, translation: Vector) {
        self.translation = translation;
        self.cache.clear_all();
    }

    pub fn apply_scaling(&mut self, scaling: f32, translation: Vector) {
        self.scaling = scaling;
        self.translation = translation;
        self.cache.clear_all();
    }

    fn last_index(&self) -> f64 {
        self.scale.len().saturating_sub(1) as f64
    }

    pub fn index_to_x(&self, index: f64) -> f32 {
        ((index - self.last_index()) as f32) * self.cell_width
    }

    pub fn x_to_index(&self, x: f32) -> f64 {
        self.last_index() + f64::from(x / self.cell_width)
    }

    pub fn time_to_x(&self, time_ms: u64) -> Option<f32> {
        let index = self.scale.time_to_logical(time_ms)?;
        Some(self.index_to_x(index))
    }

    pub fn x_to_time(&self, x: f32) -> Option<u64> {
        if self.scale.is_empty() {
            return None;
        }
        self.scale.logical_to_time(self.x_to_index(x))
    }

    pub fn price_to_y(&self, price: f64) -> Option<f32> {
        if self.scale.is_empty() {
            return None;
        }
        let ticks = (self.base_price - price) / self.tick_size;
        Some(ticks as f32 * self.cell_height)
    }

    pub fn y_to_price(&self, y: f32) -> Option<f64> {
        if self.scale.is_empty() {
            return None;
        }
        Some(self.base_price - f64::from(y / self.cell_height) * self.tick_size)
    }

    pub fn visible_region(&self, size: Size) -> Rectangle {
        let width = size.width / self.scaling;
        let height = size.height / self.scaling;

        Rectangle {
            x: -self.translation.x - width / 2.0,
            y: -self.translation.y - height / 2.0,
            width,
            height,
        }
    }

    /// Center the viewport on a logical window, resizing bars so the
    /// window fills the canvas. Drives replay auto-follow.
    pub fn set_visible_logical_range(&mut self, from: f64, to: f64) {
        if self.bounds.width <= 0.0 {
            return;
        }
        let span = (to - from).max(1.0) as f32;
        self.cell_width =
            (self.bounds.width / self.scaling / span).clamp(MIN_CELL_WIDTH, MAX_CELL_WIDTH);

        let center = (from + to) / 2.0;
        self.translation.x = -self.index_to_x(center);
        self.cache.clear_all();
    }

    /// Cursor position within the canvas mapped into chart space.
    pub fn cursor_to_chart(&self, cursor: Point, size: Size) -> Point {
        Point::new(
            (cursor.x - size.width / 2.0) / self.scaling - self.translation.x,
            (cursor.y - size.height / 2.0) / self.scaling - self.translation.y,
        )
    }
}

/// What a shape drag grabbed: the whole body or one trailing-edge
/// handle of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grab {
    Body,
    Handle(PositionHandle),
}

#[derive(Debug, Clone)]
pub enum Message {
    BoundsChanged(Size),
    Translated(Vector),
    Scaled(f32, Vector),
    CrosshairMoved(Point),
    Clicked(Point),
    DragStarted { id: i64, grab: Grab, origin: Point },
    Dragged(Point),
    DragEnded,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum Interaction {
    #[default]
    None,
    Panning {
        translation: Vector,
        start: Point,
    },
    DraggingShape,
}

/// One frame's worth of chart inputs, borrowed from the app. The
/// interaction-relevant pieces (tool, pending points, selection) come
/// in as one immutable snapshot per render.
pub struct ChartCanvas<'a> {
    pub state: &'a ViewState,
    pub candles: &'a [Candle],
    pub interval: Interval,
    pub store: &'a AnnotationStore,
    pub active_tool: Option<AnnotationKind>,
    pub pending_points: &'a [DrawingPoint],
    pub drag_preview: Option<&'a Annotation>,
    pub emas: &'a [(usize, Vec<f64>)],
    pub bands: &'a [MondayRange],
    pub replay_active: bool,
    pub marking_start: bool,
}

impl ChartCanvas<'_> {
    fn hit_test_at(&self, chart_pos: Point) -> Option<i64> {
        hit_test::hit_test(
            self.store.as_slice(),
            chart_pos,
            |t| self.state.time_to_x(t),
            |p| self.state.price_to_y(p),
        )
    }
}

impl canvas::Program<Message> for ChartCanvas<'_> {
    type State = Interaction;

    fn update(
        &self,
        interaction: &mut Interaction,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        if let Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) = event {
            let was_dragging = matches!(interaction, Interaction::DraggingShape);
            *interaction = Interaction::None;
            if was_dragging {
                return Some(canvas::Action::publish(Message::DragEnded).and_capture());
            }
        }

        if self.state.bounds() != bounds.size() {
            return Some(canvas::Action::publish(Message::BoundsChanged(bounds.size())));
        }

        let cursor_position = cursor.position_in(bounds)?;

        match event {
            Event::Mouse(mouse_event) => match mouse_event {
                mouse::Event::ButtonPressed(mouse::Button::Left) => {
                    let chart_pos = self.state.cursor_to_chart(cursor_position, bounds.size());

                    if self.active_tool.is_some() || self.marking_start {
                        return Some(
                            canvas::Action::publish(Message::Clicked(chart_pos)).and_capture(),
                        );
                    }

                    if let Some(selected) = self.store.selected() {
                        let handle = hit_test::hit_test_handle(
                            selected,
                            chart_pos,
                            |t| self.state.time_to_x(t),
                            |p| self.state.price_to_y(p),
                        );
                        if let Some(handle) = handle {
                            *interaction = Interaction::DraggingShape;
                            return Some(
                                canvas::Action::publish(Message::DragStarted {
                                    id: selected.id,
                                    grab: Grab::Handle(handle),
                                    origin: chart_pos,
                                })
                                .and_capture(),
                            );
                        }
                        if self.hit_test_at(chart_pos) == Some(selected.id) {
                            *interaction = Interaction::DraggingShape;
                            return Some(
                                canvas::Action::publish(Message::DragStarted {
                                    id: selected.id,
                                    grab: Grab::Body,
                                    origin: chart_pos,
                                })
                                .and_capture(),
                            );
                        }
                    }

                    if self.hit_test_at(chart_pos).is_some() || self.store.selected_id().is_some()
                    {
                        return Some(
                            canvas::Action::publish(Message::Clicked(chart_pos)).and_capture(),
                        );
                    }

                    *interaction = Interaction::Panning {
                        translation: self.state.translation(),
                        start: cursor_position,
                    };
                    Some(canvas::Action::request_redraw().and_capture())
                }
                mouse::Event::CursorMoved { .. } => match *interaction {
                    Interaction::Panning { translation, start } => Some(
                        canvas::Action::publish(Message::Translated(
                            translation
                                + (cursor_position - start) * (1.0 / self.state.scaling()),
                        ))
                        .and_capture(),
                    ),
                    Interaction::DraggingShape => {
                        let chart_pos =
                            self.state.cursor_to_chart(cursor_position, bounds.size());
                        Some(canvas::Action::publish(Message::Dragged(chart_pos)).and_capture())
                    }
                    Interaction::None => {
                        let chart_pos =
                            self.state.cursor_to_chart(cursor_position, bounds.size());
                        Some(canvas::Action::publish(Message::CrosshairMoved(chart_pos)))
                    }
                },
                mouse::Event::WheelScrolled { delta } => {
                    if matches!(interaction, Interaction::Panning { .. }) {
                        return Some(canvas::Action::capture());
                    }

                    let cursor_to_center = cursor.position_from(bounds.center())?;
                    let y = match delta {
                        mouse::ScrollDelta::Lines { y, .. }
                        | mouse::ScrollDelta::Pixels { y, .. } => *y,
                    };

                    let old_scaling = self.state.scaling();
                    if (y < 0.0 && old_scaling > MIN_SCALING)
                        || (y > 0.0 && old_scaling < MAX_SCALING)
                    {
                        let scaling = (old_scaling * (1.0 + y / ZOOM_SENSITIVITY))
                            .clamp(MIN_SCALING, MAX_SCALING);

                        // Keep the point under the cursor fixed while zooming.
                        let translation = self.state.translation()
                            - Vector::new(
                                cursor_to_center.x / old_scaling
                                    - cursor_to_center.x / scaling,
                                cursor_to_center.y / old_scaling
                                    - cursor_to_center.y / scaling,
                            );

                        return Some(
                            canvas::Action::publish(Message::Scaled(scaling, translation))
                                .and_capture(),
                        );
                    }

                    Some(canvas::Action::capture())
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn draw(
        &self,
        _interaction: &Interaction,
        renderer: &Renderer,
        theme: &Theme,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let state = self.state;
        let palette = theme.extended_palette();
        let center = Vector::new(bounds.width / 2.0, bounds.height / 2.0);

        let main = state.cache.main.draw(renderer, bounds.size(), |frame| {
            frame.translate(center);
            frame.scale(state.scaling());
            frame.translate(state.translation());

            let region = state.visible_region(frame.size());

            overlay::draw_monday_bands(frame, state, self.bands, palette);
            overlay::draw_candles(frame, state, self.candles, palette);
            overlay::draw_emas(frame, state, self.emas);
            if self.replay_active {
                overlay::draw_replay_boundary(frame, state, &region, palette);
            }
        });

        let annotations = state.cache.overlay.draw(renderer, bounds.size(), |frame| {
            frame.translate(center);
            frame.scale(state.scaling());
            frame.translate(state.translation());

            let region = state.visible_region(frame.size());
            for annotation in self.store.as_slice() {
                // While a shape is being dragged, its preview copy
                // replaces the committed geometry.
                let shown = match self.drag_preview {
                    Some(preview) if preview.id == annotation.id => preview,
                    _ => annotation,
                };
                let selected = state_selected(self.store, annotation.id);
                overlay::draw_annotation(frame, state, &region, shown, selected, palette);
            }
        });

        // Cursor-dependent layer is redrawn every frame.
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        if let Some(cursor_position) = cursor.position_in(bounds) {
            frame.translate(center);
            frame.scale(state.scaling());
            frame.translate(state.translation());

            let region = state.visible_region(frame.size());
            let chart_pos = state.cursor_to_chart(cursor_position, bounds.size());

            if let Some(tool) = self.active_tool {
                overlay::draw_pending(
                    &mut frame,
                    state,
                    &region,
                    tool,
                    self.pending_points,
                    chart_pos,
                    palette,
                );
            }
            overlay::draw_crosshair(&mut frame, state, &region, chart_pos, palette);
        }
        let cursor_layer = frame.into_geometry();

        vec![main, annotations, cursor_layer]
    }

    fn mouse_interaction(
        &self,
        interaction: &Interaction,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        match interaction {
            Interaction::Panning { .. } | Interaction::DraggingShape => {
                mouse::Interaction::Grabbing
            }
            Interaction::None if cursor.is_over(bounds) => mouse::Interaction::Crosshair,
            Interaction::None => mouse::Interaction::default(),
        }
    }
}

fn state_selected(store: &AnnotationStore, id: i64) -> bool {
    store.selected_id() == Some(id)
}
