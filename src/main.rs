mod api;
mod chart;
mod logger;

use chart::{ChartCanvas, Grab, ViewState};
use data::InternalError;
use data::annotation::{
    Annotation, AnnotationKind, AnnotationPatch, AnnotationStore, DrawingPoint,
};
use data::chart::hit_test::{self, PositionHandle};
use data::replay::{Phase, Replay, Speed};
use data::series::MondayRange;
use exchange::{Candle, Interval};

use iced::widget::{button, canvas, checkbox, column, container, pick_list, row, text};
use iced::{Element, Fill, Point, Subscription, Task, Theme};

const EMA_PERIODS: [usize; 2] = [20, 50];
const POSITION_EXTENT_BARS: u64 = 20;

fn main() {
    logger::setup(cfg!(debug_assertions)).expect("Failed to initialize logger");

    let _ = iced::application(Candlepad::new, Candlepad::update, Candlepad::view)
        .settings(iced::Settings {
            antialiasing: true,
            ..Default::default()
        })
        .title(Candlepad::title)
        .theme(Candlepad::theme)
        .subscription(Candlepad::subscription)
        .run();
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Ready,
    Busy(&'static str),
    Error(String),
}

/// Origin snapshot of an in-flight shape drag. Pointer deltas apply
/// against `original`, never incrementally, so the preview cannot
/// drift.
struct DragState {
    grab: Grab,
    origin: Point,
    original: Annotation,
    preview: Annotation,
}

struct Candlepad {
    api: api::Client,
    symbol: String,
    interval: Interval,
    candles: Vec<Candle>,
    view: ViewState,
    store: AnnotationStore,
    replay: Replay,
    active_tool: Option<AnnotationKind>,
    pending_points: Vec<DrawingPoint>,
    marking_start: bool,
    drag: Option<DragState>,
    emas: Vec<(usize, Vec<f64>)>,
    bands: Vec<MondayRange>,
    show_bands: bool,
    status: Status,
}

#[derive(Debug, Clone)]
enum Message {
    Chart(chart::Message),
    CandlesFetched(Result<Vec<Candle>, InternalError>),
    DrawingsFetched(Result<Vec<Annotation>, InternalError>),
    IntervalSelected(Interval),
    SyncRequested,
    SyncFinished(Result<api::SyncSummary, InternalError>),
    ToolToggled(AnnotationKind),
    DeleteSelected,
    DrawingCreated(Result<Annotation, InternalError>),
    DrawingUpdated(Result<Annotation, InternalError>),
    DrawingDeleted(Result<i64, InternalError>),
    ReplayMarkRequested,
    ReplayToggled,
    ReplayReset,
    SpeedSelected(Speed),
    AutoFollowToggled(bool),
    BandsToggled(bool),
    ReplayTick,
}

impl Candlepad {
    fn new() -> (Self, Task<Message>) {
        let symbol = std::env::var("CANDLEPAD_SYMBOL")
            .ok()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "BTCUSDT".to_owned());
        let interval = Interval::H1;

        let app = Self {
            api: api::Client::from_env(),
            symbol,
            interval,
            candles: Vec::new(),
            view: ViewState::new(interval),
            store: AnnotationStore::new(),
            replay: Replay::new(),
            active_tool: None,
            pending_points: Vec::new(),
            marking_start: false,
            drag: None,
            emas: Vec::new(),
            bands: Vec::new(),
            show_bands: true,
            status: Status::Busy("loading"),
        };
        let task = app.reload();
        (app, task)
    }

    fn title(&self) -> String {
        format!("{} {} - Candlepad", self.symbol, self.interval)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn reload(&self) -> Task<Message> {
        let candles = {
            let client = self.api.clone();
            let symbol = self.symbol.clone();
            let interval = self.interval;
            Task::perform(
                async move { client.candles(symbol, interval, 0, now_ms()).await },
                Message::CandlesFetched,
            )
        };
        let drawings = {
            let client = self.api.clone();
            let symbol = self.symbol.clone();
            Task::perform(
                async move { client.drawings(symbol).await },
                Message::DrawingsFetched,
            )
        };
        Task::batch([candles, drawings])
    }

    fn displayed_len(&self) -> usize {
        self.replay.display_len(self.candles.len())
    }

    /// Recompute everything derived from the displayed window. Called
    /// after every state change that affects it, instead of an
    /// implicit observer graph.
    fn refresh_derived(&mut self) {
        let len = self.replay.display_len(self.candles.len());
        let shown = &self.candles[..len];

        self.emas = EMA_PERIODS
            .iter()
            .map(|&period| (period, data::series::ema(shown, period)))
            .collect();
        self.bands = if self.show_bands {
            data::series::monday_ranges(shown, self.interval)
        } else {
            Vec::new()
        };
        self.view.set_display(shown, self.interval);
    }

    fn create_annotation(
        &mut self,
        kind: AnnotationKind,
        points: Vec<DrawingPoint>,
    ) -> Task<Message> {
        let client = self.api.clone();
        let symbol = self.symbol.clone();
        self.status = Status::Busy("saving");
        self.active_tool = None;
        Task::perform(
            async move { client.create_drawing(symbol, kind, points, None).await },
            Message::DrawingCreated,
        )
    }

    /// One-click trade plans get a default risk/reward shape around
    /// the entry, editable by handle drags afterwards.
    fn position_points(&self, kind: AnnotationKind, entry: DrawingPoint) -> Vec<DrawingPoint> {
        let risk = self.view.price_step() * 8.0;
        let reward = risk * 2.0;
        let (stop, profit) = match kind {
            AnnotationKind::ShortPos => (entry.price + risk, entry.price - reward),
            _ => (entry.price - risk, entry.price + reward),
        };
        let extent = entry.time + POSITION_EXTENT_BARS * self.interval.to_milliseconds();
        vec![
            entry,
            DrawingPoint::new(entry.time, stop),
            DrawingPoint::new(entry.time, profit),
            DrawingPoint::new(extent, entry.price),
        ]
    }

    fn handle_tool_click(&mut self, tool: AnnotationKind, pos: Point) -> Task<Message> {
        let (Some(time), Some(price)) = (self.view.x_to_time(pos.x), self.view.y_to_price(pos.y))
        else {
            return Task::none();
        };
        let point = DrawingPoint::new(time, price);

        match tool.point_count() {
            1 => self.create_annotation(tool, vec![point]),
            2 => {
                self.pending_points.push(point);
                if self.pending_points.len() == 2 {
                    let points = std::mem::take(&mut self.pending_points);
                    self.create_annotation(tool, points)
                } else {
                    Task::none()
                }
            }
            _ => {
                let points = self.position_points(tool, point);
                self.create_annotation(tool, points)
            }
        }
    }

    fn handle_chart_click(&mut self, pos: Point) -> Task<Message> {
        if self.marking_start {
            self.marking_start = false;
            if self.candles.is_empty() {
                return Task::none();
            }
            let last = (self.candles.len() - 1) as f64;
            let index = self.view.x_to_index(pos.x).round().clamp(0.0, last) as usize;
            self.replay.set_start(index);
            self.refresh_derived();
            return Task::none();
        }

        if let Some(tool) = self.active_tool {
            return self.handle_tool_click(tool, pos);
        }

        let hit = hit_test::hit_test(
            self.store.as_slice(),
            pos,
            |t| self.view.time_to_x(t),
            |p| self.view.price_to_y(p),
        );
        self.store.select(hit);
        self.view.cache.clear_overlay();
        Task::none()
    }

    fn apply_drag(&mut self, pos: Point) {
        let Some(drag) = &mut self.drag else {
            return;
        };
        let view = &self.view;
        let time_at = |x: f32| view.x_to_time(x);
        let (Some(t_now), Some(t_origin)) = (time_at(pos.x), time_at(drag.origin.x)) else {
            return;
        };
        let (Some(p_now), Some(p_origin)) =
            (view.y_to_price(pos.y), view.y_to_price(drag.origin.y))
        else {
            return;
        };
        let dt = t_now as i64 - t_origin as i64;
        let dp = p_now - p_origin;

        let shift_time = |time: u64| (time as i64 + dt).max(0) as u64;
        drag.preview = drag.original.clone();
        match drag.grab {
            Grab::Body => {
                for point in &mut drag.preview.points {
                    point.time = shift_time(point.time);
                    point.price += dp;
                }
            }
            Grab::Handle(PositionHandle::TakeProfit) => {
                drag.preview.points[2].price += dp;
            }
            Grab::Handle(PositionHandle::StopLoss) => {
                drag.preview.points[1].price += dp;
            }
            Grab::Handle(PositionHandle::TimeExtent) => {
                drag.preview.points[3].time = shift_time(drag.preview.points[3].time);
            }
        }
        self.view.cache.clear_overlay();
    }

    fn update_chart(&mut self, message: chart::Message) -> Task<Message> {
        match message {
            chart::Message::BoundsChanged(size) => {
                self.view.set_bounds(size);
            }
            chart::Message::Translated(translation) => {
                self.view.apply_translation(translation);
            }
            chart::Message::Scaled(scaling, translation) => {
                self.view.apply_scaling(scaling, translation);
            }
            chart::Message::CrosshairMoved(_) => {}
            chart::Message::Clicked(pos) => return self.handle_chart_click(pos),
            chart::Message::DragStarted { id, grab, origin } => {
                if let Some(annotation) = self.store.get(id) {
                    self.drag = Some(DragState {
                        grab,
                        origin,
                        original: annotation.clone(),
                        preview: annotation.clone(),
                    });
                }
            }
            chart::Message::Dragged(pos) => self.apply_drag(pos),
            chart::Message::DragEnded => {
                if let Some(drag) = self.drag.take() {
                    if drag.preview.points != drag.original.points {
                        let client = self.api.clone();
                        let id = drag.original.id;
                        let patch = AnnotationPatch::points(drag.preview.points);
                        self.status = Status::Busy("saving");
                        return Task::perform(
                            async move { client.update_drawing(id, patch).await },
                            Message::DrawingUpdated,
                        );
                    }
                    self.view.cache.clear_overlay();
                }
            }
        }
        Task::none()
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Chart(msg) => return self.update_chart(msg),
            Message::CandlesFetched(Ok(candles)) => {
                self.candles = candles;
                self.view.fit_price_axis(&self.candles);
                self.refresh_derived();
                self.status = Status::Ready;
            }
            Message::CandlesFetched(Err(e)) => {
                log::error!("candle fetch failed: {e}");
                self.status = Status::Error(e.to_string());
            }
            Message::DrawingsFetched(Ok(drawings)) => {
                self.store.replace_all(drawings);
                self.view.cache.clear_overlay();
            }
            Message::DrawingsFetched(Err(e)) => {
                log::error!("drawings fetch failed: {e}");
                self.status = Status::Error(e.to_string());
            }
            Message::IntervalSelected(interval) => {
                self.interval = interval;
                self.replay.reset();
                self.pending_points.clear();
                self.marking_start = false;
                self.status = Status::Busy("loading");
                return self.reload();
            }
            Message::SyncRequested => {
                let client = self.api.clone();
                let symbol = self.symbol.clone();
                let interval = self.interval;
                self.status = Status::Busy("syncing");
                return Task::perform(
                    async move { client.sync(symbol, interval).await },
                    Message::SyncFinished,
                );
            }
            Message::SyncFinished(Ok(summary)) => {
                log::info!(
                    "sync {} {}: {} new bars",
                    summary.symbol,
                    summary.interval,
                    summary.inserted
                );
                self.status = Status::Ready;
                return self.reload();
            }
            Message::SyncFinished(Err(e)) => {
                log::error!("sync failed: {e}");
                self.status = Status::Error(e.to_string());
            }
            Message::ToolToggled(kind) => {
                self.pending_points.clear();
                self.marking_start = false;
                self.active_tool = if self.active_tool == Some(kind) {
                    None
                } else {
                    Some(kind)
                };
            }
            Message::DeleteSelected => {
                if let Some(id) = self.store.selected_id() {
                    let client = self.api.clone();
                    self.status = Status::Busy("deleting");
                    return Task::perform(
                        async move { client.delete_drawing(id).await },
                        Message::DrawingDeleted,
                    );
                }
            }
            Message::DrawingCreated(Ok(annotation)) => {
                let id = annotation.id;
                self.store.apply_created(annotation);
                self.store.select(Some(id));
                self.view.cache.clear_overlay();
                self.status = Status::Ready;
            }
            Message::DrawingCreated(Err(e)) => {
                log::error!("drawing create failed: {e}");
                self.status = Status::Error(e.to_string());
            }
            Message::DrawingUpdated(Ok(annotation)) => {
                self.store.apply_updated(annotation);
                self.view.cache.clear_overlay();
                self.status = Status::Ready;
            }
            Message::DrawingUpdated(Err(e)) => {
                log::error!("drawing update failed: {e}");
                self.view.cache.clear_overlay();
                self.status = Status::Error(e.to_string());
            }
            Message::DrawingDeleted(Ok(id)) => {
                self.store.apply_deleted(id);
                self.view.cache.clear_overlay();
                self.status = Status::Ready;
            }
            Message::DrawingDeleted(Err(e)) => {
                log::error!("drawing delete failed: {e}");
                self.status = Status::Error(e.to_string());
            }
            Message::ReplayMarkRequested => {
                self.marking_start = true;
                self.active_tool = None;
                self.pending_points.clear();
            }
            Message::ReplayToggled => {
                if self.replay.is_running() {
                    self.replay.pause();
                    // Pausing exits drawing mode.
                    self.active_tool = None;
                    self.pending_points.clear();
                } else {
                    self.replay.start();
                    self.refresh_derived();
                }
            }
            Message::ReplayReset => {
                self.replay.reset();
                self.store.select(None);
                self.refresh_derived();
            }
            Message::SpeedSelected(speed) => {
                self.replay.set_speed(speed);
            }
            Message::AutoFollowToggled(enabled) => {
                self.replay.auto_follow = enabled;
            }
            Message::BandsToggled(enabled) => {
                self.show_bands = enabled;
                self.refresh_derived();
            }
            Message::ReplayTick => {
                let was_running = self.replay.is_running();
                let last_index = self.candles.len().saturating_sub(1);
                if self.replay.tick(last_index).is_some() {
                    self.refresh_derived();
                    if let Some((from, to)) = self.replay.follow_window() {
                        self.view.set_visible_logical_range(from, to);
                    }
                } else if was_running && !self.replay.is_running() {
                    // Pausing at the end of data exits drawing mode the
                    // same way a manual pause does.
                    self.active_tool = None;
                    self.pending_points.clear();
                }
            }
        }
        Task::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        // Recreated whenever speed or the running flag changes, so at
        // most one timer is ever live.
        if self.replay.is_running() {
            iced::time::every(self.replay.speed.tick_interval()).map(|_| Message::ReplayTick)
        } else {
            Subscription::none()
        }
    }

    fn status_line(&self) -> String {
        let replay = match (self.replay.phase(), self.replay.current_index()) {
            (Phase::Idle, _) => String::new(),
            (Phase::Prepared, _) => format!(
                " | replay armed at bar {}",
                self.replay.start_index().unwrap_or(0)
            ),
            (phase, Some(index)) => format!(
                " | replay {}/{} ({})",
                index + 1,
                self.candles.len(),
                if phase == Phase::Running { "playing" } else { "paused" },
            ),
            (_, None) => String::new(),
        };
        let tool = match self.active_tool {
            Some(kind) => format!(" | tool: {kind}"),
            None if self.marking_start => " | click a bar to set replay start".to_owned(),
            None => String::new(),
        };
        let status = match &self.status {
            Status::Ready => format!("{} bars", self.displayed_len()),
            Status::Busy(what) => (*what).to_owned(),
            Status::Error(e) => format!("error: {e}"),
        };
        format!("{status}{replay}{tool}")
    }

    fn view(&self) -> Element<'_, Message> {
        let tools = AnnotationKind::ALL.iter().fold(
            row![].spacing(4),
            |r, kind| r.push(button(text(kind.to_string())).on_press(Message::ToolToggled(*kind))),
        );

        let toolbar = row![
            pick_list(
                Interval::ALL,
                Some(self.interval),
                Message::IntervalSelected
            ),
            button("Sync").on_press(Message::SyncRequested),
            tools,
            button("Delete").on_press_maybe(
                self.store.selected_id().map(|_| Message::DeleteSelected)
            ),
        ]
        .spacing(8)
        .padding(8);

        let replay_label = if self.replay.is_running() {
            "Pause"
        } else {
            "Play"
        };
        let replay_bar = row![
            button("Mark start").on_press(Message::ReplayMarkRequested),
            button(replay_label).on_press(Message::ReplayToggled),
            button("Reset").on_press(Message::ReplayReset),
            pick_list(Speed::ALL, Some(self.replay.speed), Message::SpeedSelected),
            checkbox(self.replay.auto_follow)
                .label("Follow")
                .on_toggle(Message::AutoFollowToggled),
            checkbox(self.show_bands)
                .label("Monday bands")
                .on_toggle(Message::BandsToggled),
        ]
        .spacing(8)
        .padding(8);

        let shown = &self.candles[..self.displayed_len()];
        let chart: Element<'_, chart::Message> = canvas(ChartCanvas {
            state: &self.view,
            candles: shown,
            interval: self.interval,
            store: &self.store,
            active_tool: self.active_tool,
            pending_points: &self.pending_points,
            drag_preview: self.drag.as_ref().map(|d| &d.preview),
            emas: &self.emas,
            bands: &self.bands,
            replay_active: self.replay.is_active(),
            marking_start: self.marking_start,
        })
        .width(Fill)
        .height(Fill)
        .into();

        let content = column![
            toolbar,
            replay_bar,
            chart.map(Message::Chart),
            text(self.status_line()).size(12),
        ];
        container(content).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: u64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 59_999,
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 10.0,
        }
    }

    #[test]
    fn pause_at_end_of_data_exits_drawing_mode() {
        let (mut app, _) = Candlepad::new();
        app.candles = (0..3).map(|i| candle(i * 60_000)).collect();
        app.replay.set_start(2);
        app.replay.start();
        app.active_tool = Some(AnnotationKind::HLine);
        app.pending_points.push(DrawingPoint::new(0, 100.0));

        let _ = app.update(Message::ReplayTick);

        assert!(!app.replay.is_running());
        assert!(app.active_tool.is_none());
        assert!(app.pending_points.is_empty());
    }

    #[test]
    fn manual_pause_exits_drawing_mode() {
        let (mut app, _) = Candlepad::new();
        app.candles = (0..3).map(|i| candle(i * 60_000)).collect();
        app.replay.set_start(0);
        app.replay.start();
        app.active_tool = Some(AnnotationKind::Rect);

        let _ = app.update(Message::ReplayToggled);

        assert!(!app.replay.is_running());
        assert!(app.active_tool.is_none());
    }
}
