pub mod store;

use serde::{Deserialize, Serialize};

pub use store::AnnotationStore;

/// A time/price anchor for drawing geometry. Pure value type.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct DrawingPoint {
    pub time: u64,
    pub price: f64,
}

impl DrawingPoint {
    pub fn new(time: u64, price: f64) -> Self {
        Self { time, price }
    }
}

/// The tagged union of drawing tools. The tag string is what the wire
/// and the drawings table carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    HLine,
    Rect,
    Fibo,
    #[serde(rename = "pricerange")]
    PriceRange,
    #[serde(rename = "longpos")]
    LongPos,
    #[serde(rename = "shortpos")]
    ShortPos,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 6] = [
        AnnotationKind::HLine,
        AnnotationKind::Rect,
        AnnotationKind::Fibo,
        AnnotationKind::PriceRange,
        AnnotationKind::LongPos,
        AnnotationKind::ShortPos,
    ];

    /// Exact number of anchor points each variant carries: 1 for
    /// horizontal lines, 2 opposite corners for box-like shapes, and
    /// 4 (entry, stop-loss, take-profit, time-extent) for positions.
    pub fn point_count(self) -> usize {
        match self {
            AnnotationKind::HLine => 1,
            AnnotationKind::Rect | AnnotationKind::Fibo | AnnotationKind::PriceRange => 2,
            AnnotationKind::LongPos | AnnotationKind::ShortPos => 4,
        }
    }

    pub fn is_position(self) -> bool {
        matches!(self, AnnotationKind::LongPos | AnnotationKind::ShortPos)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::HLine => "hline",
            AnnotationKind::Rect => "rect",
            AnnotationKind::Fibo => "fibo",
            AnnotationKind::PriceRange => "pricerange",
            AnnotationKind::LongPos => "longpos",
            AnnotationKind::ShortPos => "shortpos",
        }
    }
}

impl std::fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnnotationKind {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hline" => Ok(AnnotationKind::HLine),
            "rect" => Ok(AnnotationKind::Rect),
            "fibo" => Ok(AnnotationKind::Fibo),
            "pricerange" => Ok(AnnotationKind::PriceRange),
            "longpos" => Ok(AnnotationKind::LongPos),
            "shortpos" => Ok(AnnotationKind::ShortPos),
            other => Err(AnnotationError::UnknownKind(other.to_owned())),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("unknown annotation type: {0:?}")]
    UnknownKind(String),
    #[error("{kind} requires {expected} point(s), got {got}")]
    PointCount {
        kind: AnnotationKind,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

/// Open style bag carried by every annotation. Fields are optional so
/// partial patches merge over what is already set.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_style: Option<LineStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

pub const FIBO_DEFAULT_LEVELS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

impl Style {
    /// Per-kind creation defaults layered under whatever the caller set.
    pub fn defaults_for(kind: AnnotationKind) -> Self {
        let mut style = Style {
            color: Some("#2962ff".to_owned()),
            width: Some(1.0),
            line_style: Some(LineStyle::Solid),
            ..Style::default()
        };
        match kind {
            AnnotationKind::Rect | AnnotationKind::PriceRange => {
                style.fill = Some("#2962ff26".to_owned());
            }
            AnnotationKind::Fibo => {
                style.levels = Some(FIBO_DEFAULT_LEVELS.to_vec());
            }
            AnnotationKind::LongPos | AnnotationKind::ShortPos => {
                style.mode = Some("position".to_owned());
            }
            AnnotationKind::HLine => {}
        }
        style
    }

    /// Overlay `patch` onto `self`, keeping fields the patch left unset.
    pub fn merge(&mut self, patch: Style) {
        if patch.color.is_some() {
            self.color = patch.color;
        }
        if patch.width.is_some() {
            self.width = patch.width;
        }
        if patch.line_style.is_some() {
            self.line_style = patch.line_style;
        }
        if patch.fill.is_some() {
            self.fill = patch.fill;
        }
        if patch.levels.is_some() {
            self.levels = patch.levels;
        }
        if patch.mode.is_some() {
            self.mode = patch.mode;
        }
    }

    pub fn levels_or_default(&self) -> Vec<f64> {
        self.levels
            .clone()
            .unwrap_or_else(|| FIBO_DEFAULT_LEVELS.to_vec())
    }
}

/// A persisted drawing object. Identity is the server-assigned `id`;
/// points and style are mutable, `kind` and `symbol` are not.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: i64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub kind: AnnotationKind,
    pub points: Vec<DrawingPoint>,
    pub style: Style,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Annotation {
    pub fn validate_points(
        kind: AnnotationKind,
        points: &[DrawingPoint],
    ) -> Result<(), AnnotationError> {
        let expected = kind.point_count();
        if points.len() != expected {
            return Err(AnnotationError::PointCount {
                kind,
                expected,
                got: points.len(),
            });
        }
        Ok(())
    }

    // Position point layout: [entry, stop_loss, take_profit, time_extent].
    pub fn entry(&self) -> Option<&DrawingPoint> {
        self.kind.is_position().then(|| &self.points[0])
    }

    pub fn stop_loss(&self) -> Option<&DrawingPoint> {
        self.kind.is_position().then(|| &self.points[1])
    }

    pub fn take_profit(&self) -> Option<&DrawingPoint> {
        self.kind.is_position().then(|| &self.points[2])
    }

    pub fn time_extent(&self) -> Option<&DrawingPoint> {
        self.kind.is_position().then(|| &self.points[3])
    }
}

/// Partial update payload for `PUT /api/drawings/:id`. The annotation
/// type and symbol are deliberately not representable here.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnnotationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<DrawingPoint>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Style>,
}

impl AnnotationPatch {
    pub fn is_empty(&self) -> bool {
        self.points.is_none() && self.style.is_none()
    }

    pub fn points(points: Vec<DrawingPoint>) -> Self {
        Self {
            points: Some(points),
            style: None,
        }
    }

    pub fn style(style: Style) -> Self {
        Self {
            points: None,
            style: Some(style),
        }
    }
}

/// Price rows of a fibonacci retracement: `low + (high - low) * level`
/// for each configured level, with the corner ordering normalized.
pub fn fibo_level_prices(a: &DrawingPoint, b: &DrawingPoint, levels: &[f64]) -> Vec<f64> {
    let low = a.price.min(b.price);
    let high = a.price.max(b.price);
    levels.iter().map(|level| low + (high - low) * level).collect()
}
