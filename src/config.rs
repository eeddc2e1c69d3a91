//! Visualization configuration: the declarative description of one lesson
//! step's graph.
//!
//! The JSON shape mirrors what lesson content (authored or generated) already
//! uses: camelCase fields, a `"type"` tag per element and two-element arrays
//! for ranges. Loading is lenient so a single odd element cannot reject a whole
//! lesson; [`VisualizationConfig::validate`] is the strict check applied at the
//! untrusted-input boundary.

use std::borrow::Cow;
use std::collections::HashSet;
use std::f64::consts::TAU;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::scope::{is_bindable, Scope, LOWER_T, UPPER_T};
use crate::{parse_variable_names, ParseError};

/// A closed interval written as `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Finite with `min < max`.
    pub fn is_proper(&self) -> bool {
        self.is_finite() && self.min < self.max
    }
}

impl From<[f64; 2]> for Range {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

impl From<Range> for [f64; 2] {
    fn from(range: Range) -> Self {
        [range.min, range.max]
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    #[default]
    Solid,
    Dashed,
    Dotted,
}

impl LineStyle {
    /// Dash and gap lengths in pixels, `None` for a continuous stroke.
    pub fn dash_pattern(self) -> Option<[f64; 2]> {
        match self {
            Self::Solid => None,
            Self::Dashed => Some([6.0, 6.0]),
            Self::Dotted => Some([3.0, 3.0]),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationConfig {
    pub x_domain: Range,
    pub y_domain: Range,
    pub param_range: Range,
    #[serde(default)]
    pub param_label: String,
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// Fields every element carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementBase {
    /// Series key and owner of the element's derived render data.
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default)]
    pub style: LineStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ElementBase {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            color: default_color(),
            stroke_width: None,
            style: LineStyle::Solid,
            label: None,
        }
    }
}

fn default_color() -> String {
    "#3b82f6".to_string()
}

fn zero() -> String {
    "0".to_string()
}

/// Accepts an expression written either as a string or as a bare JSON number.
fn expression_source<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Source {
        Text(String),
        Number(f64),
    }

    Ok(match Source::deserialize(deserializer)? {
        Source::Text(text) => text,
        Source::Number(number) => number.to_string(),
    })
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Element {
    Function(FunctionElement),
    Parametric(ParametricElement),
    Point(PointElement),
    Line(SegmentElement),
    Vector(SegmentElement),
    #[serde(rename = "v-line")]
    VLine(VLineElement),
    #[serde(rename = "h-line")]
    HLine(HLineElement),
    Area(AreaElement),
    Text(TextElement),
}

/// `y = f(x, t)`, sampled over the x domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default, deserialize_with = "expression_source")]
    pub expression: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParametricElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default, deserialize_with = "expression_source")]
    pub x_expression: String,
    #[serde(default, deserialize_with = "expression_source")]
    pub y_expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<usize>,
    /// Local name of the curve parameter. See
    /// [`ParametricElement::curve_variable`] for the name used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve_variable: Option<String>,
}

impl ParametricElement {
    pub const DEFAULT_RANGE: Range = Range::new(0.0, TAU);
    pub const DEFAULT_STEPS: usize = 100;

    pub fn curve_range(&self) -> Range {
        self.t_range.unwrap_or(Self::DEFAULT_RANGE)
    }

    pub fn steps(&self) -> usize {
        self.steps.unwrap_or(Self::DEFAULT_STEPS)
    }

    /// The explicit `curveVariable` if set. Otherwise the single free name
    /// other than `t` and `T` that the two expressions use, and `t` when there
    /// is no such name or more than one.
    pub fn curve_variable(&self) -> Cow<'_, str> {
        match &self.curve_variable {
            Some(name) => Cow::Borrowed(name),
            None => self
                .inferred_curve_variable()
                .map_or(Cow::Borrowed(LOWER_T), Cow::Owned),
        }
    }

    fn inferred_curve_variable(&self) -> Option<String> {
        let mut names = HashSet::new();
        for text in [&self.x_expression, &self.y_expression] {
            names.extend(parse_variable_names(text).ok()?);
        }
        names.remove(LOWER_T);
        names.remove(UPPER_T);

        let mut names = names.into_iter();
        match (names.next(), names.next()) {
            (Some(name), None) if is_bindable(&name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub x: String,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub y: String,
    /// Dot radius in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
}

/// Shared by `line` and `vector`; a vector is drawn with an arrow head at
/// `(x2, y2)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub x1: String,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub y1: String,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub x2: String,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub y2: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VLineElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub x: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HLineElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub y: String,
}

/// The band between `y1(x, t)` and `y2(x, t)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub y1: String,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub y2: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub x: String,
    #[serde(default = "zero", deserialize_with = "expression_source")]
    pub y: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Function,
    Parametric,
    Point,
    Line,
    Vector,
    VLine,
    HLine,
    Area,
    Text,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Function => "function",
            Self::Parametric => "parametric",
            Self::Point => "point",
            Self::Line => "line",
            Self::Vector => "vector",
            Self::VLine => "v-line",
            Self::HLine => "h-line",
            Self::Area => "area",
            Self::Text => "text",
        })
    }
}

impl Element {
    pub fn base(&self) -> &ElementBase {
        match self {
            Self::Function(e) => &e.base,
            Self::Parametric(e) => &e.base,
            Self::Point(e) => &e.base,
            Self::Line(e) | Self::Vector(e) => &e.base,
            Self::VLine(e) => &e.base,
            Self::HLine(e) => &e.base,
            Self::Area(e) => &e.base,
            Self::Text(e) => &e.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Function(_) => ElementKind::Function,
            Self::Parametric(_) => ElementKind::Parametric,
            Self::Point(_) => ElementKind::Point,
            Self::Line(_) => ElementKind::Line,
            Self::Vector(_) => ElementKind::Vector,
            Self::VLine(_) => ElementKind::VLine,
            Self::HLine(_) => ElementKind::HLine,
            Self::Area(_) => ElementKind::Area,
            Self::Text(_) => ElementKind::Text,
        }
    }

    /// The variables this element's expressions are compiled against.
    pub fn scope(&self) -> Scope {
        match self {
            Self::Function(_) | Self::Area(_) => Scope::function(),
            Self::Parametric(e) => Scope::curve(&e.curve_variable()),
            Self::Point(_)
            | Self::Line(_)
            | Self::Vector(_)
            | Self::VLine(_)
            | Self::HLine(_)
            | Self::Text(_) => Scope::annotation(),
        }
    }

    /// Every expression the element holds, keyed by its field name.
    pub fn expressions(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::Function(e) => vec![("expression", e.expression.as_str())],
            Self::Parametric(e) => vec![
                ("xExpression", e.x_expression.as_str()),
                ("yExpression", e.y_expression.as_str()),
            ],
            Self::Point(e) => vec![("x", e.x.as_str()), ("y", e.y.as_str())],
            Self::Line(e) | Self::Vector(e) => vec![
                ("x1", e.x1.as_str()),
                ("y1", e.y1.as_str()),
                ("x2", e.x2.as_str()),
                ("y2", e.y2.as_str()),
            ],
            Self::VLine(e) => vec![("x", e.x.as_str())],
            Self::HLine(e) => vec![("y", e.y.as_str())],
            Self::Area(e) => vec![("y1", e.y1.as_str()), ("y2", e.y2.as_str())],
            Self::Text(e) => vec![("x", e.x.as_str()), ("y", e.y.as_str())],
        }
    }
}

/// One problem found by [`VisualizationConfig::validate`].
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum ValidationIssue {
    #[error("{axis} must be finite with min < max, found {range}")]
    InvalidDomain { axis: &'static str, range: Range },

    #[error("paramRange must be finite, found {range}")]
    InvalidParamRange { range: Range },

    #[error("element #{index} has an empty id")]
    EmptyId { index: usize },

    #[error("element id `{id}` is used more than once")]
    DuplicateId { id: String },

    #[error("element `{id}`: {field} `{text}` is invalid: {error}")]
    Expression {
        id: String,
        field: &'static str,
        text: String,
        #[source]
        error: ParseError,
    },

    #[error("element `{id}`: steps must be at least 1")]
    ZeroSteps { id: String },

    #[error("element `{id}`: tRange must be finite, found {range}")]
    InvalidCurveRange { id: String, range: Range },

    #[error("element `{id}`: `{name}` cannot name a curve variable")]
    InvalidCurveVariable { id: String, name: String },
}

#[derive(thiserror::Error, Clone, Debug, PartialEq)]
#[error("{}", join_issues(issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid visualization config: {0}")]
    Schema(#[from] serde_path_to_error::Error<serde_json::Error>),

    #[error("invalid visualization config: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl VisualizationConfig {
    /// Load a configuration from JSON. Errors name the path of the offending
    /// value. Expressions are not checked; see [`Self::validate`].
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(input);
        let config = serde_path_to_error::deserialize(&mut deserializer)?;
        deserializer.end()?;
        Ok(config)
    }

    /// Load and validate a configuration from a source that cannot be
    /// trusted, such as generated lesson content.
    pub fn from_untrusted_json(input: &str) -> Result<Self, ConfigError> {
        let config = Self::from_json(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.id() == id)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let issues = self.issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Every problem with this configuration, in element order.
    pub fn issues(&self) -> Vec<ValidationIssue> {
        let mut issues = vec![];

        for (axis, range) in [("xDomain", self.x_domain), ("yDomain", self.y_domain)] {
            if !range.is_proper() {
                issues.push(ValidationIssue::InvalidDomain { axis, range });
            }
        }
        // A collapsed parameter range is allowed; it pins `t` to a constant.
        if !self.param_range.is_finite() {
            issues.push(ValidationIssue::InvalidParamRange {
                range: self.param_range,
            });
        }

        let mut seen = HashSet::new();
        for (index, element) in self.elements.iter().enumerate() {
            let id = element.id();
            if id.is_empty() {
                issues.push(ValidationIssue::EmptyId { index });
            } else if !seen.insert(id) {
                issues.push(ValidationIssue::DuplicateId { id: id.to_string() });
            }

            if let Element::Parametric(parametric) = element {
                let name = parametric.curve_variable();
                if !is_bindable(&name) || name == UPPER_T {
                    issues.push(ValidationIssue::InvalidCurveVariable {
                        id: id.to_string(),
                        name: name.to_string(),
                    });
                    continue;
                }
                if parametric.steps() == 0 {
                    issues.push(ValidationIssue::ZeroSteps { id: id.to_string() });
                }
                let range = parametric.curve_range();
                if !range.is_finite() {
                    issues.push(ValidationIssue::InvalidCurveRange {
                        id: id.to_string(),
                        range,
                    });
                }
            }

            let scope = element.scope();
            for (field, text) in element.expressions() {
                if let Err(error) = scope.compile(text) {
                    issues.push(ValidationIssue::Expression {
                        id: id.to_string(),
                        field,
                        text: text.to_string(),
                        error,
                    });
                }
            }
        }

        issues
    }
}
