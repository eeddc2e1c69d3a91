//! Scene assembly: a configuration plus one control value in, literal
//! geometry out.
//!
//! Expressions are compiled once per [`SceneAssembler`]; each call to
//! [`SceneAssembler::assemble`] rebuilds the whole [`Scene`] from scratch. An
//! element whose expressions do not compile, or whose coordinates are not
//! finite, is left out (or, for sampled curves, rendered as gaps) and never
//! affects its neighbours.

use serde::Serialize;

use crate::config::{Element, ElementBase, Range, VisualizationConfig};
use crate::param::ParameterReadout;
use crate::sample::{Sampler, DEFAULT_RESOLUTION};
use crate::trace::CurveExpressions;
use crate::{ParseError, RealExpression, Registers};

pub const FUNCTION_STROKE_WIDTH: f64 = 4.0;
pub const STROKE_WIDTH: f64 = 2.0;
pub const POINT_RADIUS: f64 = 6.0;
pub const FONT_SIZE: f64 = 12.0;
pub const AREA_OPACITY: f64 = 0.3;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub parameter: ParameterReadout,
    pub x_domain: Range,
    pub y_domain: Range,
    pub curves: CurveTable,
    pub parametric: Vec<ParametricCurve>,
    pub annotations: Vec<Annotation>,
}

/// Function and area elements sampled on one shared x grid: row `i` of every
/// series belongs to `xs[i]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveTable {
    pub xs: Vec<f64>,
    pub series: Vec<CurveSeries>,
}

impl CurveTable {
    pub fn column(&self, id: &str) -> Option<&CurveSeries> {
        self.series.iter().find(|s| s.id == id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveSeries {
    pub id: String,
    pub stroke: Stroke,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub values: SeriesValues,
}

/// `None` marks a gap: the curve is broken there, not interpolated across.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SeriesValues {
    Line {
        interpolation: Interpolation,
        values: Vec<Option<f64>>,
    },
    /// `[y1, y2]` per row.
    Band {
        opacity: f64,
        values: Vec<Option<[f64; 2]>>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Interpolation {
    Monotone,
    Step,
}

impl Interpolation {
    /// Lesson content marks staircase functions by their id.
    fn for_id(id: &str) -> Self {
        if id.contains("step") {
            Self::Step
        } else {
            Self::Monotone
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub color: String,
    pub width: f64,
    /// Dash and gap lengths, absent for a solid stroke.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash: Option<[f64; 2]>,
}

impl Stroke {
    fn new(base: &ElementBase, default_width: f64) -> Self {
        Self {
            color: base.color.clone(),
            width: base.stroke_width.unwrap_or(default_width),
            dash: base.style.dash_pattern(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParametricCurve {
    pub id: String,
    pub stroke: Stroke,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub points: Vec<[f64; 2]>,
}

/// A single-evaluation element with resolved coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Annotation {
    Point {
        id: String,
        color: String,
        x: f64,
        y: f64,
        radius: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Lines and vectors; a vector has an arrow head at `to`.
    Segment {
        id: String,
        stroke: Stroke,
        from: [f64; 2],
        to: [f64; 2],
        arrow: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    VLine {
        id: String,
        stroke: Stroke,
        x: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    HLine {
        id: String,
        stroke: Stroke,
        y: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Text {
        id: String,
        color: String,
        x: f64,
        y: f64,
        content: String,
        #[serde(rename = "fontSize")]
        font_size: f64,
    },
}

impl Annotation {
    pub fn id(&self) -> &str {
        match self {
            Self::Point { id, .. }
            | Self::Segment { id, .. }
            | Self::VLine { id, .. }
            | Self::HLine { id, .. }
            | Self::Text { id, .. } => id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AssemblerOptions {
    /// Step count of the shared x grid.
    pub resolution: usize,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

enum Compiled {
    Function(RealExpression<f64>),
    Area([RealExpression<f64>; 2]),
    Parametric(CurveExpressions),
    /// Coordinates in the order of [`Element::expressions`].
    Annotation(Vec<RealExpression<f64>>),
}

/// A configuration with every expression compiled, ready to be assembled at
/// any control value.
pub struct SceneAssembler<'a> {
    config: &'a VisualizationConfig,
    options: AssemblerOptions,
    compiled: Vec<Option<Compiled>>,
}

impl<'a> SceneAssembler<'a> {
    pub fn new(config: &'a VisualizationConfig) -> Self {
        Self::with_options(config, AssemblerOptions::default())
    }

    pub fn with_options(config: &'a VisualizationConfig, options: AssemblerOptions) -> Self {
        let compiled = config
            .elements
            .iter()
            .map(|element| match compile(element) {
                Ok(compiled) => Some(compiled),
                Err((field, error)) => {
                    tracing::warn!(
                        id = element.id(),
                        kind = %element.kind(),
                        field,
                        %error,
                        "element expression failed to compile"
                    );
                    None
                }
            })
            .collect();
        Self {
            config,
            options,
            compiled,
        }
    }

    pub fn config(&self) -> &VisualizationConfig {
        self.config
    }

    /// Build the scene for an interactive control value in `0..=100`.
    pub fn assemble(&self, control: f64) -> Scene {
        let parameter = ParameterReadout::for_control(self.config, control);
        let t = parameter.value;

        let mut sampler = Sampler::new(self.config.x_domain, self.options.resolution, t);
        let mut scalar = Registers::new(1);
        let mut curves = CurveTable {
            xs: sampler.grid().values().to_vec(),
            series: vec![],
        };
        let mut parametric = vec![];
        let mut annotations = vec![];

        for (element, compiled) in self.config.elements.iter().zip(&self.compiled) {
            match (element, compiled) {
                (Element::Function(function), compiled) => {
                    let values = match compiled {
                        Some(Compiled::Function(expression)) => sampler.sample_values(expression),
                        _ => sampler.gaps(),
                    };
                    curves.series.push(CurveSeries {
                        id: function.base.id.clone(),
                        stroke: Stroke::new(&function.base, FUNCTION_STROKE_WIDTH),
                        label: function.base.label.clone(),
                        values: SeriesValues::Line {
                            interpolation: Interpolation::for_id(&function.base.id),
                            values,
                        },
                    });
                }
                (Element::Area(area), compiled) => {
                    let values = match compiled {
                        Some(Compiled::Area([y1, y2])) => {
                            let lower = sampler.sample_values(y1);
                            let upper = sampler.sample_values(y2);
                            lower
                                .into_iter()
                                .zip(upper)
                                .map(|(lower, upper)| Some([lower?, upper?]))
                                .collect()
                        }
                        _ => vec![None; curves.xs.len()],
                    };
                    curves.series.push(CurveSeries {
                        id: area.base.id.clone(),
                        stroke: Stroke::new(&area.base, STROKE_WIDTH),
                        label: area.base.label.clone(),
                        values: SeriesValues::Band {
                            opacity: area.opacity.unwrap_or(AREA_OPACITY),
                            values,
                        },
                    });
                }
                (Element::Parametric(element), Some(Compiled::Parametric(curve))) => {
                    parametric.push(ParametricCurve {
                        id: element.base.id.clone(),
                        stroke: Stroke::new(&element.base, STROKE_WIDTH),
                        label: element.base.label.clone(),
                        points: curve.trace(element.curve_range(), element.steps(), t),
                    });
                }
                (element, Some(Compiled::Annotation(coordinates))) => {
                    let values: Vec<f64> = coordinates
                        .iter()
                        .map(|expression| {
                            let output = expression.evaluate(&[[t]], &mut scalar);
                            let value = output[0];
                            scalar.recycle_real(output);
                            value
                        })
                        .collect();
                    if values.iter().all(|v| v.is_finite()) {
                        annotations.extend(annotate(element, &values));
                    } else {
                        tracing::debug!(
                            id = element.id(),
                            ?values,
                            "omitting annotation with non-finite coordinates"
                        );
                    }
                }
                // Failed to compile; already reported.
                (_, _) => {}
            }
        }

        tracing::trace!(
            t,
            rows = curves.xs.len(),
            series = curves.series.len(),
            parametric = parametric.len(),
            annotations = annotations.len(),
            "assembled scene"
        );

        Scene {
            parameter,
            x_domain: self.config.x_domain,
            y_domain: self.config.y_domain,
            curves,
            parametric,
            annotations,
        }
    }
}

/// Compile and assemble in one go.
pub fn assemble(config: &VisualizationConfig, control: f64) -> Scene {
    SceneAssembler::new(config).assemble(control)
}

fn compile(element: &Element) -> Result<Compiled, (&'static str, ParseError)> {
    let scope = element.scope();
    let compile_field =
        |field: &'static str, text: &str| scope.compile(text).map_err(|error| (field, error));

    Ok(match element {
        Element::Function(function) => {
            Compiled::Function(compile_field("expression", &function.expression)?)
        }
        Element::Area(area) => Compiled::Area([
            compile_field("y1", &area.y1)?,
            compile_field("y2", &area.y2)?,
        ]),
        Element::Parametric(curve) => Compiled::Parametric(CurveExpressions {
            x: compile_field("xExpression", &curve.x_expression)?,
            y: compile_field("yExpression", &curve.y_expression)?,
        }),
        Element::Point(_)
        | Element::Line(_)
        | Element::Vector(_)
        | Element::VLine(_)
        | Element::HLine(_)
        | Element::Text(_) => Compiled::Annotation(
            element
                .expressions()
                .into_iter()
                .map(|(field, text)| compile_field(field, text))
                .collect::<Result<_, _>>()?,
        ),
    })
}

fn annotate(element: &Element, values: &[f64]) -> Option<Annotation> {
    let base = element.base();
    let id = base.id.clone();
    let label = base.label.clone();
    Some(match (element, values) {
        (Element::Point(point), &[x, y]) => Annotation::Point {
            id,
            color: base.color.clone(),
            x,
            y,
            radius: point.r.unwrap_or(POINT_RADIUS),
            label,
        },
        (Element::Line(_) | Element::Vector(_), &[x1, y1, x2, y2]) => Annotation::Segment {
            id,
            stroke: Stroke::new(base, STROKE_WIDTH),
            from: [x1, y1],
            to: [x2, y2],
            arrow: matches!(element, Element::Vector(_)),
            label,
        },
        (Element::VLine(_), &[x]) => Annotation::VLine {
            id,
            stroke: Stroke::new(base, STROKE_WIDTH),
            x,
            label,
        },
        (Element::HLine(_), &[y]) => Annotation::HLine {
            id,
            stroke: Stroke::new(base, STROKE_WIDTH),
            y,
            label,
        },
        (Element::Text(text), &[x, y]) => Annotation::Text {
            id,
            color: base.color.clone(),
            x,
            y,
            content: text.content.clone(),
            font_size: text.font_size.unwrap_or(FONT_SIZE),
        },
        _ => return None,
    })
}
