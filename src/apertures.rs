use std::sync::Arc;

use crate::expressions::MacroExpression;
use crate::reader::RecordedEvent;
use crate::spacial::{Length, Unit};
use crate::warnings::{SourcePosition, WarningCollector};

/// The four standard aperture templates of the gerber format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardTemplate {
    Circle,
    Rectangle,
    Obround,
    Polygon,
}

impl StandardTemplate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "C" => Some(StandardTemplate::Circle),
            "R" => Some(StandardTemplate::Rectangle),
            "O" => Some(StandardTemplate::Obround),
            "P" => Some(StandardTemplate::Polygon),
            _ => None,
        }
    }

    /// Repair pass over the raw parameter list: missing optional parameters are filled
    /// with defaults, out-of-range values clamped, excess parameters truncated. Every
    /// repair records a warning.
    pub fn validate_parameters(
        &self,
        mut parameters: Vec<Length>,
        pos: SourcePosition,
        warnings: &mut WarningCollector,
    ) -> Vec<Length> {
        match self {
            StandardTemplate::Circle => {
                if parameters.is_empty() {
                    warnings.add(pos, "Circle diameter not given, defaulting to 1 mm");
                    return vec![Length::mm(1.0)];
                }
                if parameters.len() > 2 {
                    warnings.add(pos, "too many parameters given for circle");
                    parameters.truncate(2);
                }
                parameters
            }
            StandardTemplate::Rectangle | StandardTemplate::Obround => {
                if parameters.is_empty() {
                    warnings.add(pos, "Width not given, defaulting to 1 mm");
                    parameters.push(Length::mm(1.0));
                }
                if parameters.len() < 2 {
                    warnings.add(pos, "Height not given, defaulting to the width");
                    parameters.push(parameters[0]);
                }
                if parameters.len() > 3 {
                    warnings.add(pos, "too many parameters given for rectangle/obround");
                    parameters.truncate(3);
                }
                parameters
            }
            StandardTemplate::Polygon => {
                if parameters.is_empty() {
                    warnings.add(pos, "Polygon diameter and number of vertices not given, defaulting to 1 mm/6");
                    return vec![Length::mm(1.0), Length::mm(6.0)];
                }
                if parameters.len() < 2 {
                    warnings.add(pos, "Polygon number of vertices not given, defaulting to 6");
                    parameters.push(Length::mm(6.0));
                }
                let vertex_count = parameters[1].original_value() as i64;
                if vertex_count < 3 {
                    warnings.add(pos, format!("Polygon number of vertices too small: {}", vertex_count));
                    parameters[1] = Length::mm(3.0);
                }
                if vertex_count > 12 {
                    warnings.add(pos, format!("Polygon number of vertices too large: {}", vertex_count));
                    parameters[1] = Length::mm(12.0);
                }
                if parameters.len() > 4 {
                    warnings.add(pos, "too many parameters given for polygon");
                    parameters.truncate(4);
                }
                parameters
            }
        }
    }
}

/// A statement of an aperture macro body, matched exhaustively by the plotter.
#[derive(Debug, Clone, PartialEq)]
pub enum MacroStatement {
    VariableDefinition {
        number: u32,
        expression: MacroExpression,
    },
    Comment(String),
    Circle {
        exposure: MacroExpression,
        diameter: MacroExpression,
        center_x: MacroExpression,
        center_y: MacroExpression,
        angle: Option<MacroExpression>,
    },
    VectorLine {
        exposure: MacroExpression,
        width: MacroExpression,
        start_x: MacroExpression,
        start_y: MacroExpression,
        end_x: MacroExpression,
        end_y: MacroExpression,
        angle: MacroExpression,
    },
    CenterLine {
        exposure: MacroExpression,
        width: MacroExpression,
        height: MacroExpression,
        center_x: MacroExpression,
        center_y: MacroExpression,
        angle: MacroExpression,
    },
    Outline {
        exposure: MacroExpression,
        start_x: MacroExpression,
        start_y: MacroExpression,
        vertices: Vec<(MacroExpression, MacroExpression)>,
        angle: MacroExpression,
    },
    Polygon {
        exposure: MacroExpression,
        vertex_count: MacroExpression,
        center_x: MacroExpression,
        center_y: MacroExpression,
        diameter: MacroExpression,
        angle: MacroExpression,
    },
    Moire {
        center_x: MacroExpression,
        center_y: MacroExpression,
        diameter: MacroExpression,
        ring_thickness: MacroExpression,
        ring_gap: MacroExpression,
        max_rings: MacroExpression,
        crosshair_thickness: MacroExpression,
        crosshair_length: MacroExpression,
        angle: MacroExpression,
    },
    Thermal {
        center_x: MacroExpression,
        center_y: MacroExpression,
        outer_diameter: MacroExpression,
        inner_diameter: MacroExpression,
        gap: MacroExpression,
        angle: Option<MacroExpression>,
    },
}

/// A named, user-defined aperture template (AM command), instantiated with a parameter
/// list on each aperture definition referencing it.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroTemplate {
    pub name: String,
    pub body: Vec<MacroStatement>,
}

#[derive(Debug, Clone)]
pub enum ApertureKind {
    Standard {
        template: StandardTemplate,
        parameters: Vec<Length>,
    },
    Macro {
        template: Arc<MacroTemplate>,
        parameters: Vec<Length>,
        /// Unit the aperture was defined under; literals in the macro body are
        /// interpreted in this unit.
        unit: Unit,
    },
    /// Recorded command list of a block aperture (AB), replayed under a pushed
    /// transform on each flash.
    Block {
        events: Vec<RecordedEvent>,
    },
}

#[derive(Debug, Clone)]
pub struct ApertureDefinition {
    pub nr: i32,
    pub kind: ApertureKind,
}

impl ApertureDefinition {
    /// The stroke width when this aperture is used for interpolation; only standard
    /// circles qualify.
    pub fn circle_diameter(&self) -> Option<Length> {
        match &self.kind {
            ApertureKind::Standard {
                template: StandardTemplate::Circle,
                parameters,
            } => parameters.first().copied(),
            _ => None,
        }
    }
}
