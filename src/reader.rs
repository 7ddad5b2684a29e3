use std::collections::HashMap;
use std::sync::Arc;

use log::trace;
use thiserror::Error;

use crate::apertures::{ApertureDefinition, ApertureKind, MacroStatement, MacroTemplate, StandardTemplate};
use crate::spacial::{Length, Mirroring, Position, Transform, Unit, Vector};
use crate::warnings::{SourcePosition, WarningCollector};

/// The only unrecoverable condition in this layer; everything else degrades to a
/// warning.
#[derive(Debug, Error)]
pub enum GerberError {
    #[error("Cannot set the unit multiple times")]
    DuplicateUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterpolationMode {
    #[default]
    Linear,
    ClockwiseCircular,
    CounterclockwiseCircular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuadrantMode {
    #[default]
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    #[default]
    Dark,
    Clear,
}

impl Polarity {
    pub fn negate(self) -> Self {
        match self {
            Polarity::Dark => Polarity::Clear,
            Polarity::Clear => Polarity::Dark,
        }
    }
}

/// Fixed-point coordinate format (FS command): integer/decimal digit counts per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoordinateFormat {
    pub x_integer: u8,
    pub x_decimal: u8,
    pub y_integer: u8,
    pub y_decimal: u8,
}

impl CoordinateFormat {
    pub fn new(integer: u8, decimal: u8) -> Self {
        Self {
            x_integer: integer,
            x_decimal: decimal,
            y_integer: integer,
            y_decimal: decimal,
        }
    }

    pub fn decode_x(&self, str: &str) -> Option<f64> {
        Self::decode(str, self.x_integer, self.x_decimal)
    }

    pub fn decode_y(&self, str: &str) -> Option<f64> {
        Self::decode(str, self.y_integer, self.y_decimal)
    }

    /// Decode a coordinate string: optional sign, then digits that are left-zero-padded
    /// to `integer + decimal` places and split at `integer` digits.
    pub fn decode(str: &str, integer: u8, decimal: u8) -> Option<f64> {
        let (sign, digits) = match str.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, str.strip_prefix('+').unwrap_or(str)),
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let width = (integer + decimal) as usize;
        let padded = format!("{:0>width$}", digits, width = width.max(digits.len()));
        let split = padded.len() - decimal as usize;
        let value: f64 = format!("{}.{}", &padded[..split], &padded[split..])
            .parse()
            .ok()?;
        Some(sign * value)
    }

    pub fn encode(value: f64, decimal: u8) -> String {
        let scaled = (value.abs() * 10f64.powi(decimal as i32)).round() as u64;
        if value < 0.0 {
            format!("-{}", scaled)
        } else {
            scaled.to_string()
        }
    }
}

/// Payload of one interpolate / region-interpolate event. All lengths in millimeters.
#[derive(Debug, Clone)]
pub struct InterpolateParams {
    pub pos: SourcePosition,
    /// Block transform active at emission, identity outside block aperture replay.
    pub transform: Transform,
    pub current: Position,
    pub target: Position,
    /// Arc center offset relative to `current` (I/J), zero when not given.
    pub offset: Vector,
    pub aperture: Option<Arc<ApertureDefinition>>,
    pub interpolation_mode: InterpolationMode,
    pub quadrant_mode: QuadrantMode,
    pub polarity: Polarity,
}

/// Semantic events produced by the reader, consumed by the geometric primitive
/// generator (or any other downstream).
pub trait GraphicsEventHandler {
    fn interpolate(&mut self, params: &InterpolateParams, warnings: &mut WarningCollector) {
        let _ = (params, warnings);
    }

    fn region_begin(&mut self, pos: SourcePosition, polarity: Polarity) {
        let _ = (pos, polarity);
    }

    fn region_start_contour(&mut self, pos: SourcePosition) {
        let _ = pos;
    }

    fn region_interpolate(&mut self, params: &InterpolateParams, warnings: &mut WarningCollector) {
        let _ = (params, warnings);
    }

    fn region_end_contour(&mut self, pos: SourcePosition) {
        let _ = pos;
    }

    fn region_end(&mut self, pos: SourcePosition, polarity: Polarity) {
        let _ = (pos, polarity);
    }

    /// Flash `aperture` at the origin and apply `transform` to the result.
    fn flash(
        &mut self,
        pos: SourcePosition,
        transform: &Transform,
        aperture: &ApertureDefinition,
        polarity: Polarity,
        warnings: &mut WarningCollector,
    ) {
        let _ = (pos, transform, aperture, polarity, warnings);
    }
}

/// One emission, recorded while a block aperture definition is open and replayed on
/// each flash of that aperture with the flash transform composed in explicitly.
#[derive(Debug, Clone)]
pub enum RecordedEvent {
    Interpolate(InterpolateParams),
    RegionBegin {
        pos: SourcePosition,
        polarity: Polarity,
    },
    RegionStartContour {
        pos: SourcePosition,
    },
    RegionInterpolate(InterpolateParams),
    RegionEndContour {
        pos: SourcePosition,
    },
    RegionEnd {
        pos: SourcePosition,
        polarity: Polarity,
    },
    Flash {
        pos: SourcePosition,
        transform: Transform,
        aperture: Arc<ApertureDefinition>,
        polarity: Polarity,
    },
}

/// Session state of one interpretation run.
#[derive(Debug, Default)]
struct GraphicsState {
    unit: Option<Unit>,
    coordinate_format: Option<CoordinateFormat>,
    current_x: Option<Length>,
    current_y: Option<Length>,
    current_aperture: Option<Arc<ApertureDefinition>>,
    interpolation_mode: InterpolationMode,
    quadrant_mode: QuadrantMode,
    polarity: Polarity,
    mirroring: Mirroring,
    rotation: f64,
    scaling: f64,
    aperture_transform: Transform,
}

impl GraphicsState {
    fn new() -> Self {
        Self {
            scaling: 1.0,
            ..Self::default()
        }
    }

    fn current(&self) -> Position {
        Position::new(
            self.current_x
                .map(|x| x.to_mm())
                .unwrap_or(0.0),
            self.current_y
                .map(|y| y.to_mm())
                .unwrap_or(0.0),
        )
    }

    /// LM/LR/LS change one field each; the composed aperture transform is recomputed
    /// with rotation applied before mirroring and scaling.
    fn update_aperture_transform(&mut self) {
        self.aperture_transform = Transform::mirror_scale(self.mirroring, self.scaling)
            .concat(&Transform::rotation_degrees(self.rotation));
    }
}

/// Nesting deeper than this aborts block aperture replay with a warning instead of
/// exhausting the call stack.
pub const MAX_BLOCK_NESTING: usize = 16;

/// The graphics state machine: consumes the upstream command stream one call at a time
/// and emits at most one semantic event per command (block aperture flashes replay a
/// recorded list). Owns the aperture dictionary and the warning log for the run.
pub struct GerberReader<H> {
    handler: H,
    warnings: WarningCollector,
    state: GraphicsState,
    apertures: HashMap<i32, Arc<ApertureDefinition>>,
    macro_templates: HashMap<String, Arc<MacroTemplate>>,
    region_active: bool,
    region_contour_open: bool,
    /// One frame per open block aperture definition; emissions are buffered into the
    /// top frame instead of being dispatched.
    recording_frames: Vec<Vec<RecordedEvent>>,
    /// Block transform stack, top is identity at nesting depth 0.
    transform_stack: Vec<Transform>,
}

impl<H: GraphicsEventHandler> GerberReader<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            warnings: WarningCollector::new(),
            state: GraphicsState::new(),
            apertures: HashMap::new(),
            macro_templates: HashMap::new(),
            region_active: false,
            region_contour_open: false,
            recording_frames: Vec::new(),
            transform_stack: vec![Transform::identity()],
        }
    }

    pub fn warnings(&self) -> &WarningCollector {
        &self.warnings
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_parts(self) -> (H, WarningCollector) {
        (self.handler, self.warnings)
    }

    pub fn aperture(&self, nr: i32) -> Option<&Arc<ApertureDefinition>> {
        self.apertures.get(&nr)
    }

    pub fn set_unit(&mut self, _pos: SourcePosition, unit: Unit) -> Result<(), GerberError> {
        if self.state.unit.is_some() {
            return Err(GerberError::DuplicateUnit);
        }
        self.state.unit = Some(unit);
        Ok(())
    }

    pub fn set_coordinate_format(&mut self, _pos: SourcePosition, format: CoordinateFormat) {
        self.state.coordinate_format = Some(format);
    }

    pub fn define_macro(&mut self, _pos: SourcePosition, name: &str, body: Vec<MacroStatement>) {
        let template = MacroTemplate {
            name: name.to_string(),
            body,
        };
        self.macro_templates
            .insert(template.name.clone(), Arc::new(template));
    }

    pub fn define_aperture(&mut self, pos: SourcePosition, nr: i32, template: &str, parameters: &[&str]) {
        if nr < 10 {
            self.warnings
                .add(pos, format!("Aperture number {} is reserved, numbers start at 10", nr));
        }
        let unit = self.unit_or_default(pos);
        let mut lengths = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            match parameter.parse::<f64>() {
                Ok(value) => lengths.push(Length::new(unit, value)),
                Err(_) => {
                    self.warnings
                        .add(pos, format!("Invalid aperture parameter '{}' for D{}", parameter, nr));
                    return;
                }
            }
        }

        let kind = match StandardTemplate::from_name(template) {
            Some(standard) => ApertureKind::Standard {
                template: standard,
                parameters: standard.validate_parameters(lengths, pos, &mut self.warnings),
            },
            None => match self.macro_templates.get(template) {
                Some(macro_template) => ApertureKind::Macro {
                    template: macro_template.clone(),
                    parameters: lengths,
                    unit,
                },
                None => {
                    self.warnings.add(
                        pos,
                        format!("Unknown aperture template {} for aperture definition D{}", template, nr),
                    );
                    return;
                }
            },
        };
        self.insert_aperture(
            pos,
            ApertureDefinition {
                nr,
                kind,
            },
        );
    }

    fn insert_aperture(&mut self, pos: SourcePosition, definition: ApertureDefinition) {
        let nr = definition.nr;
        if self
            .apertures
            .insert(nr, Arc::new(definition))
            .is_some()
        {
            self.warnings
                .add(pos, format!("Aperture D{} redefined, previous definition shadowed", nr));
        }
    }

    pub fn select_aperture(&mut self, pos: SourcePosition, nr: i32) {
        match self.apertures.get(&nr) {
            Some(aperture) => self.state.current_aperture = Some(aperture.clone()),
            None => {
                self.warnings
                    .add(pos, format!("aperture {} not found", nr));
            }
        }
    }

    pub fn set_interpolation_mode(&mut self, _pos: SourcePosition, mode: InterpolationMode) {
        self.state.interpolation_mode = mode;
    }

    pub fn set_quadrant_mode(&mut self, _pos: SourcePosition, mode: QuadrantMode) {
        self.state.quadrant_mode = mode;
    }

    pub fn interpolate(
        &mut self,
        pos: SourcePosition,
        x: Option<&str>,
        y: Option<&str>,
        i: Option<&str>,
        j: Option<&str>,
    ) {
        if self.state.current_x.is_none() {
            self.warnings
                .add(pos, "No initial x coordinate given. Defaulting to 0");
            self.state.current_x = Some(Length::ZERO);
        }
        if self.state.current_y.is_none() {
            self.warnings
                .add(pos, "No initial y coordinate given. Defaulting to 0");
            self.state.current_y = Some(Length::ZERO);
        }

        let target_x = self
            .parse_coordinate_x(pos, x)
            .or(self.state.current_x);
        let target_y = self
            .parse_coordinate_y(pos, y)
            .or(self.state.current_y);

        let offset_i = self
            .parse_coordinate_x(pos, i)
            .unwrap_or(Length::ZERO);
        let offset_j = self
            .parse_coordinate_y(pos, j)
            .unwrap_or(Length::ZERO);

        let params = InterpolateParams {
            pos,
            transform: Transform::identity(),
            current: self.state.current(),
            target: Position::new(
                target_x
                    .map(|x| x.to_mm())
                    .unwrap_or(0.0),
                target_y
                    .map(|y| y.to_mm())
                    .unwrap_or(0.0),
            ),
            offset: Vector::new(offset_i.to_mm(), offset_j.to_mm()),
            aperture: self.state.current_aperture.clone(),
            interpolation_mode: self.state.interpolation_mode,
            quadrant_mode: self.state.quadrant_mode,
            polarity: self.state.polarity,
        };

        if self.region_active {
            if !self.region_contour_open {
                self.region_contour_open = true;
                self.emit(RecordedEvent::RegionStartContour {
                    pos,
                });
            }
            self.emit(RecordedEvent::RegionInterpolate(params));
        } else {
            if self.state.current_aperture.is_none() {
                self.warnings
                    .add(pos, "No aperture defined, not drawing");
                return;
            }
            self.emit(RecordedEvent::Interpolate(params));
        }
        self.state.current_x = target_x;
        self.state.current_y = target_y;
    }

    pub fn move_to(&mut self, pos: SourcePosition, x: Option<&str>, y: Option<&str>) {
        if self.region_contour_open {
            self.region_contour_open = false;
            self.emit(RecordedEvent::RegionEndContour {
                pos,
            });
        }
        if let Some(x) = self.parse_coordinate_x(pos, x) {
            self.state.current_x = Some(x);
        }
        if let Some(y) = self.parse_coordinate_y(pos, y) {
            self.state.current_y = Some(y);
        }
    }

    pub fn flash(&mut self, pos: SourcePosition, x: Option<&str>, y: Option<&str>) {
        if self.region_active {
            self.warnings
                .add(pos, "flash not allowed in region");
            return;
        }
        if let Some(x) = self.parse_coordinate_x(pos, x) {
            self.state.current_x = Some(x);
        }
        if let Some(y) = self.parse_coordinate_y(pos, y) {
            self.state.current_y = Some(y);
        }

        let Some(aperture) = self.state.current_aperture.clone() else {
            self.warnings
                .add(pos, "No current aperture for flash operation");
            return;
        };

        let transform = Transform::translation(
            self.state
                .current()
                .coords,
        )
        .concat(&self.state.aperture_transform);

        self.emit(RecordedEvent::Flash {
            pos,
            transform,
            aperture,
            polarity: self.state.polarity,
        });
    }

    pub fn begin_region(&mut self, pos: SourcePosition) {
        if self.region_active {
            self.warnings
                .add(pos, "region already started");
        }
        self.region_active = true;
        self.emit(RecordedEvent::RegionBegin {
            pos,
            polarity: self.state.polarity,
        });
    }

    pub fn end_region(&mut self, pos: SourcePosition) {
        if !self.region_active {
            self.warnings
                .add(pos, "no active region");
        }
        if self.region_contour_open {
            self.region_contour_open = false;
            self.emit(RecordedEvent::RegionEndContour {
                pos,
            });
        }
        self.region_active = false;
        self.emit(RecordedEvent::RegionEnd {
            pos,
            polarity: self.state.polarity,
        });
    }

    pub fn load_polarity(&mut self, pos: SourcePosition, polarity: &str) {
        if self.region_active {
            self.warnings
                .add(pos, "cannot change polarity in region, ignoring");
            return;
        }
        match polarity {
            "C" => self.state.polarity = Polarity::Clear,
            "D" => self.state.polarity = Polarity::Dark,
            other => self
                .warnings
                .add(pos, format!("Unknown polarity {}", other)),
        }
    }

    pub fn load_mirroring(&mut self, _pos: SourcePosition, mirroring: Mirroring) {
        self.state.mirroring = mirroring;
        self.state
            .update_aperture_transform();
    }

    pub fn load_rotation(&mut self, _pos: SourcePosition, degrees: f64) {
        self.state.rotation = degrees;
        self.state
            .update_aperture_transform();
    }

    pub fn load_scaling(&mut self, _pos: SourcePosition, factor: f64) {
        self.state.scaling = factor;
        self.state
            .update_aperture_transform();
    }

    pub fn begin_block_aperture(&mut self, _pos: SourcePosition, nr: i32) {
        trace!("begin block aperture D{}", nr);
        self.recording_frames
            .push(Vec::new());
        self.state.current_x = None;
        self.state.current_y = None;
    }

    pub fn end_block_aperture(&mut self, pos: SourcePosition, nr: i32) {
        let Some(events) = self.recording_frames.pop() else {
            self.warnings
                .add(pos, format!("Block aperture D{} closed without matching open", nr));
            return;
        };
        trace!("end block aperture D{}, {} events recorded", nr, events.len());
        self.insert_aperture(
            pos,
            ApertureDefinition {
                nr,
                kind: ApertureKind::Block {
                    events,
                },
            },
        );
        self.state.current_x = None;
        self.state.current_y = None;
    }

    pub fn comment(&mut self, _pos: SourcePosition, _text: &str) {}

    pub fn unknown_statement(&mut self, pos: SourcePosition, text: &str) {
        self.warnings
            .add(pos, format!("Unknown statement: {}", text));
    }

    fn unit_or_default(&mut self, pos: SourcePosition) -> Unit {
        match self.state.unit {
            Some(unit) => unit,
            None => {
                self.warnings
                    .add(pos, "Unit not set, assuming millimeters");
                Unit::Millimeters
            }
        }
    }

    fn parse_coordinate_x(&mut self, pos: SourcePosition, str: Option<&str>) -> Option<Length> {
        let format = self.format_or_warn(pos, str)?;
        let str = str?;
        self.to_length(pos, str, format.decode_x(str))
    }

    fn parse_coordinate_y(&mut self, pos: SourcePosition, str: Option<&str>) -> Option<Length> {
        let format = self.format_or_warn(pos, str)?;
        let str = str?;
        self.to_length(pos, str, format.decode_y(str))
    }

    fn format_or_warn(&mut self, pos: SourcePosition, str: Option<&str>) -> Option<CoordinateFormat> {
        if str.is_none() {
            return None;
        }
        if self.state.coordinate_format.is_none() {
            self.warnings
                .add(pos, "Coordinate before coordinate format specification, ignoring");
        }
        self.state.coordinate_format
    }

    fn to_length(&mut self, pos: SourcePosition, str: &str, value: Option<f64>) -> Option<Length> {
        let unit = self.unit_or_default(pos);
        match value {
            Some(value) => Some(Length::new(unit, value)),
            None => {
                self.warnings
                    .add(pos, format!("Malformed coordinate '{}'", str));
                None
            }
        }
    }

    /// Dispatch an event, or buffer it when a block aperture definition is open.
    fn emit(&mut self, event: RecordedEvent) {
        if let Some(frame) = self.recording_frames.last_mut() {
            frame.push(event);
        } else {
            self.dispatch(&event);
        }
    }

    fn dispatch(&mut self, event: &RecordedEvent) {
        let parent = self
            .transform_stack
            .last()
            .copied()
            .unwrap_or_default();
        match event {
            RecordedEvent::Interpolate(params) => {
                let mut params = params.clone();
                params.transform = parent.concat(&params.transform);
                self.handler
                    .interpolate(&params, &mut self.warnings);
            }
            RecordedEvent::RegionBegin {
                pos,
                polarity,
            } => self
                .handler
                .region_begin(*pos, *polarity),
            RecordedEvent::RegionStartContour {
                pos,
            } => self
                .handler
                .region_start_contour(*pos),
            RecordedEvent::RegionInterpolate(params) => {
                let mut params = params.clone();
                params.transform = parent.concat(&params.transform);
                self.handler
                    .region_interpolate(&params, &mut self.warnings);
            }
            RecordedEvent::RegionEndContour {
                pos,
            } => self
                .handler
                .region_end_contour(*pos),
            RecordedEvent::RegionEnd {
                pos,
                polarity,
            } => self
                .handler
                .region_end(*pos, *polarity),
            RecordedEvent::Flash {
                pos,
                transform,
                aperture,
                polarity,
            } => {
                let composed = parent.concat(transform);
                match &aperture.kind {
                    ApertureKind::Block {
                        ..
                    } => self.replay_block(*pos, composed, aperture.clone()),
                    _ => self
                        .handler
                        .flash(*pos, &composed, aperture, *polarity, &mut self.warnings),
                }
            }
        }
    }

    /// Replay the recorded command list of a block aperture under the composed flash
    /// transform. Nested block flashes recurse; the transform stack returns to its
    /// previous depth before this returns.
    fn replay_block(&mut self, pos: SourcePosition, transform: Transform, aperture: Arc<ApertureDefinition>) {
        if self.transform_stack.len() > MAX_BLOCK_NESTING {
            self.warnings.add(
                pos,
                format!("Block aperture D{} nesting exceeds {} levels, skipping", aperture.nr, MAX_BLOCK_NESTING),
            );
            return;
        }
        let ApertureKind::Block {
            events,
        } = &aperture.kind
        else {
            return;
        };
        trace!("replaying block aperture D{} ({} events)", aperture.nr, events.len());
        self.transform_stack
            .push(transform);
        for event in events {
            self.dispatch(event);
        }
        self.transform_stack.pop();
    }
}

#[cfg(test)]
mod coordinate_format_tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("100000", 2, 4, 10.0)]
    #[case("-100000", 2, 4, -10.0)]
    #[case("+302100", 2, 4, 30.21)]
    #[case("500", 2, 4, 0.05)]
    #[case("0", 3, 5, 0.0)]
    fn decode_fixed_point(#[case] input: &str, #[case] integer: u8, #[case] decimal: u8, #[case] expected: f64) {
        assert_eq!(CoordinateFormat::decode(input, integer, decimal), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("12a4")]
    #[case("--3")]
    fn decode_rejects_malformed(#[case] input: &str) {
        assert_eq!(CoordinateFormat::decode(input, 2, 4), None);
    }

    #[test]
    fn per_axis_formats_decode_independently() {
        let format = CoordinateFormat {
            x_integer: 2,
            x_decimal: 4,
            y_integer: 3,
            y_decimal: 2,
        };

        assert_eq!(format.decode_x("100000"), Some(10.0));
        assert_eq!(format.decode_y("100000"), Some(1000.0));
    }

    #[rstest]
    #[case(10.0, 2, 4)]
    #[case(-10.0, 2, 4)]
    #[case(0.05, 2, 4)]
    #[case(99.9999, 2, 4)]
    #[case(1.23456, 3, 5)]
    #[case(0.0, 2, 4)]
    fn encode_decode_round_trip(#[case] value: f64, #[case] integer: u8, #[case] decimal: u8) {
        let encoded = CoordinateFormat::encode(value, decimal);
        assert_eq!(CoordinateFormat::decode(&encoded, integer, decimal), Some(value));
    }
}

#[cfg(test)]
mod reader_tests {
    use super::*;

    /// Records the semantic events for assertions.
    #[derive(Default)]
    struct EventRecorder {
        events: Vec<Event>,
    }

    #[derive(Debug, Clone)]
    enum Event {
        Interpolate {
            current: Position,
            target: Position,
            transform: Transform,
        },
        RegionBegin,
        RegionStartContour,
        RegionInterpolate {
            target: Position,
        },
        RegionEndContour,
        RegionEnd,
        Flash {
            nr: i32,
            transform: Transform,
            polarity: Polarity,
        },
    }

    impl GraphicsEventHandler for EventRecorder {
        fn interpolate(&mut self, params: &InterpolateParams, _warnings: &mut WarningCollector) {
            self.events
                .push(Event::Interpolate {
                    current: params.current,
                    target: params.target,
                    transform: params.transform,
                });
        }

        fn region_begin(&mut self, _pos: SourcePosition, _polarity: Polarity) {
            self.events
                .push(Event::RegionBegin);
        }

        fn region_start_contour(&mut self, _pos: SourcePosition) {
            self.events
                .push(Event::RegionStartContour);
        }

        fn region_interpolate(&mut self, params: &InterpolateParams, _warnings: &mut WarningCollector) {
            self.events
                .push(Event::RegionInterpolate {
                    target: params.target,
                });
        }

        fn region_end_contour(&mut self, _pos: SourcePosition) {
            self.events
                .push(Event::RegionEndContour);
        }

        fn region_end(&mut self, _pos: SourcePosition, _polarity: Polarity) {
            self.events
                .push(Event::RegionEnd);
        }

        fn flash(
            &mut self,
            _pos: SourcePosition,
            transform: &Transform,
            aperture: &ApertureDefinition,
            polarity: Polarity,
            _warnings: &mut WarningCollector,
        ) {
            self.events.push(Event::Flash {
                nr: aperture.nr,
                transform: *transform,
                polarity,
            });
        }
    }

    fn pos() -> SourcePosition {
        SourcePosition::default()
    }

    fn reader_with_defaults() -> GerberReader<EventRecorder> {
        let mut reader = GerberReader::new(EventRecorder::default());
        reader
            .set_unit(pos(), Unit::Millimeters)
            .unwrap();
        reader.set_coordinate_format(pos(), CoordinateFormat::new(2, 4));
        reader
    }

    #[test]
    fn duplicate_unit_is_fatal() {
        // given
        let mut reader = GerberReader::new(EventRecorder::default());
        reader
            .set_unit(pos(), Unit::Millimeters)
            .unwrap();

        // when
        let result = reader.set_unit(pos(), Unit::Inches);

        // then
        assert!(matches!(result, Err(GerberError::DuplicateUnit)));
    }

    #[test]
    fn interpolate_without_initial_position_warns_and_defaults_to_origin() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);
        reader.select_aperture(pos(), 10);

        reader.interpolate(pos(), Some("100000"), Some("0"), None, None);

        let (recorder, warnings) = reader.into_parts();
        assert_eq!(warnings.len(), 2); // one per axis
        match &recorder.events[0] {
            Event::Interpolate {
                current,
                target,
                ..
            } => {
                assert_eq!(*current, Position::new(0.0, 0.0));
                assert_eq!(*target, Position::new(10.0, 0.0));
            }
            other => panic!("Expected Interpolate, got {:?}", other),
        }
    }

    #[test]
    fn interpolate_without_aperture_warns_and_skips() {
        let mut reader = reader_with_defaults();
        reader.move_to(pos(), Some("0"), Some("0"));

        reader.interpolate(pos(), Some("100000"), None, None, None);

        let (recorder, warnings) = reader.into_parts();
        assert!(recorder.events.is_empty());
        assert!(warnings
            .warnings
            .iter()
            .any(|w| w.message.contains("No aperture defined")));
    }

    #[test]
    fn selecting_missing_aperture_retains_previous() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);
        reader.select_aperture(pos(), 10);
        reader.move_to(pos(), Some("0"), Some("0"));

        // when: selecting an undefined aperture, then drawing
        reader.select_aperture(pos(), 99);
        reader.interpolate(pos(), Some("100000"), None, None, None);

        // then: the previous aperture is still active
        let (recorder, warnings) = reader.into_parts();
        assert_eq!(recorder.events.len(), 1);
        assert!(warnings
            .warnings
            .iter()
            .any(|w| w.message.contains("aperture 99 not found")));
    }

    #[test]
    fn unknown_macro_template_drops_definition() {
        let mut reader = reader_with_defaults();

        reader.define_aperture(pos(), 11, "NOSUCH", &["1.0"]);

        assert!(reader
            .aperture(11)
            .is_none());
        assert!(reader
            .warnings()
            .warnings
            .iter()
            .any(|w| w.message.contains("Unknown aperture template NOSUCH")));
    }

    #[test]
    fn aperture_redefinition_warns_and_overwrites() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);

        reader.define_aperture(pos(), 10, "C", &["2.0"]);

        let aperture = reader
            .aperture(10)
            .unwrap();
        assert_eq!(
            aperture
                .circle_diameter()
                .unwrap()
                .to_mm(),
            2.0
        );
        assert!(reader
            .warnings()
            .warnings
            .iter()
            .any(|w| w.message.contains("redefined")));
    }

    #[test]
    fn region_contour_lifecycle() {
        let mut reader = reader_with_defaults();
        reader.move_to(pos(), Some("0"), Some("0"));

        reader.begin_region(pos());
        reader.interpolate(pos(), Some("100000"), None, None, None);
        reader.interpolate(pos(), Some("100000"), Some("100000"), None, None);
        reader.end_region(pos());

        let (recorder, _warnings) = reader.into_parts();
        let kinds: Vec<&'static str> = recorder
            .events
            .iter()
            .map(|e| match e {
                Event::RegionBegin => "begin",
                Event::RegionStartContour => "start-contour",
                Event::RegionInterpolate {
                    ..
                } => "interpolate",
                Event::RegionEndContour => "end-contour",
                Event::RegionEnd => "end",
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(kinds, vec!["begin", "start-contour", "interpolate", "interpolate", "end-contour", "end"]);
    }

    #[test]
    fn move_closes_open_region_contour() {
        let mut reader = reader_with_defaults();
        reader.move_to(pos(), Some("0"), Some("0"));
        reader.begin_region(pos());
        reader.interpolate(pos(), Some("100000"), None, None, None);

        reader.move_to(pos(), Some("0"), Some("100000"));
        reader.interpolate(pos(), Some("100000"), Some("100000"), None, None);
        reader.end_region(pos());

        let (recorder, _warnings) = reader.into_parts();
        let contours = recorder
            .events
            .iter()
            .filter(|e| matches!(e, Event::RegionStartContour))
            .count();
        assert_eq!(contours, 2);
    }

    #[test]
    fn flash_in_region_warns_and_is_ignored() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);
        reader.select_aperture(pos(), 10);
        reader.begin_region(pos());

        reader.flash(pos(), Some("0"), Some("0"));

        let (recorder, warnings) = reader.into_parts();
        assert!(!recorder
            .events
            .iter()
            .any(|e| matches!(e, Event::Flash { .. })));
        assert!(warnings
            .warnings
            .iter()
            .any(|w| w.message.contains("flash not allowed in region")));
    }

    #[test]
    fn polarity_change_in_region_is_ignored() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);
        reader.select_aperture(pos(), 10);
        reader.begin_region(pos());
        reader.load_polarity(pos(), "C");
        reader.end_region(pos());

        // when: flashing after the region
        reader.flash(pos(), Some("0"), Some("0"));

        // then: still dark
        let (recorder, warnings) = reader.into_parts();
        match recorder.events.last() {
            Some(Event::Flash {
                polarity, ..
            }) => assert_eq!(*polarity, Polarity::Dark),
            other => panic!("Expected Flash, got {:?}", other),
        }
        assert!(warnings
            .warnings
            .iter()
            .any(|w| w.message.contains("cannot change polarity in region")));
    }

    #[test]
    fn block_aperture_records_and_replays_with_translation() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);

        // record a block with one flash at (1, 0)
        reader.begin_block_aperture(pos(), 100);
        reader.select_aperture(pos(), 10);
        reader.flash(pos(), Some("10000"), Some("0"));
        reader.end_block_aperture(pos(), 100);

        // nothing emitted during recording
        assert!(reader
            .handler()
            .events
            .is_empty());

        // when: flashing the block at (5, 5)
        reader.select_aperture(pos(), 100);
        reader.flash(pos(), Some("50000"), Some("50000"));

        // then: the inner flash lands at (6, 5)
        let (recorder, _warnings) = reader.into_parts();
        assert_eq!(recorder.events.len(), 1);
        match &recorder.events[0] {
            Event::Flash {
                nr,
                transform,
                ..
            } => {
                assert_eq!(*nr, 10);
                let origin = transform.apply(Position::new(0.0, 0.0));
                assert!((origin.x - 6.0).abs() < 1e-9);
                assert!((origin.y - 5.0).abs() < 1e-9);
            }
            other => panic!("Expected Flash, got {:?}", other),
        }
    }

    #[test]
    fn block_aperture_entry_and_exit_reset_current_point() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);
        reader.select_aperture(pos(), 10);
        reader.move_to(pos(), Some("50000"), Some("50000"));

        reader.begin_block_aperture(pos(), 100);
        // current point is unset inside the block: interpolating warns per axis
        reader.interpolate(pos(), Some("10000"), None, None, None);
        reader.end_block_aperture(pos(), 100);

        let warnings = reader.warnings();
        assert_eq!(
            warnings
                .warnings
                .iter()
                .filter(|w| w.message.contains("No initial"))
                .count(),
            2
        );
    }

    #[test]
    fn deep_block_nesting_is_limited() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);

        // chain of blocks, each flashing the previous one
        let depth = MAX_BLOCK_NESTING as i32 + 4;
        for step in 0..depth {
            let nr = 100 + step;
            let inner = if step == 0 { 10 } else { 100 + step - 1 };
            reader.begin_block_aperture(pos(), nr);
            reader.select_aperture(pos(), inner);
            reader.flash(pos(), Some("0"), Some("0"));
            reader.end_block_aperture(pos(), nr);
        }

        reader.select_aperture(pos(), 100 + depth - 1);
        reader.flash(pos(), Some("0"), Some("0"));

        let (recorder, warnings) = reader.into_parts();
        assert!(warnings
            .warnings
            .iter()
            .any(|w| w.message.contains("nesting exceeds")));
        // the replay stopped before reaching the leaf aperture
        assert!(recorder.events.is_empty());
    }

    #[test]
    fn flash_composes_aperture_transform() {
        let mut reader = reader_with_defaults();
        reader.define_aperture(pos(), 10, "C", &["1.0"]);
        reader.select_aperture(pos(), 10);
        reader.load_rotation(pos(), 90.0);
        reader.load_mirroring(
            pos(),
            Mirroring {
                x: true,
                y: false,
            },
        );

        reader.flash(pos(), Some("100000"), Some("0"));

        let (recorder, _warnings) = reader.into_parts();
        match &recorder.events[0] {
            Event::Flash {
                transform, ..
            } => {
                // (1, 0) rotates to (0, 1), x-mirror leaves it, translate by (10, 0)
                let p = transform.apply(Position::new(1.0, 0.0));
                assert!((p.x - 10.0).abs() < 1e-9);
                assert!((p.y - 1.0).abs() < 1e-9);
                assert!(transform.is_mirroring());
            }
            other => panic!("Expected Flash, got {:?}", other),
        }
    }

    #[test]
    fn unknown_statement_warns() {
        let mut reader = reader_with_defaults();

        reader.unknown_statement(SourcePosition::new(12, 1), "G99*");

        assert_eq!(
            reader
                .warnings()
                .warnings[0]
                .message,
            "Unknown statement: G99*"
        );
    }
}
