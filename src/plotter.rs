use crate::apertures::{ApertureDefinition, ApertureKind, MacroStatement, MacroTemplate, StandardTemplate};
use crate::expressions::MacroExpressionEvaluator;
use crate::reader::{
    GraphicsEventHandler, InterpolateParams, InterpolationMode, Polarity, QuadrantMode,
};
use crate::spacial::{polar, rotate, sweep, vector_angle, Length, Position, Transform, Unit, Vector};
use crate::warnings::{SourcePosition, WarningCollector};

/// Path-level exposure: ON paths add to the enclosing object, OFF paths subtract from
/// it. Distinct from [`Polarity`], which applies to whole objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Exposure {
    On,
    Off,
}

/// The downstream geometry contract. An object brackets one flash, stroke or region;
/// each path inside it is a closed contour of line and arc segments. Arcs are given as
/// an ellipse bounding box plus start angle (0 degrees = +X, counter-clockwise) and
/// signed sweep. All lengths in millimeters, all angles in degrees.
pub trait PlotHandler {
    fn begin_object(&mut self, pos: SourcePosition, polarity: Polarity);
    fn end_object(&mut self, pos: SourcePosition, polarity: Polarity);
    fn begin_path(&mut self, pos: SourcePosition, exposure: Exposure);
    fn end_path(&mut self, pos: SourcePosition, exposure: Exposure);
    fn add_line(&mut self, pos: SourcePosition, start: Position, end: Position);
    fn add_arc(
        &mut self,
        pos: SourcePosition,
        corner: Position,
        width: f64,
        height: f64,
        start_angle: f64,
        sweep_angle: f64,
    );
}

/// Resolve the arc center for a circular interpolation from `start` to `end` with raw
/// offset `ij`.
///
/// MULTI: the nominal center `start + ij` is projected onto the perpendicular bisector
/// of the chord, tolerating coordinate format rounding. SINGLE: `ij` arrives unsigned,
/// so all four sign combinations are candidates; each is projected onto the bisector,
/// kept only when the resulting directional span stays within a quadrant, and the
/// candidate deviating least from its raw position wins. `None` when no candidate
/// qualifies.
pub fn resolve_arc_center(
    start: Position,
    end: Position,
    ij: Vector,
    quadrant_mode: QuadrantMode,
    clockwise: bool,
) -> Option<Position> {
    let chord = end - start;
    let mid = start + chord * 0.5;
    let bisector = Vector::new(-chord.y, chord.x);
    match quadrant_mode {
        QuadrantMode::Multi => Some(project_to_line(start + ij, mid, bisector)),
        QuadrantMode::Single => {
            let candidates = [
                start + ij,
                start - ij,
                start + Vector::new(ij.x, -ij.y),
                start + Vector::new(-ij.x, ij.y),
            ];
            let mut best: Option<(Position, f64)> = None;
            for candidate in candidates {
                let projected = project_to_line(candidate, mid, bisector);
                let span = sweep(
                    vector_angle(start - projected),
                    vector_angle(end - projected),
                    clockwise,
                )
                .abs();
                if span > 90.0 {
                    continue;
                }
                let deviation = (candidate - projected).norm();
                if best
                    .map(|(_, best_deviation)| deviation < best_deviation)
                    .unwrap_or(true)
                {
                    best = Some((projected, deviation));
                }
            }
            best.map(|(center, _)| center)
        }
    }
}

fn project_to_line(p: Position, origin: Position, direction: Vector) -> Position {
    let direction = direction.normalize();
    origin + direction * (p - origin).dot(&direction)
}

/// Expands semantic events into line/arc geometry: strokes a circular aperture along
/// linear and circular moves, passes region contours through as zero-width edges and
/// decomposes flashed apertures (standard and macro) into their exact outlines.
pub struct PrimitivePlotter<P> {
    handler: P,
}

impl<P: PlotHandler> PrimitivePlotter<P> {
    pub fn new(handler: P) -> Self {
        Self {
            handler,
        }
    }

    pub fn handler(&self) -> &P {
        &self.handler
    }

    pub fn into_handler(self) -> P {
        self.handler
    }

    /// Full circle arc around `center`.
    fn arc(&mut self, pos: SourcePosition, center: Position, radius: f64, start_angle: f64, sweep_angle: f64) {
        self.handler.add_arc(
            pos,
            Position::new(center.x - radius, center.y - radius),
            2.0 * radius,
            2.0 * radius,
            start_angle,
            sweep_angle,
        );
    }

    /// Circle arc given in aperture-local coordinates, mapped under the similarity
    /// transform: the center maps directly, the radius scales uniformly, the start
    /// angle follows the mapped start point and mirroring reverses the sweep.
    fn transformed_arc(
        &mut self,
        pos: SourcePosition,
        transform: &Transform,
        center: Position,
        radius: f64,
        start_angle: f64,
        sweep_angle: f64,
    ) {
        let mapped_center = transform.apply(center);
        let mapped_radius = radius * transform.uniform_scale();
        let mapped_start = transform.apply(center + polar(radius, start_angle));
        let mapped_start_angle = if mapped_radius > 0.0 {
            vector_angle(mapped_start - mapped_center)
        } else {
            start_angle
        };
        let mapped_sweep = if transform.is_mirroring() { -sweep_angle } else { sweep_angle };
        self.arc(pos, mapped_center, mapped_radius, mapped_start_angle, mapped_sweep);
    }

    fn transformed_circle_path(
        &mut self,
        pos: SourcePosition,
        transform: &Transform,
        exposure: Exposure,
        center: Position,
        diameter: f64,
    ) {
        self.handler.begin_path(pos, exposure);
        self.transformed_arc(pos, transform, center, diameter * 0.5, 0.0, 360.0);
        self.handler.end_path(pos, exposure);
    }

    fn transformed_polygon_path(
        &mut self,
        pos: SourcePosition,
        transform: &Transform,
        exposure: Exposure,
        corners: &[Position],
    ) {
        self.handler.begin_path(pos, exposure);
        for (index, corner) in corners.iter().enumerate() {
            let next = corners[(index + 1) % corners.len()];
            self.handler
                .add_line(pos, transform.apply(*corner), transform.apply(next));
        }
        self.handler.end_path(pos, exposure);
    }

    fn stroke_width(&mut self, params: &InterpolateParams, warnings: &mut WarningCollector) -> f64 {
        match params
            .aperture
            .as_deref()
            .and_then(ApertureDefinition::circle_diameter)
        {
            Some(diameter) => diameter.to_mm(),
            None => {
                let nr = params
                    .aperture
                    .as_deref()
                    .map(|aperture| aperture.nr)
                    .unwrap_or(-1);
                warnings.add(
                    params.pos,
                    format!("Invalid aperture D{} for interpolation, only standard circle is allowed.", nr),
                );
                1.0
            }
        }
    }

    fn flash_standard(
        &mut self,
        pos: SourcePosition,
        transform: &Transform,
        template: StandardTemplate,
        parameters: &[Length],
    ) {
        use crate::apertures::StandardTemplate::*;
        match template {
            Circle => {
                let diameter = parameters[0].to_mm();
                self.transformed_circle_path(pos, transform, Exposure::On, Position::origin(), diameter);
                if let Some(hole) = parameters.get(1) {
                    self.transformed_circle_path(pos, transform, Exposure::Off, Position::origin(), hole.to_mm());
                }
            }
            Rectangle => {
                let w = parameters[0].to_mm() * 0.5;
                let h = parameters[1].to_mm() * 0.5;
                self.transformed_polygon_path(
                    pos,
                    transform,
                    Exposure::On,
                    &[
                        Position::new(-w, -h),
                        Position::new(w, -h),
                        Position::new(w, h),
                        Position::new(-w, h),
                    ],
                );
                if let Some(hole) = parameters.get(2) {
                    self.transformed_circle_path(pos, transform, Exposure::Off, Position::origin(), hole.to_mm());
                }
            }
            Obround => {
                let w = parameters[0].to_mm();
                let h = parameters[1].to_mm();
                self.handler
                    .begin_path(pos, Exposure::On);
                if w < h {
                    // vertical: caps at top and bottom
                    let cap = w * 0.5;
                    let reach = h * 0.5 - cap;
                    self.transformed_arc(pos, transform, Position::new(0.0, reach), cap, 180.0, -180.0);
                    self.handler.add_line(
                        pos,
                        transform.apply(Position::new(cap, reach)),
                        transform.apply(Position::new(cap, -reach)),
                    );
                    self.transformed_arc(pos, transform, Position::new(0.0, -reach), cap, 0.0, -180.0);
                    self.handler.add_line(
                        pos,
                        transform.apply(Position::new(-cap, -reach)),
                        transform.apply(Position::new(-cap, reach)),
                    );
                } else {
                    // horizontal: caps at the left and right
                    let cap = h * 0.5;
                    let reach = w * 0.5 - cap;
                    self.transformed_arc(pos, transform, Position::new(reach, 0.0), cap, 90.0, -180.0);
                    self.handler.add_line(
                        pos,
                        transform.apply(Position::new(reach, -cap)),
                        transform.apply(Position::new(-reach, -cap)),
                    );
                    self.transformed_arc(pos, transform, Position::new(-reach, 0.0), cap, -90.0, -180.0);
                    self.handler.add_line(
                        pos,
                        transform.apply(Position::new(-reach, cap)),
                        transform.apply(Position::new(reach, cap)),
                    );
                }
                self.handler
                    .end_path(pos, Exposure::On);
                if let Some(hole) = parameters.get(2) {
                    self.transformed_circle_path(pos, transform, Exposure::Off, Position::origin(), hole.to_mm());
                }
            }
            Polygon => {
                let radius = parameters[0].to_mm() * 0.5;
                let vertex_count = parameters[1].original_value() as usize;
                let rotation = parameters
                    .get(2)
                    .map(|angle| angle.original_value())
                    .unwrap_or(0.0);
                let section = 360.0 / vertex_count as f64;
                let corners: Vec<Position> = (0..vertex_count)
                    .map(|index| Position::origin() + polar(radius, rotation + index as f64 * section))
                    .collect();
                self.transformed_polygon_path(pos, transform, Exposure::On, &corners);
                if let Some(hole) = parameters.get(3) {
                    self.transformed_circle_path(pos, transform, Exposure::Off, Position::origin(), hole.to_mm());
                }
            }
        }
    }

    /// Walk the macro body in order, one path per primitive statement. A statement
    /// referencing an undefined variable is skipped (the evaluator has warned already).
    fn flash_macro(
        &mut self,
        pos: SourcePosition,
        transform: &Transform,
        template: &MacroTemplate,
        parameters: &[Length],
        unit: Unit,
        warnings: &mut WarningCollector,
    ) {
        let mut evaluator = MacroExpressionEvaluator::new(unit);
        for (index, parameter) in parameters.iter().enumerate() {
            evaluator.set(index as u32 + 1, *parameter);
        }

        for statement in &template.body {
            match statement {
                MacroStatement::VariableDefinition {
                    number,
                    expression,
                } => {
                    if let Some(value) = evaluator.evaluate(expression, pos, warnings) {
                        evaluator.set(*number, value);
                    }
                }
                MacroStatement::Comment(_) => {}
                MacroStatement::Circle {
                    exposure,
                    diameter,
                    center_x,
                    center_y,
                    angle,
                } => {
                    let (Some(exposure), Some(diameter), Some(center_x), Some(center_y)) = (
                        evaluator.evaluate(exposure, pos, warnings),
                        evaluator.evaluate(diameter, pos, warnings),
                        evaluator.evaluate(center_x, pos, warnings),
                        evaluator.evaluate(center_y, pos, warnings),
                    ) else {
                        continue;
                    };
                    let mut center = Vector::new(center_x.to_mm(), center_y.to_mm());
                    if let Some(angle) = angle {
                        let Some(angle) = evaluator.evaluate(angle, pos, warnings) else {
                            continue;
                        };
                        center = rotate(center, angle.original_value());
                    }
                    self.transformed_circle_path(
                        pos,
                        transform,
                        exposure_of(exposure),
                        Position::origin() + center,
                        diameter.to_mm(),
                    );
                }
                MacroStatement::VectorLine {
                    exposure,
                    width,
                    start_x,
                    start_y,
                    end_x,
                    end_y,
                    angle,
                } => {
                    let (Some(exposure), Some(width), Some(start_x), Some(start_y), Some(end_x), Some(end_y), Some(angle)) = (
                        evaluator.evaluate(exposure, pos, warnings),
                        evaluator.evaluate(width, pos, warnings),
                        evaluator.evaluate(start_x, pos, warnings),
                        evaluator.evaluate(start_y, pos, warnings),
                        evaluator.evaluate(end_x, pos, warnings),
                        evaluator.evaluate(end_y, pos, warnings),
                        evaluator.evaluate(angle, pos, warnings),
                    ) else {
                        continue;
                    };
                    let rotation = angle.original_value();
                    let start =
                        Position::origin() + rotate(Vector::new(start_x.to_mm(), start_y.to_mm()), rotation);
                    let end = Position::origin() + rotate(Vector::new(end_x.to_mm(), end_y.to_mm()), rotation);
                    let direction = end - start;
                    let offset = Vector::new(-direction.y, direction.x).normalize() * (width.to_mm() * 0.5);
                    self.transformed_polygon_path(
                        pos,
                        transform,
                        exposure_of(exposure),
                        &[start + offset, end + offset, end - offset, start - offset],
                    );
                }
                MacroStatement::CenterLine {
                    exposure,
                    width,
                    height,
                    center_x,
                    center_y,
                    angle,
                } => {
                    let (Some(exposure), Some(width), Some(height), Some(center_x), Some(center_y), Some(angle)) = (
                        evaluator.evaluate(exposure, pos, warnings),
                        evaluator.evaluate(width, pos, warnings),
                        evaluator.evaluate(height, pos, warnings),
                        evaluator.evaluate(center_x, pos, warnings),
                        evaluator.evaluate(center_y, pos, warnings),
                        evaluator.evaluate(angle, pos, warnings),
                    ) else {
                        continue;
                    };
                    let rotation = angle.original_value();
                    let center = rotate(Vector::new(center_x.to_mm(), center_y.to_mm()), rotation);
                    let dw = rotate(Vector::new(width.to_mm(), 0.0), rotation) * 0.5;
                    let dh = rotate(Vector::new(0.0, height.to_mm()), rotation) * 0.5;
                    let origin = Position::origin();
                    self.transformed_polygon_path(
                        pos,
                        transform,
                        exposure_of(exposure),
                        &[
                            origin + center + dw + dh,
                            origin + center + dw - dh,
                            origin + center - dw - dh,
                            origin + center - dw + dh,
                        ],
                    );
                }
                MacroStatement::Outline {
                    exposure,
                    start_x,
                    start_y,
                    vertices,
                    angle,
                } => {
                    let (Some(exposure), Some(start_x), Some(start_y), Some(angle)) = (
                        evaluator.evaluate(exposure, pos, warnings),
                        evaluator.evaluate(start_x, pos, warnings),
                        evaluator.evaluate(start_y, pos, warnings),
                        evaluator.evaluate(angle, pos, warnings),
                    ) else {
                        continue;
                    };
                    let mut resolved = Vec::with_capacity(vertices.len());
                    let mut complete = true;
                    for (x, y) in vertices {
                        let (Some(x), Some(y)) = (
                            evaluator.evaluate(x, pos, warnings),
                            evaluator.evaluate(y, pos, warnings),
                        ) else {
                            complete = false;
                            break;
                        };
                        resolved.push(Vector::new(x.to_mm(), y.to_mm()));
                    }
                    if !complete {
                        continue;
                    }
                    let rotation = angle.original_value();
                    let exposure = exposure_of(exposure);
                    let mut last = Position::origin()
                        + rotate(Vector::new(start_x.to_mm(), start_y.to_mm()), rotation);
                    self.handler.begin_path(pos, exposure);
                    for vertex in resolved {
                        let point = Position::origin() + rotate(vertex, rotation);
                        self.handler
                            .add_line(pos, transform.apply(last), transform.apply(point));
                        last = point;
                    }
                    self.handler.end_path(pos, exposure);
                }
                MacroStatement::Polygon {
                    exposure,
                    vertex_count,
                    center_x,
                    center_y,
                    diameter,
                    angle,
                } => {
                    let (Some(exposure), Some(vertex_count), Some(center_x), Some(center_y), Some(diameter), Some(angle)) = (
                        evaluator.evaluate(exposure, pos, warnings),
                        evaluator.evaluate(vertex_count, pos, warnings),
                        evaluator.evaluate(center_x, pos, warnings),
                        evaluator.evaluate(center_y, pos, warnings),
                        evaluator.evaluate(diameter, pos, warnings),
                        evaluator.evaluate(angle, pos, warnings),
                    ) else {
                        continue;
                    };
                    let rotation = angle.original_value();
                    let count = vertex_count.original_value() as usize;
                    let section = 360.0 / count as f64;
                    let radius = diameter.to_mm() * 0.5;
                    let center = Vector::new(center_x.to_mm(), center_y.to_mm());
                    let corners: Vec<Position> = (0..count)
                        .map(|index| {
                            Position::origin()
                                + rotate(center + polar(radius, index as f64 * section), rotation)
                        })
                        .collect();
                    self.transformed_polygon_path(pos, transform, exposure_of(exposure), &corners);
                }
                MacroStatement::Moire {
                    center_x,
                    center_y,
                    diameter,
                    ring_thickness,
                    ring_gap,
                    max_rings,
                    crosshair_thickness,
                    crosshair_length,
                    angle,
                } => {
                    let (
                        Some(center_x),
                        Some(center_y),
                        Some(diameter),
                        Some(ring_thickness),
                        Some(ring_gap),
                        Some(max_rings),
                        Some(crosshair_thickness),
                        Some(crosshair_length),
                        Some(angle),
                    ) = (
                        evaluator.evaluate(center_x, pos, warnings),
                        evaluator.evaluate(center_y, pos, warnings),
                        evaluator.evaluate(diameter, pos, warnings),
                        evaluator.evaluate(ring_thickness, pos, warnings),
                        evaluator.evaluate(ring_gap, pos, warnings),
                        evaluator.evaluate(max_rings, pos, warnings),
                        evaluator.evaluate(crosshair_thickness, pos, warnings),
                        evaluator.evaluate(crosshair_length, pos, warnings),
                        evaluator.evaluate(angle, pos, warnings),
                    )
                    else {
                        continue;
                    };
                    let rotation = angle.original_value();
                    let center = Vector::new(center_x.to_mm(), center_y.to_mm());
                    let ring_center = Position::origin() + rotate(center, rotation);
                    let thickness = ring_thickness.to_mm();
                    let gap = ring_gap.to_mm();
                    for ring in 0..max_rings.original_value() as usize {
                        let mut d = diameter.to_mm() - 2.0 * ring as f64 * (thickness + gap);
                        if d <= 0.0 {
                            break;
                        }
                        self.transformed_circle_path(pos, transform, Exposure::On, ring_center, d);
                        d -= 2.0 * gap;
                        if d <= 0.0 {
                            break;
                        }
                        self.transformed_circle_path(pos, transform, Exposure::Off, ring_center, d);
                    }
                    if ring_thickness.original_value() > 0.0 {
                        let ct = crosshair_thickness.to_mm() * 0.5;
                        let cl = crosshair_length.to_mm() * 0.5;
                        let origin = Position::origin();
                        // vertical bar
                        self.transformed_polygon_path(
                            pos,
                            transform,
                            Exposure::On,
                            &[
                                origin + rotate(center + Vector::new(-ct, cl), rotation),
                                origin + rotate(center + Vector::new(ct, cl), rotation),
                                origin + rotate(center + Vector::new(ct, -cl), rotation),
                                origin + rotate(center + Vector::new(-ct, -cl), rotation),
                            ],
                        );
                        // horizontal bar
                        self.transformed_polygon_path(
                            pos,
                            transform,
                            Exposure::On,
                            &[
                                origin + rotate(center + Vector::new(-cl, ct), rotation),
                                origin + rotate(center + Vector::new(cl, ct), rotation),
                                origin + rotate(center + Vector::new(cl, -ct), rotation),
                                origin + rotate(center + Vector::new(-cl, -ct), rotation),
                            ],
                        );
                    }
                }
                MacroStatement::Thermal {
                    center_x,
                    center_y,
                    outer_diameter,
                    inner_diameter,
                    gap,
                    angle,
                } => {
                    let (Some(center_x), Some(center_y), Some(outer_diameter), Some(inner_diameter), Some(gap)) = (
                        evaluator.evaluate(center_x, pos, warnings),
                        evaluator.evaluate(center_y, pos, warnings),
                        evaluator.evaluate(outer_diameter, pos, warnings),
                        evaluator.evaluate(inner_diameter, pos, warnings),
                        evaluator.evaluate(gap, pos, warnings),
                    ) else {
                        continue;
                    };
                    let mut center_offset = Vector::new(center_x.to_mm(), center_y.to_mm());
                    if let Some(angle) = angle {
                        if let Some(angle) = evaluator.evaluate(angle, pos, warnings) {
                            center_offset = rotate(center_offset, angle.original_value());
                        }
                    }
                    let center = Position::origin() + center_offset;
                    let outer_radius = outer_diameter.to_mm() * 0.5;
                    self.transformed_circle_path(pos, transform, Exposure::On, center, outer_diameter.to_mm());
                    self.transformed_circle_path(pos, transform, Exposure::Off, center, inner_diameter.to_mm());

                    let half_gap = gap.to_mm() * 0.5;
                    // crossbars separating the thermal into four segments
                    self.transformed_polygon_path(
                        pos,
                        transform,
                        Exposure::Off,
                        &[
                            center + Vector::new(-half_gap, outer_radius),
                            center + Vector::new(half_gap, outer_radius),
                            center + Vector::new(half_gap, -outer_radius),
                            center + Vector::new(-half_gap, -outer_radius),
                        ],
                    );
                    self.transformed_polygon_path(
                        pos,
                        transform,
                        Exposure::Off,
                        &[
                            center + Vector::new(outer_radius, half_gap),
                            center + Vector::new(outer_radius, -half_gap),
                            center + Vector::new(-outer_radius, -half_gap),
                            center + Vector::new(-outer_radius, half_gap),
                        ],
                    );
                }
            }
        }
    }
}

fn exposure_of(value: Length) -> Exposure {
    if value.original_value() == 0.0 {
        Exposure::Off
    } else {
        Exposure::On
    }
}

impl<P: PlotHandler> GraphicsEventHandler for PrimitivePlotter<P> {
    #[profiling::function]
    fn interpolate(&mut self, params: &InterpolateParams, warnings: &mut WarningCollector) {
        let pos = params.pos;
        let transform = &params.transform;
        let start = transform.apply(params.current);
        let end = transform.apply(params.target);
        let ij = transform.apply_vector(params.offset);
        let width = self.stroke_width(params, warnings) * transform.uniform_scale();
        let half = width * 0.5;

        self.handler
            .begin_object(pos, params.polarity);
        match params.interpolation_mode {
            InterpolationMode::Linear => {
                if start == end {
                    // no direction to offset along, a dot of the aperture width remains
                    self.handler
                        .begin_path(pos, Exposure::On);
                    self.arc(pos, start, half, 0.0, 360.0);
                    self.handler
                        .end_path(pos, Exposure::On);
                } else {
                    let direction = end - start;
                    let offset = Vector::new(-direction.y, direction.x).normalize() * half;
                    self.handler
                        .begin_path(pos, Exposure::On);
                    self.handler
                        .add_line(pos, start + offset, end + offset);
                    self.arc(pos, end, half, vector_angle(offset), -180.0);
                    self.handler
                        .add_line(pos, end - offset, start - offset);
                    self.arc(pos, start, half, vector_angle(-offset), -180.0);
                    self.handler
                        .end_path(pos, Exposure::On);
                }
            }
            InterpolationMode::ClockwiseCircular | InterpolationMode::CounterclockwiseCircular => {
                let clockwise = (params.interpolation_mode == InterpolationMode::ClockwiseCircular)
                    != transform.is_mirroring();
                if start == end {
                    match params.quadrant_mode {
                        QuadrantMode::Multi => {
                            // full annulus around the offset center
                            let radius = ij.norm();
                            let center = start + ij;
                            self.handler
                                .begin_path(pos, Exposure::On);
                            self.arc(pos, center, radius + half, 0.0, 360.0);
                            self.handler
                                .end_path(pos, Exposure::On);
                            self.handler
                                .begin_path(pos, Exposure::Off);
                            self.arc(pos, center, radius - half, 0.0, 360.0);
                            self.handler
                                .end_path(pos, Exposure::Off);
                        }
                        QuadrantMode::Single => {
                            // the offset is meaningless for a zero length move, a dot
                            // of the aperture width remains
                            self.handler
                                .begin_path(pos, Exposure::On);
                            self.arc(pos, start, half, 0.0, if clockwise { -360.0 } else { 360.0 });
                            self.handler
                                .end_path(pos, Exposure::On);
                        }
                    }
                } else {
                    match resolve_arc_center(start, end, ij, params.quadrant_mode, clockwise) {
                        Some(center) => {
                            let start_angle = vector_angle(start - center);
                            let end_angle = vector_angle(end - center);
                            let radius = (start - center).norm();
                            let cap = if clockwise { -180.0 } else { 180.0 };
                            self.handler
                                .begin_path(pos, Exposure::On);
                            self.arc(pos, center, radius + half, start_angle, sweep(start_angle, end_angle, clockwise));
                            self.arc(pos, end, half, end_angle, cap);
                            self.arc(pos, center, radius - half, end_angle, sweep(end_angle, start_angle, clockwise));
                            self.arc(pos, start, half, start_angle, cap);
                            self.handler
                                .end_path(pos, Exposure::On);
                        }
                        None => warnings.add(pos, "No viable arc center found, skipping interpolation"),
                    }
                }
            }
        }
        self.handler
            .end_object(pos, params.polarity);
    }

    fn region_begin(&mut self, pos: SourcePosition, polarity: Polarity) {
        self.handler
            .begin_object(pos, polarity);
    }

    fn region_start_contour(&mut self, pos: SourcePosition) {
        self.handler
            .begin_path(pos, Exposure::On);
    }

    fn region_interpolate(&mut self, params: &InterpolateParams, warnings: &mut WarningCollector) {
        let pos = params.pos;
        let transform = &params.transform;
        let start = transform.apply(params.current);
        let end = transform.apply(params.target);
        let ij = transform.apply_vector(params.offset);

        match params.interpolation_mode {
            InterpolationMode::Linear => self
                .handler
                .add_line(pos, start, end),
            InterpolationMode::ClockwiseCircular | InterpolationMode::CounterclockwiseCircular => {
                let clockwise = (params.interpolation_mode == InterpolationMode::ClockwiseCircular)
                    != transform.is_mirroring();
                if start == end {
                    match params.quadrant_mode {
                        QuadrantMode::Multi => {
                            let radius = ij.norm();
                            self.arc(pos, start, radius, 0.0, if clockwise { -360.0 } else { 360.0 });
                        }
                        // zero length contour edge, nothing remains
                        QuadrantMode::Single => {}
                    }
                } else {
                    match resolve_arc_center(start, end, ij, params.quadrant_mode, clockwise) {
                        Some(center) => {
                            let start_angle = vector_angle(start - center);
                            let end_angle = vector_angle(end - center);
                            let radius = (start - center).norm();
                            self.arc(pos, center, radius, start_angle, sweep(start_angle, end_angle, clockwise));
                        }
                        None => warnings.add(pos, "No viable arc center found, skipping contour edge"),
                    }
                }
            }
        }
    }

    fn region_end_contour(&mut self, pos: SourcePosition) {
        self.handler
            .end_path(pos, Exposure::On);
    }

    fn region_end(&mut self, pos: SourcePosition, polarity: Polarity) {
        self.handler
            .end_object(pos, polarity);
    }

    #[profiling::function]
    fn flash(
        &mut self,
        pos: SourcePosition,
        transform: &Transform,
        aperture: &ApertureDefinition,
        polarity: Polarity,
        warnings: &mut WarningCollector,
    ) {
        self.handler
            .begin_object(pos, polarity);
        match &aperture.kind {
            ApertureKind::Standard {
                template,
                parameters,
            } => self.flash_standard(pos, transform, *template, parameters),
            ApertureKind::Macro {
                template,
                parameters,
                unit,
            } => self.flash_macro(pos, transform, template, parameters, *unit, warnings),
            // block apertures are expanded into their recorded events upstream
            ApertureKind::Block {
                ..
            } => {}
        }
        self.handler
            .end_object(pos, polarity);
    }
}
