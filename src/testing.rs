//! Support for tests of geometry consumers.

use crate::plotter::{Exposure, PlotHandler};
use crate::reader::Polarity;
use crate::spacial::Position;
use crate::warnings::SourcePosition;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcSegment {
    pub corner: Position,
    pub width: f64,
    pub height: f64,
    pub start_angle: f64,
    pub sweep: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlotEvent {
    BeginObject(Polarity),
    EndObject(Polarity),
    BeginPath(Exposure),
    EndPath(Exposure),
    Line(Position, Position),
    Arc(ArcSegment),
}

/// [`PlotHandler`] that records every emission for later assertions.
#[derive(Debug, Default)]
pub struct PlotRecorder {
    pub events: Vec<PlotEvent>,
}

impl PlotRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Position, Position)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                PlotEvent::Line(start, end) => Some((*start, *end)),
                _ => None,
            })
            .collect()
    }

    pub fn arcs(&self) -> Vec<ArcSegment> {
        self.events
            .iter()
            .filter_map(|event| match event {
                PlotEvent::Arc(arc) => Some(*arc),
                _ => None,
            })
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, PlotEvent::BeginObject(_)))
            .count()
    }

    pub fn path_count(&self, exposure: Exposure) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, PlotEvent::BeginPath(e) if *e == exposure))
            .count()
    }
}

impl PlotHandler for PlotRecorder {
    fn begin_object(&mut self, _pos: SourcePosition, polarity: Polarity) {
        self.events
            .push(PlotEvent::BeginObject(polarity));
    }

    fn end_object(&mut self, _pos: SourcePosition, polarity: Polarity) {
        self.events
            .push(PlotEvent::EndObject(polarity));
    }

    fn begin_path(&mut self, _pos: SourcePosition, exposure: Exposure) {
        self.events
            .push(PlotEvent::BeginPath(exposure));
    }

    fn end_path(&mut self, _pos: SourcePosition, exposure: Exposure) {
        self.events
            .push(PlotEvent::EndPath(exposure));
    }

    fn add_line(&mut self, _pos: SourcePosition, start: Position, end: Position) {
        self.events
            .push(PlotEvent::Line(start, end));
    }

    fn add_arc(
        &mut self,
        _pos: SourcePosition,
        corner: Position,
        width: f64,
        height: f64,
        start_angle: f64,
        sweep: f64,
    ) {
        self.events.push(PlotEvent::Arc(ArcSegment {
            corner,
            width,
            height,
            start_angle,
            sweep,
        }));
    }
}
