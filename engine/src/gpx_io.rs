use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use chrono::{DateTime, Utc};
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Metadata, Route, Track, TrackSegment, Waypoint};
use shared::{GeoPoint, PointSequence};
use time::OffsetDateTime;

use crate::error::{EngineError, TrackError};

const CREATOR: &str = "trackstat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    /// A segment of the `track`-th track of the document.
    TrackSegment { track: usize },
    Route,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSequence {
    pub kind: SequenceKind,
    pub name: Option<String>,
    pub points: PointSequence,
}

impl AsRef<[GeoPoint]> for LabeledSequence {
    fn as_ref(&self) -> &[GeoPoint] {
        &self.points
    }
}

/// Every track segment and route of a GPX document, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackDocument {
    pub name: Option<String>,
    pub sequences: Vec<LabeledSequence>,
}

impl TrackDocument {
    pub fn point_count(&self) -> usize {
        self.sequences.iter().map(|s| s.points.len()).sum()
    }

    /// New document with `transform` applied to every sequence.
    pub fn map_sequences<F>(&self, mut transform: F) -> Result<Self, EngineError>
    where
        F: FnMut(&[GeoPoint]) -> Result<PointSequence, EngineError>,
    {
        let sequences = self
            .sequences
            .iter()
            .map(|sequence| {
                Ok(LabeledSequence {
                    kind: sequence.kind,
                    name: sequence.name.clone(),
                    points: transform(&sequence.points)?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(Self {
            name: self.name.clone(),
            sequences,
        })
    }
}

pub fn read_path(path: impl AsRef<Path>) -> Result<TrackDocument, TrackError> {
    let file = File::open(path)?;
    read_document(BufReader::new(file))
}

pub fn read_document(reader: impl Read) -> Result<TrackDocument, TrackError> {
    let gpx: Gpx = gpx::read(reader)?;

    let mut sequences = Vec::new();
    for (track_idx, track) in gpx.tracks.iter().enumerate() {
        for segment in &track.segments {
            sequences.push(LabeledSequence {
                kind: SequenceKind::TrackSegment { track: track_idx },
                name: track.name.clone(),
                points: to_sequence(&segment.points),
            });
        }
    }
    for route in &gpx.routes {
        sequences.push(LabeledSequence {
            kind: SequenceKind::Route,
            name: route.name.clone(),
            points: to_sequence(&route.points),
        });
    }

    let document = TrackDocument {
        name: gpx.metadata.and_then(|m| m.name),
        sequences,
    };
    tracing::debug!(
        "read GPX document with {} sequence(s), {} point(s)",
        document.sequences.len(),
        document.point_count()
    );
    Ok(document)
}

pub fn write_path(document: &TrackDocument, path: impl AsRef<Path>) -> Result<(), TrackError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_document(document, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub fn write_document(document: &TrackDocument, writer: impl Write) -> Result<(), TrackError> {
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.into()),
        ..Default::default()
    };
    if document.name.is_some() {
        gpx.metadata = Some(Metadata {
            name: document.name.clone(),
            ..Default::default()
        });
    }

    let mut current_track: Option<usize> = None;
    for sequence in &document.sequences {
        let waypoints: Vec<Waypoint> = sequence.points.iter().map(to_waypoint).collect();
        match sequence.kind {
            SequenceKind::TrackSegment { track } => {
                if current_track != Some(track) || gpx.tracks.is_empty() {
                    gpx.tracks.push(Track {
                        name: sequence.name.clone(),
                        ..Default::default()
                    });
                    current_track = Some(track);
                }
                let mut segment = TrackSegment::new();
                segment.points = waypoints;
                if let Some(track) = gpx.tracks.last_mut() {
                    track.segments.push(segment);
                }
            }
            SequenceKind::Route => {
                gpx.routes.push(Route {
                    name: sequence.name.clone(),
                    points: waypoints,
                    ..Default::default()
                });
            }
        }
    }

    gpx::write(&gpx, writer)?;
    Ok(())
}

fn to_sequence(waypoints: &[Waypoint]) -> PointSequence {
    let mut points = Vec::with_capacity(waypoints.len());
    for waypoint in waypoints {
        let point = to_geo_point(waypoint);
        if point.is_valid() {
            points.push(point);
        } else {
            tracing::warn!(
                "dropping waypoint outside coordinate range: ({}, {})",
                point.lat,
                point.lon
            );
        }
    }
    points
}

fn to_geo_point(waypoint: &Waypoint) -> GeoPoint {
    let point = waypoint.point();
    GeoPoint {
        lat: point.y(),
        lon: point.x(),
        elevation: waypoint.elevation,
        time: waypoint.time.and_then(to_utc),
    }
}

fn to_waypoint(point: &GeoPoint) -> Waypoint {
    let mut waypoint = Waypoint::new(Point::new(point.lon, point.lat));
    waypoint.elevation = point.elevation;
    waypoint.time = point.time.and_then(to_gpx_time);
    waypoint
}

fn to_utc(time: gpx::Time) -> Option<DateTime<Utc>> {
    let time: OffsetDateTime = time.into();
    DateTime::from_timestamp(time.unix_timestamp(), time.nanosecond())
}

fn to_gpx_time(time: DateTime<Utc>) -> Option<gpx::Time> {
    let nanos = time.timestamp_nanos_opt()?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .ok()
        .map(gpx::Time::from)
}
