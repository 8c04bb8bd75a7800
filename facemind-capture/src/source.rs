use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::embedding::Embedding;

/// One frame as seen by the upstream detector + encoder
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    NoFace,
    Face(Embedding),
    /// Several faces in one frame, in detector order
    Faces(Vec<Embedding>),
}

impl Frame {
    /// The frame's primary face (the first one the detector reported)
    pub fn into_face(self) -> Option<Embedding> {
        match self {
            Frame::Face(embedding) => Some(embedding),
            Frame::Faces(faces) => faces.into_iter().next(),
            Frame::NoFace => None,
        }
    }

    pub fn into_faces(self) -> Vec<Embedding> {
        match self {
            Frame::Face(embedding) => vec![embedding],
            Frame::Faces(faces) => faces,
            Frame::NoFace => vec![],
        }
    }
}

fn parse_embedding(value: Value) -> Result<Embedding> {
    let values: Vec<f32> = serde_json::from_value(value)?;
    Ok(Embedding::try_from(values)?)
}

/// Stream of already-extracted frames. `Ok(None)` means the stream ended.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl FrameSource for std::vec::IntoIter<Frame> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.next())
    }
}

/// Frames recorded one per line: `null` for a frame without a face, a JSON
/// array holding that frame's face embedding, or an array of such arrays when
/// the frame has several faces.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl JsonLinesSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> FrameSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.with_context(|| format!("reading frame line {}", self.line_no))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(line)
                .with_context(|| format!("parsing frame line {}", self.line_no))?;
            let frame = match value {
                Value::Null => Frame::NoFace,
                Value::Array(items) if items.first().map_or(false, Value::is_array) => {
                    let faces = items
                        .into_iter()
                        .map(parse_embedding)
                        .collect::<Result<Vec<_>>>()
                        .with_context(|| format!("frame line {}", self.line_no))?;
                    Frame::Faces(faces)
                }
                other => Frame::Face(
                    parse_embedding(other)
                        .with_context(|| format!("frame line {}", self.line_no))?,
                ),
            };
            return Ok(Some(frame));
        }
        Ok(None)
    }
}
