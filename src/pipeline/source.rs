//! Frame sources
//!
//! A source yields HSV frames until it is exhausted. `close()` releases
//! whatever the source holds and may be called more than once.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::imageops;

use crate::error::SourceError;
use crate::vision::hsv::{rgb_to_hsv, HsvImage};

/// Stream of HSV frames
pub trait FrameSource: Send {
    /// Next frame, `Ok(None)` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<HsvImage>, SourceError>;

    /// Release acquisition resources
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<HsvImage>, SourceError> {
        (**self).next_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Replays recorded frames `1.png, 2.png, ...` from a directory.
///
/// Iteration stops at the first missing index.
#[derive(Debug)]
pub struct DirectoryFrameSource {
    dir: PathBuf,
    next_index: u64,
    /// Clockwise quarter turns
    rotation: u8,
    closed: bool,
}

impl DirectoryFrameSource {
    pub fn open(dir: impl Into<PathBuf>, rotation: u8) -> Result<Self, SourceError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(SourceError::DirectoryNotFound(dir.display().to_string()));
        }
        tracing::info!("Replaying frames from {}", dir.display());
        Ok(Self {
            dir,
            next_index: 1,
            rotation: rotation % 4,
            closed: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}.png", index))
    }
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<HsvImage>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        let index = self.next_index;
        let path = self.frame_path(index);
        if !path.is_file() {
            tracing::debug!("No frame {} in {}, source exhausted", index, self.dir.display());
            return Ok(None);
        }

        let rgb = image::open(&path)
            .map_err(|e| SourceError::ReadFailed {
                index,
                message: e.to_string(),
            })?
            .to_rgb8();
        let rgb = match self.rotation {
            1 => imageops::rotate90(&rgb),
            2 => imageops::rotate180(&rgb),
            3 => imageops::rotate270(&rgb),
            _ => rgb,
        };
        self.next_index += 1;
        Ok(Some(rgb_to_hsv(&rgb)))
    }

    fn close(&mut self) {
        if !self.closed {
            tracing::debug!("Closed frame directory {}", self.dir.display());
            self.closed = true;
        }
    }
}

/// Frames held in memory
#[derive(Debug, Default)]
pub struct MemoryFrameSource {
    frames: VecDeque<HsvImage>,
    closed: bool,
}

impl MemoryFrameSource {
    pub fn new(frames: impl IntoIterator<Item = HsvImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<HsvImage>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        Ok(self.frames.pop_front())
    }

    fn close(&mut self) {
        self.closed = true;
        self.frames.clear();
    }
}
