use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RegionClass};
use crate::frame::FrameView;

/// Scripted backend for dry runs and tests.
///
/// Answers are keyed by frame index and class. Frames without an entry have
/// no regions. An entry may be a fault, which makes `detect` fail for that
/// frame and class.
#[derive(Default)]
pub struct ScriptedBackend {
    script: HashMap<(u64, RegionClass), ScriptEntry>,
}

#[derive(Clone, Debug)]
enum ScriptEntry {
    Boxes(Vec<BoundingBox>),
    Fault(String),
}

/// One line of a JSON detection script.
#[derive(Debug, Deserialize)]
struct ScriptLine {
    frame: u64,
    class: RegionClass,
    #[serde(default)]
    boxes: Vec<[f32; 4]>,
    #[serde(default)]
    fault: Option<String>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a script from a JSON array of
    /// `{"frame": 31, "class": "face", "boxes": [[x, y, w, h]], "fault": null}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("invalid detection script {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let lines: Vec<ScriptLine> = serde_json::from_str(raw)?;
        let mut backend = Self::new();
        for line in lines {
            if line.frame == 0 {
                return Err(anyhow!("frame indices start at 1"));
            }
            match line.fault {
                Some(reason) => backend.fail_at(line.frame, line.class, reason),
                None => {
                    let boxes = line
                        .boxes
                        .iter()
                        .map(|[x, y, w, h]| BoundingBox::new(line.class, *x, *y, *w, *h))
                        .collect();
                    backend.set(line.frame, line.class, boxes)
                }
            }
        }
        Ok(backend)
    }

    /// Set the boxes returned for `class` on frame `index`.
    pub fn set(&mut self, index: u64, class: RegionClass, boxes: Vec<BoundingBox>) {
        self.script.insert((index, class), ScriptEntry::Boxes(boxes));
    }

    /// Make detection of `class` fail on frame `index`.
    pub fn fail_at(&mut self, index: u64, class: RegionClass, reason: impl Into<String>) {
        self.script
            .insert((index, class), ScriptEntry::Fault(reason.into()));
    }

    pub fn with(mut self, index: u64, class: RegionClass, boxes: Vec<BoundingBox>) -> Self {
        self.set(index, class, boxes);
        self
    }

    pub fn with_fault(mut self, index: u64, class: RegionClass) -> Self {
        self.fail_at(index, class, "scripted fault");
        self
    }

    pub fn len(&self) -> usize {
        self.script.len()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, _class: RegionClass) -> bool {
        true
    }

    fn detect(&mut self, frame: &FrameView<'_>, class: RegionClass) -> Result<Vec<BoundingBox>> {
        match self.script.get(&(frame.index(), class)) {
            None => Ok(Vec::new()),
            Some(ScriptEntry::Boxes(boxes)) => Ok(boxes.clone()),
            Some(ScriptEntry::Fault(reason)) => Err(anyhow!(
                "{} detection failed on frame {}: {}",
                class.as_str(),
                frame.index(),
                reason
            )),
        }
    }
}
