//! Background segment encoding on a single worker thread.
//!
//! Segments are handed to the worker over a channel and encoded strictly in
//! the order they were accepted. `drain` closes the channel and joins the
//! worker, so every accepted segment is finished before the run ends.
//! Segments that fail on the worker are returned from `drain` as
//! `LostSegment`s.

use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};

use super::{EncodeStats, LostSegment, OutputTarget, SegmentEncoder};
use crate::event::Segment;

pub struct BackgroundEncoder {
    target: OutputTarget,
    sender: Option<Sender<Segment>>,
    worker: Option<JoinHandle<EncodeStats>>,
    accepted: Vec<Segment>,
}

impl BackgroundEncoder {
    pub fn spawn<E: SegmentEncoder + 'static>(mut inner: E) -> Result<Self> {
        let target = inner.target();
        let (sender, receiver) = mpsc::channel::<Segment>();
        let worker = std::thread::Builder::new()
            .name("segment-encoder".to_string())
            .spawn(move || {
                let mut stats = EncodeStats::default();
                while let Ok(segment) = receiver.recv() {
                    match inner.encode(&segment) {
                        Ok(path) => {
                            stats.written += 1;
                            log::debug!("background encode finished: {}", path.display());
                        }
                        Err(e) => {
                            log::error!(
                                "segment {:.2}s - {:.2}s: {:#}",
                                segment.start_time,
                                segment.end_time,
                                e
                            );
                            stats.lost.push(LostSegment {
                                segment,
                                reason: format!("{e:#}"),
                            });
                        }
                    }
                }
                let inner_stats = inner.drain();
                stats.written += inner_stats.written;
                stats.lost.extend(inner_stats.lost);
                stats
            })
            .context("failed to start encoder thread")?;

        Ok(Self {
            target,
            sender: Some(sender),
            worker: Some(worker),
            accepted: Vec::new(),
        })
    }

    /// Segments accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.len() as u64
    }
}

impl SegmentEncoder for BackgroundEncoder {
    fn encode(&mut self, segment: &Segment) -> Result<PathBuf> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder already drained"))?;
        sender
            .send(*segment)
            .map_err(|_| anyhow!("encoder thread has stopped"))?;
        self.accepted.push(*segment);
        Ok(self.target.path_for(segment))
    }

    fn target(&self) -> OutputTarget {
        self.target.clone()
    }

    fn drain(&mut self) -> EncodeStats {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return EncodeStats::default();
        };
        match worker.join() {
            Ok(stats) => stats,
            Err(_) => {
                log::error!("encoder thread panicked");
                EncodeStats {
                    written: 0,
                    lost: self
                        .accepted
                        .iter()
                        .map(|segment| LostSegment {
                            segment: *segment,
                            reason: "encoder thread panicked".to_string(),
                        })
                        .collect(),
                }
            }
        }
    }
}

impl Drop for BackgroundEncoder {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.drain();
        }
    }
}
