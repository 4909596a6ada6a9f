//! Virtual camera source
//!
//! Produces synthetic frames (or scripted failures) instead of talking to
//! hardware. Used by the demo shell on machines without a camera and by the
//! test suite, which relies on its live-handle accounting.

use super::traits::{MediaError, MediaSource, RawFrame, Resolution, StreamConstraints, StreamHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the next `open` call returns
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Grant { width: u32, height: u32 },
    Fail(MediaError),
}

pub struct ScriptedSource {
    /// Consumed front to back; `fallback` once empty
    script: Mutex<VecDeque<ScriptedOutcome>>,
    fallback: ScriptedOutcome,
    open_delay: Duration,
    ready_delay: Duration,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    requests: Mutex<Vec<StreamConstraints>>,
}

impl ScriptedSource {
    /// Every request is granted with a `width` x `height` stream
    pub fn granting(width: u32, height: u32) -> Self {
        Self::with_fallback(VecDeque::new(), ScriptedOutcome::Grant { width, height })
    }

    /// Every request fails with `error`
    pub fn failing(error: MediaError) -> Self {
        Self::with_fallback(VecDeque::new(), ScriptedOutcome::Fail(error))
    }

    /// Play `outcomes` in order, then keep repeating the last one
    pub fn scripted(outcomes: Vec<ScriptedOutcome>) -> Self {
        let fallback = outcomes
            .last()
            .cloned()
            .unwrap_or(ScriptedOutcome::Grant {
                width: 640,
                height: 480,
            });
        Self::with_fallback(outcomes.into(), fallback)
    }

    fn with_fallback(script: VecDeque<ScriptedOutcome>, fallback: ScriptedOutcome) -> Self {
        Self {
            script: Mutex::new(script),
            fallback,
            open_delay: Duration::ZERO,
            ready_delay: Duration::ZERO,
            live: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Simulate the permission prompt / negotiation taking `delay`
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Simulate the video element taking `delay` to report dimensions
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Streams currently open
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Most streams ever open at the same time
    pub fn peak_live_handles(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Constraints of every `open` call so far
    pub fn requests(&self) -> Vec<StreamConstraints> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl MediaSource for ScriptedSource {
    fn name(&self) -> &str {
        "virtual"
    }

    async fn open(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn StreamHandle>, MediaError> {
        self.requests.lock().push(constraints.clone());

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match outcome {
            ScriptedOutcome::Fail(error) => Err(error),
            ScriptedOutcome::Grant { width, height } => {
                let now_live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now_live, Ordering::SeqCst);
                tracing::debug!("Virtual camera opened {}x{} ({} live)", width, height, now_live);

                Ok(Box::new(ScriptedStream {
                    resolution: Resolution { width, height },
                    ready_delay: self.ready_delay,
                    live: self.live.clone(),
                    stopped: false,
                    frames_served: 0,
                }))
            }
        }
    }
}

struct ScriptedStream {
    resolution: Resolution,
    ready_delay: Duration,
    live: Arc<AtomicUsize>,
    stopped: bool,
    frames_served: u32,
}

#[async_trait]
impl StreamHandle for ScriptedStream {
    async fn wait_ready(&mut self) -> Result<Resolution, MediaError> {
        if self.stopped {
            return Err(MediaError::Other("stream stopped".to_string()));
        }
        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay).await;
        }
        Ok(self.resolution)
    }

    fn grab_frame(&mut self) -> Result<RawFrame, MediaError> {
        if self.stopped {
            return Err(MediaError::Other("stream stopped".to_string()));
        }
        self.frames_served += 1;
        Ok(test_pattern(self.resolution, self.frames_served))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Diagonal gradient, shifted by `seed` so consecutive frames differ
fn test_pattern(resolution: Resolution, seed: u32) -> RawFrame {
    let Resolution { width, height } = resolution;
    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let v = ((x + y + seed) % 256) as u8;
            rgba.extend_from_slice(&[v, v / 2, 255 - v, 255]);
        }
    }
    RawFrame {
        width,
        height,
        rgba,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_fallback() {
        let source = ScriptedSource::scripted(vec![
            ScriptedOutcome::Fail(MediaError::NotFound("none".into())),
            ScriptedOutcome::Grant {
                width: 2,
                height: 2,
            },
        ]);
        let c = StreamConstraints::rear_minimal();

        assert!(source.open(&c).await.is_err());
        let first = source.open(&c).await.unwrap();
        let second = source.open(&c).await.unwrap();
        assert_eq!(source.live_handles(), 2);

        drop(first);
        drop(second);
        assert_eq!(source.live_handles(), 0);
        assert_eq!(source.peak_live_handles(), 2);
    }

    #[tokio::test]
    async fn test_stopped_stream_serves_nothing() {
        let source = ScriptedSource::granting(3, 2);
        let mut stream = source.open(&StreamConstraints::rear_minimal()).await.unwrap();

        let frame = stream.grab_frame().unwrap();
        assert_eq!(frame.rgba.len(), 3 * 2 * 4);

        stream.stop();
        stream.stop();
        assert_eq!(source.live_handles(), 0);
        assert!(stream.grab_frame().is_err());
    }
}
