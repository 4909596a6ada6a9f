//! Native webcam source using nokhwa
//!
//! nokhwa cameras are not `Send` on every backend, so each stream lives on
//! its own thread and the handle talks to it over a channel.

use super::traits::{CameraInfo, MediaError, MediaSource, RawFrame, Resolution, StreamConstraints, StreamHandle};
use async_trait::async_trait;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| CameraInfo {
                id: match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                },
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

fn classify(error: &nokhwa::NokhwaError) -> MediaError {
    let message = format!("{error:?}");
    if message.to_lowercase().contains("permission") {
        MediaError::NotAllowed(message)
    } else {
        MediaError::NotReadable(message)
    }
}

/// Webcam source backed by the platform's native capture API
pub struct NativeSource {
    device_id: Option<String>,
}

impl NativeSource {
    /// `device_id` of `None` opens the first camera
    pub fn new(device_id: Option<String>) -> Self {
        Self { device_id }
    }

    fn camera_index(&self) -> CameraIndex {
        match &self.device_id {
            Some(id) => match id.parse::<u32>() {
                Ok(idx) => CameraIndex::Index(idx),
                Err(_) => CameraIndex::String(id.clone()),
            },
            None => CameraIndex::Index(0),
        }
    }
}

enum Command {
    Grab(mpsc::Sender<Result<RawFrame, MediaError>>),
    Stop,
}

#[async_trait]
impl MediaSource for NativeSource {
    fn name(&self) -> &str {
        "native"
    }

    async fn open(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn StreamHandle>, MediaError> {
        if constraints.facing_mode.is_some() {
            tracing::debug!("Native cameras have no facing mode, ignoring constraint");
        }
        if list_cameras().is_empty() {
            return Err(MediaError::NotFound("no cameras found".to_string()));
        }

        let index = self.camera_index();
        let (opened_tx, opened_rx) = oneshot::channel();
        let (command_tx, command_rx) = mpsc::channel::<Command>();

        let thread = std::thread::spawn(move || {
            // Let the driver pick its default mode; anything stricter fails on cheap webcams
            let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None);

            let mut camera = match Camera::new(index.clone(), format) {
                Ok(camera) => camera,
                Err(e) => {
                    let _ = opened_tx.send(Err(classify(&e)));
                    return;
                }
            };
            if let Err(e) = camera.open_stream() {
                let _ = opened_tx.send(Err(classify(&e)));
                return;
            }

            let resolution = camera.resolution();
            tracing::info!(
                "Webcam {:?} opened: {}x{}",
                index,
                resolution.width(),
                resolution.height()
            );
            let _ = opened_tx.send(Ok(Resolution {
                width: resolution.width(),
                height: resolution.height(),
            }));

            // Runs until Stop or until the handle (and its sender) is dropped
            while let Ok(Command::Grab(reply)) = command_rx.recv() {
                let frame = camera
                    .frame()
                    .and_then(|buffer| buffer.decode_image::<RgbAFormat>())
                    .map(|image| RawFrame {
                        width: image.width(),
                        height: image.height(),
                        rgba: image.into_raw(),
                    })
                    .map_err(|e| MediaError::Other(format!("{e:?}")));
                let _ = reply.send(frame);
            }

            if let Err(e) = camera.stop_stream() {
                tracing::warn!("Error stopping camera stream: {:?}", e);
            }
            tracing::info!("Webcam thread stopped");
        });

        let resolution = opened_rx
            .await
            .map_err(|_| MediaError::Other("camera thread exited".to_string()))??;

        Ok(Box::new(NativeStream {
            resolution,
            commands: command_tx,
            thread: Some(thread),
        }))
    }
}

struct NativeStream {
    resolution: Resolution,
    commands: mpsc::Sender<Command>,
    thread: Option<JoinHandle<()>>,
}

#[async_trait]
impl StreamHandle for NativeStream {
    async fn wait_ready(&mut self) -> Result<Resolution, MediaError> {
        if self.thread.is_none() {
            return Err(MediaError::Other("stream stopped".to_string()));
        }
        // The thread only reports success after the stream delivered its format
        Ok(self.resolution)
    }

    fn grab_frame(&mut self) -> Result<RawFrame, MediaError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(Command::Grab(reply_tx))
            .map_err(|_| MediaError::Other("stream stopped".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| MediaError::Other("camera thread exited".to_string()))?
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(Command::Stop);
            let _ = thread.join();
        }
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.stop();
    }
}
