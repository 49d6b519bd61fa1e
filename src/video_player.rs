use crate::error::MediaError;
use crate::playback::{MediaEvent, MediaSurface};
use eframe::epaint::ColorImage;
use gstreamer::prelude::*;
use gstreamer::{Bin, ClockTime, Element, ElementFactory, MessageView, SeekFlags, State};
use gstreamer_app::AppSink;
use gstreamer_video::{VideoFrame, VideoInfo};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use tokio::sync::watch;

pub type FrameSender = Arc<watch::Sender<Option<ColorImage>>>;

/// gstreamer `playbin` rendering RGBA frames into a watch channel.
pub struct VideoPlayer {
    frames: FrameSender,
    pipeline: Option<Element>,
    events: Option<mpsc::Receiver<MediaEvent>>,
    frame_count: Arc<AtomicU64>,
    frames_seen: u64,
    stop_bus: Arc<AtomicBool>,
}

impl VideoPlayer {
    pub fn new(frames: FrameSender) -> Self {
        Self {
            frames,
            pipeline: None,
            events: None,
            frame_count: Arc::new(AtomicU64::new(0)),
            frames_seen: 0,
            stop_bus: Arc::new(AtomicBool::new(false)),
        }
    }

    fn pipeline(&self) -> Result<&Element, MediaError> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| MediaError("no media loaded".to_string()))
    }

    fn set_state(&self, state: State) -> Result<(), MediaError> {
        self.pipeline()?
            .set_state(state)
            .map(|_| ())
            .map_err(|e| MediaError(format!("state change to {state:?} failed: {e:?}")))
    }
}

fn make(factory: &str) -> Result<Element, MediaError> {
    ElementFactory::make(factory)
        .build()
        .map_err(|e| MediaError(format!("failed to create {factory}: {e:?}")))
}

fn build_pipeline(uri: &str, frames: FrameSender, frame_count: Arc<AtomicU64>) -> Result<Element, MediaError> {
    let pipeline = make("playbin")?;
    pipeline.set_property("uri", uri);

    let video_bin = Bin::new();
    let videoconvert = make("videoconvert")?;
    let videoscale = make("videoscale")?;
    let capsfilter = make("capsfilter")?;
    capsfilter.set_property(
        "caps",
        &gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .build(),
    );

    let appsink = AppSink::builder().build();
    appsink.set_max_buffers(1);
    appsink.set_drop(true);
    let sink: Element = appsink.clone().upcast();

    video_bin
        .add_many([&videoconvert, &videoscale, &capsfilter, &sink])
        .map_err(|e| MediaError(format!("failed to assemble video bin: {e:?}")))?;
    Element::link_many([&videoconvert, &videoscale, &capsfilter, &sink])
        .map_err(|e| MediaError(format!("failed to link video bin: {e:?}")))?;

    let pad = videoconvert
        .static_pad("sink")
        .ok_or_else(|| MediaError("videoconvert has no sink pad".to_string()))?;
    let ghost = gstreamer::GhostPad::with_target(&pad)
        .map_err(|e| MediaError(format!("failed to create ghost pad: {e:?}")))?;
    video_bin
        .add_pad(&ghost)
        .map_err(|e| MediaError(format!("failed to add ghost pad: {e:?}")))?;
    pipeline.set_property("video-sink", &video_bin);
    pipeline.set_property("audio-sink", &make("autoaudiosink")?);

    appsink.set_callbacks(
        gstreamer_app::AppSinkCallbacks::builder()
            .new_sample(move |appsink| {
                match pull_frame(appsink) {
                    Some(frame) => {
                        frames.send_replace(Some(frame));
                        frame_count.fetch_add(1, Ordering::Relaxed);
                    }
                    None => debug!(target: "video", "Dropped undecodable sample"),
                }
                Ok(gstreamer::FlowSuccess::Ok)
            })
            .build(),
    );

    Ok(pipeline)
}

fn pull_frame(appsink: &AppSink) -> Option<ColorImage> {
    let sample = appsink.pull_sample().ok()?;
    let buffer = sample.buffer()?;
    let video_info = VideoInfo::from_caps(sample.caps()?).ok()?;
    let frame = VideoFrame::from_buffer_readable(buffer.copy(), &video_info).ok()?;

    let width = video_info.width() as usize;
    let height = video_info.height() as usize;
    let stride = usize::try_from(*frame.plane_stride().first()?).ok()?;
    let data = frame.plane_data(0).ok()?;

    let row = width * 4;
    if stride == row {
        return Some(ColorImage::from_rgba_unmultiplied(
            [width, height],
            data.get(..row * height)?,
        ));
    }
    // Rows are padded.
    let mut pixels = Vec::with_capacity(row * height);
    for line in data.chunks(stride).take(height) {
        pixels.extend_from_slice(line.get(..row)?);
    }
    Some(ColorImage::from_rgba_unmultiplied([width, height], &pixels))
}

/// Forwards bus messages as media events until `stop` is set.
fn watch_bus(pipeline: &Element, events: mpsc::Sender<MediaEvent>, stop: Arc<AtomicBool>) -> Result<(), MediaError> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| MediaError("pipeline has no bus".to_string()))?;

    std::thread::spawn(move || {
        let mut ready_sent = false;
        while !stop.load(Ordering::Relaxed) {
            let Some(msg) = bus.timed_pop(ClockTime::from_mseconds(200)) else {
                continue;
            };
            let event = match msg.view() {
                MessageView::AsyncDone(_) if !ready_sent => {
                    info!(target: "video", "Media prerolled");
                    ready_sent = true;
                    Some(MediaEvent::Ready)
                }
                MessageView::Eos(_) => Some(MediaEvent::Ended),
                MessageView::Error(err) => {
                    let message = format!(
                        "{} ({:?})",
                        err.error(),
                        err.src().map(|s| s.path_string())
                    );
                    error!(target: "video", "Pipeline error: {}", message);
                    Some(MediaEvent::Error(message))
                }
                MessageView::Warning(w) => {
                    warn!(target: "video", "Pipeline warning: {} ({:?})", w.error(), w.debug());
                    None
                }
                _ => None,
            };
            if let Some(event) = event {
                if events.send(event).is_err() {
                    break;
                }
            }
        }
        debug!(target: "video", "Bus watch stopped");
    });
    Ok(())
}

impl MediaSurface for VideoPlayer {
    fn load(&mut self, url: &str) -> Result<(), MediaError> {
        gstreamer::init().map_err(|e| MediaError(format!("gstreamer init failed: {e}")))?;
        self.release();

        info!(target: "video", "Loading {}", url);
        self.frame_count = Arc::new(AtomicU64::new(0));
        self.frames_seen = 0;
        self.stop_bus = Arc::new(AtomicBool::new(false));

        let pipeline = build_pipeline(url, self.frames.clone(), self.frame_count.clone())?;
        let (sender, receiver) = mpsc::channel();
        watch_bus(&pipeline, sender, self.stop_bus.clone())?;
        self.pipeline = Some(pipeline);
        self.events = Some(receiver);
        self.set_state(State::Paused)
    }

    fn play(&mut self) -> Result<(), MediaError> {
        self.set_state(State::Playing)
    }

    fn pause(&mut self) -> Result<(), MediaError> {
        self.set_state(State::Paused)
    }

    fn seek_to_start(&mut self) -> Result<(), MediaError> {
        self.pipeline()?
            .seek_simple(SeekFlags::FLUSH | SeekFlags::KEY_UNIT, ClockTime::ZERO)
            .map_err(|e| MediaError(format!("seek failed: {e:?}")))
    }

    fn user_gesture_play(&mut self) -> Result<(), MediaError> {
        self.set_state(State::Ready)?;
        self.set_state(State::Playing)
    }

    fn poll_events(&mut self) -> Vec<MediaEvent> {
        let mut events = Vec::new();
        let frames = self.frame_count.load(Ordering::Relaxed);
        if frames != self.frames_seen {
            self.frames_seen = frames;
            events.push(MediaEvent::Progress);
        }
        if let Some(receiver) = &self.events {
            events.extend(receiver.try_iter());
        }
        events
    }

    fn release(&mut self) {
        self.stop_bus.store(true, Ordering::Relaxed);
        self.events = None;
        if let Some(pipeline) = self.pipeline.take() {
            debug!(target: "video", "Releasing pipeline");
            if let Err(e) = pipeline.set_state(State::Null) {
                warn!(target: "video", "Failed to stop pipeline: {:?}", e);
            }
        }
        self.frames.send_replace(None);
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        self.release();
    }
}
