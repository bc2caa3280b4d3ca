//! Local media tracks
//!
//! There is no camera or microphone capture here: acquiring media creates
//! the outbound tracks, and while audio is enabled a pump writes Opus
//! silence so the other side sees a live inbound track. Muting pauses the
//! pump; with the camera off, video samples are dropped.

use crate::call::{CallError, LocalMedia};
use crate::config::WebRtcConfig;
use bytes::Bytes;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// One 20 ms Opus frame of silence
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];
const FRAME_DURATION: Duration = Duration::from_millis(20);
const STREAM_ID: &str = "duet-call";

/// Outbound audio/video tracks for one call
pub struct LocalTracks {
    audio: Option<Arc<TrackLocalStaticSample>>,
    video: Option<Arc<TrackLocalStaticSample>>,
    audio_enabled: Arc<AtomicBool>,
    video_enabled: AtomicBool,
    silence_frames: Arc<AtomicU64>,
    stopped: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl LocalTracks {
    /// Create the enabled tracks and start the silence pump.
    /// Must be called from within a tokio runtime.
    pub fn acquire(config: &WebRtcConfig) -> Result<Arc<Self>, CallError> {
        if !config.audio && !config.video {
            return Err(CallError::MediaAccess("Audio and video are both disabled".to_string()));
        }

        let audio = config.audio.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    clock_rate: 48_000,
                    channels: 2,
                    ..Default::default()
                },
                "audio".to_string(),
                STREAM_ID.to_string(),
            ))
        });

        let video = config.video.then(|| {
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_string(),
                    clock_rate: 90_000,
                    ..Default::default()
                },
                "video".to_string(),
                STREAM_ID.to_string(),
            ))
        });

        let audio_enabled = Arc::new(AtomicBool::new(true));
        let silence_frames = Arc::new(AtomicU64::new(0));
        let pump = audio.clone().map(|track| {
            tokio::spawn(pump_silence(track, audio_enabled.clone(), silence_frames.clone()))
        });
        info!(
            "Local media acquired (audio: {}, video: {})",
            audio.is_some(),
            video.is_some()
        );

        Ok(Arc::new(Self {
            audio,
            video,
            audio_enabled,
            video_enabled: AtomicBool::new(true),
            silence_frames,
            stopped: AtomicBool::new(false),
            pump: Mutex::new(pump),
        }))
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio.is_some() && self.audio_enabled.load(Ordering::SeqCst)
    }

    pub fn video_enabled(&self) -> bool {
        self.video.is_some() && self.video_enabled.load(Ordering::SeqCst)
    }

    /// Silence frames written so far
    pub fn silence_frames(&self) -> u64 {
        self.silence_frames.load(Ordering::SeqCst)
    }

    /// Send one encoded video frame. Returns false when the frame was
    /// dropped because the camera is off, there is no video track, or
    /// media has been released.
    pub async fn write_video(&self, sample: &Sample) -> Result<bool, CallError> {
        let Some(video) = &self.video else {
            return Ok(false);
        };
        if self.is_stopped() || !self.video_enabled.load(Ordering::SeqCst) {
            return Ok(false);
        }
        video
            .write_sample(sample)
            .await
            .map_err(|e| CallError::MediaAccess(format!("Failed to write video frame: {}", e)))?;
        Ok(true)
    }
}

impl LocalMedia for LocalTracks {
    fn tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        let mut tracks: Vec<Arc<dyn TrackLocal + Send + Sync>> = Vec::new();
        if let Some(audio) = &self.audio {
            tracks.push(audio.clone());
        }
        if let Some(video) = &self.video {
            tracks.push(video.clone());
        }
        tracks
    }

    fn toggle_audio(&self) -> Option<bool> {
        self.audio.as_ref()?;
        let enabled = !self.audio_enabled.fetch_xor(true, Ordering::SeqCst);
        debug!("Outbound audio {}", if enabled { "enabled" } else { "muted" });
        Some(enabled)
    }

    fn toggle_video(&self) -> Option<bool> {
        self.video.as_ref()?;
        let enabled = !self.video_enabled.fetch_xor(true, Ordering::SeqCst);
        debug!("Outbound video {}", if enabled { "enabled" } else { "off" });
        Some(enabled)
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        info!("Local media released");
    }
}

impl Drop for LocalTracks {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}

async fn pump_silence(track: Arc<TrackLocalStaticSample>, enabled: Arc<AtomicBool>, frames: Arc<AtomicU64>) {
    let mut ticker = tokio::time::interval(FRAME_DURATION);
    loop {
        ticker.tick().await;
        if !enabled.load(Ordering::SeqCst) {
            continue;
        }
        let sample = Sample {
            data: Bytes::from_static(&OPUS_SILENCE),
            duration: FRAME_DURATION,
            ..Default::default()
        };
        if let Err(e) = track.write_sample(&sample).await {
            debug!("Silence frame not written: {}", e);
        }
        frames.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_both_disabled_is_media_error() {
        let config = WebRtcConfig { audio: false, video: false, ..WebRtcConfig::default() };
        assert!(matches!(LocalTracks::acquire(&config), Err(CallError::MediaAccess(_))));
    }

    #[tokio::test]
    async fn test_enabled_tracks_only() {
        let config = WebRtcConfig { video: false, ..WebRtcConfig::default() };
        let media = LocalTracks::acquire(&config).unwrap();
        let tracks = media.tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].kind(), webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Audio);

        let both = LocalTracks::acquire(&WebRtcConfig::default()).unwrap();
        assert_eq!(both.tracks().len(), 2);
        both.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let media = LocalTracks::acquire(&WebRtcConfig::default()).unwrap();
        assert!(!media.is_stopped());
        media.stop();
        media.stop();
        assert!(media.is_stopped());
        assert!(media.pump.lock().is_none());
    }

    #[tokio::test]
    async fn test_mute_pauses_silence_pump() {
        let media = LocalTracks::acquire(&WebRtcConfig { video: false, ..WebRtcConfig::default() }).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(media.silence_frames() > 0);

        assert_eq!(media.toggle_audio(), Some(false));
        assert!(!media.audio_enabled());
        tokio::time::sleep(Duration::from_millis(40)).await;
        let paused_at = media.silence_frames();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(media.silence_frames(), paused_at);

        assert_eq!(media.toggle_audio(), Some(true));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(media.silence_frames() > paused_at);

        assert_eq!(media.toggle_video(), None);
        media.stop();
    }

    #[tokio::test]
    async fn test_camera_off_drops_video_frames() {
        let media = LocalTracks::acquire(&WebRtcConfig::default()).unwrap();
        let frame = Sample {
            data: Bytes::from_static(&[0x10, 0x02, 0x00]),
            duration: Duration::from_millis(33),
            ..Default::default()
        };
        assert!(media.write_video(&frame).await.unwrap());

        assert_eq!(media.toggle_video(), Some(false));
        assert!(!media.video_enabled());
        assert!(!media.write_video(&frame).await.unwrap());

        assert_eq!(media.toggle_video(), Some(true));
        media.stop();
        assert!(!media.write_video(&frame).await.unwrap());
    }
}
