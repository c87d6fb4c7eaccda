// Packet-level remuxing
//
// Copies the encoded packets of one video input and one audio input into a
// new container without decoding. Backends provide the actual demuxer and
// muxer; this module owns the copy rules:
//
// - each output track takes its codec parameters from its input track
// - packets without a decode timestamp are dropped
// - each input is drained in arrival order; the output is finalized only
//   after both inputs are exhausted

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::StreamKind;
use super::traits::StreamMerger;
use super::utils::remove_quietly;

/// One encoded packet as read from a demuxer
pub trait MediaPacket {
    /// Decode timestamp, `None` when the container did not provide one
    fn dts(&self) -> Option<i64>;
}

/// Demultiplexed view of the selected stream of one input file
pub trait PacketSource {
    type Packet: MediaPacket;

    /// Next packet of the selected stream, `None` at end of input
    fn next_packet(&mut self) -> Result<Option<Self::Packet>, DownloadError>;
}

/// Output container being written
pub trait PacketSink {
    type Source: PacketSource;

    /// Create an output track whose codec parameters copy `source`'s track
    fn add_track_from(&mut self, source: &Self::Source) -> Result<usize, DownloadError>;

    /// Called once after all tracks are added
    fn begin(&mut self) -> Result<(), DownloadError>;

    fn write_packet(
        &mut self,
        track: usize,
        packet: <Self::Source as PacketSource>::Packet,
    ) -> Result<(), DownloadError>;

    /// Flush and close the container
    fn finish(self) -> Result<(), DownloadError>;
}

/// Opens inputs and creates outputs for one container library
pub trait MediaContainers {
    type Source: PacketSource;
    type Sink: PacketSink<Source = Self::Source>;

    /// Open `path` and select its best stream of `kind`
    fn open_input(&self, path: &Path, kind: StreamKind) -> Result<Self::Source, DownloadError>;

    fn create_output(&self, path: &Path) -> Result<Self::Sink, DownloadError>;
}

/// Packet accounting for one remux
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemuxStats {
    pub video_packets: u64,
    pub audio_packets: u64,
    /// Packets dropped for lacking a decode timestamp
    pub skipped_packets: u64,
}

impl RemuxStats {
    pub fn written(&self) -> u64 {
        self.video_packets + self.audio_packets
    }
}

/// Copy the best video stream of `video` and the best audio stream of
/// `audio` into `output`
pub fn remux<C: MediaContainers>(
    containers: &C,
    video: &Path,
    audio: &Path,
    output: &Path,
) -> Result<RemuxStats, DownloadError> {
    let mut video_in = containers.open_input(video, StreamKind::Video)?;
    let mut audio_in = containers.open_input(audio, StreamKind::Audio)?;
    let mut sink = containers.create_output(output)?;

    let video_track = sink.add_track_from(&video_in)?;
    let audio_track = sink.add_track_from(&audio_in)?;
    sink.begin()?;

    let mut stats = RemuxStats::default();
    let (written, skipped) = copy_packets(&mut video_in, &mut sink, video_track)?;
    stats.video_packets = written;
    stats.skipped_packets += skipped;

    let (written, skipped) = copy_packets(&mut audio_in, &mut sink, audio_track)?;
    stats.audio_packets = written;
    stats.skipped_packets += skipped;

    sink.finish()?;
    Ok(stats)
}

fn copy_packets<S: PacketSink>(
    source: &mut S::Source,
    sink: &mut S,
    track: usize,
) -> Result<(u64, u64), DownloadError> {
    let mut written = 0u64;
    let mut skipped = 0u64;

    while let Some(packet) = source.next_packet()? {
        if packet.dts().is_none() {
            skipped += 1;
            continue;
        }
        sink.write_packet(track, packet)?;
        written += 1;
    }

    Ok((written, skipped))
}

/// `StreamMerger` running the packet copy on a blocking thread
pub struct PacketRemuxer<C> {
    containers: C,
}

impl<C> PacketRemuxer<C> {
    pub fn new(containers: C) -> Self {
        Self { containers }
    }
}

#[async_trait]
impl<C> StreamMerger for PacketRemuxer<C>
where
    C: MediaContainers + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "packet-remux"
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<Option<RemuxStats>, DownloadError> {
        let containers = self.containers.clone();
        let (v, a, o): (PathBuf, PathBuf, PathBuf) =
            (video.to_path_buf(), audio.to_path_buf(), output.to_path_buf());

        let result = tokio::task::spawn_blocking(move || remux(&containers, &v, &a, &o))
            .await
            .map_err(|e| DownloadError::MergeFailed(format!("remux task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(stats) => {
                tracing::info!(
                    video_packets = stats.video_packets,
                    audio_packets = stats.audio_packets,
                    skipped = stats.skipped_packets,
                    "remux finished"
                );
                Ok(Some(stats))
            }
            Err(e) => {
                remove_quietly(output).await;
                Err(e)
            }
        }
    }
}
