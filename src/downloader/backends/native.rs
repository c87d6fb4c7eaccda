// In-process container backend on libav (ffmpeg-next)
//
// Only compiled with the `ffmpeg-native` feature. Plugs into the generic
// packet copy in `remux.rs`.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::{codec, encoder, format, media, Rational};

use crate::downloader::errors::DownloadError;
use crate::downloader::models::StreamKind;
use crate::downloader::remux::{MediaContainers, MediaPacket, PacketSink, PacketSource};

fn merge_error(context: &str, e: ffmpeg::Error) -> DownloadError {
    DownloadError::MergeFailed(format!("{}: {}", context, e))
}

#[derive(Debug, Clone, Copy)]
pub struct FfmpegContainers;

impl FfmpegContainers {
    pub fn new() -> Result<Self, DownloadError> {
        ffmpeg::init().map_err(|e| merge_error("libav init", e))?;
        Ok(Self)
    }
}

pub struct FfmpegPacket {
    packet: ffmpeg::Packet,
    time_base: Rational,
}

impl MediaPacket for FfmpegPacket {
    fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }
}

pub struct FfmpegInput {
    ctx: format::context::Input,
    stream_index: usize,
    time_base: Rational,
}

impl PacketSource for FfmpegInput {
    type Packet = FfmpegPacket;

    fn next_packet(&mut self) -> Result<Option<FfmpegPacket>, DownloadError> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.ctx) {
                Ok(()) if packet.stream() == self.stream_index => {
                    return Ok(Some(FfmpegPacket {
                        packet,
                        time_base: self.time_base,
                    }))
                }
                // other streams of the same file are not copied
                Ok(()) => continue,
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(merge_error("read packet", e)),
            }
        }
    }
}

pub struct FfmpegOutput {
    ctx: format::context::Output,
}

impl PacketSink for FfmpegOutput {
    type Source = FfmpegInput;

    fn add_track_from(&mut self, source: &FfmpegInput) -> Result<usize, DownloadError> {
        let input_stream = source
            .ctx
            .stream(source.stream_index)
            .ok_or_else(|| DownloadError::MergeFailed("input stream disappeared".to_string()))?;

        let mut track = self
            .ctx
            .add_stream(encoder::find(codec::Id::None))
            .map_err(|e| merge_error("add stream", e))?;
        track.set_parameters(input_stream.parameters());
        // SAFETY: points at the parameters of the stream added above; a zero
        // tag lets the muxer pick one valid for its container.
        unsafe {
            (*track.parameters().as_mut_ptr()).codec_tag = 0;
        }
        Ok(track.index())
    }

    fn begin(&mut self) -> Result<(), DownloadError> {
        self.ctx.write_header().map_err(|e| merge_error("write header", e))
    }

    fn write_packet(&mut self, track: usize, packet: FfmpegPacket) -> Result<(), DownloadError> {
        // time bases of output streams are only final after the header
        let out_time_base = self
            .ctx
            .stream(track)
            .map(|s| s.time_base())
            .ok_or_else(|| DownloadError::MergeFailed(format!("no output track {}", track)))?;

        let FfmpegPacket { mut packet, time_base } = packet;
        packet.rescale_ts(time_base, out_time_base);
        packet.set_position(-1);
        packet.set_stream(track);
        packet
            .write_interleaved(&mut self.ctx)
            .map_err(|e| merge_error("write packet", e))
    }

    fn finish(mut self) -> Result<(), DownloadError> {
        self.ctx.write_trailer().map_err(|e| merge_error("write trailer", e))
    }
}

impl MediaContainers for FfmpegContainers {
    type Source = FfmpegInput;
    type Sink = FfmpegOutput;

    fn open_input(&self, path: &Path, kind: StreamKind) -> Result<FfmpegInput, DownloadError> {
        let ctx = format::input(&path).map_err(|e| merge_error(&format!("open {}", path.display()), e))?;
        let media_type = match kind {
            StreamKind::Video => media::Type::Video,
            StreamKind::Audio => media::Type::Audio,
        };

        let (stream_index, time_base) = {
            let stream = ctx
                .streams()
                .best(media_type)
                .ok_or(DownloadError::NoStreamsAvailable(kind))?;
            (stream.index(), stream.time_base())
        };

        Ok(FfmpegInput {
            ctx,
            stream_index,
            time_base,
        })
    }

    fn create_output(&self, path: &Path) -> Result<FfmpegOutput, DownloadError> {
        let ctx = format::output(&path).map_err(|e| merge_error(&format!("create {}", path.display()), e))?;
        Ok(FfmpegOutput { ctx })
    }
}
